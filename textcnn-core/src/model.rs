use ndarray::{
    concatenate, s, Array, Array1, Array2, Array3, ArrayD, ArrayView2, ArrayView3, Axis,
    Dimension, ShapeBuilder,
};
use rand::Rng;
use tracing::debug;

use crate::checkpoint::Checkpoint;
use crate::config::RunConfig;
use crate::error::{Error, Result};

/// A network layer whose parameters can be read, replaced and persisted.
///
/// Parameters are exchanged in the order given by [`Layer::param_names`].
pub trait Layer {
    fn name(&self) -> &str;

    fn param_names(&self) -> &'static [&'static str];

    fn weights(&self) -> Vec<ArrayD<f32>>;

    /// Replaces every parameter, rejecting tensors whose shape differs from
    /// the layer's.
    fn set_weights(&mut self, weights: &[ArrayD<f32>]) -> Result<()>;

    fn load_from(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let tensors = self
            .param_names()
            .iter()
            .map(|param| {
                checkpoint
                    .require(&format!("{}/{}", self.name(), param))
                    .cloned()
            })
            .collect::<Result<Vec<_>>>()?;
        self.set_weights(&tensors)
    }

    fn save_to(&self, checkpoint: &mut Checkpoint) {
        for (param, tensor) in self.param_names().iter().zip(self.weights()) {
            checkpoint.insert(format!("{}/{}", self.name(), param), tensor);
        }
    }
}

fn uniform<Sh: ShapeBuilder, R: Rng>(shape: Sh, rng: &mut R) -> Array<f32, Sh::Dim> {
    Array::from_shape_simple_fn(shape, || rng.gen_range(-0.1..0.1))
}

fn assign<D: Dimension>(
    layer: &str,
    param: &str,
    target: &mut Array<f32, D>,
    source: &ArrayD<f32>,
) -> Result<()> {
    let mismatch = || Error::ShapeMismatch {
        layer: format!("{layer}/{param}"),
        expected: target.shape().to_vec(),
        actual: source.shape().to_vec(),
    };
    if source.shape() != target.shape() {
        return Err(mismatch());
    }
    let typed = source
        .clone()
        .into_dimensionality::<D>()
        .map_err(|_| mismatch())?;
    *target = typed;
    Ok(())
}

fn expect_count(layer: &str, names: &[&str], weights: &[ArrayD<f32>]) -> Result<()> {
    if let Some(missing) = names.get(weights.len()) {
        return Err(Error::MissingWeight {
            name: format!("{layer}/{missing}"),
        });
    }
    if weights.len() > names.len() {
        // tensor count, not a tensor shape
        return Err(Error::ShapeMismatch {
            layer: layer.to_string(),
            expected: vec![names.len()],
            actual: vec![weights.len()],
        });
    }
    Ok(())
}

/// Embedding layer mapping token ids to vectors.
pub struct Embedding {
    name: String,
    weight: Array2<f32>, // vocab_size x dim
}

impl Embedding {
    pub fn new<R: Rng>(vocab_size: usize, dim: usize, rng: &mut R) -> Self {
        Self {
            name: "embedding".into(),
            weight: uniform((vocab_size, dim), rng),
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.weight.nrows()
    }

    pub fn dim(&self) -> usize {
        self.weight.ncols()
    }

    /// Looks up every token of a `[batch, seq]` id matrix.
    pub fn forward(&self, tokens: ArrayView2<usize>) -> Result<Array3<f32>> {
        let (batch, seq) = tokens.dim();
        let mut out = Array3::<f32>::zeros((batch, seq, self.dim()));
        for ((b, t), &tok) in tokens.indexed_iter() {
            if tok >= self.vocab_size() {
                return Err(Error::NumericFailure(format!(
                    "token id {tok} outside embedding table of {} rows",
                    self.vocab_size()
                )));
            }
            out.slice_mut(s![b, t, ..]).assign(&self.weight.row(tok));
        }
        Ok(out)
    }
}

impl Layer for Embedding {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["embeddings"]
    }

    fn weights(&self) -> Vec<ArrayD<f32>> {
        vec![self.weight.clone().into_dyn()]
    }

    fn set_weights(&mut self, weights: &[ArrayD<f32>]) -> Result<()> {
        expect_count(&self.name, self.param_names(), weights)?;
        assign(&self.name, "embeddings", &mut self.weight, &weights[0])
    }
}

/// One-dimensional convolution with "same" padding and ReLU.
///
/// The output keeps the input's sequence length, so position `t` of the
/// activation lines up with token `t`.
pub struct Conv1d {
    name: String,
    kernel: Array3<f32>, // filter_size x in_channels x filters
    bias: Array1<f32>,
}

impl Conv1d {
    pub fn new<R: Rng>(
        name: impl Into<String>,
        filter_size: usize,
        in_channels: usize,
        filters: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            name: name.into(),
            kernel: uniform((filter_size, in_channels, filters), rng),
            bias: uniform(filters, rng),
        }
    }

    pub fn filter_size(&self) -> usize {
        self.kernel.shape()[0]
    }

    pub fn filters(&self) -> usize {
        self.bias.len()
    }

    /// `[batch, seq, in]` to `[batch, seq, filters]`.
    pub fn forward(&self, x: ArrayView3<f32>) -> Array3<f32> {
        let (batch, seq, _) = x.dim();
        let k = self.filter_size();
        let left = (k - 1) / 2;
        let mut out = Array3::<f32>::zeros((batch, seq, self.filters()));
        for (xb, mut ob) in x.outer_iter().zip(out.outer_iter_mut()) {
            for tap in 0..k {
                // output row t reads input row t + tap - left
                let lo = left.saturating_sub(tap);
                let hi = (seq + left).saturating_sub(tap).min(seq);
                if lo >= hi {
                    continue;
                }
                let src = xb.slice(s![lo + tap - left..hi + tap - left, ..]);
                let mut dst = ob.slice_mut(s![lo..hi, ..]);
                dst += &src.dot(&self.kernel.index_axis(Axis(0), tap));
            }
            ob += &self.bias;
            ob.mapv_inplace(relu);
        }
        out
    }
}

impl Layer for Conv1d {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["kernel", "bias"]
    }

    fn weights(&self) -> Vec<ArrayD<f32>> {
        vec![self.kernel.clone().into_dyn(), self.bias.clone().into_dyn()]
    }

    fn set_weights(&mut self, weights: &[ArrayD<f32>]) -> Result<()> {
        expect_count(&self.name, self.param_names(), weights)?;
        assign(&self.name, "kernel", &mut self.kernel, &weights[0])?;
        assign(&self.name, "bias", &mut self.bias, &weights[1])
    }
}

/// Fully connected layer.
pub struct Linear {
    name: String,
    weight: Array2<f32>, // in x out
    bias: Array1<f32>,
}

impl Linear {
    pub fn new<R: Rng>(
        name: impl Into<String>,
        in_features: usize,
        out_features: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            name: name.into(),
            weight: uniform((in_features, out_features), rng),
            bias: uniform(out_features, rng),
        }
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weight) + &self.bias
    }
}

impl Layer for Linear {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["kernel", "bias"]
    }

    fn weights(&self) -> Vec<ArrayD<f32>> {
        vec![self.weight.clone().into_dyn(), self.bias.clone().into_dyn()]
    }

    fn set_weights(&mut self, weights: &[ArrayD<f32>]) -> Result<()> {
        expect_count(&self.name, self.param_names(), weights)?;
        assign(&self.name, "kernel", &mut self.weight, &weights[0])?;
        assign(&self.name, "bias", &mut self.bias, &weights[1])
    }
}

/// Dropout is only active during training; at inference it passes through.
pub struct Dropout {
    name: String,
    pub p: f32,
}

impl Layer for Dropout {
    fn name(&self) -> &str {
        &self.name
    }

    fn param_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn weights(&self) -> Vec<ArrayD<f32>> {
        Vec::new()
    }

    fn set_weights(&mut self, weights: &[ArrayD<f32>]) -> Result<()> {
        expect_count(&self.name, self.param_names(), weights)
    }
}

fn relu(v: f32) -> f32 {
    v.max(0.0)
}

/// Row-wise softmax.
pub fn softmax(mut x: Array2<f32>) -> Array2<f32> {
    for mut row in x.axis_iter_mut(Axis(0)) {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
    x
}

/// Max over the sequence axis: `[batch, seq, filters]` to `[batch, filters]`.
pub fn global_max_pool(x: &Array3<f32>) -> Array2<f32> {
    x.fold_axis(Axis(1), f32::NEG_INFINITY, |acc, &v| acc.max(v))
}

fn conv_branches<R: Rng>(config: &RunConfig, rng: &mut R) -> Vec<Conv1d> {
    config
        .filter_sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| {
            Conv1d::new(
                format!("conv1d_{i}"),
                size,
                config.embedding_dim,
                config.num_filters,
                rng,
            )
        })
        .collect()
}

fn ensure_finite(what: &str, x: &Array2<f32>) -> Result<()> {
    if x.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(Error::NumericFailure(format!("{what} contains non-finite values")))
    }
}

fn ensure_nonempty(tokens: &ArrayView2<usize>) -> Result<()> {
    if tokens.ncols() == 0 {
        return Err(Error::NumericFailure("input sequences have zero length".into()));
    }
    Ok(())
}

/// Convolutional text classifier.
///
/// Layer indices: 0 is the embedding, `1..=k` the convolution branches in
/// filter-size order, then the hidden layer, dropout and the output layer.
pub struct TextCnn {
    pub config: RunConfig,
    embedding: Embedding,
    convs: Vec<Conv1d>,
    hidden: Linear,
    dropout: Dropout,
    output: Linear,
}

impl TextCnn {
    pub fn new(vocab_size: usize, num_classes: usize, config: &RunConfig) -> Self {
        Self::with_rng(vocab_size, num_classes, config, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng>(
        vocab_size: usize,
        num_classes: usize,
        config: &RunConfig,
        rng: &mut R,
    ) -> Self {
        let embedding = Embedding::new(vocab_size, config.embedding_dim, rng);
        let convs = conv_branches(config, rng);
        let pooled = config.num_filters * config.filter_sizes.len();
        let hidden = Linear::new("hidden", pooled, config.hidden_dim, rng);
        let dropout = Dropout {
            name: "dropout".into(),
            p: config.dropout_p,
        };
        let output = Linear::new("output", config.hidden_dim, num_classes, rng);
        Self {
            config: config.clone(),
            embedding,
            convs,
            hidden,
            dropout,
            output,
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.embedding.vocab_size()
    }

    pub fn num_classes(&self) -> usize {
        self.output.bias.len()
    }

    pub fn layers(&self) -> Vec<&dyn Layer> {
        let mut layers: Vec<&dyn Layer> = Vec::with_capacity(self.convs.len() + 4);
        layers.push(&self.embedding);
        layers.extend(self.convs.iter().map(|c| c as &dyn Layer));
        layers.push(&self.hidden);
        layers.push(&self.dropout);
        layers.push(&self.output);
        layers
    }

    pub fn layers_mut(&mut self) -> Vec<&mut dyn Layer> {
        let mut layers: Vec<&mut dyn Layer> = Vec::with_capacity(self.convs.len() + 4);
        layers.push(&mut self.embedding);
        layers.extend(self.convs.iter_mut().map(|c| c as &mut dyn Layer));
        layers.push(&mut self.hidden);
        layers.push(&mut self.dropout);
        layers.push(&mut self.output);
        layers
    }

    /// Parameters of the layer at `index`, or `None` past the last layer.
    pub fn layer_weights(&self, index: usize) -> Option<Vec<ArrayD<f32>>> {
        self.layers().get(index).map(|layer| layer.weights())
    }

    /// Class probabilities for a `[batch, seq]` id matrix.
    pub fn forward(&self, tokens: ArrayView2<usize>) -> Result<Array2<f32>> {
        ensure_nonempty(&tokens)?;
        let x = self.embedding.forward(tokens)?;
        let pooled: Vec<Array2<f32>> = self
            .convs
            .iter()
            .map(|conv| global_max_pool(&conv.forward(x.view())))
            .collect();
        let views: Vec<_> = pooled.iter().map(|p| p.view()).collect();
        let features = concatenate(Axis(1), &views)
            .map_err(|e| Error::NumericFailure(format!("concatenating pooled features: {e}")))?;
        let h = self.hidden.forward(&features).mapv(relu);
        let probs = softmax(self.output.forward(&h));
        ensure_finite("class probabilities", &probs)?;
        Ok(probs)
    }

    pub fn load_weights(&mut self, path: &std::path::Path) -> Result<()> {
        let checkpoint = Checkpoint::load(path)?;
        for layer in self.layers_mut() {
            debug!(layer = layer.name(), "loading weights");
            layer.load_from(&checkpoint)?;
        }
        Ok(())
    }

    pub fn save_weights(&self, path: &std::path::Path) -> Result<()> {
        let mut checkpoint = Checkpoint::new();
        for layer in self.layers() {
            layer.save_to(&mut checkpoint);
        }
        checkpoint.save(path)
    }
}

/// Embedding plus convolution branches, exposing pre-pooling activations.
///
/// Layer indices match [`TextCnn`] for the embedding and every branch.
pub struct ConvOutputsModel {
    embedding: Embedding,
    convs: Vec<Conv1d>,
}

impl ConvOutputsModel {
    pub fn new(vocab_size: usize, config: &RunConfig) -> Self {
        Self::with_rng(vocab_size, config, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng>(vocab_size: usize, config: &RunConfig, rng: &mut R) -> Self {
        Self {
            embedding: Embedding::new(vocab_size, config.embedding_dim, rng),
            convs: conv_branches(config, rng),
        }
    }

    pub fn layers(&self) -> Vec<&dyn Layer> {
        let mut layers: Vec<&dyn Layer> = Vec::with_capacity(self.convs.len() + 1);
        layers.push(&self.embedding);
        layers.extend(self.convs.iter().map(|c| c as &dyn Layer));
        layers
    }

    pub fn layer_weights(&self, index: usize) -> Option<Vec<ArrayD<f32>>> {
        self.layers().get(index).map(|layer| layer.weights())
    }

    /// Replaces the parameters of the layer at `index`.
    pub fn set_layer_weights(&mut self, index: usize, weights: &[ArrayD<f32>]) -> Result<()> {
        let layer: &mut dyn Layer = match index {
            0 => &mut self.embedding,
            i => self.convs.get_mut(i - 1).ok_or_else(|| {
                Error::InvalidConfig(format!("diagnostic model has no layer {i}"))
            })?,
        };
        layer.set_weights(weights)
    }

    /// One `[batch, seq, filters]` activation tensor per filter size.
    pub fn forward(&self, tokens: ArrayView2<usize>) -> Result<Vec<Array3<f32>>> {
        ensure_nonempty(&tokens)?;
        let x = self.embedding.forward(tokens)?;
        Ok(self.convs.iter().map(|conv| conv.forward(x.view())).collect())
    }
}
