//! Batched inference with per-sample explanations.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::Serialize;
use tracing::{debug, warn};

use crate::artifacts::RunComponents;
use crate::attribution::{top_n_grams, TopNGrams};
use crate::error::{Error, Result};
use crate::ranking::{rank_probabilities, Probabilities};

/// Output for one input text.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub raw_input: String,
    pub preprocessed_input: String,
    pub probabilities: Probabilities,
    pub top_n_grams: TopNGrams,
}

/// Runs a loaded model over raw text.
pub struct Predictor {
    components: RunComponents,
}

impl Predictor {
    pub fn new(components: RunComponents) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &RunComponents {
        &self.components
    }

    /// See [`predict`].
    pub fn predict<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Prediction>> {
        predict(texts, &self.components)
    }
}

/// Right-pads every sequence with id 0 to a common width of at least
/// `min_len`.
pub fn pad_batch(sequences: &[Vec<usize>], min_len: usize) -> Array2<usize> {
    let longest = sequences.iter().map(Vec::len).max().unwrap_or(0);
    let width = longest.max(min_len);
    let mut batch = Array2::<usize>::zeros((sequences.len(), width));
    for (mut row, seq) in batch.outer_iter_mut().zip(sequences) {
        for (slot, &id) in row.iter_mut().zip(seq) {
            *slot = id;
        }
    }
    batch
}

/// Classifies `texts` and explains each prediction.
///
/// Results come back in input order. Any failure aborts the whole call;
/// there are no partial results.
///
/// # Errors
///
/// [`Error::EmptyBatch`] when `texts` is empty and [`Error::NumericFailure`]
/// when a forward pass cannot be computed.
pub fn predict<S: AsRef<str>>(texts: &[S], components: &RunComponents) -> Result<Vec<Prediction>> {
    if texts.is_empty() {
        return Err(Error::EmptyBatch);
    }
    let RunComponents {
        config,
        model,
        conv_outputs_model,
        input_tokenizer,
        label_encoder,
    } = components;

    let sequences = input_tokenizer.texts_to_sequences(texts);
    let preprocessed = input_tokenizer.sequences_to_texts(&sequences);
    for (text, seq) in texts.iter().zip(&sequences) {
        if seq.is_empty() {
            warn!(text = text.as_ref(), "input has no known tokens");
        }
    }

    let mut probabilities: Vec<Array1<f32>> = Vec::with_capacity(texts.len());
    let mut activations: Vec<Vec<Array2<f32>>> = Vec::with_capacity(texts.len());
    for (index, chunk) in sequences.chunks(config.batch_size.max(1)).enumerate() {
        let batch = pad_batch(chunk, config.max_filter_size());
        debug!(batch = index, shape = ?batch.dim(), "forward pass");
        let probs = model.forward(batch.view())?;
        let conv_outputs = conv_outputs_model.forward(batch.view())?;
        for sample in 0..chunk.len() {
            probabilities.push(probs.row(sample).to_owned());
            activations.push(
                conv_outputs
                    .iter()
                    .map(|branch| branch.index_axis(Axis(0), sample).to_owned())
                    .collect(),
            );
        }
    }

    let results = texts
        .iter()
        .zip(preprocessed)
        .zip(probabilities.iter().zip(&activations))
        .map(|((text, preprocessed_input), (probs, branches))| {
            let tokens: Vec<&str> = preprocessed_input.split(' ').collect();
            let views: Vec<ArrayView2<f32>> = branches.iter().map(|a| a.view()).collect();
            let n_grams = top_n_grams(&tokens, &views, &config.filter_sizes);
            Prediction {
                raw_input: text.as_ref().to_string(),
                probabilities: rank_probabilities(probs.view(), label_encoder.classes()),
                top_n_grams: n_grams,
                preprocessed_input,
            }
        })
        .collect();
    Ok(results)
}
