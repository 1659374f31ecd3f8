//! Loads everything a finished run left behind.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::label_encoder::LabelEncoder;
use crate::model::{ConvOutputsModel, TextCnn};
use crate::tokenizer::InputTokenizer;

pub const CONFIG_FILE: &str = "config.json";
pub const INPUT_TOKENIZER_FILE: &str = "X_tokenizer.json";
pub const LABEL_ENCODER_FILE: &str = "y_tokenizer.bin";
pub const CHECKPOINT_FILE: &str = "model/cp.ckpt";

/// File locations inside a run directory.
#[derive(Clone, Debug)]
pub struct RunPaths {
    pub config: PathBuf,
    pub input_tokenizer: PathBuf,
    pub label_encoder: PathBuf,
    pub checkpoint: PathBuf,
}

impl RunPaths {
    pub fn new(run_dir: &Path) -> Self {
        Self {
            config: run_dir.join(CONFIG_FILE),
            input_tokenizer: run_dir.join(INPUT_TOKENIZER_FILE),
            label_encoder: run_dir.join(LABEL_ENCODER_FILE),
            checkpoint: run_dir.join(CHECKPOINT_FILE),
        }
    }

    fn all(&self) -> [&Path; 4] {
        [
            &self.config,
            &self.input_tokenizer,
            &self.label_encoder,
            &self.checkpoint,
        ]
    }

    /// Fails on the first artifact that is not a regular file.
    pub fn ensure_present(&self) -> Result<()> {
        match self.all().into_iter().find(|path| !path.is_file()) {
            Some(path) => Err(Error::ArtifactMissing {
                path: path.to_path_buf(),
            }),
            None => Ok(()),
        }
    }
}

/// The loaded pieces of one run, ready for prediction.
pub struct RunComponents {
    pub config: RunConfig,
    pub model: TextCnn,
    pub conv_outputs_model: ConvOutputsModel,
    pub input_tokenizer: InputTokenizer,
    pub label_encoder: LabelEncoder,
}

impl RunComponents {
    /// Reads the run directory and rebuilds both networks.
    ///
    /// Every artifact is checked for presence before anything is parsed or
    /// constructed. The directory is never written to.
    ///
    /// # Errors
    ///
    /// [`Error::ArtifactMissing`], [`Error::ArtifactMalformed`],
    /// [`Error::Json`], [`Error::InvalidConfig`], [`Error::MissingWeight`] or
    /// [`Error::ShapeMismatch`].
    pub fn load(run_dir: &Path) -> Result<Self> {
        let paths = RunPaths::new(run_dir);
        paths.ensure_present()?;

        let config = RunConfig::load(&paths.config)?;
        debug!(?config, "loaded run config");
        let input_tokenizer = InputTokenizer::load(&paths.input_tokenizer)?;
        let label_encoder = LabelEncoder::load(&paths.label_encoder)?;
        let vocab_size = input_tokenizer.vocab_size();
        debug!(
            vocab_size,
            classes = label_encoder.len(),
            "loaded tokenizers"
        );

        let mut model = TextCnn::new(vocab_size, label_encoder.len(), &config);
        model.load_weights(&paths.checkpoint)?;

        let mut conv_outputs_model = ConvOutputsModel::new(vocab_size, &config);
        copy_conv_weights(&model, &mut conv_outputs_model, config.filter_sizes.len())?;

        info!(run_dir = %run_dir.display(), "run components loaded");
        Ok(Self {
            config,
            model,
            conv_outputs_model,
            input_tokenizer,
            label_encoder,
        })
    }

    /// Writes every artifact into `run_dir`, creating it if needed.
    pub fn save(&self, run_dir: &Path) -> Result<()> {
        let paths = RunPaths::new(run_dir);
        if let Some(parent) = paths.checkpoint.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.config.save(&paths.config)?;
        self.input_tokenizer.save(&paths.input_tokenizer)?;
        self.label_encoder.save(&paths.label_encoder)?;
        self.model.save_weights(&paths.checkpoint)
    }
}

/// Copies the embedding (layer 0) and every convolution branch (layers
/// `1..=branches`) from the primary model into the diagnostic model.
pub fn copy_conv_weights(
    model: &TextCnn,
    conv_outputs_model: &mut ConvOutputsModel,
    branches: usize,
) -> Result<()> {
    for index in 0..=branches {
        let weights = model.layer_weights(index).ok_or_else(|| {
            Error::InvalidConfig(format!("primary model has no layer {index}"))
        })?;
        conv_outputs_model.set_layer_weights(index, &weights)?;
    }
    Ok(())
}
