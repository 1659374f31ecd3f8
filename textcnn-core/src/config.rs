//! Hyper-parameters recorded alongside a trained run.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Architecture and batching parameters read from a run's `config.json`.
///
/// Training writes many more keys into that file; anything not listed here is
/// ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Width of each word embedding.
    pub embedding_dim: usize,
    /// Convolution widths, one branch per entry.
    pub filter_sizes: Vec<usize>,
    /// Output channels of every convolution branch.
    pub num_filters: usize,
    /// Width of the hidden dense layer.
    pub hidden_dim: usize,
    /// Dropout probability used during training.
    pub dropout_p: f32,
    /// Number of samples per forward pass.
    pub batch_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 100,
            filter_sizes: vec![2, 3, 4],
            num_filters: 50,
            hidden_dim: 128,
            dropout_p: 0.1,
            batch_size: 64,
        }
    }
}

impl RunConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactMissing`] if the file does not exist,
    /// [`Error::Json`] if it does not parse and [`Error::InvalidConfig`] if a
    /// value is out of range.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()
    }

    /// Writes the configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks that every value can build a network.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(self) -> Result<Self> {
        let positive = [
            ("embedding_dim", self.embedding_dim),
            ("num_filters", self.num_filters),
            ("hidden_dim", self.hidden_dim),
            ("batch_size", self.batch_size),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(Error::InvalidConfig(format!("{name} must be greater than 0")));
        }
        if self.filter_sizes.is_empty() {
            return Err(Error::InvalidConfig("filter_sizes must not be empty".into()));
        }
        if self.filter_sizes.contains(&0) {
            return Err(Error::InvalidConfig(
                "every filter size must be greater than 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_p) {
            return Err(Error::InvalidConfig(format!(
                "dropout_p must be in [0, 1), got {}",
                self.dropout_p
            )));
        }
        Ok(self)
    }

    /// Largest configured filter width; the minimum padded sequence length.
    pub fn max_filter_size(&self) -> usize {
        self.filter_sizes.iter().copied().max().unwrap_or(1)
    }
}
