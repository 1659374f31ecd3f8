//! Error types shared by the loader, the predictor and the run registry.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can stop a prediction run.
///
/// None of these are retried; they surface at the process boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// A required artifact is absent from the run directory.
    #[error("missing artifact: {path}")]
    ArtifactMissing {
        /// Expected location of the artifact.
        path: PathBuf,
    },

    /// An artifact exists but its contents cannot be decoded.
    #[error("malformed artifact at {path}: {reason}")]
    ArtifactMalformed {
        /// Location of the offending artifact.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Reading an artifact failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON artifact failed to parse.
    #[error("failed to parse JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A stored tensor does not fit the reconstructed architecture.
    #[error("shape mismatch for {layer}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Layer (or tensor) name.
        layer: String,
        /// Shape the architecture requires.
        expected: Vec<usize>,
        /// Shape that was supplied.
        actual: Vec<usize>,
    },

    /// The checkpoint lacks a tensor the architecture needs.
    #[error("checkpoint has no tensor named {name}")]
    MissingWeight {
        /// Tensor name.
        name: String,
    },

    /// The forward pass could not be computed.
    #[error("numeric failure: {0}")]
    NumericFailure(String),

    /// `predict` was called without any input text.
    #[error("prediction requires at least one input text")]
    EmptyBatch,

    /// Run configuration values are out of range.
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    /// No run in the registry matches the query.
    #[error("no run in project {project} reports metric {metric}")]
    RunNotFound { project: String, metric: String },

    /// The run registry database failed.
    #[error("run registry error: {0}")]
    Registry(#[from] rusqlite::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::ArtifactMissing { path }
        } else {
            Self::Io { path, source }
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ArtifactMalformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
