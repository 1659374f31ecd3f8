//! Inference for trained TextCNN runs.
//!
//! Loads a run's artifacts, classifies raw text and explains each prediction
//! with one n-gram per convolution width.

pub mod artifacts;
pub mod attribution;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod label_encoder;
pub mod model;
pub mod predict;
pub mod ranking;
pub mod tokenizer;
pub mod tracking;

pub use artifacts::RunComponents;
pub use config::RunConfig;
pub use error::{Error, Result};
pub use predict::{predict, Prediction, Predictor};
pub use tracking::{ExperimentTracker, Objective, RunId, RunRegistry};
