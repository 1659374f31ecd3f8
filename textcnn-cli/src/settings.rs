//! Runtime settings: built-in defaults overridden by `TEXTCNN_*` variables.

use std::path::PathBuf;

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use textcnn_core::Objective;

pub const ENV_PREFIX: &str = "TEXTCNN_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Project whose runs are considered.
    pub project: String,
    /// Metric that ranks runs.
    pub metric: String,
    pub objective: Objective,
    /// SQLite run registry.
    pub registry: PathBuf,
    pub logs_dir: PathBuf,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project: "GokuMohandas/e2e-ml-app-tensorflow".into(),
            metric: "test_loss".into(),
            objective: Objective::Minimize,
            registry: PathBuf::from("experiments/runs.db"),
            logs_dir: PathBuf::from("logs"),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default())).merge(Env::prefixed(ENV_PREFIX))
    }

    /// Loads settings from the environment on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if a variable holds an invalid value.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }
}
