//! Logging setup for the binary.

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::settings::Settings;

pub const LOG_FILE: &str = "info.log";

/// Installs the global subscriber: human-readable output on stderr and a
/// plain-text copy appended to `<logs_dir>/info.log`.
pub fn init(settings: &Settings) -> Result<()> {
    fs::create_dir_all(&settings.logs_dir)
        .with_context(|| format!("creating {}", settings.logs_dir.display()))?;
    let path = settings.logs_dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .with_context(|| format!("invalid log filter {:?}", settings.log_filter))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}
