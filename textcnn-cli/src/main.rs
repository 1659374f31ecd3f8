use anyhow::{Context, Result};
use clap::Parser;
use textcnn_core::{ExperimentTracker, Predictor, RunComponents, RunRegistry};
use tracing::info;

mod bootstrap;
mod settings;

use settings::Settings;

/// Classify text with the best finished TextCNN run.
#[derive(Parser, Debug)]
#[command(author, about)]
struct Args {
    /// Text to classify
    #[arg(long)]
    text: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load().context("loading settings")?;
    bootstrap::init(&settings)?;

    let registry = RunRegistry::open(&settings.registry)
        .with_context(|| format!("opening registry {}", settings.registry.display()))?;
    let run = registry
        .find_best_run(&settings.project, &settings.metric, settings.objective)
        .context("selecting best run")?;
    let run_dir = registry
        .materialize_run(&run)
        .with_context(|| format!("locating artifacts of run {run}"))?;

    let components = RunComponents::load(&run_dir)
        .with_context(|| format!("loading run from {}", run_dir.display()))?;
    let predictor = Predictor::new(components);
    let results = predictor.predict(&[args.text.as_str()])?;

    let json = serde_json::to_string_pretty(&results)?;
    info!(run = %run, results = %json, "prediction complete");
    println!("{json}");
    Ok(())
}
