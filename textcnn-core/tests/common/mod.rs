#![allow(dead_code)]

use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use textcnn_core::label_encoder::LabelEncoder;
use textcnn_core::model::{ConvOutputsModel, TextCnn};
use textcnn_core::tokenizer::InputTokenizer;
use textcnn_core::{RunComponents, RunConfig};

pub const VOCAB: [&str; 8] = ["the", "movie", "was", "great", "awful", "plot", "acting", "fine"];

pub fn small_config() -> RunConfig {
    RunConfig {
        embedding_dim: 8,
        filter_sizes: vec![2, 3],
        num_filters: 4,
        hidden_dim: 6,
        dropout_p: 0.1,
        batch_size: 2,
    }
}

/// Deterministic in-memory run.
pub fn components(config: RunConfig, seed: u64) -> RunComponents {
    let input_tokenizer = InputTokenizer::from_vocab(VOCAB).with_oov_token("<UNK>");
    let label_encoder = LabelEncoder::new(["negative", "positive"]);
    let vocab_size = input_tokenizer.vocab_size();
    let mut rng = StdRng::seed_from_u64(seed);
    let model = TextCnn::with_rng(vocab_size, label_encoder.len(), &config, &mut rng);
    let conv_outputs_model = ConvOutputsModel::with_rng(vocab_size, &config, &mut rng);
    RunComponents {
        config,
        model,
        conv_outputs_model,
        input_tokenizer,
        label_encoder,
    }
}

/// Writes a complete run directory and returns the saved components.
pub fn write_run(dir: &Path, seed: u64) -> RunComponents {
    let run = components(small_config(), seed);
    run.save(dir).unwrap();
    run
}
