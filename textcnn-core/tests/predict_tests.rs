mod common;

use ndarray::{ArrayView2, Axis};
use textcnn_core::attribution::top_n_grams;
use textcnn_core::predict::pad_batch;
use textcnn_core::ranking::rank_probabilities;
use textcnn_core::{predict, Error, Predictor, RunComponents};

fn loaded_run() -> (tempfile::TempDir, RunComponents) {
    let dir = tempfile::tempdir().unwrap();
    common::write_run(dir.path(), 7);
    let components = RunComponents::load(dir.path()).unwrap();
    (dir, components)
}

#[test]
fn predicts_single_text() {
    let (_dir, components) = loaded_run();
    let results = predict(&["The movie was GREAT!"], &components).unwrap();
    assert_eq!(results.len(), 1);

    let result = &results[0];
    assert_eq!(result.raw_input, "The movie was GREAT!");
    assert_eq!(result.preprocessed_input, "the movie was great");

    let probs = &result.probabilities.0;
    assert_eq!(probs.len(), 2);
    assert!(probs[0].1 >= probs[1].1);
    let total: f64 = probs.iter().map(|(_, p)| p).sum();
    assert!((total - 1.0).abs() < 1e-5);
    let mut classes: Vec<&str> = result.probabilities.classes().collect();
    classes.sort_unstable();
    assert_eq!(classes, vec!["negative", "positive"]);

    let tokens: Vec<&str> = result.preprocessed_input.split(' ').collect();
    assert_eq!(result.top_n_grams.filter_sizes().collect::<Vec<_>>(), vec![2, 3]);
    for size in [2, 3] {
        let span = result.top_n_grams.get(size).unwrap();
        assert!(span.start <= span.end && span.end <= tokens.len());
        assert!(span.end - span.start <= size);
        assert_eq!(span.n_gram, tokens[span.start..span.end].join(" "));
    }
}

#[test]
fn repeated_calls_serialize_identically() {
    let (_dir, components) = loaded_run();
    let texts = ["the plot was fine", "awful acting"];
    let first = serde_json::to_string(&predict(&texts, &components).unwrap()).unwrap();
    let second = serde_json::to_string(&predict(&texts, &components).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn output_follows_input_order_across_batches() {
    let (_dir, components) = loaded_run();
    let texts = ["great", "the movie", "awful plot", "fine acting", "was"];
    let results = predict(&texts, &components).unwrap();
    let raw: Vec<&str> = results.iter().map(|r| r.raw_input.as_str()).collect();
    assert_eq!(raw, texts);
    assert_eq!(results[3].preprocessed_input, "fine acting");
}

#[test]
fn every_sample_gets_its_own_scores_and_spans() {
    let (_dir, components) = loaded_run();
    let texts = [
        "the movie was great",
        "awful acting",
        "fine plot",
        "great",
        "the plot was awful",
    ];
    let results = predict(&texts, &components).unwrap();
    let RunComponents {
        config,
        model,
        conv_outputs_model,
        input_tokenizer,
        label_encoder,
    } = &components;
    assert!(config.batch_size < texts.len());

    for (offset, chunk) in texts.chunks(config.batch_size).enumerate() {
        let sequences = input_tokenizer.texts_to_sequences(chunk);
        let batch = pad_batch(&sequences, config.max_filter_size());
        let probs = model.forward(batch.view()).unwrap();
        let conv_outputs = conv_outputs_model.forward(batch.view()).unwrap();

        for i in 0..chunk.len() {
            let result = &results[offset * config.batch_size + i];
            assert_eq!(
                result.probabilities,
                rank_probabilities(probs.row(i), label_encoder.classes())
            );
            let tokens: Vec<&str> = result.preprocessed_input.split(' ').collect();
            let views: Vec<ArrayView2<f32>> = conv_outputs
                .iter()
                .map(|branch| branch.index_axis(Axis(0), i))
                .collect();
            assert_eq!(
                result.top_n_grams,
                top_n_grams(&tokens, &views, &config.filter_sizes)
            );
        }
    }

    // same batch, different texts
    assert_ne!(results[0].probabilities, results[1].probabilities);
    assert_ne!(results[2].probabilities, results[3].probabilities);
}

#[test]
fn unknown_words_map_to_oov_token() {
    let (_dir, components) = loaded_run();
    let results = predict(&["the zebra"], &components).unwrap();
    assert_eq!(results[0].preprocessed_input, "the <UNK>");
}

#[test]
fn empty_text_still_predicts() {
    let (_dir, components) = loaded_run();
    let results = predict(&[""], &components).unwrap();
    let result = &results[0];
    assert_eq!(result.preprocessed_input, "");
    assert_eq!(result.probabilities.0.len(), 2);
    for size in [2, 3] {
        let span = result.top_n_grams.get(size).unwrap();
        assert!(span.end <= 1);
    }
}

#[test]
fn empty_batch_is_rejected() {
    let (_dir, components) = loaded_run();
    let texts: [&str; 0] = [];
    assert!(matches!(predict(&texts, &components), Err(Error::EmptyBatch)));
}

#[test]
fn predictor_wraps_components() {
    let (_dir, components) = loaded_run();
    let predictor = Predictor::new(components);
    assert_eq!(predictor.components().config.filter_sizes, vec![2, 3]);
    let json = serde_json::to_value(predictor.predict(&["fine"]).unwrap()).unwrap();
    let entry = &json[0];
    for key in ["raw_input", "preprocessed_input", "probabilities", "top_n_grams"] {
        assert!(entry.get(key).is_some(), "missing {key}");
    }
    assert!(entry["top_n_grams"].get("2").is_some());
    assert!(entry["top_n_grams"].get("3").is_some());
}
