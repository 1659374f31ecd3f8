mod common;

use std::fs;

use ndarray::ArrayD;
use textcnn_core::artifacts::{CHECKPOINT_FILE, CONFIG_FILE, LABEL_ENCODER_FILE};
use textcnn_core::checkpoint::Checkpoint;
use textcnn_core::{Error, RunComponents, RunConfig};

#[test]
fn empty_directory_reports_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    match RunComponents::load(dir.path()) {
        Err(Error::ArtifactMissing { path }) => assert!(path.ends_with(CONFIG_FILE)),
        other => panic!("expected ArtifactMissing, got {:?}", other.err()),
    }
}

#[test]
fn missing_checkpoint_is_detected_before_parsing() {
    let dir = tempfile::tempdir().unwrap();
    common::write_run(dir.path(), 1);
    fs::remove_file(dir.path().join(CHECKPOINT_FILE)).unwrap();
    // a broken config must not be reported while another artifact is absent
    fs::write(dir.path().join(CONFIG_FILE), "not json").unwrap();
    assert!(matches!(
        RunComponents::load(dir.path()),
        Err(Error::ArtifactMissing { .. })
    ));
}

#[test]
fn loaded_weights_match_saved_weights() {
    let dir = tempfile::tempdir().unwrap();
    let saved = common::write_run(dir.path(), 3);
    let loaded = RunComponents::load(dir.path()).unwrap();

    assert_eq!(loaded.config, saved.config);
    assert_eq!(loaded.label_encoder.classes(), saved.label_encoder.classes());
    let layers = saved.config.filter_sizes.len() + 4;
    for index in 0..layers {
        assert_eq!(
            loaded.model.layer_weights(index),
            saved.model.layer_weights(index),
            "layer {index}"
        );
    }
}

#[test]
fn diagnostic_model_shares_primary_weights() {
    let dir = tempfile::tempdir().unwrap();
    common::write_run(dir.path(), 5);
    let run = RunComponents::load(dir.path()).unwrap();
    for index in 0..=run.config.filter_sizes.len() {
        assert_eq!(
            run.conv_outputs_model.layer_weights(index),
            run.model.layer_weights(index),
            "layer {index}"
        );
    }
}

#[test]
fn config_disagreeing_with_checkpoint_is_a_shape_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    common::write_run(dir.path(), 2);
    let config = RunConfig {
        embedding_dim: 5,
        ..common::small_config()
    };
    config.save(&dir.path().join(CONFIG_FILE)).unwrap();

    match RunComponents::load(dir.path()) {
        Err(Error::ShapeMismatch { layer, .. }) => assert_eq!(layer, "embedding/embeddings"),
        other => panic!("expected ShapeMismatch, got {:?}", other.err()),
    }
}

#[test]
fn checkpoint_without_output_layer_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    common::write_run(dir.path(), 4);
    let path = dir.path().join(CHECKPOINT_FILE);
    let full = Checkpoint::load(&path).unwrap();

    let mut partial = Checkpoint::new();
    for name in full.names().filter(|n| !n.starts_with("output/")) {
        let tensor: ArrayD<f32> = full.get(name).unwrap().clone();
        partial.insert(name, tensor);
    }
    partial.save(&path).unwrap();

    match RunComponents::load(dir.path()) {
        Err(Error::MissingWeight { name }) => assert_eq!(name, "output/kernel"),
        other => panic!("expected MissingWeight, got {:?}", other.err()),
    }
}

#[test]
fn corrupt_label_encoder_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    common::write_run(dir.path(), 6);
    fs::write(dir.path().join(LABEL_ENCODER_FILE), [0xff, 0xff, 0xff]).unwrap();
    assert!(matches!(
        RunComponents::load(dir.path()),
        Err(Error::ArtifactMalformed { .. })
    ));
}

#[test]
fn loading_leaves_run_directory_untouched() {
    let dir = tempfile::tempdir().unwrap();
    common::write_run(dir.path(), 8);
    let before = fs::read(dir.path().join(CHECKPOINT_FILE)).unwrap();
    RunComponents::load(dir.path()).unwrap();
    let after = fs::read(dir.path().join(CHECKPOINT_FILE)).unwrap();
    assert_eq!(before, after);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 4);
}
