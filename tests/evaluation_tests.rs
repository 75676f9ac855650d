mod common;

use common::*;
use kws_pipeline::data::{Partition, SampleCount};
use kws_pipeline::evaluation::Evaluator;
use kws_pipeline::models::artifact::ModelKind;
use kws_pipeline::models::interpreter::{InputTensor, TfliteLoader};
use kws_pipeline::quantization::QuantParams;
use kws_pipeline::{Config, KwsError};
use std::path::Path;

fn float_loader(path: &str) -> OracleLoader {
    OracleLoader::default().with(path, float_spec())
}

#[test_log::test]
fn test_float_model_perfect_accuracy() {
    let config = Config::default();
    let mut provider = VecProvider::new(labelled_samples(50, |i| i % LABEL_COUNT));
    let loader = float_loader("float_model.tflite");

    let mut evaluator = Evaluator::new(&mut provider, &loader, &config);
    let result = evaluator
        .evaluate(Path::new("float_model.tflite"), ModelKind::Float)
        .unwrap();

    assert_eq!(result.correct_count, 50);
    assert_eq!(result.total_count, 50);
    assert_eq!(result.percentage(), 100.0);
    assert_eq!(
        result.to_string(),
        "Float model accuracy is 100.0% (Number of test samples=50)"
    );
}

#[test]
fn test_partial_accuracy() {
    let config = Config::default();
    // Every fifth label disagrees with the model
    let samples = labelled_samples(50, |i| {
        if i % 5 == 0 {
            (i + 1) % LABEL_COUNT
        } else {
            i % LABEL_COUNT
        }
    });
    let mut provider = VecProvider::new(samples);
    let loader = float_loader("float_model.tflite");

    let result = Evaluator::new(&mut provider, &loader, &config)
        .evaluate(Path::new("float_model.tflite"), ModelKind::Float)
        .unwrap();

    assert_eq!(result.correct_count, 40);
    assert_eq!(result.percentage(), 80.0);
    assert_eq!(
        result.to_string(),
        "Float model accuracy is 80.0% (Number of test samples=50)"
    );
}

#[test]
fn test_whole_testing_partition_is_requested() {
    let config = Config::default();
    let mut provider = VecProvider::new(labelled_samples(12, |i| i % LABEL_COUNT));
    let loader = float_loader("m.tflite");

    Evaluator::new(&mut provider, &loader, &config)
        .evaluate(Path::new("m.tflite"), ModelKind::Float)
        .unwrap();

    assert_eq!(provider.seeds, vec![config.eval_seed]);
    assert_eq!(provider.requests.len(), 1);
    let request = &provider.requests[0];
    assert_eq!(request.count, SampleCount::All);
    assert_eq!(request.offset, 0);
    assert_eq!(request.partition, Partition::Testing);
}

#[test]
fn test_quantized_inputs_are_integer_encoded() {
    let config = Config::default();
    let params = QuantParams::new(0.1, 0);
    let mut samples = labelled_samples(5, |i| i % LABEL_COUNT);
    samples[0].features[1] = 2.6;
    samples[1].features[1] = 100.0;
    let mut provider = VecProvider::new(samples);
    let loader = OracleLoader::default().with("model.tflite", int8_spec(params));

    let result = Evaluator::new(&mut provider, &loader, &config)
        .evaluate(Path::new("model.tflite"), ModelKind::Quantized)
        .unwrap();
    assert_eq!(result.correct_count, 5);

    let seen = loader.seen.borrow();
    assert_eq!(seen.len(), 5);
    match (&seen[0], &seen[1]) {
        (InputTensor::Int8(first), InputTensor::Int8(second)) => {
            assert_eq!(first.len(), FEATURE_LENGTH);
            assert_eq!(first[1], 26);
            assert_eq!(first[2], 5);
            // Saturates instead of wrapping
            assert_eq!(second[1], 127);
        }
        other => panic!("expected int8 inputs, got {:?}", other),
    }
}

#[test]
fn test_float_inputs_pass_through() {
    let config = Config::default();
    let samples = labelled_samples(3, |i| i % LABEL_COUNT);
    let expected = samples[2].features.clone();
    let mut provider = VecProvider::new(samples);
    let loader = float_loader("float_model.tflite");

    Evaluator::new(&mut provider, &loader, &config)
        .evaluate(Path::new("float_model.tflite"), ModelKind::Float)
        .unwrap();

    assert_eq!(loader.seen.borrow()[2], InputTensor::Float32(expected));
}

#[test]
fn test_repeated_evaluation_is_identical() {
    let config = Config::default();
    let mut provider = VecProvider::new(labelled_samples(30, |i| (i * 7) % LABEL_COUNT));
    let loader = float_loader("float_model.tflite");

    let mut evaluator = Evaluator::new(&mut provider, &loader, &config);
    let first = evaluator
        .evaluate(Path::new("float_model.tflite"), ModelKind::Float)
        .unwrap();
    let second = evaluator
        .evaluate(Path::new("float_model.tflite"), ModelKind::Float)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_shape_mismatch_is_load_error() {
    let config = Config::default();
    let mut provider = VecProvider::new(labelled_samples(5, |_| 0));
    let mut spec = float_spec();
    spec.dims = vec![1, 490];
    let loader = OracleLoader::default().with("float_model.tflite", spec);

    let err = Evaluator::new(&mut provider, &loader, &config)
        .evaluate(Path::new("float_model.tflite"), ModelKind::Float)
        .unwrap_err();
    assert!(matches!(err, KwsError::ArtifactLoadError(_)));
    assert!(loader.seen.borrow().is_empty());
}

#[test]
fn test_output_must_score_every_label() {
    // Two wanted words give four labels; the model scores five
    let config = Config {
        wanted_words: vec!["low".into(), "high".into()],
        ..Config::default()
    };
    let mut provider = VecProvider::new(labelled_samples(5, |_| 0));
    let loader = float_loader("float_model.tflite");

    let err = Evaluator::new(&mut provider, &loader, &config)
        .evaluate(Path::new("float_model.tflite"), ModelKind::Float)
        .unwrap_err();
    assert!(matches!(err, KwsError::ArtifactLoadError(ref msg) if msg.contains("labels")));
    assert!(loader.seen.borrow().is_empty());
}

#[test]
fn test_kind_must_match_input_type() {
    let config = Config::default();
    let mut provider = VecProvider::new(labelled_samples(5, |_| 0));
    let loader = OracleLoader::default()
        .with("float_model.tflite", int8_spec(QuantParams::new(0.1, 0)))
        .with("model.tflite", float_spec());

    let mut evaluator = Evaluator::new(&mut provider, &loader, &config);
    let err = evaluator
        .evaluate(Path::new("float_model.tflite"), ModelKind::Float)
        .unwrap_err();
    assert!(matches!(err, KwsError::ArtifactLoadError(_)));
    let err = evaluator
        .evaluate(Path::new("model.tflite"), ModelKind::Quantized)
        .unwrap_err();
    assert!(matches!(err, KwsError::ArtifactLoadError(_)));
}

#[test]
fn test_quantized_input_without_parameters() {
    let config = Config::default();
    let mut provider = VecProvider::new(labelled_samples(5, |_| 0));
    let mut spec = int8_spec(QuantParams::new(0.1, 0));
    spec.quantization = None;
    let loader = OracleLoader::default().with("model.tflite", spec);

    let err = Evaluator::new(&mut provider, &loader, &config)
        .evaluate(Path::new("model.tflite"), ModelKind::Quantized)
        .unwrap_err();
    assert!(matches!(err, KwsError::ArtifactLoadError(ref msg) if msg.contains("quantization")));
}

#[test]
fn test_empty_partition_is_data_unavailable() {
    let config = Config::default();
    let mut provider = VecProvider::new(Vec::new());
    let loader = float_loader("float_model.tflite");

    let err = Evaluator::new(&mut provider, &loader, &config)
        .evaluate(Path::new("float_model.tflite"), ModelKind::Float)
        .unwrap_err();
    assert!(matches!(err, KwsError::DataUnavailable(_)));
}

#[test]
fn test_missing_artifact_with_tflite_runtime() {
    let config = Config::default();
    let dir = tempfile::TempDir::new().unwrap();
    let mut provider = VecProvider::new(labelled_samples(5, |_| 0));

    let err = Evaluator::new(&mut provider, TfliteLoader::default(), &config)
        .evaluate(&dir.path().join("missing.tflite"), ModelKind::Float)
        .unwrap_err();
    assert!(matches!(err, KwsError::ArtifactLoadError(_)));
}
