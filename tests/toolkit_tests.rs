//! End-to-end runs against a real TensorFlow checkout and trained model.
//!
//! Run with `--features test-integration` from a directory laid out like the
//! training setup (`models/saved_model`, `features/testing.json`, toolkit dir).
#![cfg(feature = "test-integration")]

use kws_pipeline::models::artifact::ModelKind;
use kws_pipeline::pipeline::{Pipeline, Stage, StageOutcome};
use kws_pipeline::Config;

#[test_log::test]
fn test_eval_with_real_converter() {
    let config = Config::load().unwrap();
    let mut pipeline = Pipeline::with_defaults(&config);

    let StageOutcome::Evaluated { artifacts, results } = pipeline.run(Stage::Eval).unwrap() else {
        panic!("expected evaluation outcome");
    };

    assert_eq!(artifacts.len(), 2);
    let quantized = artifacts
        .iter()
        .find(|a| a.kind == ModelKind::Quantized)
        .unwrap();
    let float = artifacts.iter().find(|a| a.kind == ModelKind::Float).unwrap();
    assert!(quantized.size_bytes < float.size_bytes);

    for result in &results {
        assert!(result.total_count > 0);
        println!("{}", result);
    }
}
