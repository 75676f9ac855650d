//! Top-1 accuracy of deployable artifacts on the testing partition

use crate::config::Config;
use crate::data::{DataRequest, Sample, SampleCount, SampleProvider};
use crate::error::{KwsError, Result};
use crate::models::artifact::ModelKind;
use crate::models::interpreter::{ArtifactLoader, InferenceModel, InputTensor, TensorType};
use crate::models::settings::ModelSettings;
use crate::quantization::{IntDtype, QuantParams};
use std::fmt;
use std::path::Path;

/// How features are prepared before they reach the artifact
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputPolicy {
    Float,
    Quantized { params: QuantParams, dtype: IntDtype },
}

impl InputPolicy {
    /// Build the policy for `kind` from the loaded artifact's input descriptor
    pub fn for_model(kind: ModelKind, model: &dyn InferenceModel) -> Result<Self> {
        let input = model.input_spec();
        match kind {
            ModelKind::Float => {
                if input.dtype != TensorType::Float32 {
                    return Err(KwsError::ArtifactLoadError(format!(
                        "float artifact declares {:?} input",
                        input.dtype
                    )));
                }
                Ok(InputPolicy::Float)
            }
            ModelKind::Quantized => {
                let dtype = input.dtype.int_dtype().ok_or_else(|| {
                    KwsError::ArtifactLoadError(format!(
                        "quantized artifact declares {:?} input",
                        input.dtype
                    ))
                })?;
                let params = input.quantization.ok_or_else(|| {
                    KwsError::ArtifactLoadError(
                        "quantized artifact has no input quantization parameters".to_string(),
                    )
                })?;
                Ok(InputPolicy::Quantized { params, dtype })
            }
        }
    }

    pub fn prepare(&self, features: &[f32]) -> InputTensor {
        match *self {
            InputPolicy::Float => InputTensor::Float32(features.to_vec()),
            InputPolicy::Quantized { params, dtype } => match dtype {
                IntDtype::Int8 => {
                    InputTensor::Int8(features.iter().map(|&f| params.quantize(f)).collect())
                }
                IntDtype::UInt8 => {
                    InputTensor::UInt8(features.iter().map(|&f| params.quantize(f)).collect())
                }
            },
        }
    }
}

/// Correct predictions out of the evaluated samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccuracyResult {
    pub kind: ModelKind,
    pub correct_count: usize,
    pub total_count: usize,
}

impl AccuracyResult {
    pub fn percentage(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        (self.correct_count * 100) as f64 / self.total_count as f64
    }
}

impl fmt::Display for AccuracyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} model accuracy is {:?}% (Number of test samples={})",
            self.kind,
            self.percentage(),
            self.total_count
        )
    }
}

/// Progress of one evaluation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EvalStage {
    Uninitialized,
    DataLoaded,
    ArtifactReady,
    Evaluating,
    Reported,
}

#[derive(Debug)]
struct StageTracker {
    stage: EvalStage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: EvalStage::Uninitialized,
        }
    }

    fn advance(&mut self, next: EvalStage) {
        debug_assert!(next > self.stage, "{:?} -> {:?}", self.stage, next);
        log::debug!("Evaluation {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }
}

/// Runs artifacts over the full testing partition
pub struct Evaluator<'a, P: SampleProvider, L: ArtifactLoader> {
    provider: P,
    loader: L,
    config: &'a Config,
    settings: ModelSettings,
}

impl<'a, P: SampleProvider, L: ArtifactLoader> Evaluator<'a, P, L> {
    pub fn new(provider: P, loader: L, config: &'a Config) -> Self {
        Self {
            provider,
            loader,
            settings: config.model_settings(),
            config,
        }
    }

    /// Fixed-seed retrieval of the whole testing partition
    pub fn load_test_set(&mut self) -> Result<Vec<Sample>> {
        self.provider.seed(self.config.eval_seed);
        let request = DataRequest::testing(SampleCount::All, 0, self.config);
        let samples = self.provider.get_data(&request)?;

        if samples.is_empty() {
            return Err(KwsError::DataUnavailable(
                "testing partition is empty".to_string(),
            ));
        }
        if let Some(bad) = samples
            .iter()
            .position(|s| s.features.len() != self.settings.fingerprint_size)
        {
            return Err(KwsError::DataUnavailable(format!(
                "test sample {} has {} values, expected {}",
                bad,
                samples[bad].features.len(),
                self.settings.fingerprint_size
            )));
        }
        Ok(samples)
    }

    pub fn evaluate(&mut self, path: &Path, kind: ModelKind) -> Result<AccuracyResult> {
        let mut tracker = StageTracker::new();

        let samples = self.load_test_set()?;
        tracker.advance(EvalStage::DataLoaded);

        let mut model = self.loader.load(path)?;
        let expected = self.settings.fingerprint_size;
        let actual = model.input_spec().element_count();
        if actual != expected {
            return Err(KwsError::ArtifactLoadError(format!(
                "{} expects {} input values, features have {}",
                path.display(),
                actual,
                expected
            )));
        }
        let labels = model.output_spec().element_count();
        if labels != self.settings.label_count {
            return Err(KwsError::ArtifactLoadError(format!(
                "{} scores {} labels, expected {}",
                path.display(),
                labels,
                self.settings.label_count
            )));
        }
        let policy = InputPolicy::for_model(kind, &*model)?;
        tracker.advance(EvalStage::ArtifactReady);

        log::info!(
            "Evaluating {} model {} on {} samples ({:?})",
            kind,
            path.display(),
            samples.len(),
            policy
        );
        tracker.advance(EvalStage::Evaluating);
        let result = run_samples(&mut *model, policy, kind, &samples)?;

        tracker.advance(EvalStage::Reported);
        log::debug!("{}", result);
        Ok(result)
    }

}

/// Feed every sample through `model` in order and count top-1 matches
pub fn run_samples(
    model: &mut dyn InferenceModel,
    policy: InputPolicy,
    kind: ModelKind,
    samples: &[Sample],
) -> Result<AccuracyResult> {
    let mut correct_count = 0;
    for (i, sample) in samples.iter().enumerate() {
        // Leading batch axis of one: the flat buffer already has that layout
        let input = policy.prepare(&sample.features);
        let output = model.invoke(&input)?;
        let predicted = output.argmax().ok_or_else(|| {
            KwsError::ArtifactLoadError(format!("empty output for test sample {}", i))
        })?;
        if predicted == sample.label {
            correct_count += 1;
        }
    }

    Ok(AccuracyResult {
        kind,
        correct_count,
        total_count: samples.len(),
    })
}
