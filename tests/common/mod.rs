//! Shared mocks for the integration tests
#![allow(dead_code)]

use kws_pipeline::calibration::CalibrationSet;
use kws_pipeline::conversion::{ConversionBackend, ConversionTarget, ConvertedModel, SavedModel};
use kws_pipeline::data::{DataRequest, Sample, SampleProvider};
use kws_pipeline::models::artifact::ModelKind;
use kws_pipeline::models::interpreter::{
    ArtifactLoader, InferenceModel, InputTensor, OutputTensor, TensorSpec, TensorType,
};
use kws_pipeline::quantization::QuantParams;
use kws_pipeline::toolkit::{Freezer, Trainer};
use kws_pipeline::{Config, KwsError, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const FEATURE_LENGTH: usize = 1960;
pub const LABEL_COUNT: usize = 5;

/// Samples whose first feature value is the class the mock model predicts
pub fn labelled_samples(count: usize, label_of: impl Fn(usize) -> usize) -> Vec<Sample> {
    (0..count)
        .map(|i| {
            let predicted = i % LABEL_COUNT;
            let mut features = vec![0.5; FEATURE_LENGTH];
            features[0] = predicted as f32;
            features[1] = i as f32 / 10.0;
            Sample {
                features,
                label: label_of(i),
            }
        })
        .collect()
}

/// In-memory testing partition
pub struct VecProvider {
    pub samples: Vec<Sample>,
    pub seeds: Vec<u64>,
    pub requests: Vec<DataRequest>,
}

impl VecProvider {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            seeds: Vec::new(),
            requests: Vec::new(),
        }
    }
}

impl SampleProvider for VecProvider {
    fn seed(&mut self, seed: u64) {
        self.seeds.push(seed);
    }

    fn get_data(&mut self, request: &DataRequest) -> Result<Vec<Sample>> {
        self.requests.push(request.clone());
        let range = request.resolve(self.samples.len())?;
        Ok(self.samples[range].to_vec())
    }
}

/// Backend that emits fixed bytes and reports the calibrated input parameters
#[derive(Default)]
pub struct MockBackend {
    pub calls: RefCell<Vec<ModelKind>>,
    pub calibration_sizes: RefCell<Vec<usize>>,
    pub fail: bool,
}

impl ConversionBackend for MockBackend {
    fn convert(&self, _model: &SavedModel, target: ConversionTarget<'_>) -> Result<ConvertedModel> {
        self.calls.borrow_mut().push(target.kind());
        if self.fail {
            return Err(KwsError::ConversionError("graph cannot be traced".into()));
        }
        match target {
            ConversionTarget::Float => Ok(ConvertedModel {
                bytes: vec![0x46; 64],
                input_quantization: None,
            }),
            ConversionTarget::FullInteger { calibration } => {
                self.calibration_sizes.borrow_mut().push(calibration.len());
                Ok(ConvertedModel {
                    bytes: vec![0x51; 16],
                    input_quantization: calibrated(calibration),
                })
            }
        }
    }
}

fn calibrated(calibration: &CalibrationSet) -> Option<QuantParams> {
    calibration.observer().params()
}

/// Model predicting the class stored in the first input value
pub struct OracleModel {
    input: TensorSpec,
    output: TensorSpec,
    pub seen: Rc<RefCell<Vec<InputTensor>>>,
}

impl InferenceModel for OracleModel {
    fn input_spec(&self) -> &TensorSpec {
        &self.input
    }

    fn output_spec(&self) -> &TensorSpec {
        &self.output
    }

    fn invoke(&mut self, input: &InputTensor) -> Result<OutputTensor> {
        self.seen.borrow_mut().push(input.clone());
        let class = match input {
            InputTensor::Float32(v) => v[0].round() as usize,
            InputTensor::Int8(v) => {
                let params = self.input.quantization.expect("quantized input");
                params.dequantize(v[0]).round() as usize
            }
            InputTensor::UInt8(v) => {
                let params = self.input.quantization.expect("quantized input");
                params.dequantize(v[0]).round() as usize
            }
        };
        let mut scores = vec![-100i8; LABEL_COUNT];
        scores[class.min(LABEL_COUNT - 1)] = 100;
        Ok(match self.output.dtype {
            TensorType::Float32 => {
                OutputTensor::Float32(scores.iter().map(|&s| s as f32 / 100.0).collect())
            }
            _ => OutputTensor::Int8(scores),
        })
    }
}

/// Loader serving oracle models with per-path input descriptors
#[derive(Default)]
pub struct OracleLoader {
    pub specs: HashMap<PathBuf, TensorSpec>,
    pub seen: Rc<RefCell<Vec<InputTensor>>>,
}

impl OracleLoader {
    pub fn with(mut self, path: impl Into<PathBuf>, spec: TensorSpec) -> Self {
        self.specs.insert(path.into(), spec);
        self
    }
}

impl ArtifactLoader for OracleLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceModel>> {
        let input = self.specs.get(path).cloned().ok_or_else(|| {
            KwsError::ArtifactLoadError(format!("no artifact at {}", path.display()))
        })?;
        let output = TensorSpec {
            dims: vec![1, LABEL_COUNT],
            dtype: input.dtype.clone(),
            quantization: input.quantization,
        };
        Ok(Box::new(OracleModel {
            input,
            output,
            seen: Rc::clone(&self.seen),
        }))
    }
}

pub fn float_spec() -> TensorSpec {
    TensorSpec {
        dims: vec![1, FEATURE_LENGTH],
        dtype: TensorType::Float32,
        quantization: None,
    }
}

pub fn int8_spec(params: QuantParams) -> TensorSpec {
    TensorSpec {
        dims: vec![1, FEATURE_LENGTH],
        dtype: TensorType::Int8,
        quantization: Some(params),
    }
}

/// Trainer and freezer that only record that they ran
#[derive(Default)]
pub struct RecordingToolkit {
    pub runs: Rc<RefCell<Vec<&'static str>>>,
}

impl Trainer for RecordingToolkit {
    fn train(&self, _config: &Config) -> Result<()> {
        self.runs.borrow_mut().push("train");
        Ok(())
    }
}

impl Freezer for RecordingToolkit {
    fn freeze(&self, config: &Config) -> Result<SavedModel> {
        self.runs.borrow_mut().push("freeze");
        SavedModel::open(config.saved_model())
    }
}

/// Config rooted in `dir` with a SavedModel stub in place
pub fn workspace(dir: &Path) -> Config {
    let config = Config {
        models_dir: dir.join("models"),
        features_dir: dir.join("features"),
        ..Config::default()
    };
    std::fs::create_dir_all(config.saved_model()).unwrap();
    std::fs::write(config.saved_model().join("saved_model.pb"), b"graph").unwrap();
    config
}
