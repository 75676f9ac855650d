//! Inference over deployable artifacts using TensorFlow Lite
//!
//! The evaluator talks to [`InferenceModel`] so the TFLite runtime stays behind
//! one seam; [`TfliteLoader`] is the production implementation.

use crate::error::{KwsError, Result};
use crate::quantization::{IntDtype, QuantParams};
use std::path::Path;

use tflitec::interpreter::{Interpreter, Options};
use tflitec::model::Model;
use tflitec::tensor::{DataType, Tensor};

/// Element type of an artifact tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TensorType {
    Float32,
    Int8,
    UInt8,
    Other(String),
}

impl TensorType {
    pub fn int_dtype(&self) -> Option<IntDtype> {
        match self {
            TensorType::Int8 => Some(IntDtype::Int8),
            TensorType::UInt8 => Some(IntDtype::UInt8),
            _ => None,
        }
    }
}

/// Tensor descriptor read from an artifact
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSpec {
    pub dims: Vec<usize>,
    pub dtype: TensorType,
    pub quantization: Option<QuantParams>,
}

impl TensorSpec {
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Prepared input for one forward pass
#[derive(Debug, Clone, PartialEq)]
pub enum InputTensor {
    Float32(Vec<f32>),
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
}

impl InputTensor {
    pub fn element_count(&self) -> usize {
        match self {
            InputTensor::Float32(v) => v.len(),
            InputTensor::Int8(v) => v.len(),
            InputTensor::UInt8(v) => v.len(),
        }
    }
}

/// Raw output of one forward pass
#[derive(Debug, Clone, PartialEq)]
pub enum OutputTensor {
    Float32(Vec<f32>),
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
}

impl OutputTensor {
    /// Index of the highest score; ties resolve to the lowest index
    pub fn argmax(&self) -> Option<usize> {
        match self {
            OutputTensor::Float32(v) => argmax(v),
            OutputTensor::Int8(v) => argmax(v),
            OutputTensor::UInt8(v) => argmax(v),
        }
    }
}

pub fn argmax<T: PartialOrd + Copy>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if !(v > b) => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// A loaded artifact ready for single-sample inference
pub trait InferenceModel {
    fn input_spec(&self) -> &TensorSpec;
    fn output_spec(&self) -> &TensorSpec;
    fn invoke(&mut self, input: &InputTensor) -> Result<OutputTensor>;
}

/// Opens artifacts from disk
pub trait ArtifactLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceModel>>;
}

impl<L: ArtifactLoader + ?Sized> ArtifactLoader for &L {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceModel>> {
        (**self).load(path)
    }
}

impl<L: ArtifactLoader + ?Sized> ArtifactLoader for Box<L> {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceModel>> {
        (**self).load(path)
    }
}

/// Loads `.tflite` flatbuffers with a single-threaded interpreter
#[derive(Debug, Clone)]
pub struct TfliteLoader {
    pub thread_count: i32,
}

impl Default for TfliteLoader {
    fn default() -> Self {
        Self { thread_count: 1 }
    }
}

impl ArtifactLoader for TfliteLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn InferenceModel>> {
        Ok(Box::new(TfliteInference::new(path, self.thread_count)?))
    }
}

pub struct TfliteInference {
    interpreter: Interpreter<'static>,
    input: TensorSpec,
    output: TensorSpec,
}

impl TfliteInference {
    pub fn new(path: &Path, thread_count: i32) -> Result<Self> {
        if !path.exists() {
            return Err(KwsError::ArtifactLoadError(format!(
                "Model file not found: {}",
                path.display()
            )));
        }
        let path_str = path.to_str().ok_or_else(|| {
            KwsError::ArtifactLoadError(format!("Non UTF-8 model path: {}", path.display()))
        })?;

        // The interpreter borrows the model for its whole life
        let model = Box::leak(Box::new(Model::new(path_str).map_err(|e| {
            KwsError::ArtifactLoadError(format!("Failed to load {}: {}", path.display(), e))
        })?));

        let mut options = Options::default();
        options.thread_count = thread_count;

        let interpreter = Interpreter::new(model, Some(options)).map_err(|e| {
            KwsError::ArtifactLoadError(format!(
                "Failed to create interpreter for {}: {}",
                path.display(),
                e
            ))
        })?;
        interpreter.allocate_tensors().map_err(|e| {
            KwsError::ArtifactLoadError(format!(
                "Failed to allocate tensors for {}: {}",
                path.display(),
                e
            ))
        })?;

        let input = interpreter
            .input(0)
            .map(|t| describe(&t))
            .map_err(|e| KwsError::ArtifactLoadError(format!("Failed to get input tensor: {}", e)))?;
        let output = interpreter
            .output(0)
            .map(|t| describe(&t))
            .map_err(|e| KwsError::ArtifactLoadError(format!("Failed to get output tensor: {}", e)))?;

        log::debug!(
            "Loaded {}: input {:?} {:?} {:?}, output {:?} {:?}",
            path.display(),
            input.dims,
            input.dtype,
            input.quantization,
            output.dims,
            output.dtype
        );

        Ok(Self {
            interpreter,
            input,
            output,
        })
    }
}

fn describe(tensor: &Tensor) -> TensorSpec {
    let dtype = match tensor.data_type() {
        DataType::Float32 => TensorType::Float32,
        DataType::Int8 => TensorType::Int8,
        DataType::Uint8 => TensorType::UInt8,
        other => TensorType::Other(format!("{:?}", other)),
    };
    let quantization = tensor
        .quantization_parameters()
        .filter(|q| q.scale != 0.0)
        .map(|q| QuantParams::new(q.scale, q.zero_point));

    TensorSpec {
        dims: tensor.shape().dimensions().clone(),
        dtype,
        quantization,
    }
}

impl InferenceModel for TfliteInference {
    fn input_spec(&self) -> &TensorSpec {
        &self.input
    }

    fn output_spec(&self) -> &TensorSpec {
        &self.output
    }

    fn invoke(&mut self, input: &InputTensor) -> Result<OutputTensor> {
        if input.element_count() != self.input.element_count() {
            return Err(KwsError::ArtifactLoadError(format!(
                "input has {} values, tensor expects {}",
                input.element_count(),
                self.input.element_count()
            )));
        }
        let copied = match input {
            InputTensor::Float32(data) => self.interpreter.copy(&data[..], 0),
            InputTensor::Int8(data) => self.interpreter.copy(&data[..], 0),
            InputTensor::UInt8(data) => self.interpreter.copy(&data[..], 0),
        };
        copied.map_err(|e| KwsError::ArtifactLoadError(format!("Failed to set input: {}", e)))?;

        self.interpreter
            .invoke()
            .map_err(|e| KwsError::ArtifactLoadError(format!("Inference failed: {}", e)))?;

        let tensor = self
            .interpreter
            .output(0)
            .map_err(|e| KwsError::ArtifactLoadError(format!("Failed to get output: {}", e)))?;

        let output = match self.output.dtype {
            TensorType::Float32 => OutputTensor::Float32(tensor.data::<f32>().to_vec()),
            TensorType::Int8 => OutputTensor::Int8(tensor.data::<i8>().to_vec()),
            TensorType::UInt8 => OutputTensor::UInt8(tensor.data::<u8>().to_vec()),
            TensorType::Other(ref name) => {
                return Err(KwsError::ArtifactLoadError(format!(
                    "Unsupported output type {}",
                    name
                )))
            }
        };
        Ok(output)
    }
}
