//! Post-training conversion into float and full-integer artifacts
//!
//! The graph rewrite itself belongs to the converter toolkit behind
//! [`ConversionBackend`]. This module owns everything around it: draining the
//! calibration feed before the quantized conversion starts, checking the
//! calibrated input range, and writing artifacts so that a failed conversion
//! never leaves a file behind.

pub mod tflite_cli;

pub use tflite_cli::TfliteConverterCli;

use crate::calibration::{CalibrationSet, RepresentativeDataset};
use crate::config::Config;
use crate::data::SampleProvider;
use crate::error::{KwsError, Result};
use crate::models::artifact::{write_atomic, DeployableArtifact, ModelKind};
use crate::quantization::QuantParams;
use std::path::{Path, PathBuf};

/// Relative scale difference tolerated between calibrated and converter-reported parameters
const QPARAM_TOLERANCE: f32 = 1e-3;

/// Handle to a frozen model in SavedModel directory form
#[derive(Debug, Clone)]
pub struct SavedModel {
    dir: PathBuf,
}

impl SavedModel {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(KwsError::ConversionError(format!(
                "SavedModel directory not found: {}",
                dir.display()
            )));
        }
        let has_graph = ["saved_model.pb", "saved_model.pbtxt"]
            .iter()
            .any(|name| dir.join(name).is_file());
        if !has_graph {
            return Err(KwsError::ConversionError(format!(
                "{} contains no saved_model.pb",
                dir.display()
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// What the backend should produce
#[derive(Debug, Clone, Copy)]
pub enum ConversionTarget<'a> {
    Float,
    /// Default optimizations, int8 input and output, ranges from `calibration`
    FullInteger { calibration: &'a CalibrationSet },
}

impl ConversionTarget<'_> {
    pub fn kind(&self) -> ModelKind {
        match self {
            ConversionTarget::Float => ModelKind::Float,
            ConversionTarget::FullInteger { .. } => ModelKind::Quantized,
        }
    }
}

/// Serialized model returned by a backend
#[derive(Debug, Clone)]
pub struct ConvertedModel {
    pub bytes: Vec<u8>,
    /// Input parameters as the backend recorded them, if it reports any
    pub input_quantization: Option<QuantParams>,
}

/// Graph converter toolkit
pub trait ConversionBackend {
    fn convert(&self, model: &SavedModel, target: ConversionTarget<'_>) -> Result<ConvertedModel>;
}

impl<B: ConversionBackend + ?Sized> ConversionBackend for &B {
    fn convert(&self, model: &SavedModel, target: ConversionTarget<'_>) -> Result<ConvertedModel> {
        (**self).convert(model, target)
    }
}

impl<B: ConversionBackend + ?Sized> ConversionBackend for Box<B> {
    fn convert(&self, model: &SavedModel, target: ConversionTarget<'_>) -> Result<ConvertedModel> {
        (**self).convert(model, target)
    }
}

/// Produces both deployable artifacts from one trained model
pub struct ModelConverter<'a, B: ConversionBackend> {
    backend: B,
    config: &'a Config,
}

impl<'a, B: ConversionBackend> ModelConverter<'a, B> {
    pub fn new(backend: B, config: &'a Config) -> Self {
        Self { backend, config }
    }

    pub fn convert_float(&self, model: &SavedModel) -> Result<DeployableArtifact> {
        let converted = self.backend.convert(model, ConversionTarget::Float)?;
        let path = self.config.float_model_tflite();
        let size_bytes = write_artifact(&path, &converted.bytes)?;
        log::info!("Float model is {} bytes", size_bytes);

        Ok(DeployableArtifact {
            path,
            kind: ModelKind::Float,
            size_bytes,
            input_quantization: None,
        })
    }

    /// Calibrate on the whole feed, then convert; nothing is written if any draw fails
    pub fn convert_quantized<P: SampleProvider>(
        &self,
        model: &SavedModel,
        dataset: &mut RepresentativeDataset<P>,
    ) -> Result<DeployableArtifact> {
        dataset.restart();
        log::info!("Drawing {} representative samples", dataset.draws());
        let calibration = CalibrationSet::drain(dataset.by_ref())?;
        log::info!(
            "Calibrated on {} samples of {} values",
            calibration.len(),
            calibration.feature_length()
        );

        let calibrated = calibration.observer().params().ok_or_else(|| {
            KwsError::DataUnavailable("calibration samples contain no finite values".to_string())
        })?;
        self.check_input_range(&calibration);

        let converted = self.backend.convert(
            model,
            ConversionTarget::FullInteger {
                calibration: &calibration,
            },
        )?;

        match converted.input_quantization {
            Some(reported) if calibrated.diverges_from(&reported, QPARAM_TOLERANCE) => {
                log::warn!(
                    "Converter input quantization ({}) differs from calibrated ({})",
                    reported,
                    calibrated
                );
            }
            Some(reported) => log::debug!("Converter input quantization: {}", reported),
            None => log::warn!("Converter reported no input quantization parameters"),
        }

        let path = self.config.model_tflite();
        let size_bytes = write_artifact(&path, &converted.bytes)?;
        log::info!("Quantized model is {} bytes", size_bytes);

        Ok(DeployableArtifact {
            path,
            kind: ModelKind::Quantized,
            size_bytes,
            input_quantization: Some(calibrated),
        })
    }

    /// Float conversion followed by quantized conversion
    pub fn convert_all<P: SampleProvider>(
        &self,
        model: &SavedModel,
        dataset: &mut RepresentativeDataset<P>,
    ) -> Result<Vec<DeployableArtifact>> {
        let float = self.convert_float(model)?;
        let quantized = self.convert_quantized(model, dataset)?;
        Ok(vec![float, quantized])
    }

    /// Compare the observed input range with the configured fixed range
    fn check_input_range(&self, calibration: &CalibrationSet) {
        let Some((min, max)) = calibration.observer().range() else {
            return;
        };
        let (fixed_min, fixed_max) = (self.config.quant_input_min, self.config.quant_input_max);
        log::info!(
            "Calibrated input range [{}, {}], configured [{}, {}]",
            min,
            max,
            fixed_min,
            fixed_max
        );
        if min < fixed_min || max > fixed_max {
            log::warn!(
                "Calibrated input range [{}, {}] exceeds configured range [{}, {}]; using calibrated parameters",
                min,
                max,
                fixed_min,
                fixed_max
            );
        }
    }
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<u64> {
    if bytes.is_empty() {
        return Err(KwsError::ConversionError(format!(
            "converter produced an empty model for {}",
            path.display()
        )));
    }
    write_atomic(path, bytes)
}
