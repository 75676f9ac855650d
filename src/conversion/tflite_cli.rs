//! Conversion through the TensorFlow Lite converter in a Python subprocess
//!
//! Calibration samples are handed over as a raw little-endian f32 file, the model
//! comes back through a temporary output file, and the converted model's input
//! quantization is reported as one JSON line on stdout.

use super::{ConversionBackend, ConversionTarget, ConvertedModel, SavedModel};
use crate::error::{KwsError, Result};
use crate::quantization::QuantParams;
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;

const CONVERT_SCRIPT: &str = r#"
import json, sys
import numpy as np
import tensorflow as tf

saved_model, output, mode = sys.argv[1:4]
converter = tf.lite.TFLiteConverter.from_saved_model(saved_model)
if mode == "int8":
    calibration, feature_length = sys.argv[4], int(sys.argv[5])
    samples = np.fromfile(calibration, dtype="<f4").reshape(-1, 1, feature_length)
    converter.optimizations = [tf.lite.Optimize.DEFAULT]
    converter.inference_input_type = tf.int8
    converter.inference_output_type = tf.int8
    converter.representative_dataset = lambda: ([s] for s in samples)
model = converter.convert()
with open(output, "wb") as f:
    f.write(model)
details = tf.lite.Interpreter(model_content=model).get_input_details()[0]
scale, zero_point = details["quantization"]
print(json.dumps({"input_scale": float(scale), "input_zero_point": int(zero_point)}))
"#;

#[derive(Debug, Deserialize)]
struct ConverterReport {
    input_scale: f32,
    input_zero_point: i32,
}

/// Runs `tf.lite.TFLiteConverter` with the configured Python interpreter
#[derive(Debug, Clone)]
pub struct TfliteConverterCli {
    python: String,
    scratch_dir: Option<PathBuf>,
}

impl TfliteConverterCli {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            scratch_dir: None,
        }
    }

    /// Keep temporary files in `dir` instead of the system temp directory
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    fn temp_file(&self) -> Result<NamedTempFile> {
        let file = match &self.scratch_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                NamedTempFile::new_in(dir)?
            }
            None => NamedTempFile::new()?,
        };
        Ok(file)
    }
}

impl ConversionBackend for TfliteConverterCli {
    fn convert(&self, model: &SavedModel, target: ConversionTarget<'_>) -> Result<ConvertedModel> {
        let output = self.temp_file()?;

        let mut command = Command::new(&self.python);
        command
            .arg("-c")
            .arg(CONVERT_SCRIPT)
            .arg(model.dir())
            .arg(output.path());

        // Must outlive the subprocess
        let mut calibration_file = None;
        match target {
            ConversionTarget::Float => {
                command.arg("float");
            }
            ConversionTarget::FullInteger { calibration } => {
                let mut file = self.temp_file()?;
                file.write_all(&calibration.to_le_bytes())?;
                file.flush()?;
                command
                    .arg("int8")
                    .arg(file.path())
                    .arg(calibration.feature_length().to_string());
                calibration_file = Some(file);
            }
        }

        log::info!(
            "Converting {} to a {} model",
            model.dir().display(),
            target.kind()
        );
        let result = command.output().map_err(|e| {
            KwsError::ConversionError(format!("Failed to start {}: {}", self.python, e))
        })?;
        drop(calibration_file);

        if !result.status.success() {
            return Err(KwsError::ConversionError(format!(
                "converter exited with {}: {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        let bytes = fs::read(output.path())?;
        let stdout = String::from_utf8_lossy(&result.stdout);
        let input_quantization = parse_report(&stdout)?;

        Ok(ConvertedModel {
            bytes,
            input_quantization,
        })
    }
}

/// Parse the last stdout line; a zero scale means the input is not quantized
fn parse_report(stdout: &str) -> Result<Option<QuantParams>> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| KwsError::ConversionError("converter printed no report".to_string()))?;
    let report: ConverterReport = serde_json::from_str(line.trim()).map_err(|e| {
        KwsError::ConversionError(format!("Malformed converter report '{}': {}", line, e))
    })?;

    Ok((report.input_scale != 0.0)
        .then(|| QuantParams::new(report.input_scale, report.input_zero_point)))
}
