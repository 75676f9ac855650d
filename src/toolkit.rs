//! Training and freezing through the speech_commands toolkit scripts

use crate::config::{join_display, Config};
use crate::conversion::SavedModel;
use crate::error::{KwsError, Result};
use std::path::Path;
use std::process::Command;

pub trait Trainer {
    fn train(&self, config: &Config) -> Result<()>;
}

pub trait Freezer {
    /// Freeze the final checkpoint into a SavedModel directory
    fn freeze(&self, config: &Config) -> Result<SavedModel>;
}

/// Runs `train.py` and `freeze.py` from the configured toolkit directory
#[derive(Debug, Clone)]
pub struct SpeechCommandsToolkit {
    python: String,
}

impl SpeechCommandsToolkit {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    fn run_script(&self, script: &Path, args: &[String]) -> Result<()> {
        if !script.is_file() {
            return Err(KwsError::ToolkitError(format!(
                "toolkit script not found: {}",
                script.display()
            )));
        }
        log::info!("Running {} {}", script.display(), args.join(" "));

        let status = Command::new(&self.python)
            .arg(script)
            .args(args)
            .status()
            .map_err(|e| {
                KwsError::ToolkitError(format!("Failed to start {}: {}", self.python, e))
            })?;

        if !status.success() {
            return Err(KwsError::ToolkitError(format!(
                "{} exited with {}",
                script.display(),
                status
            )));
        }
        Ok(())
    }
}

impl Trainer for SpeechCommandsToolkit {
    fn train(&self, config: &Config) -> Result<()> {
        self.run_script(&config.toolkit_script("train.py"), &train_args(config))
    }
}

impl Freezer for SpeechCommandsToolkit {
    fn freeze(&self, config: &Config) -> Result<SavedModel> {
        self.run_script(&config.toolkit_script("freeze.py"), &freeze_args(config))?;
        SavedModel::open(config.saved_model()).map_err(|e| {
            KwsError::ToolkitError(format!("freeze.py produced no usable SavedModel: {}", e))
        })
    }
}

/// Arguments for `train.py`
pub fn train_args(config: &Config) -> Vec<String> {
    vec![
        format!("--data_dir={}", config.dataset_dir.display()),
        format!("--wanted_words={}", config.wanted_words.join(",")),
        format!("--silence_percentage={}", config.silence_percentage()),
        format!("--unknown_percentage={}", config.unknown_percentage()),
        format!("--preprocess={}", config.preprocess),
        format!("--window_stride={}", config.window_stride_ms),
        format!("--model_architecture={}", config.model_architecture),
        format!(
            "--how_many_training_steps={}",
            join_display(&config.training_steps)
        ),
        format!("--learning_rate={}", config.learning_rates.join(",")),
        format!("--train_dir={}", config.train_dir.display()),
        format!("--summaries_dir={}", config.logs_dir.display()),
        format!("--verbosity={}", config.verbosity),
        format!("--eval_step_interval={}", config.eval_step_interval),
        format!("--save_step_interval={}", config.save_step_interval),
    ]
}

/// Arguments for `freeze.py`
pub fn freeze_args(config: &Config) -> Vec<String> {
    // train_dir keeps its trailing separator, the checkpoint name is appended verbatim
    let checkpoint = format!(
        "{}{}.ckpt-{}",
        config.train_dir.display(),
        config.model_architecture,
        config.total_steps()
    );
    vec![
        format!("--wanted_words={}", config.wanted_words.join(",")),
        format!("--window_stride={}", config.window_stride_ms),
        format!("--preprocess={}", config.preprocess),
        format!("--model_architecture={}", config.model_architecture),
        format!("--start_checkpoint={}", checkpoint),
        "--save_format=saved_model".to_string(),
        format!("--output_file={}", config.saved_model().display()),
    ]
}
