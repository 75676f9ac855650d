use regex::Regex;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::calibration::CALIBRATION_DRAWS;
use crate::models::settings::{prepare_words_list, ModelSettings};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Immutable pipeline configuration, built once at start-up and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    // Training
    pub wanted_words: Vec<String>,
    pub training_steps: Vec<u32>,
    pub learning_rates: Vec<String>,
    pub model_architecture: String,
    pub verbosity: String,
    pub eval_step_interval: u32,
    pub save_step_interval: u32,

    // Shared between training and inference
    pub preprocess: String,
    pub window_stride_ms: u32,

    // Directories
    pub dataset_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub train_dir: PathBuf,
    pub models_dir: PathBuf,
    pub features_dir: PathBuf,
    pub toolkit_dir: PathBuf,
    pub python: String,

    // Quantization
    pub quant_input_min: f32,
    pub quant_input_max: f32,
    pub calibration_draws: usize,
    pub c_array_name: String,

    // Audio processing during quantization and evaluation
    pub sample_rate: u32,
    pub clip_duration_ms: u32,
    pub window_size_ms: f32,
    pub feature_bin_count: u32,
    pub background_frequency: f32,
    pub background_volume_range: f32,
    /// Forwarded to the sample provider as a shift in audio samples
    pub time_shift_ms: f32,
    pub eval_seed: u64,

    // Dataset
    pub data_url: String,
    pub validation_percentage: u32,
    pub testing_percentage: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wanted_words: vec!["none".into(), "low".into(), "high".into()],
            training_steps: vec![12000, 3000],
            learning_rates: vec!["0.001".into(), "0.0001".into()],
            model_architecture: "tiny_conv".into(),
            verbosity: "DEBUG".into(),
            eval_step_interval: 1000,
            save_step_interval: 1000,
            preprocess: "micro".into(),
            window_stride_ms: 20,
            dataset_dir: PathBuf::from("wav/"),
            logs_dir: PathBuf::from("logs/"),
            train_dir: PathBuf::from("train/"),
            models_dir: PathBuf::from("models"),
            features_dir: PathBuf::from("features"),
            toolkit_dir: PathBuf::from("../tensorflow/tensorflow/examples/speech_commands/"),
            python: "python3".into(),
            quant_input_min: 0.0,
            quant_input_max: 26.0,
            calibration_draws: CALIBRATION_DRAWS,
            c_array_name: "g_model".into(),
            sample_rate: 16000,
            clip_duration_ms: 1000,
            window_size_ms: 30.0,
            feature_bin_count: 40,
            background_frequency: 0.8,
            background_volume_range: 0.1,
            time_shift_ms: 100.0,
            eval_seed: 0,
            data_url: "http://storage.googleapis.com/download.tensorflow.org/data/speech_commands_v0.02.tar.gz".into(),
            validation_percentage: 10,
            testing_percentage: 10,
        }
    }
}

impl Config {
    /// Load configuration from `.env` and `KWS_*` environment variables on top of the defaults
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(words) = lookup("KWS_WANTED_WORDS") {
            config.wanted_words = split_list(&words);
        }
        if let Some(steps) = lookup("KWS_TRAINING_STEPS") {
            config.training_steps = split_list(&steps)
                .iter()
                .map(|s| parse_var("KWS_TRAINING_STEPS", s))
                .collect::<Result<_, _>>()?;
        }
        if let Some(rates) = lookup("KWS_LEARNING_RATE") {
            for rate in split_list(&rates) {
                parse_var::<f64>("KWS_LEARNING_RATE", &rate)?;
            }
            config.learning_rates = split_list(&rates);
        }
        if let Some(arch) = lookup("KWS_MODEL_ARCHITECTURE") {
            config.model_architecture = arch;
        }
        if let Some(dir) = lookup("KWS_DATASET_DIR") {
            config.dataset_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("KWS_LOGS_DIR") {
            config.logs_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("KWS_TRAIN_DIR") {
            config.train_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("KWS_MODELS_DIR") {
            config.models_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("KWS_FEATURES_DIR") {
            config.features_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("KWS_TOOLKIT_DIR") {
            config.toolkit_dir = PathBuf::from(dir);
        }
        if let Some(python) = lookup("KWS_PYTHON") {
            config.python = python;
        }
        if let Some(name) = lookup("KWS_C_ARRAY_NAME") {
            config.c_array_name = name;
        }
        if let Some(draws) = lookup("KWS_CALIBRATION_DRAWS") {
            config.calibration_draws = parse_var("KWS_CALIBRATION_DRAWS", &draws)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.wanted_words.is_empty() {
            return Err(ConfigError::InvalidValue {
                var: "KWS_WANTED_WORDS".into(),
                reason: "at least one wanted word is required".into(),
            });
        }
        if self.training_steps.len() != self.learning_rates.len() {
            return Err(ConfigError::Inconsistent(format!(
                "{} training stages but {} learning rates",
                self.training_steps.len(),
                self.learning_rates.len()
            )));
        }
        if self.calibration_draws == 0 {
            return Err(ConfigError::InvalidValue {
                var: "KWS_CALIBRATION_DRAWS".into(),
                reason: "must be positive".into(),
            });
        }
        let identifier =
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").map_err(|e| ConfigError::InvalidValue {
                var: "KWS_C_ARRAY_NAME".into(),
                reason: e.to_string(),
            })?;
        if !identifier.is_match(&self.c_array_name) {
            return Err(ConfigError::InvalidValue {
                var: "KWS_C_ARRAY_NAME".into(),
                reason: format!("'{}' is not a C identifier", self.c_array_name),
            });
        }
        Ok(())
    }

    /// Every label the model predicts, `_silence_` and `_unknown_` first
    pub fn labels(&self) -> Vec<String> {
        prepare_words_list(&self.wanted_words)
    }

    pub fn label_count(&self) -> usize {
        self.labels().len()
    }

    /// Share of silence samples so that every label gets an equal share
    pub fn silence_percentage(&self) -> u32 {
        (100.0 / self.label_count() as f64) as u32
    }

    pub fn unknown_percentage(&self) -> u32 {
        self.silence_percentage()
    }

    /// Total step count, used to name the final checkpoint
    pub fn total_steps(&self) -> u32 {
        self.training_steps.iter().sum()
    }

    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings::prepare(
            self.label_count(),
            self.sample_rate,
            self.clip_duration_ms,
            self.window_size_ms,
            self.window_stride_ms as f32,
            self.feature_bin_count,
            &self.preprocess,
        )
    }

    pub fn model_tflite(&self) -> PathBuf {
        self.models_dir.join("model.tflite")
    }

    pub fn float_model_tflite(&self) -> PathBuf {
        self.models_dir.join("float_model.tflite")
    }

    pub fn model_tflite_micro(&self) -> PathBuf {
        self.models_dir.join("model.cc")
    }

    pub fn saved_model(&self) -> PathBuf {
        self.models_dir.join("saved_model")
    }

    pub fn toolkit_script(&self, name: &str) -> PathBuf {
        self.toolkit_dir.join(name)
    }

    /// Log the effective training setup
    pub fn log_summary(&self) {
        log::info!("Training these words: {}", self.wanted_words.join(","));
        log::info!(
            "Training steps in each stage: {}",
            join_display(&self.training_steps)
        );
        log::info!("Learning rate in each stage: {}", self.learning_rates.join(","));
        log::info!("Total number of training steps: {}", self.total_steps());
        log::debug!(
            "number_of_labels={} number_of_total_labels={}",
            self.wanted_words.len(),
            self.label_count()
        );
        log::debug!("Labels: {}", self.labels().join(","));
        log::debug!(
            "silence={}% unknown={}%",
            self.silence_percentage(),
            self.unknown_percentage()
        );
    }
}

pub(crate) fn join_display<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_var<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var: var.to_string(),
        reason: format!("'{}': {}", value, e),
    })
}
