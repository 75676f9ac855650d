pub mod calibration;
pub mod cli;
pub mod config;
pub mod conversion;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod pipeline;
pub mod quantization;
pub mod toolkit;

pub use config::Config;
pub use error::{KwsError, Result};
