use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, KwsError>;

#[derive(Error, Debug)]
pub enum KwsError {
    #[error("Argument error: {0}")]
    ArgumentError(String),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Conversion error: {0}")]
    ConversionError(String),

    #[error("Artifact load error: {0}")]
    ArtifactLoadError(String),

    #[error("Toolkit error: {0}")]
    ToolkitError(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<clap::Error> for KwsError {
    fn from(err: clap::Error) -> Self {
        KwsError::ArgumentError(err.render().to_string())
    }
}

impl KwsError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            KwsError::ArgumentError(_) => 2,
            _ => 1,
        }
    }
}
