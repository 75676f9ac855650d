//! Deployable model artifacts and how they reach disk

use crate::error::{KwsError, Result};
use crate::quantization::QuantParams;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use strum::Display;
use tempfile::NamedTempFile;

/// Numeric flavour of a deployable artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ModelKind {
    Float,
    Quantized,
}

/// A converted model written once and read back only for inference
#[derive(Debug, Clone)]
pub struct DeployableArtifact {
    pub path: PathBuf,
    pub kind: ModelKind,
    pub size_bytes: u64,
    /// Calibrated input parameters, quantized artifacts only
    pub input_quantization: Option<QuantParams>,
}

/// Write `bytes` to `path` through a temporary sibling file and an atomic rename.
///
/// Nothing appears at `path` unless every byte was written.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<u64> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut tmp = NamedTempFile::new_in(&parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| KwsError::Io(e.error))?;

    Ok(bytes.len() as u64)
}

/// Read an artifact back, mapping every failure to an artifact load error
pub fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).map_err(|e| {
        KwsError::ArtifactLoadError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    if bytes.is_empty() {
        return Err(KwsError::ArtifactLoadError(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(bytes)
}
