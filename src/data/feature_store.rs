//! Precomputed feature tensors stored as one JSON file per partition
//!
//! Layout: `<dir>/<partition>.json` containing
//! `{ "feature_length": n, "samples": [{ "label": i, "features": [...] }] }`.
//! Each feature vector is `spectrogram_length` frames of `feature_bin_count` bins.

use super::{DataRequest, Partition, Sample, SampleProvider};
use crate::error::{KwsError, Result};
use crate::models::settings::ModelSettings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSample {
    pub label: usize,
    pub features: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFile {
    pub feature_length: usize,
    pub samples: Vec<StoredSample>,
}

/// Serves features extracted ahead of time by the training toolkit
pub struct FeatureStore {
    dir: PathBuf,
    settings: ModelSettings,
    rng: StdRng,
    partitions: HashMap<Partition, FeatureFile>,
}

impl FeatureStore {
    pub fn new<P: AsRef<Path>>(dir: P, settings: ModelSettings) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            settings,
            rng: StdRng::seed_from_u64(0),
            partitions: HashMap::new(),
        }
    }

    pub fn partition_path(&self, partition: Partition) -> PathBuf {
        self.dir.join(format!("{}.json", partition))
    }

    /// Write a partition file in the layout this store reads
    pub fn write_partition(dir: &Path, partition: Partition, file: &FeatureFile) -> Result<()> {
        fs::create_dir_all(dir)?;
        let json = serde_json::to_vec(file).map_err(|e| {
            KwsError::DataUnavailable(format!("Failed to encode {} features: {}", partition, e))
        })?;
        fs::write(dir.join(format!("{}.json", partition)), json)?;
        Ok(())
    }

    fn load(&mut self, partition: Partition) -> Result<&FeatureFile> {
        if !self.partitions.contains_key(&partition) {
            let path = self.partition_path(partition);
            let bytes = fs::read(&path).map_err(|e| {
                KwsError::DataUnavailable(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let file: FeatureFile = serde_json::from_slice(&bytes).map_err(|e| {
                KwsError::DataUnavailable(format!("Malformed feature file {}: {}", path.display(), e))
            })?;

            if file.feature_length != self.settings.fingerprint_size {
                return Err(KwsError::DataUnavailable(format!(
                    "{} holds {}-value features, model expects {}",
                    path.display(),
                    file.feature_length,
                    self.settings.fingerprint_size
                )));
            }
            if let Some(bad) = file
                .samples
                .iter()
                .position(|s| s.features.len() != file.feature_length)
            {
                return Err(KwsError::DataUnavailable(format!(
                    "Sample {} in {} has {} values, expected {}",
                    bad,
                    path.display(),
                    file.samples[bad].features.len(),
                    file.feature_length
                )));
            }

            log::debug!(
                "Loaded {} {} samples from {}",
                file.samples.len(),
                partition,
                path.display()
            );
            self.partitions.insert(partition, file);
        }

        self.partitions.get(&partition).ok_or_else(|| {
            KwsError::DataUnavailable(format!("Partition {} not loaded", partition))
        })
    }

    /// Maximum shift in whole frames for a shift given in audio samples
    fn shift_frames(&self, time_shift_samples: f32) -> i64 {
        if self.settings.window_stride_samples == 0 {
            return 0;
        }
        (time_shift_samples / self.settings.window_stride_samples as f32).round() as i64
    }
}

impl SampleProvider for FeatureStore {
    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn get_data(&mut self, request: &DataRequest) -> Result<Vec<Sample>> {
        let max_shift = self.shift_frames(request.time_shift_samples);
        let bins = self.settings.feature_bin_count;

        let file = self.load(request.partition)?;
        let range = request.resolve(file.samples.len())?;
        let stored: Vec<StoredSample> = file.samples[range].to_vec();

        // Background noise is only mixed into training audio, before feature extraction
        let samples = stored
            .into_iter()
            .map(|sample| {
                let shift = if max_shift > 0 {
                    self.rng.gen_range(-max_shift..max_shift)
                } else {
                    0
                };
                Sample {
                    features: shift_frames(&sample.features, bins, shift),
                    label: sample.label,
                }
            })
            .collect();

        Ok(samples)
    }
}

/// Move whole frames by `shift` (positive is later in time), zero-filling the gap
pub fn shift_frames(features: &[f32], bins: usize, shift: i64) -> Vec<f32> {
    if shift == 0 || bins == 0 {
        return features.to_vec();
    }
    let frames = (features.len() / bins) as i64;
    let mut shifted = vec![0.0; features.len()];
    for dst in 0..frames {
        let src = dst - shift;
        if (0..frames).contains(&src) {
            let (d, s) = (dst as usize * bins, src as usize * bins);
            shifted[d..d + bins].copy_from_slice(&features[s..s + bins]);
        }
    }
    shifted
}
