//! Labelled feature samples for calibration and evaluation
//!
//! The audio front-end and dataset split are owned by the training toolkit; this
//! module only defines how the pipeline asks for samples and one provider that
//! serves features the toolkit has already extracted.

pub mod feature_store;

pub use feature_store::{FeatureFile, FeatureStore, StoredSample};

use crate::config::Config;
use crate::error::{KwsError, Result};
use std::ops::Range;
use strum::Display;

/// Dataset partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Partition {
    Training,
    Validation,
    Testing,
}

/// How many samples a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCount {
    /// Every sample from the offset to the end of the partition
    All,
    Exactly(usize),
}

/// Request key understood by every [`SampleProvider`]
#[derive(Debug, Clone, PartialEq)]
pub struct DataRequest {
    pub count: SampleCount,
    pub offset: usize,
    pub partition: Partition,
    pub background_frequency: f32,
    pub background_volume_range: f32,
    /// Maximum random shift, counted in audio samples
    pub time_shift_samples: f32,
}

impl DataRequest {
    /// Request against the testing partition with the configured augmentation settings
    pub fn testing(count: SampleCount, offset: usize, config: &Config) -> Self {
        Self {
            count,
            offset,
            partition: Partition::Testing,
            background_frequency: config.background_frequency,
            background_volume_range: config.background_volume_range,
            time_shift_samples: config.time_shift_ms,
        }
    }

    pub fn at_offset(&self, count: SampleCount, offset: usize) -> Self {
        Self {
            count,
            offset,
            ..self.clone()
        }
    }

    /// Index range this request covers in a partition of `available` samples
    pub fn resolve(&self, available: usize) -> Result<Range<usize>> {
        let end = match self.count {
            SampleCount::All => available,
            SampleCount::Exactly(n) => self.offset.saturating_add(n),
        };
        if self.offset > available || end > available {
            return Err(KwsError::DataUnavailable(format!(
                "requested {:?} samples at offset {} from '{}' partition with {} samples",
                self.count, self.offset, self.partition, available
            )));
        }
        Ok(self.offset..end)
    }
}

/// A flattened feature tensor and its label index
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub features: Vec<f32>,
    pub label: usize,
}

/// Source of labelled feature tensors
pub trait SampleProvider {
    /// Reset the random state that drives augmentation
    fn seed(&mut self, seed: u64);

    /// Fetch a dense batch; fails rather than returning fewer samples than asked for
    fn get_data(&mut self, request: &DataRequest) -> Result<Vec<Sample>>;
}

impl<P: SampleProvider + ?Sized> SampleProvider for &mut P {
    fn seed(&mut self, seed: u64) {
        (**self).seed(seed)
    }

    fn get_data(&mut self, request: &DataRequest) -> Result<Vec<Sample>> {
        (**self).get_data(request)
    }
}

impl<P: SampleProvider + ?Sized> SampleProvider for Box<P> {
    fn seed(&mut self, seed: u64) {
        (**self).seed(seed)
    }

    fn get_data(&mut self, request: &DataRequest) -> Result<Vec<Sample>> {
        (**self).get_data(request)
    }
}
