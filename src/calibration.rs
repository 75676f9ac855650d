//! Representative dataset for full-integer quantization
//!
//! Draws a fixed number of single samples from the testing partition, one offset
//! per draw, and hands them to the converter as `(1, fingerprint_size)` tensors.

use crate::config::Config;
use crate::data::{DataRequest, SampleCount, SampleProvider};
use crate::error::{KwsError, Result};
use crate::models::settings::ModelSettings;
use crate::quantization::RangeObserver;

/// Calibration draws per conversion
pub const CALIBRATION_DRAWS: usize = 100;

/// Distance between the offsets of consecutive draws
const OFFSET_STRIDE: usize = 1;

/// One calibration tensor with shape `(1, feature_length)`
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSample {
    data: Vec<f32>,
}

impl CalibrationSample {
    pub fn shape(&self) -> [usize; 2] {
        [1, self.data.len()]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Lazy, finite, single-pass calibration feed
pub struct RepresentativeDataset<P: SampleProvider> {
    provider: P,
    request: DataRequest,
    feature_length: usize,
    draws: usize,
    seed: u64,
    next: usize,
    failed: bool,
}

impl<P: SampleProvider> RepresentativeDataset<P> {
    pub fn new(provider: P, settings: &ModelSettings, config: &Config) -> Self {
        let request = DataRequest::testing(SampleCount::Exactly(1), 0, config);
        let mut dataset = Self {
            provider,
            request,
            feature_length: settings.fingerprint_size,
            draws: config.calibration_draws,
            seed: config.eval_seed,
            next: 0,
            failed: false,
        };
        dataset.restart();
        dataset
    }

    /// Rewind to the first draw and reseed the provider
    pub fn restart(&mut self) {
        self.provider.seed(self.seed);
        self.next = 0;
        self.failed = false;
    }

    pub fn draws(&self) -> usize {
        self.draws
    }

    pub fn offset(draw: usize) -> usize {
        draw * OFFSET_STRIDE
    }

    /// Offsets requested by every draw, in draw order
    pub fn offsets(&self) -> impl Iterator<Item = usize> {
        (0..self.draws).map(Self::offset)
    }

    pub fn into_provider(self) -> P {
        self.provider
    }

    fn draw(&mut self, index: usize) -> Result<CalibrationSample> {
        let request = self
            .request
            .at_offset(SampleCount::Exactly(1), Self::offset(index));
        let mut batch = self.provider.get_data(&request)?;
        if batch.len() != 1 {
            return Err(KwsError::DataUnavailable(format!(
                "calibration draw {} returned {} samples",
                index,
                batch.len()
            )));
        }

        let data = batch.remove(0).features;
        if data.len() != self.feature_length {
            return Err(KwsError::DataUnavailable(format!(
                "calibration draw {} has {} values, expected {}",
                index,
                data.len(),
                self.feature_length
            )));
        }
        Ok(CalibrationSample { data })
    }
}

impl<P: SampleProvider> Iterator for RepresentativeDataset<P> {
    type Item = Result<CalibrationSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next >= self.draws {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let result = self.draw(index);
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.failed { 0 } else { self.draws - self.next };
        (0, Some(remaining))
    }
}

/// Fully drained calibration feed with its observed activation range
#[derive(Debug, Clone)]
pub struct CalibrationSet {
    samples: Vec<CalibrationSample>,
    observer: RangeObserver,
}

impl CalibrationSet {
    /// Drain every draw; the first failure aborts the whole set
    pub fn drain<I>(feed: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<CalibrationSample>>,
    {
        let mut samples = Vec::new();
        let mut observer = RangeObserver::new();
        for (index, sample) in feed.into_iter().enumerate() {
            let sample = sample.map_err(|e| match e {
                KwsError::DataUnavailable(msg) => {
                    KwsError::DataUnavailable(format!("calibration draw {}: {}", index, msg))
                }
                other => other,
            })?;
            observer.observe(sample.data());
            samples.push(sample);
        }

        if samples.is_empty() {
            return Err(KwsError::DataUnavailable(
                "calibration produced no samples".to_string(),
            ));
        }
        Ok(Self { samples, observer })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[CalibrationSample] {
        &self.samples
    }

    pub fn observer(&self) -> &RangeObserver {
        &self.observer
    }

    pub fn feature_length(&self) -> usize {
        self.samples.first().map(|s| s.data.len()).unwrap_or(0)
    }

    /// Samples as one contiguous little-endian f32 buffer
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|s| s.data.iter().flat_map(|v| v.to_le_bytes()))
            .collect()
    }
}
