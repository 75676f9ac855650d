//! Model input geometry derived from the audio front-end configuration

/// Labels that every model carries ahead of the wanted words
pub const SILENCE_LABEL: &str = "_silence_";
pub const UNKNOWN_LABEL: &str = "_unknown_";

/// Tensor geometry shared by training, conversion and evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub desired_samples: usize,
    pub window_size_samples: usize,
    pub window_stride_samples: usize,
    pub spectrogram_length: usize,
    pub feature_bin_count: usize,
    /// Flattened feature length, the model's input element count
    pub fingerprint_size: usize,
    pub label_count: usize,
    pub sample_rate: u32,
    pub preprocess: String,
}

impl ModelSettings {
    pub fn prepare(
        label_count: usize,
        sample_rate: u32,
        clip_duration_ms: u32,
        window_size_ms: f32,
        window_stride_ms: f32,
        feature_bin_count: u32,
        preprocess: &str,
    ) -> Self {
        let desired_samples = (sample_rate as u64 * clip_duration_ms as u64 / 1000) as usize;
        let window_size_samples = (sample_rate as f32 * window_size_ms / 1000.0) as usize;
        let window_stride_samples = (sample_rate as f32 * window_stride_ms / 1000.0) as usize;

        let spectrogram_length = if desired_samples < window_size_samples || window_stride_samples == 0 {
            0
        } else {
            1 + (desired_samples - window_size_samples) / window_stride_samples
        };
        let feature_bin_count = feature_bin_count as usize;

        Self {
            desired_samples,
            window_size_samples,
            window_stride_samples,
            spectrogram_length,
            feature_bin_count,
            fingerprint_size: feature_bin_count * spectrogram_length,
            label_count,
            sample_rate,
            preprocess: preprocess.to_string(),
        }
    }
}

/// Full label list: silence, unknown, then the wanted words in order
pub fn prepare_words_list(wanted_words: &[String]) -> Vec<String> {
    let mut words = vec![SILENCE_LABEL.to_string(), UNKNOWN_LABEL.to_string()];
    words.extend(wanted_words.iter().cloned());
    words
}
