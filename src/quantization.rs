//! Per-tensor affine quantization
//!
//! Maps floats to integers with `q = round(f / scale) + zero_point` and back with
//! `f = (q - zero_point) * scale`. Parameters for calibrated tensors are derived
//! from the observed activation range the same way the TFLite converter does for
//! full-integer models: asymmetric, int8, with the range widened to contain zero.

use num_traits::{Bounded, NumCast, ToPrimitive};
use std::fmt;

/// Integer element types an artifact input can be declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntDtype {
    Int8,
    UInt8,
}

/// `(scale, zero_point)` pair attached to a quantized tensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantParams {
    pub fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }

    /// Int8 asymmetric parameters covering `[min, max]`
    pub fn from_range(min: f32, max: f32) -> Self {
        let (qmin, qmax) = (i8::MIN as i32, i8::MAX as i32);
        // The representable range must contain zero exactly
        let min = min.min(0.0);
        let max = max.max(0.0);

        let range = max - min;
        let scale = if range > 0.0 {
            range / (qmax - qmin) as f32
        } else {
            1.0
        };
        let zero_point = (qmin as f32 - min / scale).round() as i32;

        Self {
            scale,
            zero_point: zero_point.clamp(qmin, qmax),
        }
    }

    /// Unclamped quantized value, `round(f / scale) + zero_point`
    pub fn quantize_raw(&self, value: f32) -> f32 {
        (value / self.scale).round() + self.zero_point as f32
    }

    /// Quantize into `T`, saturating at the type's bounds
    pub fn quantize<T>(&self, value: f32) -> T
    where
        T: Bounded + NumCast + ToPrimitive,
    {
        saturating_cast(self.quantize_raw(value))
    }

    pub fn dequantize<T: ToPrimitive>(&self, value: T) -> f32 {
        let q = value.to_i64().unwrap_or_default();
        (q - self.zero_point as i64) as f32 * self.scale
    }

    /// Whether two parameter sets differ beyond `tolerance` relative scale error
    /// or any zero-point difference
    pub fn diverges_from(&self, other: &QuantParams, tolerance: f32) -> bool {
        let scale_error = (self.scale - other.scale).abs() / self.scale.abs().max(f32::EPSILON);
        scale_error > tolerance || self.zero_point != other.zero_point
    }
}

impl fmt::Display for QuantParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scale={} zero_point={}", self.scale, self.zero_point)
    }
}

/// Cast a float into an integer type, clamping to its representable range
pub fn saturating_cast<T>(value: f32) -> T
where
    T: Bounded + NumCast + ToPrimitive,
{
    let lo = T::min_value().to_f32().unwrap_or(f32::MIN);
    let hi = T::max_value().to_f32().unwrap_or(f32::MAX);
    if value.is_nan() {
        return <T as NumCast>::from(0).unwrap_or_else(T::min_value);
    }
    <T as NumCast>::from(value.clamp(lo, hi)).unwrap_or_else(T::max_value)
}

/// Running min/max over every value fed through calibration
#[derive(Debug, Clone)]
pub struct RangeObserver {
    min: f32,
    max: f32,
    count: usize,
}

impl Default for RangeObserver {
    fn default() -> Self {
        Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            count: 0,
        }
    }
}

impl RangeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, values: &[f32]) {
        for &v in values.iter().filter(|v| v.is_finite()) {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
            self.count += 1;
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Observed `(min, max)`, `None` before any finite value was seen
    pub fn range(&self) -> Option<(f32, f32)> {
        (self.count > 0).then_some((self.min, self.max))
    }

    pub fn params(&self) -> Option<QuantParams> {
        self.range().map(|(min, max)| QuantParams::from_range(min, max))
    }
}
