//! Compact parameter descriptors for per-voice tunables.
//!
//! Descriptors carry the id, name, range and default of a tunable and clamp incoming
//! values silently: out-of-range configuration is never rejected, only sanitized.

use std::ops::RangeInclusive;

use four_cc::FourCC;

// -------------------------------------------------------------------------------------------------

/// A continuous (float) parameter descriptor.
#[derive(Debug, Clone)]
pub struct FloatParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<f32>,
    default: f32,
}

impl FloatParameter {
    pub const fn new(
        id: FourCC,
        name: &'static str,
        range: RangeInclusive<f32>,
        default: f32,
    ) -> Self {
        assert!(
            default >= *range.start() && default <= *range.end(),
            "Invalid parameter default value"
        );
        Self {
            id,
            name,
            range,
            default,
        }
    }

    #[inline]
    pub fn id(&self) -> FourCC {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn range(&self) -> &RangeInclusive<f32> {
        &self.range
    }

    #[inline]
    pub fn default_value(&self) -> f32 {
        self.default
    }

    /// Clamp the given plain value to the parameter's range. Non-finite values fall
    /// back to the default.
    pub fn clamp_value(&self, value: f32) -> f32 {
        if value.is_finite() {
            value.clamp(*self.range.start(), *self.range.end())
        } else {
            self.default
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A discrete (integer) parameter descriptor.
#[derive(Debug, Clone)]
pub struct IntegerParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<i32>,
    default: i32,
}

impl IntegerParameter {
    pub const fn new(
        id: FourCC,
        name: &'static str,
        range: RangeInclusive<i32>,
        default: i32,
    ) -> Self {
        assert!(
            default >= *range.start() && default <= *range.end(),
            "Invalid parameter default value"
        );
        Self {
            id,
            name,
            range,
            default,
        }
    }

    #[inline]
    pub fn id(&self) -> FourCC {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn default_value(&self) -> i32 {
        self.default
    }

    /// Clamp the given plain value to the parameter's range.
    pub fn clamp_value(&self, value: i32) -> i32 {
        value.clamp(*self.range.start(), *self.range.end())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_FLOAT: FloatParameter =
        FloatParameter::new(FourCC(*b"TFLT"), "Test Float", 1.0..=100.0, 10.0);
    const TEST_INT: IntegerParameter =
        IntegerParameter::new(FourCC(*b"TINT"), "Test Int", 1..=64, 32);

    #[test]
    fn values_clamp_silently() {
        assert_eq!(TEST_FLOAT.clamp_value(50.0), 50.0);
        assert_eq!(TEST_FLOAT.clamp_value(0.0), 1.0);
        assert_eq!(TEST_FLOAT.clamp_value(1_000.0), 100.0);
        assert_eq!(TEST_FLOAT.clamp_value(f32::NAN), 10.0);
        assert_eq!(TEST_INT.clamp_value(-3), 1);
        assert_eq!(TEST_INT.clamp_value(100), 64);
    }
}
