//! Small shared helpers with no better home.

#![allow(unused_macros)]

use std::sync::atomic::{AtomicUsize, Ordering};

// -------------------------------------------------------------------------------------------------

macro_rules! assert_eq_with_epsilon {
    ($x:expr, $y:expr, $d:expr) => {
        if ($x - $y).abs() > $d {
            panic!("{} != {} (epsilon {})", $x, $y, $d);
        }
    };
}

#[cfg(test)]
pub(crate) use assert_eq_with_epsilon;

// -------------------------------------------------------------------------------------------------

/// Generates a unique usize number, by simply counting atomically upwards from 1.
pub fn unique_usize_id() -> usize {
    static ID_COUNTER: AtomicUsize = AtomicUsize::new(1);
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

// -------------------------------------------------------------------------------------------------

/// Linearly interpolate between `a` and `b` with `t` in range 0..=1.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

// -------------------------------------------------------------------------------------------------

/// Convert a pitch shift in semitones (+ optional cents detune) to a playback rate multiplier.
#[inline]
pub fn playback_rate_from_pitch(semitones: f32, cents: f32) -> f64 {
    f64::powf(2.0, (semitones as f64 + cents as f64 / 100.0) / 12.0)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_to_rate_conversion() {
        assert_eq!(playback_rate_from_pitch(0.0, 0.0), 1.0);
        assert_eq_with_epsilon!(playback_rate_from_pitch(12.0, 0.0), 2.0, 1e-9);
        assert_eq_with_epsilon!(playback_rate_from_pitch(-12.0, 0.0), 0.5, 1e-9);
        assert_eq_with_epsilon!(playback_rate_from_pitch(0.0, 100.0), 2.0f64.powf(1.0 / 12.0), 1e-9);
    }

    #[test]
    fn lerp_endpoints() {
        assert_eq!(lerp(2.0, 6.0, 0.0), 2.0);
        assert_eq!(lerp(2.0, 6.0, 1.0), 6.0);
        assert_eq!(lerp(2.0, 6.0, 0.5), 4.0);
    }
}
