//! Boundary to the external audio rendering backend.
//!
//! The core assumes exactly one primitive from the backend: start a windowed buffer
//! playback voice with an offset, rate, pan and gain envelope, and stop it again. All
//! DSP (resampling, panning law, mixing) is backend-owned.

use std::sync::Arc;

use crate::{utils::unique_usize_id, Error};

// -------------------------------------------------------------------------------------------------

/// A decoded, mono source sample buffer shared with the backend.
///
/// Decoding and resampling happen in the external asset subsystem; the core only
/// carries the buffer around and slices grain offsets into it.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    frames: Arc<Box<[f32]>>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(frames: Arc<Box<[f32]>>, sample_rate: u32) -> Self {
        debug_assert!(sample_rate > 0, "Need a valid sample rate");
        Self {
            frames,
            sample_rate,
        }
    }

    #[inline]
    pub fn frames(&self) -> &Arc<Box<[f32]>> {
        &self.frames
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Buffer duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 / self.sample_rate as f64
    }

    /// Convert a normalized position (0..=1) to a frame offset.
    pub fn frame_offset(&self, normalized_position: f32) -> usize {
        let max_frame = self.frames.len().saturating_sub(1);
        ((normalized_position.clamp(0.0, 1.0) as f64 * max_frame as f64) as usize).min(max_frame)
    }
}

// -------------------------------------------------------------------------------------------------

/// A linear gain envelope breakpoint, time in seconds from voice start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopePoint {
    pub time: f32,
    pub gain: f32,
}

/// Attack/hold/release envelope as breakpoints: linear ramp up, hold, linear ramp
/// down. The backend interpolates between consecutive points.
pub fn attack_hold_release(duration: f32, fade_length: f32, gain: f32) -> [EnvelopePoint; 4] {
    let fade = fade_length.min(duration / 4.0).max(0.0);
    [
        EnvelopePoint { time: 0.0, gain: 0.0 },
        EnvelopePoint { time: fade, gain },
        EnvelopePoint {
            time: (duration - fade).max(fade),
            gain,
        },
        EnvelopePoint {
            time: duration,
            gain: 0.0,
        },
    ]
}

// -------------------------------------------------------------------------------------------------

/// Opaque handle to a backend voice, returned by [`AudioBackend::start_voice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(usize);

impl VoiceHandle {
    /// Create a unique new handle. Intended for backend implementations.
    pub fn unique() -> Self {
        Self(unique_usize_id())
    }
}

// -------------------------------------------------------------------------------------------------

/// A grain start request, fully resolved into backend terms.
#[derive(Debug, Clone)]
pub struct VoiceStart<'a> {
    pub buffer: &'a SampleBuffer,
    /// Start frame offset into the buffer.
    pub frame_offset: usize,
    /// Playback duration in seconds.
    pub duration: f32,
    /// Resampling rate multiplier (pitch shift).
    pub playback_rate: f64,
    /// Stereo pan position (-1..=1).
    pub pan: f32,
    /// Gain envelope breakpoints.
    pub envelope: [EnvelopePoint; 4],
    /// Scheduling delay in seconds before the voice becomes audible.
    pub delay: f32,
}

// -------------------------------------------------------------------------------------------------

/// The only contract the core expects from the audio rendering backend.
pub trait AudioBackend {
    /// Start a new playback voice. May fail; failures are treated like resource
    /// exhaustion by the caller (logged and counted, never propagated upward).
    fn start_voice(&mut self, request: &VoiceStart) -> Result<VoiceHandle, Error>;

    /// Stop a voice immediately. Unknown or already finished handles are a no-op.
    fn stop_voice(&mut self, handle: VoiceHandle);
}

// -------------------------------------------------------------------------------------------------

/// A backend that accepts everything and renders nothing. Useful for tests and for
/// running the pipeline headless.
#[derive(Debug, Default)]
pub struct NullBackend {
    started: Vec<VoiceHandle>,
    stopped: Vec<VoiceHandle>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles started so far, in start order.
    pub fn started(&self) -> &[VoiceHandle] {
        &self.started
    }

    /// Handles explicitly stopped so far.
    pub fn stopped(&self) -> &[VoiceHandle] {
        &self.stopped
    }
}

impl AudioBackend for NullBackend {
    fn start_voice(&mut self, request: &VoiceStart) -> Result<VoiceHandle, Error> {
        debug_assert!(request.frame_offset < request.buffer.frame_count().max(1));
        let handle = VoiceHandle::unique();
        self.started.push(handle);
        Ok(handle)
    }

    fn stop_voice(&mut self, handle: VoiceHandle) {
        self.stopped.push(handle);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_buffer(frame_count: usize) -> SampleBuffer {
        SampleBuffer::new(Arc::new(vec![0.0; frame_count].into_boxed_slice()), 48_000)
    }

    #[test]
    fn frame_offset_is_bounded() {
        let buffer = test_buffer(1_000);
        assert_eq!(buffer.frame_offset(0.0), 0);
        assert_eq!(buffer.frame_offset(1.0), 999);
        assert_eq!(buffer.frame_offset(2.0), 999);
        assert_eq!(buffer.frame_offset(-1.0), 0);
        assert_eq!(buffer.frame_offset(0.5), 499);
    }

    #[test]
    fn envelope_fade_never_exceeds_quarter_duration() {
        let envelope = attack_hold_release(0.02, 0.1, 1.0);
        assert_eq!(envelope[0].gain, 0.0);
        assert_eq!(envelope[1].time, 0.005); // clamped to duration / 4
        assert_eq!(envelope[1].gain, 1.0);
        assert_eq!(envelope[3].time, 0.02);
        assert_eq!(envelope[3].gain, 0.0);
        // points are non-decreasing in time
        for pair in envelope.windows(2) {
            assert!(pair[0].time <= pair[1].time);
        }
    }
}
