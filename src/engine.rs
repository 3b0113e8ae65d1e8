//! Per-voice grain engine: consumes organizer output under a fixed resource budget.
//!
//! Each engine owns one fixed-capacity pool of reusable grain records and the
//! active-grain bookkeeping for a single species. Admission control, rate limiting and
//! pool exhaustion all degrade silently (fewer or no grains) and are observable
//! through [`EngineMetrics`], never through errors.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use four_cc::FourCC;

use crate::{
    backend::{attack_hold_release, AudioBackend, SampleBuffer, VoiceStart},
    organizer::GrainDescriptor,
    parameter::{FloatParameter, IntegerParameter},
    particle::SpeciesId,
    utils::playback_rate_from_pitch,
    Error,
};

mod pool;

pub use pool::{GrainId, GrainPool};

// -------------------------------------------------------------------------------------------------

/// Global per-pass knobs owned by the orchestrator and passed into every voice.
#[derive(Debug, Clone, Copy)]
pub struct GlobalParams {
    /// Master output gain applied on top of per-grain gain.
    pub master_gain: f32,
    /// Scales every voice's trigger rate.
    pub density_multiplier: f32,
    /// Scales every grain's duration.
    pub size_multiplier: f32,
    /// Concurrency ceiling across all voices; each voice receives its share and never
    /// admits more than it in a single pass.
    pub voice_grain_ceiling: usize,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            master_gain: 1.0,
            density_multiplier: 1.0,
            size_multiplier: 1.0,
            voice_grain_ceiling: usize::MAX,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Control messages consumed by a [`GrainEngine`] at the start of its next tick.
pub enum EngineMessage {
    /// Swap in a new source sample buffer.
    LoadSample(SampleBuffer),
    /// Drop the sample buffer and synchronously stop everything that is playing.
    ClearSample,
    /// Update a per-voice tunable, clamped silently into range.
    SetParameter { id: FourCC, value: f32 },
    /// Stop all active grains without touching the sample buffer.
    StopAll,
}

// -------------------------------------------------------------------------------------------------

/// Load metrics and silent-degradation counters for one voice.
///
/// Dropping a grain request is a deliberate backpressure choice, not an error; these
/// counters make the degradation observable without breaking the no-throw contract.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineMetrics {
    pub active_grains: usize,
    pub pool_utilization: f32,
    pub audio_load: f32,
    pub started: u64,
    pub dropped_admission: u64,
    pub dropped_rate: u64,
    pub dropped_pool: u64,
    pub backend_failures: u64,
}

// -------------------------------------------------------------------------------------------------

/// One voice: a grain engine bound to a single particle species.
pub struct GrainEngine {
    species: SpeciesId,
    sample: Option<SampleBuffer>,
    pool: GrainPool,
    message_queue: Arc<ArrayQueue<EngineMessage>>,
    metrics: EngineMetrics,
    /// Audio-side timestamp of the last scheduled grain, for rate limiting.
    last_grain_time: f64,
    // per-voice tunables, clamped through the descriptors below
    density: f32,
    max_grains: usize,
    fade_length: f32,
    pitch_range: f32,
    gain: f32,
    // scratch for the admission ranking pass
    ranked: Vec<(usize, f32)>,
}

impl GrainEngine {
    /// Grain records allocated per voice at construction time.
    pub const POOL_CAPACITY: usize = 100;
    const MESSAGE_QUEUE_CAPACITY: usize = 64;

    pub const DENSITY: FloatParameter =
        FloatParameter::new(FourCC(*b"GDEN"), "Density", 1.0..=100.0, 10.0);
    pub const MAX_GRAINS: IntegerParameter =
        IntegerParameter::new(FourCC(*b"GMAX"), "Max Grains", 1..=100, 64);
    pub const FADE_LENGTH: FloatParameter =
        FloatParameter::new(FourCC(*b"GFAD"), "Fade Length", 0.0..=0.25, 0.01);
    pub const PITCH_RANGE: FloatParameter =
        FloatParameter::new(FourCC(*b"GPIT"), "Pitch Range", 0.0..=24.0, 24.0);
    pub const GAIN: FloatParameter = FloatParameter::new(FourCC(*b"GVOL"), "Gain", 0.0..=2.0, 1.0);

    pub fn new(species: SpeciesId) -> Self {
        Self {
            species,
            sample: None,
            pool: GrainPool::new(Self::POOL_CAPACITY),
            message_queue: Arc::new(ArrayQueue::new(Self::MESSAGE_QUEUE_CAPACITY)),
            metrics: EngineMetrics::default(),
            last_grain_time: f64::NEG_INFINITY,
            density: Self::DENSITY.default_value(),
            max_grains: Self::MAX_GRAINS.default_value() as usize,
            fade_length: Self::FADE_LENGTH.default_value(),
            pitch_range: Self::PITCH_RANGE.default_value(),
            gain: Self::GAIN.default_value(),
            ranked: Vec::new(),
        }
    }

    #[inline]
    pub fn species(&self) -> SpeciesId {
        self.species
    }

    #[inline]
    pub fn has_sample(&self) -> bool {
        self.sample.is_some()
    }

    /// Queue for deferred engine control. Messages apply at the start of the next tick.
    pub fn message_queue(&self) -> Arc<ArrayQueue<EngineMessage>> {
        Arc::clone(&self.message_queue)
    }

    #[inline]
    pub fn density(&self) -> f32 {
        self.density
    }

    #[inline]
    pub fn max_grains(&self) -> usize {
        self.max_grains
    }

    #[inline]
    pub fn fade_length(&self) -> f32 {
        self.fade_length
    }

    #[inline]
    pub fn pitch_range(&self) -> f32 {
        self.pitch_range
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Current load metrics. `active_grains` and the load figures reflect the state
    /// after the most recent tick.
    pub fn metrics(&self) -> EngineMetrics {
        let mut metrics = self.metrics;
        metrics.active_grains = self.pool.active_count();
        metrics.pool_utilization = self.pool.utilization();
        metrics
    }

    /// Swap in a new source sample buffer, synchronously.
    pub fn load_sample(&mut self, sample: SampleBuffer) {
        self.sample = Some(sample);
    }

    /// Drop the sample and synchronously stop every active grain. Completion events
    /// that fire later for these grains are harmless: grain release is idempotent.
    pub fn clear_sample(&mut self, backend: &mut dyn AudioBackend) {
        self.stop_all(backend);
        self.sample = None;
    }

    /// Stop all active grains and return every grain record to the pool.
    pub fn stop_all(&mut self, backend: &mut dyn AudioBackend) {
        for grain_id in self.pool.active_ids() {
            if let Some(handle) = self.pool.voice_handle(grain_id) {
                backend.stop_voice(handle);
            }
        }
        self.pool.reset();
    }

    /// Set a per-voice tunable by parameter name. Unknown names report an error;
    /// out-of-range values clamp silently.
    pub fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), Error> {
        let id = [
            &Self::DENSITY.id(),
            &Self::MAX_GRAINS.id(),
            &Self::FADE_LENGTH.id(),
            &Self::PITCH_RANGE.id(),
            &Self::GAIN.id(),
        ]
        .into_iter()
        .zip([
            Self::DENSITY.name(),
            Self::MAX_GRAINS.name(),
            Self::FADE_LENGTH.name(),
            Self::PITCH_RANGE.name(),
            Self::GAIN.name(),
        ])
        .find(|(_, parameter_name)| parameter_name.eq_ignore_ascii_case(name))
        .map(|(id, _)| *id)
        .ok_or_else(|| Error::ParameterError(format!("Unknown voice parameter '{name}'")))?;
        self.apply_parameter(id, value);
        Ok(())
    }

    pub(crate) fn apply_parameter(&mut self, id: FourCC, value: f32) {
        if id == Self::DENSITY.id() {
            self.density = Self::DENSITY.clamp_value(value);
        } else if id == Self::MAX_GRAINS.id() {
            self.max_grains = Self::MAX_GRAINS.clamp_value(value as i32) as usize;
        } else if id == Self::FADE_LENGTH.id() {
            self.fade_length = Self::FADE_LENGTH.clamp_value(value);
        } else if id == Self::PITCH_RANGE.id() {
            self.pitch_range = Self::PITCH_RANGE.clamp_value(value);
        } else if id == Self::GAIN.id() {
            self.gain = Self::GAIN.clamp_value(value);
        } else {
            log::warn!("Ignoring unknown voice parameter id '{id}'");
        }
    }

    /// Process one audio tick for this voice.
    ///
    /// Consumes the organizer's descriptors under admission control and rate limiting
    /// and issues start requests to the backend. Missing sample buffers, exhausted
    /// pools and rejected starts all degrade silently.
    pub fn process(
        &mut self,
        backend: &mut dyn AudioBackend,
        descriptors: &[GrainDescriptor],
        globals: &GlobalParams,
        now: f64,
    ) {
        self.drain_messages(backend);
        self.complete_elapsed_grains(now);

        // no source buffer loaded: skip the entire voice for this tick
        let Some(sample) = self.sample.clone() else {
            return;
        };
        if descriptors.is_empty() {
            return;
        }

        // admission ceiling from the current load
        let load = (self.pool.active_count() as f32 / self.max_grains.max(1) as f32)
            .max(self.pool.utilization());
        self.metrics.audio_load = load;
        let ceiling_factor = if load >= 0.9 {
            0.5
        } else if load >= 0.7 {
            0.75
        } else {
            1.0
        };
        // may be zero when the global budget is spent; then everything drops
        let ceiling = (((self.max_grains as f32) * ceiling_factor) as usize)
            .max(1)
            .min(globals.voice_grain_ceiling);

        // rank and truncate when more triggers arrive than the ceiling admits
        self.ranked.clear();
        self.ranked.extend(
            descriptors
                .iter()
                .enumerate()
                .filter(|(_, descriptor)| descriptor.trigger)
                .map(|(index, descriptor)| (index, descriptor.priority)),
        );
        if self.ranked.len() > ceiling {
            self.ranked.sort_unstable_by(|a, b| b.1.total_cmp(&a.1));
            self.metrics.dropped_admission += (self.ranked.len() - ceiling) as u64;
            self.ranked.truncate(ceiling);
        }

        let ranked = std::mem::take(&mut self.ranked);
        for &(descriptor_index, _) in &ranked {
            let descriptor = &descriptors[descriptor_index];
            self.schedule_grain(backend, &sample, descriptor, globals, now);
        }
        self.ranked = ranked;
    }

    fn schedule_grain(
        &mut self,
        backend: &mut dyn AudioBackend,
        sample: &SampleBuffer,
        descriptor: &GrainDescriptor,
        globals: &GlobalParams,
        now: f64,
    ) {
        // rate limit: the voice's trigger rate is density grains per second, scaled by
        // the global multiplier and the descriptor's own rate multiplier
        let schedule_time = now + descriptor.delay as f64;
        let rate = self.density
            * globals.density_multiplier.max(0.01)
            * descriptor.rate_multiplier.max(0.01)
            * 10.0;
        let min_interval = 1.0 / rate as f64;
        if schedule_time - self.last_grain_time < min_interval {
            self.metrics.dropped_rate += 1;
            return;
        }

        // pool exhaustion drops the request silently: deliberate backpressure
        let Some(grain_id) = self.pool.acquire() else {
            self.metrics.dropped_pool += 1;
            log::debug!("Voice {}: grain pool exhausted", self.species.0);
            return;
        };

        let duration = (descriptor.duration * globals.size_multiplier).clamp(0.001, 2.0);
        let gain = (descriptor.gain * self.gain * globals.master_gain).clamp(0.0, 4.0);
        let pitch = descriptor.pitch.clamp(-self.pitch_range, self.pitch_range);
        let request = VoiceStart {
            buffer: sample,
            frame_offset: sample.frame_offset(descriptor.position),
            duration,
            playback_rate: playback_rate_from_pitch(pitch, descriptor.detune),
            pan: descriptor.pan.clamp(-1.0, 1.0),
            envelope: attack_hold_release(duration, self.fade_length, gain),
            delay: descriptor.delay,
        };

        match backend.start_voice(&request) {
            Ok(handle) => {
                self.pool
                    .start(grain_id, handle, schedule_time + duration as f64);
                self.last_grain_time = schedule_time;
                self.metrics.started += 1;
            }
            Err(err) => {
                // treated identically to resource exhaustion
                log::warn!("Voice {}: backend rejected grain start: {err}", self.species.0);
                self.pool.release(grain_id);
                self.metrics.backend_failures += 1;
            }
        }
    }

    fn drain_messages(&mut self, backend: &mut dyn AudioBackend) {
        let queue = Arc::clone(&self.message_queue);
        while let Some(message) = queue.pop() {
            match message {
                EngineMessage::LoadSample(sample) => self.load_sample(sample),
                EngineMessage::ClearSample => self.clear_sample(backend),
                EngineMessage::SetParameter { id, value } => self.apply_parameter(id, value),
                EngineMessage::StopAll => self.stop_all(backend),
            }
        }
    }

    /// Return every grain whose playback duration has elapsed to the pool. Grain
    /// completion is deferred work handled here, at the engine's own tick, so all pool
    /// mutation sites stay centralized.
    fn complete_elapsed_grains(&mut self, now: f64) {
        self.pool.release_elapsed(now);
    }
}

// -------------------------------------------------------------------------------------------------
