//! Top-level wiring: region, bridge, organizer and per-species voices, driven by the
//! two external clocks.
//!
//! The orchestrator exposes exactly two entry points to the outside world:
//! [`Orchestrator::on_simulation_tick`] on the simulation clock and
//! [`Orchestrator::on_audio_tick`] on the audio clock. Everything in between (spatial
//! indexing, sampling, clock bridging, grain organization, admission) happens inside
//! those two calls, so the host never needs to know the pipeline's internals.

use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    backend::{AudioBackend, SampleBuffer},
    bridge::{ClockBridge, Regime},
    config::{Config, GlobalsConfig, OrganizerConfig, VoiceConfig},
    engine::{EngineMetrics, GlobalParams, GrainEngine},
    organizer::{self, GrainDescriptor, OrganizeContext, OrganizerMode, OrganizerParams},
    particle::{Particle, SpeciesId},
    region::{RegionOptions, SamplingRegion},
    spatial::PerformanceMode,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// The complete synthesis core for one particle field.
pub struct Orchestrator {
    region: SamplingRegion,
    bridge: ClockBridge,
    engines: Vec<GrainEngine>,
    organizer_mode: OrganizerMode,
    organizer_params: OrganizerParams,
    globals: GlobalsConfig,
    field: (f32, f32),
    rng: SmallRng,
    // scratch, reused across audio ticks
    descriptors: Vec<GrainDescriptor>,
    sanitized: Vec<Particle>,
}

impl Orchestrator {
    /// Create a core for a `field`-sized simulation with `species_count` voices. No
    /// voice makes sound until a sample buffer is loaded for it.
    pub fn new(field: (f32, f32), species_count: usize) -> Self {
        Self::with_rng(field, species_count, SmallRng::from_os_rng())
    }

    /// Create a core with a caller-provided random generator, for reproducible runs.
    pub fn with_rng(field: (f32, f32), species_count: usize, rng: SmallRng) -> Self {
        debug_assert!(species_count > 0, "Need at least one species voice");
        Self {
            region: SamplingRegion::new(RegionOptions::default(), field, species_count),
            bridge: ClockBridge::new(species_count),
            engines: (0..species_count)
                .map(|index| GrainEngine::new(SpeciesId(index)))
                .collect(),
            organizer_mode: OrganizerMode::default(),
            organizer_params: OrganizerParams::default(),
            globals: GlobalsConfig::default(),
            field,
            rng,
            descriptors: Vec::new(),
            sanitized: Vec::new(),
        }
    }

    #[inline]
    pub fn species_count(&self) -> usize {
        self.engines.len()
    }

    #[inline]
    pub fn organizer_mode(&self) -> OrganizerMode {
        self.organizer_mode
    }

    pub fn set_organizer_mode(&mut self, mode: OrganizerMode) {
        self.organizer_mode = mode;
    }

    pub fn set_organizer_params(&mut self, params: OrganizerParams) {
        self.organizer_params = params.clamped();
    }

    #[inline]
    pub fn region_options(&self) -> &RegionOptions {
        self.region.options()
    }

    pub fn set_region_options(&mut self, options: RegionOptions) {
        self.region.set_options(options);
    }

    pub fn set_globals(&mut self, globals: GlobalsConfig) {
        self.globals = globals.clamped();
    }

    /// Staleness regime the bridge used for the most recent audio tick.
    #[inline]
    pub fn regime(&self) -> Regime {
        self.bridge.regime()
    }

    /// Load-shedding tier the sampler chose during the most recent simulation tick.
    #[inline]
    pub fn performance_mode(&self) -> PerformanceMode {
        self.region.performance_mode()
    }

    // ---------------------------------------------------------------------------------------------
    // voice management

    fn engine_mut(&mut self, species: SpeciesId) -> Result<&mut GrainEngine, Error> {
        self.engines
            .get_mut(species.0)
            .ok_or(Error::VoiceNotFoundError(species.0))
    }

    /// Swap in a source sample for one voice.
    pub fn load_sample(&mut self, species: SpeciesId, sample: SampleBuffer) -> Result<(), Error> {
        self.engine_mut(species)?.load_sample(sample);
        Ok(())
    }

    /// Remove a voice's sample and stop its active grains immediately.
    pub fn clear_sample(
        &mut self,
        species: SpeciesId,
        backend: &mut dyn AudioBackend,
    ) -> Result<(), Error> {
        self.engine_mut(species)?.clear_sample(backend);
        Ok(())
    }

    /// Set a per-voice tunable by name, clamping the value silently.
    pub fn set_voice_parameter(
        &mut self,
        species: SpeciesId,
        name: &str,
        value: f32,
    ) -> Result<(), Error> {
        self.engine_mut(species)?.set_parameter(name, value)
    }

    /// Stop all grains on all voices, keeping samples loaded.
    pub fn stop_all(&mut self, backend: &mut dyn AudioBackend) {
        for engine in &mut self.engines {
            engine.stop_all(backend);
        }
    }

    /// Per-voice load metrics, index-aligned with the species ids.
    pub fn metrics(&self) -> Vec<EngineMetrics> {
        self.engines.iter().map(GrainEngine::metrics).collect()
    }

    // ---------------------------------------------------------------------------------------------
    // clock entry points

    /// Feed one simulation frame. Particles with non-finite or negative fields are
    /// repaired, not rejected. `now` is the simulation-side timestamp in seconds.
    pub fn on_simulation_tick(&mut self, particles: &[Particle], now: f64) {
        self.sanitized.clear();
        self.sanitized
            .extend(particles.iter().copied().map(Particle::sanitized));
        let snapshot = self.region.ingest(&self.sanitized, now);
        self.bridge.push(snapshot);
    }

    /// Run one audio tick: pull a bridge frame, organize every species row and let
    /// each voice schedule its grains. `now` is the audio-side timestamp in seconds.
    pub fn on_audio_tick(&mut self, backend: &mut dyn AudioBackend, now: f64) {
        let frame = self.bridge.pull(now);

        let mut active_total: usize = self
            .engines
            .iter()
            .map(|engine| engine.metrics().active_grains)
            .sum();

        for (species_index, engine) in self.engines.iter_mut().enumerate() {
            let members = frame
                .particles_by_species
                .get(species_index)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let context = OrganizeContext {
                members,
                statistics: frame.statistics,
                field: self.field,
                now,
            };
            organizer::organize(
                &context,
                self.organizer_mode,
                &self.organizer_params,
                &mut self.rng,
                &mut self.descriptors,
            );

            // each voice gets whatever is left of the global concurrency budget
            let remaining = self.globals.max_total_grains.saturating_sub(active_total);
            let globals = GlobalParams {
                master_gain: self.globals.master_gain,
                density_multiplier: self.globals.density_multiplier,
                size_multiplier: self.globals.size_multiplier,
                voice_grain_ceiling: remaining,
            };
            let active_before = engine.metrics().active_grains;
            engine.process(backend, &self.descriptors, &globals, now);
            let active_after = engine.metrics().active_grains;
            active_total = active_total + active_after - active_before.min(active_after);
        }
    }

    // ---------------------------------------------------------------------------------------------
    // configuration

    /// Snapshot the current configuration tree.
    pub fn config(&self) -> Config {
        Config {
            region: *self.region.options(),
            organizer: OrganizerConfig {
                mode: self.organizer_mode,
                params: self.organizer_params.clone(),
            },
            voices: self
                .engines
                .iter()
                .map(|engine| VoiceConfig {
                    density: engine.density(),
                    max_grains: engine.max_grains() as i32,
                    fade_length: engine.fade_length(),
                    pitch_range: engine.pitch_range(),
                    gain: engine.gain(),
                })
                .collect(),
            globals: self.globals,
        }
    }

    /// Apply a configuration tree. Out-of-range leaves clamp silently; voice entries
    /// beyond the species count are ignored, missing ones keep their current values.
    pub fn apply_config(&mut self, config: Config) {
        let config = config.clamped();
        self.region.set_options(config.region);
        self.organizer_mode = config.organizer.mode;
        self.organizer_params = config.organizer.params;
        self.globals = config.globals;
        for (engine, voice) in self.engines.iter_mut().zip(&config.voices) {
            engine.apply_parameter(GrainEngine::DENSITY.id(), voice.density);
            engine.apply_parameter(GrainEngine::MAX_GRAINS.id(), voice.max_grains as f32);
            engine.apply_parameter(GrainEngine::FADE_LENGTH.id(), voice.fade_length);
            engine.apply_parameter(GrainEngine::PITCH_RANGE.id(), voice.pitch_range);
            engine.apply_parameter(GrainEngine::GAIN.id(), voice.gain);
        }
    }
}

// -------------------------------------------------------------------------------------------------
