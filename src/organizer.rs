//! Strategy layer that turns a particle collection into grain trigger decisions.
//!
//! The organizer is a pure transform: it never owns state, never touches the grain
//! pool and never talks to the audio backend. Eight alternative strategies share one
//! dispatcher and a couple of common helpers (clustering, velocity→duration mapping)
//! instead of eight independent code paths.

use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::{bridge::Statistics, particle::RegionParticle};

mod modes;

// -------------------------------------------------------------------------------------------------

/// One grain trigger decision. `position` is normalized into the voice's source
/// buffer; `pitch` is in semitones, `detune` in cents, `delay` is a timing jitter in
/// seconds applied before the grain starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainDescriptor {
    /// Whether this particle should produce a grain at all this pass.
    pub trigger: bool,
    pub delay: f32,
    pub position: f32,
    pub pitch: f32,
    pub detune: f32,
    pub pan: f32,
    pub gain: f32,
    /// Grain duration in seconds (10 ms .. 500 ms domain).
    pub duration: f32,
    /// Per-descriptor scale on the voice's trigger rate limit.
    pub rate_multiplier: f32,
    /// Ranking score consumed by the engine's admission control.
    pub priority: f32,
}

impl Default for GrainDescriptor {
    fn default() -> Self {
        Self {
            trigger: false,
            delay: 0.0,
            position: 0.0,
            pitch: 0.0,
            detune: 0.0,
            pan: 0.0,
            gain: 0.0,
            duration: MIN_GRAIN_DURATION,
            rate_multiplier: 1.0,
            priority: 0.0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Organization strategy selector.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum OrganizerMode {
    /// One grain per particle, parameters mapped directly from particle state.
    #[default]
    Direct,
    /// Particles cluster by distance; each cluster plays as one louder, longer event.
    ClusteredAmplitude,
    /// Local particle density modulates grain duration, rate and overlap.
    DensityModulation,
    /// Boid-style alignment/cohesion/separation scoring gates the triggers.
    SwarmIntelligence,
    /// Vertical position selects a harmonic ratio; only active ratios sound.
    HarmonicLayers,
    /// Probabilistic triggers quantized to a BPM-derived grid with accents.
    RhythmicPatterns,
    /// The region's angular zones shift pitch and trigger rate.
    SpatialZones,
    /// Population chaos modulates timing, pitch, pan and detune jitter.
    ChaosModulation,
}

// -------------------------------------------------------------------------------------------------

/// Response curve for chaos-modulated jitter.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum ChaosCurve {
    #[default]
    Linear,
    Exponential,
    Logarithmic,
}

impl ChaosCurve {
    /// Map a chaos index (0..=1) through the configured response curve.
    #[inline]
    pub fn apply(&self, chaos: f32) -> f32 {
        let chaos = chaos.clamp(0.0, 1.0);
        match self {
            Self::Linear => chaos,
            Self::Exponential => chaos * chaos,
            Self::Logarithmic => (1.0 + 9.0 * chaos).log10(),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Per-mode configuration bag. Mutated only by configuration load; read-only during a
/// processing pass. Out-of-range values clamp silently via [`Self::clamped`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizerParams {
    // clustered amplitude
    pub cluster_distance: f32,
    pub min_cluster_size: usize,
    pub max_cluster_voices: usize,

    // density modulation
    pub density_cell_size: f32,
    pub density_overlap: f32,

    // swarm intelligence
    pub swarm_neighbor_radius: f32,
    pub swarm_alignment_weight: f32,
    pub swarm_cohesion_weight: f32,
    pub swarm_separation_weight: f32,
    pub swarm_trigger_threshold: f32,

    // harmonic layers
    pub harmonic_ratios: Vec<f32>,
    pub harmonic_active: Vec<bool>,

    // rhythmic patterns
    pub rhythm_bpm: f32,
    pub rhythm_subdivision: u32,
    pub rhythm_accents: Vec<u32>,
    pub rhythm_gate_width: f32,

    // spatial zones
    pub zone_pitch_step: f32,
    pub zone_rate_spread: f32,

    // chaos modulation
    pub chaos_threshold: f32,
    pub chaos_curve: ChaosCurve,
    pub chaos_speed_gate: f32,
    pub chaos_delay_jitter: f32,
    pub chaos_pitch_jitter: f32,
    pub chaos_pan_jitter: f32,
    pub chaos_detune_cents: f32,
}

impl Default for OrganizerParams {
    fn default() -> Self {
        Self {
            cluster_distance: 40.0,
            min_cluster_size: 3,
            max_cluster_voices: 8,

            density_cell_size: 50.0,
            density_overlap: 0.5,

            swarm_neighbor_radius: 50.0,
            swarm_alignment_weight: 0.4,
            swarm_cohesion_weight: 0.3,
            swarm_separation_weight: 0.3,
            swarm_trigger_threshold: 0.3,

            harmonic_ratios: vec![1.0, 1.25, 1.5, 2.0, 2.5, 3.0],
            harmonic_active: vec![true, false, true, true, false, true],

            rhythm_bpm: 120.0,
            rhythm_subdivision: 4,
            rhythm_accents: vec![0, 8],
            rhythm_gate_width: 0.25,

            zone_pitch_step: 2.0,
            zone_rate_spread: 0.5,

            chaos_threshold: 0.5,
            chaos_curve: ChaosCurve::Linear,
            chaos_speed_gate: 5.0,
            chaos_delay_jitter: 0.05,
            chaos_pitch_jitter: 3.0,
            chaos_pan_jitter: 0.5,
            chaos_detune_cents: 30.0,
        }
    }
}

impl OrganizerParams {
    /// Clamp all values into their valid domains. Never rejects.
    pub fn clamped(mut self) -> Self {
        let defaults = Self::default();
        self.cluster_distance = sane_positive(self.cluster_distance, defaults.cluster_distance);
        self.min_cluster_size = self.min_cluster_size.max(1);
        self.max_cluster_voices = self.max_cluster_voices.clamp(1, 8);
        self.density_cell_size = sane_positive(self.density_cell_size, defaults.density_cell_size);
        self.density_overlap = sane_unit(self.density_overlap);
        self.swarm_neighbor_radius =
            sane_positive(self.swarm_neighbor_radius, defaults.swarm_neighbor_radius);
        self.swarm_alignment_weight = sane_unit(self.swarm_alignment_weight);
        self.swarm_cohesion_weight = sane_unit(self.swarm_cohesion_weight);
        self.swarm_separation_weight = sane_unit(self.swarm_separation_weight);
        self.swarm_trigger_threshold = sane_unit(self.swarm_trigger_threshold);
        if self.harmonic_ratios.is_empty() {
            self.harmonic_ratios = defaults.harmonic_ratios;
        }
        self.harmonic_ratios
            .iter_mut()
            .for_each(|ratio| *ratio = sane_positive(*ratio, 1.0));
        self.harmonic_active.resize(self.harmonic_ratios.len(), true);
        self.rhythm_bpm = if self.rhythm_bpm.is_finite() {
            self.rhythm_bpm.clamp(20.0, 300.0)
        } else {
            defaults.rhythm_bpm
        };
        self.rhythm_subdivision = self.rhythm_subdivision.clamp(1, 16);
        self.rhythm_gate_width = sane_unit(self.rhythm_gate_width);
        self.zone_pitch_step = if self.zone_pitch_step.is_finite() {
            self.zone_pitch_step.clamp(-12.0, 12.0)
        } else {
            defaults.zone_pitch_step
        };
        self.zone_rate_spread = sane_unit(self.zone_rate_spread);
        self.chaos_threshold = sane_unit(self.chaos_threshold);
        self.chaos_speed_gate = sane_positive(self.chaos_speed_gate, defaults.chaos_speed_gate);
        self.chaos_delay_jitter = sane_unit(self.chaos_delay_jitter);
        self.chaos_pitch_jitter = if self.chaos_pitch_jitter.is_finite() {
            self.chaos_pitch_jitter.clamp(0.0, 12.0)
        } else {
            defaults.chaos_pitch_jitter
        };
        self.chaos_pan_jitter = sane_unit(self.chaos_pan_jitter);
        self.chaos_detune_cents = if self.chaos_detune_cents.is_finite() {
            self.chaos_detune_cents.clamp(0.0, 100.0)
        } else {
            defaults.chaos_detune_cents
        };
        self
    }
}

fn sane_positive(value: f32, default: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        default
    }
}

fn sane_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// -------------------------------------------------------------------------------------------------

pub const MIN_GRAIN_DURATION: f32 = 0.010;
pub const MAX_GRAIN_DURATION: f32 = 0.500;

/// Shared velocity→duration helper: linear interpolation between the 10 ms floor and
/// the 500 ms ceiling over a 0..=10 speed range.
#[inline]
pub fn duration_from_speed(speed: f32) -> f32 {
    let t = (speed / 10.0).clamp(0.0, 1.0);
    crate::utils::lerp(MIN_GRAIN_DURATION, MAX_GRAIN_DURATION, t)
}

/// Admission-ranking score: speed-weighted, variance-from-centroid-weighted,
/// size-weighted, plus a small jitter term so ties don't starve.
#[inline]
fn priority_score(
    member: &RegionParticle,
    statistics: &Statistics,
    rng: &mut SmallRng,
) -> f32 {
    use rand::Rng;
    let particle = &member.particle;
    let speed = (particle.speed() / 10.0).min(1.0);
    let (centroid_x, centroid_y) = statistics.centroid;
    let spread = (particle.distance_squared(centroid_x, centroid_y).sqrt() / 100.0).min(1.0);
    let size = (particle.size / 10.0).min(1.0);
    0.4 * speed + 0.3 * spread + 0.2 * size + 0.1 * rng.random::<f32>()
}

// -------------------------------------------------------------------------------------------------

/// Everything a single organize pass needs to see, bundled to keep the mode
/// signatures flat.
pub struct OrganizeContext<'a> {
    /// One species row from a pulled bridge frame.
    pub members: &'a [RegionParticle],
    pub statistics: &'a Statistics,
    /// Simulation field size `(width, height)` in field units.
    pub field: (f32, f32),
    /// Audio-side time of this pass, in seconds.
    pub now: f64,
}

/// Run the selected strategy over one species row, appending one descriptor per
/// particle (or per cluster voice) to `out`. Descriptors with `trigger == false` are
/// kept so callers can observe the decision; the engine skips them.
pub fn organize(
    context: &OrganizeContext,
    mode: OrganizerMode,
    params: &OrganizerParams,
    rng: &mut SmallRng,
    out: &mut Vec<GrainDescriptor>,
) {
    out.clear();
    if context.members.is_empty() {
        return;
    }
    match mode {
        OrganizerMode::Direct => modes::direct(context, rng, out),
        OrganizerMode::ClusteredAmplitude => modes::clustered_amplitude(context, params, rng, out),
        OrganizerMode::DensityModulation => modes::density_modulation(context, params, rng, out),
        OrganizerMode::SwarmIntelligence => modes::swarm_intelligence(context, params, rng, out),
        OrganizerMode::HarmonicLayers => modes::harmonic_layers(context, params, rng, out),
        OrganizerMode::RhythmicPatterns => modes::rhythmic_patterns(context, params, rng, out),
        OrganizerMode::SpatialZones => modes::spatial_zones(context, params, rng, out),
        OrganizerMode::ChaosModulation => modes::chaos_modulation(context, params, rng, out),
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::particle::{Particle, SpeciesId};
    use strum::VariantNames;

    pub(super) fn member_at(x: f32, y: f32, vx: f32, vy: f32) -> RegionParticle {
        RegionParticle {
            particle: Particle::new(x, y, vx, vy, SpeciesId(0)),
            normalized_distance: 0.5,
            angle: 0.0,
            zone: 0,
        }
    }

    pub(super) fn test_statistics(members: &[RegionParticle]) -> Statistics {
        let mut bridge = crate::bridge::ClockBridge::new(1);
        bridge.push(crate::bridge::RegionSnapshot {
            time: 0.0,
            center: (400.0, 300.0),
            particles_by_species: vec![members.to_vec()],
        });
        bridge.statistics().clone()
    }

    #[test]
    fn duration_mapping_endpoints() {
        assert_eq!(duration_from_speed(0.0), MIN_GRAIN_DURATION);
        assert_eq!(duration_from_speed(10.0), MAX_GRAIN_DURATION);
        assert_eq!(duration_from_speed(100.0), MAX_GRAIN_DURATION);
        let mid = duration_from_speed(5.0);
        assert!(mid > MIN_GRAIN_DURATION && mid < MAX_GRAIN_DURATION);
    }

    #[test]
    fn chaos_curves_are_monotonic_and_bounded() {
        for curve in [ChaosCurve::Linear, ChaosCurve::Exponential, ChaosCurve::Logarithmic] {
            let mut previous = -1.0f32;
            for step in 0..=10 {
                let value = curve.apply(step as f32 / 10.0);
                assert!((0.0..=1.0 + 1e-6).contains(&value));
                assert!(value >= previous);
                previous = value;
            }
            assert_eq!(curve.apply(0.0), 0.0);
        }
    }

    #[test]
    fn every_mode_produces_valid_descriptors() {
        let members: Vec<RegionParticle> = (0..24)
            .map(|i| {
                member_at(
                    (i * 30) as f32 % 800.0,
                    (i * 23) as f32 % 600.0,
                    (i % 7) as f32 - 3.0,
                    (i % 5) as f32 - 2.0,
                )
            })
            .collect();
        let statistics = test_statistics(&members);
        let context = OrganizeContext {
            members: &members,
            statistics: &statistics,
            field: (800.0, 600.0),
            now: 1.0,
        };
        let params = OrganizerParams::default();
        let mut rng = SmallRng::seed_from_u64(11);
        let mut out = Vec::new();

        use std::str::FromStr;
        for mode_name in OrganizerMode::VARIANTS {
            let mode = OrganizerMode::from_str(mode_name).unwrap();
            organize(&context, mode, &params, &mut rng, &mut out);
            for descriptor in &out {
                assert!((0.0..=1.0).contains(&descriptor.position), "{mode}");
                assert!((-1.0..=1.0).contains(&descriptor.pan), "{mode}");
                assert!(descriptor.gain >= 0.0 && descriptor.gain <= 2.0, "{mode}");
                assert!(
                    descriptor.duration >= MIN_GRAIN_DURATION
                        && descriptor.duration <= 2.0 * MAX_GRAIN_DURATION,
                    "{mode}"
                );
                assert!(descriptor.delay >= 0.0, "{mode}");
            }
        }
    }

    #[test]
    fn empty_row_is_a_noop() {
        let statistics = Statistics::default();
        let context = OrganizeContext {
            members: &[],
            statistics: &statistics,
            field: (800.0, 600.0),
            now: 0.0,
        };
        let mut rng = SmallRng::seed_from_u64(0);
        let mut out = vec![GrainDescriptor::default()];
        organize(
            &context,
            OrganizerMode::Direct,
            &OrganizerParams::default(),
            &mut rng,
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn params_clamp_silently() {
        let params = OrganizerParams {
            cluster_distance: -5.0,
            max_cluster_voices: 100,
            rhythm_bpm: f32::NAN,
            harmonic_ratios: vec![],
            chaos_threshold: 3.0,
            ..Default::default()
        }
        .clamped();
        assert!(params.cluster_distance > 0.0);
        assert_eq!(params.max_cluster_voices, 8);
        assert_eq!(params.rhythm_bpm, OrganizerParams::default().rhythm_bpm);
        assert!(!params.harmonic_ratios.is_empty());
        assert_eq!(params.harmonic_active.len(), params.harmonic_ratios.len());
        assert_eq!(params.chaos_threshold, 1.0);
    }
}
