//! Bridges the irregular simulation clock into the fixed-rate audio control clock.
//!
//! The simulation side pushes a [`RegionSnapshot`] whenever a tick fires (anywhere
//! between 5 and 60 Hz, often jittery). The audio side pulls at a fixed rate and gets
//! back the freshest view the bridge can construct: the latest snapshot verbatim, a
//! linear interpolation between the two newest snapshots, or a short-horizon velocity
//! extrapolation once the simulation has stalled. A slow simulation must never stop
//! sound generation outright; prediction trades positional accuracy for continuity.

use crate::particle::RegionParticle;

// -------------------------------------------------------------------------------------------------

/// Default fixed audio control tick period (60 Hz).
pub const AUDIO_TICK_PERIOD: f64 = 1.0 / 60.0;

/// Elapsed time after which interpolation gives up and prediction takes over.
const PREDICTION_HORIZON: f64 = 0.2;

/// Velocity decay applied per prediction step to avoid runaway drift.
const PREDICTION_VELOCITY_DECAY: f32 = 0.99;

// -------------------------------------------------------------------------------------------------

/// Which strategy the bridge used to answer a pull.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::VariantNames)]
#[repr(u8)]
pub enum Regime {
    /// The latest snapshot was recent enough to return verbatim.
    Fresh,
    /// The two newest snapshots were linearly interpolated.
    Interpolated,
    /// The simulation stalled; positions are extrapolated from the latest snapshot.
    Predicted,
}

// -------------------------------------------------------------------------------------------------

/// Timestamped per-species particle membership produced by a sampling region.
#[derive(Debug, Clone, Default)]
pub struct RegionSnapshot {
    /// Simulation-side timestamp in seconds.
    pub time: f64,
    /// Region center in field units (used to derive angular motion when predicting).
    pub center: (f32, f32),
    /// Particles that passed the region query, split by species index.
    pub particles_by_species: Vec<Vec<RegionParticle>>,
}

impl RegionSnapshot {
    pub fn particle_count(&self) -> usize {
        self.particles_by_species.iter().map(Vec::len).sum()
    }
}

// -------------------------------------------------------------------------------------------------

/// Derived population statistics, recomputed once per new snapshot (or prediction
/// step) and shared read-only by all downstream consumers.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    /// Mean particle position.
    pub centroid: (f32, f32),
    /// Mean scalar speed.
    pub mean_speed: f32,
    /// Population share per species (sums to 1.0 when non-empty).
    pub species_ratios: Vec<f32>,
    /// Velocity standard deviation normalized by mean speed, clamped to 0..=1.
    /// 0.0 for an empty population or identical velocity vectors.
    pub chaos: f32,
    /// True once extrapolation is in effect.
    pub predicted: bool,
}

impl Statistics {
    fn compute(snapshot: &RegionSnapshot, predicted: bool) -> Self {
        let total: usize = snapshot.particle_count();
        let species_count = snapshot.particles_by_species.len();
        if total == 0 {
            return Self {
                species_ratios: vec![0.0; species_count],
                predicted,
                ..Default::default()
            };
        }
        let inv_total = 1.0 / total as f32;

        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_vx = 0.0;
        let mut sum_vy = 0.0;
        let mut sum_speed = 0.0;
        let mut species_ratios = Vec::with_capacity(species_count);
        for species in &snapshot.particles_by_species {
            species_ratios.push(species.len() as f32 * inv_total);
            for member in species {
                sum_x += member.particle.x;
                sum_y += member.particle.y;
                sum_vx += member.particle.vx;
                sum_vy += member.particle.vy;
                sum_speed += member.particle.speed();
            }
        }
        let mean_vx = sum_vx * inv_total;
        let mean_vy = sum_vy * inv_total;
        let mean_speed = sum_speed * inv_total;

        let mut velocity_variance = 0.0;
        for species in &snapshot.particles_by_species {
            for member in species {
                let dvx = member.particle.vx - mean_vx;
                let dvy = member.particle.vy - mean_vy;
                velocity_variance += dvx * dvx + dvy * dvy;
            }
        }
        velocity_variance *= inv_total;

        let chaos = if mean_speed > f32::EPSILON {
            (velocity_variance.sqrt() / mean_speed).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            centroid: (sum_x * inv_total, sum_y * inv_total),
            mean_speed,
            species_ratios,
            chaos,
            predicted,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A pulled frame: particle view, derived statistics and the regime that produced them.
#[derive(Debug)]
pub struct BridgeFrame<'a> {
    pub particles_by_species: &'a [Vec<RegionParticle>],
    pub statistics: &'a Statistics,
    pub regime: Regime,
}

// -------------------------------------------------------------------------------------------------

/// The clock-domain bridge itself.
///
/// Pushes and pulls run on the same logical thread and never interleave mid-operation,
/// but may occur in any order: the audio tick may run zero, one or several times
/// between simulation ticks, and vice versa.
pub struct ClockBridge {
    audio_tick_period: f64,
    /// Newest snapshot last. Only the last [`Self::HISTORY_CAPACITY`] are retained.
    history: Vec<RegionSnapshot>,
    /// Reused output buffer for interpolated and predicted views.
    working: RegionSnapshot,
    statistics: Statistics,
    regime: Regime,
    predicting: bool,
    last_pull_time: f64,
}

impl ClockBridge {
    const HISTORY_CAPACITY: usize = 4;

    pub fn new(species_count: usize) -> Self {
        Self::with_tick_period(species_count, AUDIO_TICK_PERIOD)
    }

    pub fn with_tick_period(species_count: usize, audio_tick_period: f64) -> Self {
        let empty = RegionSnapshot {
            time: f64::NEG_INFINITY,
            center: (0.0, 0.0),
            particles_by_species: vec![Vec::new(); species_count],
        };
        Self {
            audio_tick_period,
            history: Vec::with_capacity(Self::HISTORY_CAPACITY),
            working: empty,
            statistics: Statistics {
                species_ratios: vec![0.0; species_count],
                ..Default::default()
            },
            regime: Regime::Fresh,
            predicting: false,
            last_pull_time: f64::NEG_INFINITY,
        }
    }

    /// Regime selected by the most recent pull.
    #[inline]
    pub fn regime(&self) -> Regime {
        self.regime
    }

    /// Statistics derived by the most recent push or pull.
    #[inline]
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Record a new simulation-side snapshot. Snapshots older than the retained
    /// history window are discarded.
    pub fn push(&mut self, snapshot: RegionSnapshot) {
        self.statistics = Statistics::compute(&snapshot, false);
        if self.history.len() == Self::HISTORY_CAPACITY {
            self.history.remove(0);
        }
        self.history.push(snapshot);
        self.predicting = false;
    }

    /// Answer an audio-side pull at time `now`, selecting the regime from the elapsed
    /// time since the newest snapshot.
    pub fn pull(&mut self, now: f64) -> BridgeFrame<'_> {
        let regime = self.select_regime(now);
        match regime {
            Regime::Fresh => {
                if let Some(latest) = self.history.last() {
                    self.working.clone_from(latest);
                }
                self.statistics.predicted = false;
            }
            Regime::Interpolated => {
                self.interpolate(now);
                self.statistics = Statistics::compute(&self.working, false);
            }
            Regime::Predicted => {
                self.predict(now);
                self.statistics = Statistics::compute(&self.working, true);
            }
        }
        self.regime = regime;
        self.last_pull_time = now;
        BridgeFrame {
            particles_by_species: &self.working.particles_by_species,
            statistics: &self.statistics,
            regime,
        }
    }

    fn select_regime(&self, now: f64) -> Regime {
        let Some(latest) = self.history.last() else {
            return Regime::Fresh;
        };
        let elapsed = now - latest.time;
        if elapsed <= 2.0 * self.audio_tick_period {
            Regime::Fresh
        } else if elapsed <= PREDICTION_HORIZON && self.history.len() >= 2 {
            Regime::Interpolated
        } else if elapsed <= PREDICTION_HORIZON {
            // a single stale snapshot cannot interpolate; keep returning it verbatim
            Regime::Fresh
        } else {
            Regime::Predicted
        }
    }

    /// Linearly interpolate the two newest snapshots. Pulls render one simulation tick
    /// behind: `t` measures the elapsed time since the newest snapshot against the
    /// inter-snapshot interval. Species rows with mismatched particle counts
    /// interpolate over the index overlap only; the remainder is dropped.
    fn interpolate(&mut self, now: f64) {
        let [.., older, newer] = &self.history[..] else {
            // regime selection requires two snapshots before picking interpolation
            unreachable!("interpolation needs at least two snapshots");
        };
        let interval = newer.time - older.time;
        let t = if interval > 0.0 {
            (((now - newer.time) / interval).clamp(0.0, 1.0)) as f32
        } else {
            1.0
        };

        self.working.time = now;
        self.working.center = newer.center;
        self.working
            .particles_by_species
            .resize(newer.particles_by_species.len(), Vec::new());
        for (species_index, target) in self.working.particles_by_species.iter_mut().enumerate() {
            target.clear();
            let to = &newer.particles_by_species[species_index];
            let Some(from) = older.particles_by_species.get(species_index) else {
                continue;
            };
            let overlap = from.len().min(to.len());
            for member_index in 0..overlap {
                target.push(from[member_index].lerp(&to[member_index], t));
            }
        }
    }

    /// Extrapolate the working set forward from the latest snapshot, decaying
    /// velocities each step and advancing angular position proportionally to lateral
    /// velocity to approximate orbital motion around the region center.
    fn predict(&mut self, now: f64) {
        let Some(latest) = self.history.last() else {
            return;
        };
        let dt = if self.predicting {
            (now - self.last_pull_time).clamp(0.0, 4.0 * self.audio_tick_period) as f32
        } else {
            self.working.clone_from(latest);
            self.predicting = true;
            (now - latest.time).min(PREDICTION_HORIZON * 2.0) as f32
        };
        self.working.time = now;

        let (center_x, center_y) = self.working.center;
        for species in &mut self.working.particles_by_species {
            for member in species.iter_mut() {
                let particle = &mut member.particle;
                particle.x += particle.vx * dt;
                particle.y += particle.vy * dt;
                particle.vx *= PREDICTION_VELOCITY_DECAY;
                particle.vy *= PREDICTION_VELOCITY_DECAY;

                // advance angular position proportionally to lateral velocity
                let dx = particle.x - center_x;
                let dy = particle.y - center_y;
                let distance = (dx * dx + dy * dy).sqrt();
                if distance > f32::EPSILON {
                    let (radial_x, radial_y) = (dx / distance, dy / distance);
                    let lateral = particle.vy * radial_x - particle.vx * radial_y;
                    let angle = dy.atan2(dx) + lateral / distance * dt;
                    particle.x = center_x + distance * angle.cos();
                    particle.y = center_y + distance * angle.sin();
                    member.angle = angle;
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{Particle, SpeciesId};
    use crate::utils::assert_eq_with_epsilon;

    fn region_particle(x: f32, y: f32, vx: f32, vy: f32) -> RegionParticle {
        RegionParticle {
            particle: Particle::new(x, y, vx, vy, SpeciesId(0)),
            normalized_distance: 0.0,
            angle: 0.0,
            zone: 0,
        }
    }

    fn snapshot(time: f64, members: Vec<RegionParticle>) -> RegionSnapshot {
        RegionSnapshot {
            time,
            center: (0.0, 0.0),
            particles_by_species: vec![members],
        }
    }

    #[test]
    fn fresh_regime_returns_latest_verbatim() {
        let mut bridge = ClockBridge::new(1);
        bridge.push(snapshot(0.0, vec![region_particle(1.0, 2.0, 0.0, 0.0)]));
        let frame = bridge.pull(0.016);
        assert_eq!(frame.regime, Regime::Fresh);
        assert_eq!(frame.particles_by_species[0][0].particle.x, 1.0);
        assert!(!frame.statistics.predicted);
    }

    #[test]
    fn interpolation_exactness() {
        let mut bridge = ClockBridge::new(1);
        bridge.push(snapshot(0.0, vec![region_particle(0.0, 0.0, 0.0, 0.0)]));
        bridge.push(snapshot(0.1, vec![region_particle(10.0, 0.0, 0.0, 0.0)]));

        // 50 ms past the newest snapshot: halfway through the 100 ms interval
        let frame = bridge.pull(0.15);
        assert_eq!(frame.regime, Regime::Interpolated);
        let particle = frame.particles_by_species[0][0].particle;
        assert_eq_with_epsilon!(particle.x, 5.0, 1e-6);
        assert_eq_with_epsilon!(particle.y, 0.0, 1e-6);
    }

    #[test]
    fn interpolation_drops_count_mismatch_remainder() {
        let mut bridge = ClockBridge::new(1);
        bridge.push(snapshot(
            0.0,
            vec![
                region_particle(0.0, 0.0, 0.0, 0.0),
                region_particle(5.0, 5.0, 0.0, 0.0),
            ],
        ));
        bridge.push(snapshot(0.1, vec![region_particle(10.0, 0.0, 0.0, 0.0)]));
        let frame = bridge.pull(0.15);
        assert_eq!(frame.regime, Regime::Interpolated);
        assert_eq!(frame.particles_by_species[0].len(), 1);
    }

    #[test]
    fn prediction_keeps_stationary_particles_in_place() {
        let mut bridge = ClockBridge::new(1);
        bridge.push(snapshot(0.0, vec![region_particle(3.0, 4.0, 0.0, 0.0)]));

        let frame = bridge.pull(0.3);
        assert_eq!(frame.regime, Regime::Predicted);
        let particle = frame.particles_by_species[0][0].particle;
        assert_eq!((particle.x, particle.y), (3.0, 4.0));
        assert!(frame.statistics.predicted);
    }

    #[test]
    fn prediction_decays_velocity_each_step() {
        let mut bridge = ClockBridge::new(1);
        bridge.push(snapshot(0.0, vec![region_particle(0.0, 10.0, 1.0, 0.0)]));

        let first = bridge.pull(0.3);
        let vx_after_first = first.particles_by_species[0][0].particle.vx;
        assert!(vx_after_first < 1.0);
        let second = bridge.pull(0.32);
        let vx_after_second = second.particles_by_species[0][0].particle.vx;
        assert!(vx_after_second < vx_after_first);
    }

    #[test]
    fn chaos_is_zero_for_identical_velocities() {
        let mut bridge = ClockBridge::new(1);
        let members = (0..8).map(|i| region_particle(i as f32, 0.0, 2.0, 1.0)).collect();
        bridge.push(snapshot(0.0, members));
        assert_eq!(bridge.statistics().chaos, 0.0);
    }

    #[test]
    fn chaos_is_bounded_for_opposing_velocities() {
        let mut bridge = ClockBridge::new(1);
        let members = vec![
            region_particle(0.0, 0.0, 1.0, 0.0),
            region_particle(1.0, 0.0, -1.0, 0.0),
            region_particle(2.0, 0.0, 0.0, 1.0),
            region_particle(3.0, 0.0, 0.0, -1.0),
        ];
        bridge.push(snapshot(0.0, members));
        let chaos = bridge.statistics().chaos;
        assert!(chaos > 0.0);
        assert!(chaos <= 1.0);
    }

    #[test]
    fn empty_history_pull_is_a_noop() {
        let mut bridge = ClockBridge::new(2);
        let frame = bridge.pull(1.0);
        assert_eq!(frame.regime, Regime::Fresh);
        assert_eq!(frame.particles_by_species.len(), 2);
        assert!(frame.particles_by_species.iter().all(Vec::is_empty));
        assert_eq!(frame.statistics.chaos, 0.0);
    }

    #[test]
    fn history_is_bounded() {
        let mut bridge = ClockBridge::new(1);
        for i in 0..10 {
            bridge.push(snapshot(i as f64 * 0.02, vec![region_particle(i as f32, 0.0, 0.0, 0.0)]));
        }
        assert!(bridge.history.len() <= 4);
        assert_eq!(bridge.history.last().unwrap().particles_by_species[0][0].particle.x, 9.0);
    }
}
