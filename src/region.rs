//! Circular sampling region: filters the full particle population down to the bounded
//! working set the audio system may "hear".

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::{
    bridge::RegionSnapshot,
    particle::{Particle, RegionParticle},
    spatial::{AdaptiveSampler, PerformanceMode, SamplerOptions, SpatialGrid},
};

// -------------------------------------------------------------------------------------------------

/// Mutable sampling region geometry. Center coordinates are normalized to the field
/// size; radius is in field units. Out-of-range values clamp silently on application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionOptions {
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
    /// Hard cap on the number of particles a query may return.
    pub max_particles: usize,
    /// Number of discrete angular zones (used by the zoned organizer mode).
    pub zone_count: usize,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            center_x: 0.5,
            center_y: 0.5,
            radius: 150.0,
            max_particles: 128,
            zone_count: 6,
        }
    }
}

impl RegionOptions {
    /// Clamp all values into their valid domain. Never rejects.
    pub fn clamped(mut self) -> Self {
        self.center_x = if self.center_x.is_finite() {
            self.center_x.clamp(0.0, 1.0)
        } else {
            0.5
        };
        self.center_y = if self.center_y.is_finite() {
            self.center_y.clamp(0.0, 1.0)
        } else {
            0.5
        };
        self.radius = if self.radius.is_finite() {
            self.radius.max(1.0)
        } else {
            Self::default().radius
        };
        self.max_particles = self.max_particles.max(1);
        self.zone_count = self.zone_count.clamp(1, 64);
        self
    }
}

// -------------------------------------------------------------------------------------------------

/// A circular membership filter over the particle field.
///
/// Owns the spatial grid and the adaptive sampler; one `ingest` call per simulation
/// tick rebuilds the index, queries the circle, down-samples to the cap and enriches
/// every kept particle with region-relative geometry.
pub struct SamplingRegion {
    options: RegionOptions,
    field: (f32, f32),
    species_count: usize,
    grid: SpatialGrid,
    sampler: AdaptiveSampler,
    // scratch buffers, reused across ticks
    matches: Vec<crate::spatial::CircleMatch>,
    sampled: Vec<crate::spatial::CircleMatch>,
}

impl SamplingRegion {
    pub fn new(options: RegionOptions, field: (f32, f32), species_count: usize) -> Self {
        let options = options.clamped();
        let sampler_options = SamplerOptions {
            target_sample_size: options.max_particles,
            ..Default::default()
        };
        Self {
            options,
            field,
            species_count,
            grid: SpatialGrid::default(),
            sampler: AdaptiveSampler::new(sampler_options),
            matches: Vec::new(),
            sampled: Vec::new(),
        }
    }

    #[inline]
    pub fn options(&self) -> &RegionOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: RegionOptions) {
        self.options = options.clamped();
        let mut sampler_options = *self.sampler.options();
        sampler_options.target_sample_size = self.options.max_particles;
        self.sampler.set_options(sampler_options);
    }

    /// Region center in field units.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (
            self.options.center_x * self.field.0,
            self.options.center_y * self.field.1,
        )
    }

    /// Performance tier the sampler derived during the last ingest.
    #[inline]
    pub fn performance_mode(&self) -> PerformanceMode {
        self.sampler.performance_mode()
    }

    /// Local grid density around a field position (particles in the containing cell).
    #[inline]
    pub fn local_density(&self, x: f32, y: f32) -> usize {
        self.grid.local_density(x, y)
    }

    /// Process one simulation tick: returns the enriched per-species membership as a
    /// timestamped snapshot, ready to push into the clock bridge.
    pub fn ingest(&mut self, particles: &[Particle], now: f64) -> RegionSnapshot {
        self.grid.rebuild(particles);

        let (center_x, center_y) = self.center();
        self.grid.query_circle(
            particles,
            center_x,
            center_y,
            self.options.radius,
            &mut self.matches,
        );

        self.sampler.sample(
            particles,
            &self.matches,
            &self.grid,
            self.field,
            now,
            &mut self.sampled,
        );
        self.sampled.truncate(self.options.max_particles);

        let mut particles_by_species: Vec<Vec<RegionParticle>> =
            vec![Vec::new(); self.species_count];
        for kept in &self.sampled {
            let particle = particles[kept.index];
            let species_index = particle.species.0;
            if species_index >= self.species_count {
                continue;
            }
            let angle = (particle.y - center_y).atan2(particle.x - center_x);
            let zone_fraction = (angle + std::f32::consts::PI) / TAU;
            let zone = ((zone_fraction * self.options.zone_count as f32) as usize)
                .min(self.options.zone_count - 1);
            particles_by_species[species_index].push(RegionParticle {
                particle,
                normalized_distance: kept.normalized_distance,
                angle,
                zone,
            });
        }

        RegionSnapshot {
            time: now,
            center: (center_x, center_y),
            particles_by_species,
        }
    }
}

// -------------------------------------------------------------------------------------------------
