//! Particle snapshot records, copied out of the simulation once per tick.

use serde::{Deserialize, Serialize};

// -------------------------------------------------------------------------------------------------

/// Identifies one particle species. Each species drives one independent audio voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesId(pub usize);

// -------------------------------------------------------------------------------------------------

/// Immutable snapshot of a single simulation particle.
///
/// Optional simulation fields (`size`, `trail_length`) are defaulted and validated once
/// at the simulation boundary via [`Particle::sanitized`], so downstream consumers can
/// read all fields unconditionally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub size: f32,
    pub species: SpeciesId,
    /// Length of the particle's motion trail in field units. When the simulation does
    /// not track trails this defaults to twice the particle's speed.
    pub trail_length: f32,
}

impl Particle {
    pub const DEFAULT_SIZE: f32 = 2.0;

    /// Create a particle with defaulted optional fields.
    pub fn new(x: f32, y: f32, vx: f32, vy: f32, species: SpeciesId) -> Self {
        let size = Self::DEFAULT_SIZE;
        let trail_length = 2.0 * (vx * vx + vy * vy).sqrt();
        Self {
            x,
            y,
            vx,
            vy,
            size,
            species,
            trail_length,
        }
    }

    /// Return a copy with non-finite or out-of-domain fields replaced by defaults.
    /// Applied once when a simulation tick is observed, never at read sites.
    pub fn sanitized(mut self) -> Self {
        if !self.x.is_finite() {
            self.x = 0.0;
        }
        if !self.y.is_finite() {
            self.y = 0.0;
        }
        if !self.vx.is_finite() {
            self.vx = 0.0;
        }
        if !self.vy.is_finite() {
            self.vy = 0.0;
        }
        if !self.size.is_finite() || self.size <= 0.0 {
            self.size = Self::DEFAULT_SIZE;
        }
        if !self.trail_length.is_finite() || self.trail_length < 0.0 {
            self.trail_length = 2.0 * self.speed();
        }
        self
    }

    /// The particle's scalar speed.
    #[inline]
    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }

    /// Squared distance to the given point.
    #[inline]
    pub fn distance_squared(&self, x: f32, y: f32) -> f32 {
        let dx = self.x - x;
        let dy = self.y - y;
        dx * dx + dy * dy
    }

    /// Linearly interpolate position and velocity between two snapshots of the same
    /// particle. `t` is clamped to 0..=1; size and species are taken from `self`.
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            x: crate::utils::lerp(self.x, other.x, t),
            y: crate::utils::lerp(self.y, other.y, t),
            vx: crate::utils::lerp(self.vx, other.vx, t),
            vy: crate::utils::lerp(self.vy, other.vy, t),
            size: self.size,
            species: self.species,
            trail_length: crate::utils::lerp(self.trail_length, other.trail_length, t),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A particle enriched with region-relative geometry after passing a sampling region's
/// membership query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionParticle {
    pub particle: Particle,
    /// Distance from the region center, normalized by the region radius (0..=1).
    pub normalized_distance: f32,
    /// Angle from the region center in radians (-π..=π).
    pub angle: f32,
    /// Discrete zone index, derived from the angle (0..zone_count).
    pub zone: usize,
}

impl RegionParticle {
    /// Interpolate two region snapshots of the same particle. Geometry fields follow
    /// the newer snapshot's zone assignment to keep zone indices discrete.
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            particle: self.particle.lerp(&other.particle, t),
            normalized_distance: crate::utils::lerp(
                self.normalized_distance,
                other.normalized_distance,
                t.clamp(0.0, 1.0),
            ),
            angle: other.angle,
            zone: other.zone,
        }
    }
}

// -------------------------------------------------------------------------------------------------
