use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::particle::Particle;

// -------------------------------------------------------------------------------------------------

/// A particle matched by a circle query, annotated with its distance from the query
/// center normalized by the query radius (0..=1).
#[derive(Debug, Clone, Copy)]
pub struct CircleMatch {
    /// Index into the particle slice the grid was last rebuilt from.
    pub index: usize,
    pub normalized_distance: f32,
}

// -------------------------------------------------------------------------------------------------

/// Uniform spatial hash grid over the 2-D particle field.
///
/// The grid is rebuilt wholesale once per simulation tick and never mutated
/// incrementally. Circle queries only visit the grid cells whose bounding box
/// intersects the query circle, which bounds query cost to the particles in
/// overlapping cells instead of the full population.
#[derive(Debug)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<usize>>,
    particle_count: usize,
    last_build_duration: Duration,
}

impl SpatialGrid {
    pub const DEFAULT_CELL_SIZE: f32 = 50.0;

    pub fn new(cell_size: f32) -> Self {
        // non-positive cell sizes silently clamp to the default, per the crate's
        // no-reject configuration policy
        let cell_size = if cell_size > 0.0 {
            cell_size
        } else {
            Self::DEFAULT_CELL_SIZE
        };
        Self {
            cell_size,
            cells: HashMap::new(),
            particle_count: 0,
            last_build_duration: Duration::ZERO,
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of particles indexed by the last rebuild.
    #[inline]
    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    /// Wallclock time the last rebuild took. Feeds performance mode derivation.
    #[inline]
    pub fn last_build_duration(&self) -> Duration {
        self.last_build_duration
    }

    #[inline]
    fn cell_key(&self, x: f32, y: f32) -> (i32, i32) {
        (
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
        )
    }

    /// Rebuild the index from scratch with O(n) bucket insertion.
    ///
    /// Cell vectors are retained across rebuilds and only cleared, so steady-state
    /// rebuilds do not allocate.
    pub fn rebuild(&mut self, particles: &[Particle]) {
        let build_start = Instant::now();

        for bucket in self.cells.values_mut() {
            bucket.clear();
        }
        for (index, particle) in particles.iter().enumerate() {
            let key = self.cell_key(particle.x, particle.y);
            self.cells.entry(key).or_default().push(index);
        }

        self.particle_count = particles.len();
        self.last_build_duration = build_start.elapsed();
    }

    /// Collect all particles within `radius` of `(cx, cy)` into `out`.
    ///
    /// `particles` must be the same slice the grid was last rebuilt from.
    pub fn query_circle(
        &self,
        particles: &[Particle],
        cx: f32,
        cy: f32,
        radius: f32,
        out: &mut Vec<CircleMatch>,
    ) {
        out.clear();
        if radius <= 0.0 {
            return;
        }
        let radius_squared = radius * radius;

        let (min_cx, min_cy) = self.cell_key(cx - radius, cy - radius);
        let (max_cx, max_cy) = self.cell_key(cx + radius, cy + radius);

        for cell_y in min_cy..=max_cy {
            for cell_x in min_cx..=max_cx {
                let Some(bucket) = self.cells.get(&(cell_x, cell_y)) else {
                    continue;
                };
                for &index in bucket {
                    let distance_squared = particles[index].distance_squared(cx, cy);
                    if distance_squared <= radius_squared {
                        out.push(CircleMatch {
                            index,
                            normalized_distance: distance_squared.sqrt() / radius,
                        });
                    }
                }
            }
        }
    }

    /// Number of particles in the cell containing `(x, y)`. This is the "local
    /// density" term used by importance sampling and density-modulated organizing.
    pub fn local_density(&self, x: f32, y: f32) -> usize {
        self.cells
            .get(&self.cell_key(x, y))
            .map_or(0, |bucket| bucket.len())
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CELL_SIZE)
    }
}

// -------------------------------------------------------------------------------------------------
