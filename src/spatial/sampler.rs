use std::time::Duration;

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    cluster::single_linkage,
    particle::Particle,
    spatial::grid::{CircleMatch, SpatialGrid},
};

// -------------------------------------------------------------------------------------------------

/// Discrete performance tier, derived from recent grid-build latency and candidate-set
/// size. Scales the sampling target down as the simulation gets heavier.
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
)]
#[repr(u8)]
pub enum PerformanceMode {
    #[default]
    Full,
    Balanced,
    Performance,
    Emergency,
}

impl PerformanceMode {
    /// Derive the mode from the current candidate count and the last grid build time.
    pub fn derive(candidate_count: usize, build_time: Duration) -> Self {
        let build_ms = build_time.as_secs_f64() * 1000.0;
        if candidate_count > 10_000 || build_ms > 10.0 {
            Self::Emergency
        } else if candidate_count > 5_000 || build_ms > 5.0 {
            Self::Performance
        } else if candidate_count > 1_000 || build_ms > 2.0 {
            Self::Balanced
        } else {
            Self::Full
        }
    }

    /// Scale factor applied to the configured target sample size.
    pub fn target_scale(&self) -> f32 {
        match self {
            Self::Full => 1.0,
            Self::Balanced => 0.75,
            Self::Performance => 0.5,
            Self::Emergency => 0.25,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Options for [`AdaptiveSampler`].
#[derive(Debug, Clone, Copy)]
pub struct SamplerOptions {
    /// Sample budget at [`PerformanceMode::Full`].
    pub target_sample_size: usize,
    /// The output never shrinks below `min(input, min_sample_size)`.
    pub min_sample_size: usize,
    /// Importance score weights: speed, center proximity, sparsity, size, jitter.
    pub importance_weights: [f32; 5],
    /// Single-linkage absorption radius for hybrid sampling.
    pub cluster_radius: f32,
    /// How long cached cluster centroids stay usable for statistical sampling, in seconds.
    pub centroid_cache_validity: f64,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            target_sample_size: 256,
            min_sample_size: 16,
            importance_weights: [0.35, 0.25, 0.20, 0.10, 0.10],
            cluster_radius: 100.0,
            centroid_cache_validity: 0.1,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Down-samples an oversized candidate set to a bounded working set.
///
/// The strategy is chosen by candidate-set size: importance scoring for small sets,
/// greedy clustering plus proportional importance picks for medium sets, and stratified
/// uniform draws (with a short-lived cluster-centroid fallback) for very large sets.
pub struct AdaptiveSampler {
    options: SamplerOptions,
    performance_mode: PerformanceMode,
    cached_centroids: Vec<(f32, f32)>,
    centroid_cache_time: f64,
    rng: SmallRng,
    // reused across calls to keep the per-tick path allocation free
    scored: Vec<(usize, f32)>,
}

impl AdaptiveSampler {
    const HYBRID_THRESHOLD: usize = 1_000;
    const STATISTICAL_THRESHOLD: usize = 5_000;

    pub fn new(options: SamplerOptions) -> Self {
        Self {
            options,
            performance_mode: PerformanceMode::Full,
            cached_centroids: Vec::new(),
            centroid_cache_time: f64::NEG_INFINITY,
            rng: SmallRng::from_os_rng(),
            scored: Vec::new(),
        }
    }

    /// Create a sampler with a fixed RNG seed for deterministic tests.
    pub fn with_seed(options: SamplerOptions, seed: u64) -> Self {
        let mut sampler = Self::new(options);
        sampler.rng = SmallRng::seed_from_u64(seed);
        sampler
    }

    #[inline]
    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: SamplerOptions) {
        self.options = options;
    }

    /// Performance tier derived during the most recent [`sample`](Self::sample) call.
    #[inline]
    pub fn performance_mode(&self) -> PerformanceMode {
        self.performance_mode
    }

    /// Reduce `candidates` to at most the mode-scaled target size, writing the kept
    /// matches to `out`. `particles` must be the slice the grid was rebuilt from and
    /// `field` is the `(width, height)` of the simulation canvas.
    pub fn sample(
        &mut self,
        particles: &[Particle],
        candidates: &[CircleMatch],
        grid: &SpatialGrid,
        field: (f32, f32),
        now: f64,
        out: &mut Vec<CircleMatch>,
    ) {
        out.clear();

        self.performance_mode = PerformanceMode::derive(candidates.len(), grid.last_build_duration());
        let target = self.scaled_target();

        if candidates.len() <= target {
            out.extend_from_slice(candidates);
            return;
        }

        if candidates.len() < Self::HYBRID_THRESHOLD {
            self.importance_sample(particles, candidates, grid, field, target, out);
        } else if candidates.len() <= Self::STATISTICAL_THRESHOLD {
            self.hybrid_sample(particles, candidates, grid, field, target, now, out);
        } else {
            self.statistical_sample(particles, candidates, field, target, now, out);
        }

        // never fall below the configured floor; top up from the unpicked remainder
        let floor = self.options.min_sample_size.min(candidates.len());
        if out.len() < floor {
            for candidate in candidates {
                if out.len() >= floor {
                    break;
                }
                if !out.iter().any(|kept| kept.index == candidate.index) {
                    out.push(*candidate);
                }
            }
        }
        debug_assert!(out.len() <= candidates.len());
    }

    fn scaled_target(&self) -> usize {
        let scaled =
            (self.options.target_sample_size as f32 * self.performance_mode.target_scale()) as usize;
        scaled.max(self.options.min_sample_size)
    }

    /// Weighted sum of normalized speed, canvas-center proximity, local sparsity,
    /// size, plus a random jitter term to avoid starving the tail.
    fn importance_score(
        &mut self,
        particle: &Particle,
        grid: &SpatialGrid,
        field: (f32, f32),
    ) -> f32 {
        let [w_speed, w_center, w_sparsity, w_size, w_jitter] = self.options.importance_weights;

        let speed = (particle.speed() / 10.0).min(1.0);

        let (field_width, field_height) = field;
        let half_diagonal =
            (field_width * field_width + field_height * field_height).sqrt() * 0.5;
        let center_distance = particle
            .distance_squared(field_width * 0.5, field_height * 0.5)
            .sqrt();
        let center_proximity = 1.0 - (center_distance / half_diagonal.max(1.0)).min(1.0);

        let sparsity = 1.0 / (1.0 + grid.local_density(particle.x, particle.y) as f32);
        let size = (particle.size / 10.0).min(1.0);
        let jitter = self.rng.random::<f32>();

        w_speed * speed
            + w_center * center_proximity
            + w_sparsity * sparsity
            + w_size * size
            + w_jitter * jitter
    }

    fn importance_sample(
        &mut self,
        particles: &[Particle],
        candidates: &[CircleMatch],
        grid: &SpatialGrid,
        field: (f32, f32),
        target: usize,
        out: &mut Vec<CircleMatch>,
    ) {
        let mut scored = std::mem::take(&mut self.scored);
        scored.clear();
        for (candidate_index, candidate) in candidates.iter().enumerate() {
            let score = self.importance_score(&particles[candidate.index], grid, field);
            scored.push((candidate_index, score));
        }
        scored.sort_unstable_by(|a, b| b.1.total_cmp(&a.1));
        out.extend(scored.iter().take(target).map(|&(i, _)| candidates[i]));
        self.scored = scored;
    }

    fn hybrid_sample(
        &mut self,
        particles: &[Particle],
        candidates: &[CircleMatch],
        grid: &SpatialGrid,
        field: (f32, f32),
        target: usize,
        now: f64,
        out: &mut Vec<CircleMatch>,
    ) {
        let positions: Vec<(f32, f32)> = candidates
            .iter()
            .map(|c| (particles[c.index].x, particles[c.index].y))
            .collect();
        let clusters = single_linkage(&positions, self.options.cluster_radius);

        // refresh the centroid cache for the statistical fallback path
        self.cached_centroids.clear();
        for cluster in &clusters {
            self.cached_centroids
                .push(crate::cluster::centroid(&positions, cluster));
        }
        self.centroid_cache_time = now;

        // importance-sample within each cluster, proportionally to cluster size
        for cluster in &clusters {
            let share = ((cluster.len() * target) as f32 / candidates.len() as f32).ceil() as usize;
            let share = share.min(cluster.len()).max(1);

            let mut scored = std::mem::take(&mut self.scored);
            scored.clear();
            for &candidate_index in cluster {
                let particle = &particles[candidates[candidate_index].index];
                let score = self.importance_score(particle, grid, field);
                scored.push((candidate_index, score));
            }
            scored.sort_unstable_by(|a, b| b.1.total_cmp(&a.1));
            out.extend(scored.iter().take(share).map(|&(i, _)| candidates[i]));
            self.scored = scored;

            if out.len() >= target {
                break;
            }
        }
        out.truncate(target);
    }

    fn statistical_sample(
        &mut self,
        particles: &[Particle],
        candidates: &[CircleMatch],
        field: (f32, f32),
        target: usize,
        now: f64,
        out: &mut Vec<CircleMatch>,
    ) {
        // a recent clustering pass is a better density estimate than blind strata:
        // pick the candidate nearest to each cached centroid first
        if now - self.centroid_cache_time <= self.options.centroid_cache_validity {
            for &(centroid_x, centroid_y) in &self.cached_centroids {
                if out.len() >= target {
                    break;
                }
                let nearest = candidates.iter().min_by(|a, b| {
                    let da = particles[a.index].distance_squared(centroid_x, centroid_y);
                    let db = particles[b.index].distance_squared(centroid_x, centroid_y);
                    da.total_cmp(&db)
                });
                if let Some(&nearest) = nearest {
                    if !out.iter().any(|kept| kept.index == nearest.index) {
                        out.push(nearest);
                    }
                }
            }
        }

        // partition the canvas into √K×√K strata and draw uniformly from each
        let strata_per_axis = (target as f32).sqrt().ceil() as usize;
        let (field_width, field_height) = field;
        let stratum_width = field_width / strata_per_axis as f32;
        let stratum_height = field_height / strata_per_axis as f32;

        let mut strata: Vec<Vec<usize>> = vec![Vec::new(); strata_per_axis * strata_per_axis];
        for (candidate_index, candidate) in candidates.iter().enumerate() {
            let particle = &particles[candidate.index];
            let sx = ((particle.x / stratum_width.max(1.0)) as usize).min(strata_per_axis - 1);
            let sy = ((particle.y / stratum_height.max(1.0)) as usize).min(strata_per_axis - 1);
            strata[sy * strata_per_axis + sx].push(candidate_index);
        }

        let mut round = 0;
        while out.len() < target {
            let mut drew_any = false;
            for stratum in &strata {
                if out.len() >= target {
                    break;
                }
                if stratum.len() <= round {
                    continue;
                }
                let pick = stratum[self.rng.random_range(0..stratum.len())];
                let candidate = candidates[pick];
                if !out.iter().any(|kept| kept.index == candidate.index) {
                    out.push(candidate);
                    drew_any = true;
                }
            }
            if !drew_any {
                break;
            }
            round += 1;
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::SpeciesId;

    fn uniform_candidates(count: usize) -> (Vec<Particle>, Vec<CircleMatch>) {
        let mut rng = SmallRng::seed_from_u64(7);
        let particles: Vec<Particle> = (0..count)
            .map(|_| {
                Particle::new(
                    rng.random_range(0.0..800.0),
                    rng.random_range(0.0..600.0),
                    rng.random_range(-5.0..5.0),
                    rng.random_range(-5.0..5.0),
                    SpeciesId(0),
                )
            })
            .collect();
        let candidates = (0..count)
            .map(|index| CircleMatch {
                index,
                normalized_distance: 0.5,
            })
            .collect();
        (particles, candidates)
    }

    fn run_sampler(count: usize) -> (usize, usize) {
        let (particles, candidates) = uniform_candidates(count);
        let mut grid = SpatialGrid::default();
        grid.rebuild(&particles);

        let options = SamplerOptions::default();
        let mut sampler = AdaptiveSampler::with_seed(options, 42);
        let mut out = Vec::new();
        sampler.sample(&particles, &candidates, &grid, (800.0, 600.0), 0.0, &mut out);

        // no duplicates
        let mut indices: Vec<usize> = out.iter().map(|m| m.index).collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), out.len());

        (out.len(), candidates.len())
    }

    #[test]
    fn output_respects_bounds_in_all_strategies() {
        let options = SamplerOptions::default();
        for &count in &[10, 500, 2_000, 6_000] {
            let (len, input) = run_sampler(count);
            assert!(len <= input);
            assert!(len <= options.target_sample_size);
            assert!(len >= options.min_sample_size.min(input));
        }
    }

    #[test]
    fn small_sets_pass_through() {
        let (len, input) = run_sampler(100);
        assert_eq!(len, input);
    }

    #[test]
    fn performance_mode_thresholds() {
        let fast = Duration::from_micros(500);
        assert_eq!(PerformanceMode::derive(100, fast), PerformanceMode::Full);
        assert_eq!(
            PerformanceMode::derive(2_000, fast),
            PerformanceMode::Balanced
        );
        assert_eq!(
            PerformanceMode::derive(6_000, fast),
            PerformanceMode::Performance
        );
        assert_eq!(
            PerformanceMode::derive(20_000, fast),
            PerformanceMode::Emergency
        );
        assert_eq!(
            PerformanceMode::derive(100, Duration::from_millis(12)),
            PerformanceMode::Emergency
        );
        assert_eq!(
            PerformanceMode::derive(100, Duration::from_millis(3)),
            PerformanceMode::Balanced
        );
    }
}
