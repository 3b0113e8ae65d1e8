//! Spatial indexing and adaptive down-sampling for particle neighborhood queries.

mod grid;
mod sampler;

pub use grid::{CircleMatch, SpatialGrid};
pub use sampler::{AdaptiveSampler, PerformanceMode, SamplerOptions};
