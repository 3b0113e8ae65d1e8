#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod backend;
mod bridge;
mod cluster;
mod config;
mod engine;
mod error;
mod orchestrator;
mod organizer;
mod parameter;
mod particle;
mod region;
mod spatial;

// public, flat re-exports
pub use error::Error;

pub use backend::{
    attack_hold_release, AudioBackend, EnvelopePoint, NullBackend, SampleBuffer, VoiceHandle,
    VoiceStart,
};

pub use bridge::{BridgeFrame, ClockBridge, Regime, RegionSnapshot, Statistics, AUDIO_TICK_PERIOD};

pub use config::{Config, GlobalsConfig, OrganizerConfig, VoiceConfig};

pub use engine::{
    EngineMessage, EngineMetrics, GlobalParams, GrainEngine, GrainId, GrainPool,
};

pub use orchestrator::Orchestrator;

pub use organizer::{
    duration_from_speed, organize, ChaosCurve, GrainDescriptor, OrganizeContext, OrganizerMode,
    OrganizerParams, MAX_GRAIN_DURATION, MIN_GRAIN_DURATION,
};

pub use parameter::{FloatParameter, IntegerParameter};

pub use particle::{Particle, RegionParticle, SpeciesId};

pub use region::{RegionOptions, SamplingRegion};

pub use spatial::{AdaptiveSampler, CircleMatch, PerformanceMode, SamplerOptions, SpatialGrid};

// public mods
pub mod utils;
