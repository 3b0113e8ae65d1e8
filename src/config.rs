//! Serializable configuration tree for the whole synthesis core.
//!
//! Loading never rejects out-of-range values: every leaf clamps silently into its
//! valid domain, so a hand-edited or stale config file always yields a running
//! system. Only structurally invalid JSON is reported as an error.

use serde::{Deserialize, Serialize};

use crate::{
    engine::GrainEngine,
    organizer::{OrganizerMode, OrganizerParams},
    region::RegionOptions,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Organizer strategy selection plus its parameter bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizerConfig {
    pub mode: OrganizerMode,
    pub params: OrganizerParams,
}

// -------------------------------------------------------------------------------------------------

/// Per-voice engine tunables. Defaults mirror the engine's parameter descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub density: f32,
    pub max_grains: i32,
    pub fade_length: f32,
    pub pitch_range: f32,
    pub gain: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            density: GrainEngine::DENSITY.default_value(),
            max_grains: GrainEngine::MAX_GRAINS.default_value(),
            fade_length: GrainEngine::FADE_LENGTH.default_value(),
            pitch_range: GrainEngine::PITCH_RANGE.default_value(),
            gain: GrainEngine::GAIN.default_value(),
        }
    }
}

impl VoiceConfig {
    pub fn clamped(mut self) -> Self {
        self.density = GrainEngine::DENSITY.clamp_value(self.density);
        self.max_grains = GrainEngine::MAX_GRAINS.clamp_value(self.max_grains);
        self.fade_length = GrainEngine::FADE_LENGTH.clamp_value(self.fade_length);
        self.pitch_range = GrainEngine::PITCH_RANGE.clamp_value(self.pitch_range);
        self.gain = GrainEngine::GAIN.clamp_value(self.gain);
        self
    }
}

// -------------------------------------------------------------------------------------------------

/// Output-wide knobs shared by all voices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalsConfig {
    pub master_gain: f32,
    pub density_multiplier: f32,
    pub size_multiplier: f32,
    /// Concurrency ceiling across all voices combined.
    pub max_total_grains: usize,
}

impl Default for GlobalsConfig {
    fn default() -> Self {
        Self {
            master_gain: 1.0,
            density_multiplier: 1.0,
            size_multiplier: 1.0,
            max_total_grains: 256,
        }
    }
}

impl GlobalsConfig {
    pub fn clamped(mut self) -> Self {
        let sane = |value: f32, low: f32, high: f32, default: f32| {
            if value.is_finite() {
                value.clamp(low, high)
            } else {
                default
            }
        };
        self.master_gain = sane(self.master_gain, 0.0, 2.0, 1.0);
        self.density_multiplier = sane(self.density_multiplier, 0.01, 8.0, 1.0);
        self.size_multiplier = sane(self.size_multiplier, 0.1, 4.0, 1.0);
        self.max_total_grains = self.max_total_grains.clamp(1, 4_096);
        self
    }
}

// -------------------------------------------------------------------------------------------------

/// The full configuration tree, as serialized to and from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub region: RegionOptions,
    pub organizer: OrganizerConfig,
    /// One entry per species voice, index-aligned. Missing entries fall back to
    /// defaults; extra entries are ignored.
    pub voices: Vec<VoiceConfig>,
    pub globals: GlobalsConfig,
}

impl Config {
    /// Clamp every leaf into its valid domain.
    pub fn clamped(mut self) -> Self {
        self.region = self.region.clamped();
        self.organizer.params = self.organizer.params.clamped();
        self.voices = self.voices.into_iter().map(VoiceConfig::clamped).collect();
        self.globals = self.globals.clamped();
        self
    }

    /// Parse from a JSON string, clamping all values. Unknown fields are ignored.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.clamped())
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_is_idempotent() {
        let config = Config {
            organizer: OrganizerConfig {
                mode: OrganizerMode::RhythmicPatterns,
                params: OrganizerParams {
                    rhythm_bpm: 90.0,
                    ..Default::default()
                },
            },
            voices: vec![
                VoiceConfig {
                    density: 25.0,
                    ..Default::default()
                },
                VoiceConfig::default(),
            ],
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        let restored = Config::from_json(&json).unwrap();
        assert_eq!(restored, config);

        // a second round trip through an already clamped tree changes nothing
        let json2 = restored.to_json().unwrap();
        assert_eq!(json, json2);
    }

    #[test]
    fn out_of_range_values_clamp_on_load() {
        let json = r#"{
            "region": { "center_x": 9.0, "radius": -1.0 },
            "voices": [{ "density": 100000.0, "gain": -2.0 }],
            "globals": { "master_gain": 50.0, "max_total_grains": 0 }
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.region.center_x, 1.0);
        assert!(config.region.radius >= 1.0);
        assert_eq!(config.voices[0].density, 100.0);
        assert_eq!(config.voices[0].gain, 0.0);
        assert_eq!(config.globals.master_gain, 2.0);
        assert_eq!(config.globals.max_total_grains, 1);
    }

    #[test]
    fn structurally_broken_json_is_an_error() {
        assert!(Config::from_json("{ not json").is_err());
        assert!(Config::from_json(r#"{ "voices": 42 }"#).is_err());
    }

    #[test]
    fn defaults_parse_from_empty_object() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
    }
}
