use std::{error, fmt};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by grainfield.
///
/// The synthesis hot path never reports errors for recoverable conditions: exhausted
/// grain pools, rate-limited triggers and missing sample buffers degrade silently and
/// are tracked as [`EngineMetrics`](crate::EngineMetrics) counters instead.
#[derive(Debug)]
pub enum Error {
    /// A parameter id is unknown or a parameter value cannot be sanitized (e.g. NaN).
    ParameterError(String),
    /// A configuration snapshot failed to serialize or deserialize.
    ConfigError(Box<dyn error::Error + Send + Sync>),
    /// The audio backend rejected a voice start request.
    BackendError(Box<dyn error::Error + Send + Sync>),
    /// A voice/species index is out of range.
    VoiceNotFoundError(usize),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::ConfigError(err) | Self::BackendError(err) => err.fmt(f),
            Self::VoiceNotFoundError(voice_index) => {
                write!(f, "Voice with index {voice_index} not found")
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigError(Box::new(err))
    }
}
