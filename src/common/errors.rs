use std::io;

use thiserror::Error;

/// Errors raised by the audio runtime.
///
/// Everything here is local to a single stream or request; nothing in this
/// enum ever crosses a worker thread boundary.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The byte stream for an existing file could not be opened.
    #[error("failed to open '{name}': {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    /// No file matched under any search root / extension.
    #[error("no such audio file: '{0}'")]
    NotFound(String),

    /// Container probing or codec setup failed.
    #[error("cannot decode '{name}': {reason}")]
    Decode { name: String, reason: String },

    /// The native sample layout cannot be played by the backend.
    #[error("sample format not supported by the playback backend: {0}")]
    UnsupportedFormat(String),

    #[error("requested BGM track {index} out of range (max: {max})")]
    TrackOutOfRange { index: usize, max: usize },

    /// The backend has no free playback voice.
    #[error("no free playback voice ({0} in use)")]
    VoiceExhausted(usize),

    #[error("failed to spawn thread '{name}': {source}")]
    Thread {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl AudioError {
    pub fn decode(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience Result type for the audio runtime.
pub type AudioResult<T> = std::result::Result<T, AudioError>;
