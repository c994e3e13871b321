//! Error types for Cineteca Core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Library error types
#[derive(Error, Debug)]
pub enum Error {
    // Source errors
    #[error("Source unreachable: {url} ({reason})")]
    SourceUnreachable { url: String, reason: String },

    #[error("Invalid source URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    // Manifest errors
    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("Invalid manifest format: {0}")]
    InvalidManifest(String),

    #[error("No suitable rendition found")]
    NoSuitableRendition,

    // Sink errors
    #[error("Sink rejected source: {0}")]
    SinkAttach(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Returns the error code for logs and CLI output
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::SourceUnreachable { .. } => "SOURCE_UNREACHABLE",
            Error::InvalidUrl { .. } => "INVALID_URL",
            Error::ManifestFetch(_) => "MANIFEST_FETCH",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::InvalidManifest(_) => "INVALID_MANIFEST",
            Error::NoSuitableRendition => "NO_RENDITION",
            Error::SinkAttach(_) => "SINK_ATTACH",
            Error::Network(_) => "NETWORK",
            Error::Storage(_) => "STORAGE",
            Error::Json(_) => "JSON",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Internal(_) => "INTERNAL",
            Error::Io(_) => "IO",
        }
    }

    /// Map a resolution failure onto the user-facing fault taxonomy
    pub fn to_fault(&self) -> PlaybackFault {
        match self {
            Error::SourceUnreachable { url, .. } => PlaybackFault::SourceUnreachable { url: url.clone() },
            Error::ManifestFetch(msg) => PlaybackFault::StreamingNetwork(msg.clone()),
            Error::Network(e) => PlaybackFault::StreamingNetwork(e.to_string()),
            other => PlaybackFault::Playback(other.to_string()),
        }
    }
}

/// Faults surfaced to the user through `PlaybackState::Error`
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PlaybackFault {
    /// Reachability probe failed before any playback attempt
    #[error("source unreachable: {url}")]
    SourceUnreachable { url: String },

    /// Manifest or segment fetch failed
    #[error("streaming network error: {0}")]
    StreamingNetwork(String),

    /// Decode or media pipeline failure
    #[error("streaming media error: {0}")]
    StreamingMedia(String),

    /// Any other fatal fault, or an exhausted retry budget
    #[error("playback error: {0}")]
    Playback(String),
}

impl PlaybackFault {
    /// Faults that go through the retry loop instead of surfacing at once
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PlaybackFault::SourceUnreachable { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            PlaybackFault::SourceUnreachable { .. } => "SOURCE_UNREACHABLE",
            PlaybackFault::StreamingNetwork(_) => "STREAMING_NETWORK",
            PlaybackFault::StreamingMedia(_) => "STREAMING_MEDIA",
            PlaybackFault::Playback(_) => "PLAYBACK",
        }
    }
}

/// Non-fatal notices shown alongside the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    /// Platform policy blocked automatic playback; a user gesture is needed
    AutoplayRejected,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::AutoplayRejected => write!(f, "autoplay was blocked, press play to start"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_maps_to_terminal_fault() {
        let err = Error::SourceUnreachable {
            url: "https://cdn.example.com/a.mp4".into(),
            reason: "404 Not Found".into(),
        };
        let fault = err.to_fault();
        assert_eq!(err.error_code(), "SOURCE_UNREACHABLE");
        assert!(!fault.is_retryable());
    }

    #[test]
    fn test_manifest_fetch_is_retryable() {
        let err = Error::ManifestFetch("connection reset".into());
        assert!(err.to_fault().is_retryable());
        assert_eq!(err.to_fault(), PlaybackFault::StreamingNetwork("connection reset".into()));
    }
}
