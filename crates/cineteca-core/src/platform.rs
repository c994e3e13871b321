//! Platform capabilities the controller drives
//!
//! The media element, the streaming engine, fullscreen/picture-in-picture
//! and the catalogue are all owned by the host. The controller talks to them
//! only through these traits, so a browser binding, a native player and the
//! headless CLI sink can be swapped without touching the state machine.

use crate::{
    resolver::StreamPlan,
    types::{MediaId, SessionToken},
    Result,
};
use serde::{Deserialize, Serialize};
use url::Url;

/// The media element. Asynchronous outcomes (metadata loaded, play() settled,
/// errors) come back later as [`SinkEvent`]s tagged with the attach token.
pub trait MediaSink {
    /// Whether the platform can drive a manifest-based streaming session
    fn supports_adaptive(&self) -> bool;

    /// Assign a progressive source
    fn attach_direct(&mut self, url: &Url, token: SessionToken) -> Result<()>;

    /// Open a streaming session feeding this sink
    fn attach_stream(&mut self, plan: &StreamPlan, token: SessionToken) -> Result<Box<dyn StreamingSession>>;

    /// Drop the current source and stop emitting events for it
    fn detach(&mut self);

    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: f64);
    fn set_volume(&mut self, volume: f64);
    fn set_muted(&mut self, muted: bool);
    fn set_playback_rate(&mut self, rate: f64);

    /// Current playhead in seconds
    fn current_time(&self) -> f64;
    fn is_paused(&self) -> bool;
}

/// A live manifest-streaming session
pub trait StreamingSession {
    /// Reload the manifest in place after a fatal network error
    fn start_load(&mut self);

    /// Re-attach media without discarding buffered segments
    fn recover_media_error(&mut self);

    /// Stop in-flight fetches. Called before the sink is detached.
    fn release(&mut self);
}

/// Fullscreen and picture-in-picture
pub trait DisplayControl {
    fn request_fullscreen(&mut self) -> Result<()>;
    fn exit_fullscreen(&mut self) -> Result<()>;
    fn request_picture_in_picture(&mut self) -> Result<()>;
    fn exit_picture_in_picture(&mut self) -> Result<()>;
}

/// Catalogue-side callbacks. The controller never mutates the catalogue.
pub trait PlaybackNavigator {
    fn on_ended(&mut self, media_id: &MediaId);
    fn on_next(&mut self);
}

/// Display capability for hosts without fullscreen or picture-in-picture
#[derive(Debug, Default)]
pub struct NoDisplay;

impl DisplayControl for NoDisplay {
    fn request_fullscreen(&mut self) -> Result<()> {
        Err(crate::Error::Internal("fullscreen is not available".into()))
    }

    fn exit_fullscreen(&mut self) -> Result<()> {
        Ok(())
    }

    fn request_picture_in_picture(&mut self) -> Result<()> {
        Err(crate::Error::Internal("picture-in-picture is not available".into()))
    }

    fn exit_picture_in_picture(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Media element error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaErrorCode {
    Aborted,
    Network,
    Decode,
    SourceNotSupported,
}

/// Streaming-protocol error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingErrorKind {
    Network,
    Media,
    Other,
}

/// Error reported by the streaming engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingError {
    pub kind: StreamingErrorKind,
    /// Fatal errors stop the session until recovered
    pub fatal: bool,
    pub details: String,
}

impl StreamingError {
    pub fn fatal(kind: StreamingErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            fatal: true,
            details: details.into(),
        }
    }

    pub fn non_fatal(kind: StreamingErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            fatal: false,
            details: details.into(),
        }
    }
}

/// Lifecycle events emitted by the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkEvent {
    LoadedMetadata { duration: Option<f64> },
    CanPlay,
    Playing,
    Waiting,
    Pause,
    TimeUpdate { position: f64 },
    DurationChange { duration: f64 },
    Ended,
    Error { code: MediaErrorCode, message: String },
    /// The play() request was refused by autoplay policy
    PlayRejected,
    FullscreenChanged { active: bool },
    PictureInPictureChanged { active: bool },
    Streaming(StreamingError),
}
