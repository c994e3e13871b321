//! Core types for Cineteca

use crate::error::{Error, PlaybackFault, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Unique identifier for a mounted player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a title; key for persisted progress
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Attach generation. Every load and every retry attaches the sink under a
/// fresh token; events carrying an older token belong to a superseded attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SessionToken(pub u64);

impl SessionToken {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Video codec types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
    H265,
    Vp9,
    Av1,
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoCodec::H264 => write!(f, "H.264/AVC"),
            VideoCodec::H265 => write!(f, "H.265/HEVC"),
            VideoCodec::Vp9 => write!(f, "VP9"),
            VideoCodec::Av1 => write!(f, "AV1"),
        }
    }
}

/// Audio codec types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioCodec {
    Aac,
    Ac3,
    Eac3,
    Opus,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns quality tier name
    pub fn quality_name(&self) -> &'static str {
        match self.height {
            0..=240 => "240p",
            241..=360 => "360p",
            361..=480 => "480p",
            481..=720 => "720p",
            721..=1080 => "1080p",
            1081..=1440 => "1440p",
            _ => "4K",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One rung of the bitrate ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rendition {
    /// Unique identifier for this rendition
    pub id: String,
    /// Bandwidth in bits per second (0 = unknown)
    pub bandwidth: u64,
    /// Video resolution (if advertised)
    pub resolution: Option<Resolution>,
    /// Frame rate (if advertised)
    pub frame_rate: Option<f32>,
    pub video_codec: Option<VideoCodec>,
    pub audio_codec: Option<AudioCodec>,
    /// URI to the media playlist
    pub uri: Url,
}

impl Rendition {
    /// Human-readable label for menus and CLI output
    pub fn label(&self) -> String {
        match self.resolution {
            Some(r) => format!("{} ({} kbps)", r.quality_name(), self.bandwidth / 1000),
            None if self.bandwidth > 0 => format!("{} kbps", self.bandwidth / 1000),
            None => "auto".to_string(),
        }
    }
}

/// Player state machine states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "fault", rename_all = "snake_case")]
pub enum PlaybackState {
    /// No source attached
    Idle,
    /// Resolving the source or waiting for the sink to become ready
    Loading,
    /// Sink has metadata and can start
    Ready,
    /// Content is playing
    Playing,
    /// Playback paused
    Paused,
    /// Position stalled while the sink wants to play
    Buffering,
    /// Terminal until an explicit retry
    Error(PlaybackFault),
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: &PlaybackState) -> bool {
        use PlaybackState::*;
        match (self, target) {
            // Entering Error or a (re)load is always allowed; leaving Error
            // is gated by the controller's retry command.
            (_, Error(_)) | (_, Loading) => true,
            (Idle, _) => false,
            (Loading, Ready) => true,
            (Ready, Playing) | (Ready, Paused) | (Ready, Buffering) => true,
            (Playing, Paused) | (Playing, Buffering) | (Playing, Idle) => true,
            (Paused, Playing) | (Paused, Buffering) => true,
            (Buffering, Playing) | (Buffering, Paused) | (Buffering, Idle) => true,
            _ => false,
        }
    }

    /// States during which the position is written to durable storage
    pub fn persists_progress(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Buffering)
    }

    /// States from which a seek is honored
    pub fn accepts_seek(&self) -> bool {
        matches!(
            self,
            PlaybackState::Ready | PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Buffering
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PlaybackState::Error(_))
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Ready => write!(f, "ready"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Error(fault) => write!(f, "error ({})", fault.code()),
        }
    }
}

/// Fixed playback-rate menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum PlaybackRate {
    Half,
    ThreeQuarters,
    #[default]
    Normal,
    OneAndQuarter,
    OneAndHalf,
    Double,
}

impl PlaybackRate {
    pub const ALL: [PlaybackRate; 6] = [
        PlaybackRate::Half,
        PlaybackRate::ThreeQuarters,
        PlaybackRate::Normal,
        PlaybackRate::OneAndQuarter,
        PlaybackRate::OneAndHalf,
        PlaybackRate::Double,
    ];

    pub fn as_f64(self) -> f64 {
        match self {
            PlaybackRate::Half => 0.5,
            PlaybackRate::ThreeQuarters => 0.75,
            PlaybackRate::Normal => 1.0,
            PlaybackRate::OneAndQuarter => 1.25,
            PlaybackRate::OneAndHalf => 1.5,
            PlaybackRate::Double => 2.0,
        }
    }
}

impl TryFrom<f64> for PlaybackRate {
    type Error = String;

    fn try_from(value: f64) -> std::result::Result<Self, Self::Error> {
        PlaybackRate::ALL
            .into_iter()
            .find(|r| (r.as_f64() - value).abs() < 1e-9)
            .ok_or_else(|| format!("unsupported playback rate {value}"))
    }
}

impl From<PlaybackRate> for f64 {
    fn from(rate: PlaybackRate) -> f64 {
        rate.as_f64()
    }
}

impl std::fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x", self.as_f64())
    }
}

/// Modal panels drawn over the video surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overlay {
    Settings,
    Shortcuts,
}

/// Process-wide playback preferences
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub volume: f64,
    pub playback_rate: PlaybackRate,
    pub autoplay: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            playback_rate: PlaybackRate::Normal,
            autoplay: true,
        }
    }
}

/// Last known position of a title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub media_id: MediaId,
    /// Seconds from the start of the title
    pub position: f64,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(media_id: MediaId, position: f64) -> Self {
        Self {
            media_id,
            position: position.max(0.0),
            updated_at: Utc::now(),
        }
    }
}

/// Catalogue entry as supplied by the catalogue collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(alias = "vimeo_url")]
    pub source_url: String,
    #[serde(default)]
    pub language: Option<String>,
    /// Running time in minutes
    #[serde(default)]
    pub duration: Option<u32>,
}

/// The part of a catalogue entry the controller consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableItem {
    pub id: MediaId,
    pub source_url: Url,
    pub poster_url: Option<Url>,
}

impl PlayableItem {
    pub fn new(id: impl Into<String>, source_url: &str) -> Result<Self> {
        Ok(Self {
            id: MediaId::new(id),
            source_url: parse_url(source_url)?,
            poster_url: None,
        })
    }
}

impl TryFrom<&CatalogueEntry> for PlayableItem {
    type Error = Error;

    fn try_from(entry: &CatalogueEntry) -> Result<Self> {
        let poster_url = entry
            .poster_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_url)
            .transpose()?;

        Ok(Self {
            id: MediaId::new(entry.id.clone()),
            source_url: parse_url(&entry.source_url)?,
            poster_url,
        })
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    Url::parse(trimmed).map_err(|source| Error::InvalidUrl {
        url: trimmed.to_string(),
        source,
    })
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Automatic recovery attempts before surfacing an error
    pub max_retries: u32,
    /// Fixed backoff before re-resolving the source (milliseconds)
    pub retry_delay_ms: u64,
    /// Stall detection sampling interval (milliseconds)
    pub buffering_sample_ms: u64,
    /// Idle time before controls hide while playing (milliseconds)
    pub controls_hide_ms: u64,
    /// Progress write interval (milliseconds)
    pub progress_interval_ms: u64,
    /// HTTP timeout for probes and manifest fetches (milliseconds)
    pub request_timeout_ms: u64,
    /// Arrow-key seek step (seconds)
    pub seek_step: f64,
    /// Shift+arrow and double-tap seek step (seconds)
    pub seek_step_large: f64,
    /// Arrow-up/down volume step
    pub volume_step: f64,
    /// Maximum bitrate cap for the initial rendition (0 = no cap)
    pub max_bitrate: u64,
    /// Start adaptive playback at the lowest rendition
    pub start_at_lowest: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            buffering_sample_ms: 1000,
            controls_hide_ms: 3000,
            progress_interval_ms: 1000,
            request_timeout_ms: 10000,
            seek_step: 5.0,
            seek_step_large: 10.0,
            volume_step: 0.1,
            max_bitrate: 0,
            start_at_lowest: false,
        }
    }
}

impl PlayerConfig {
    /// Load a configuration file, filling missing keys with defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: PlayerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("retry_delay_ms", self.retry_delay_ms),
            ("buffering_sample_ms", self.buffering_sample_ms),
            ("controls_hide_ms", self.controls_hide_ms),
            ("progress_interval_ms", self.progress_interval_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidConfig(format!("{name} must be greater than zero")));
        }
        if self.seek_step <= 0.0 || self.seek_step_large <= 0.0 {
            return Err(Error::InvalidConfig("seek steps must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.volume_step) || self.volume_step == 0.0 {
            return Err(Error::InvalidConfig("volume_step must be in (0, 1]".into()));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn buffering_sample_interval(&self) -> Duration {
        Duration::from_millis(self.buffering_sample_ms)
    }

    pub fn controls_hide_delay(&self) -> Duration {
        Duration::from_millis(self.controls_hide_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_rate_menu() {
        assert_eq!(PlaybackRate::try_from(1.25), Ok(PlaybackRate::OneAndQuarter));
        assert!(PlaybackRate::try_from(3.0).is_err());
        assert_eq!(PlaybackRate::default().as_f64(), 1.0);
    }

    #[test]
    fn test_settings_json_uses_numeric_rate() {
        let settings = PlaybackSettings {
            volume: 0.4,
            playback_rate: PlaybackRate::OneAndHalf,
            autoplay: false,
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"playback_rate\":1.5"));
        let back: PlaybackSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_error_is_left_only_through_loading() {
        let error = PlaybackState::Error(PlaybackFault::Playback("boom".into()));
        assert!(error.can_transition_to(&PlaybackState::Loading));
        assert!(!error.can_transition_to(&PlaybackState::Playing));
        assert!(!error.can_transition_to(&PlaybackState::Idle));
    }

    #[test]
    fn test_state_transitions() {
        assert!(PlaybackState::Idle.can_transition_to(&PlaybackState::Loading));
        assert!(PlaybackState::Loading.can_transition_to(&PlaybackState::Ready));
        assert!(PlaybackState::Playing.can_transition_to(&PlaybackState::Idle));
        assert!(!PlaybackState::Idle.can_transition_to(&PlaybackState::Playing));
        assert!(!PlaybackState::Paused.can_transition_to(&PlaybackState::Idle));
    }

    #[test]
    fn test_catalogue_entry_accepts_legacy_field() {
        let json = r#"{
            "id": "42",
            "title": "Metropolis",
            "poster_url": " https://img.example.com/metropolis.jpg ",
            "vimeo_url": "https://cdn.example.com/metropolis/master.m3u8 ",
            "duration": 153
        }"#;
        let entry: CatalogueEntry = serde_json::from_str(json).unwrap();
        let item = PlayableItem::try_from(&entry).unwrap();
        assert_eq!(item.id.as_str(), "42");
        assert_eq!(item.source_url.path(), "/metropolis/master.m3u8");
        assert!(item.poster_url.is_some());
    }

    #[test]
    fn test_config_rejects_zero_interval() {
        let config = PlayerConfig {
            progress_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        assert!(PlayerConfig::default().validate().is_ok());
    }
}
