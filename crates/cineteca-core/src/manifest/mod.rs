//! Manifest detection and parsing for adaptive sources

mod hls;

pub use hls::HlsParser;

use crate::{Rendition, Result};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Manifest types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestType {
    Hls,
}

/// Parsed manifest data
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Type of manifest
    pub manifest_type: ManifestType,
    /// Bitrate ladder, sorted by bandwidth ascending
    pub renditions: Vec<Rendition>,
    /// Is this a live stream
    pub is_live: bool,
    /// Total duration (for VOD media playlists)
    pub duration: Option<Duration>,
    /// Target segment duration
    pub target_duration: Duration,
    /// Base URL for resolving relative URIs
    pub base_url: Url,
    /// Size of the fetched document, used as the first throughput sample
    pub fetched_bytes: usize,
    /// Time spent fetching the document
    pub fetch_time: Duration,
}

/// Trait for manifest parsers
#[async_trait]
pub trait ManifestParser: Send + Sync {
    /// Fetch and parse a manifest from URL
    async fn parse(&self, url: &Url) -> Result<Manifest>;
}

/// Detect manifest type from URL or the probe's content type.
/// `None` means the source is a progressive file.
pub fn detect_manifest_type(url: &Url, content_type: Option<&str>) -> Option<ManifestType> {
    let path = url.path().to_lowercase();
    if path.ends_with(".m3u8") || path.ends_with(".m3u") {
        return Some(ManifestType::Hls);
    }

    if let Some(content_type) = content_type {
        let mime = content_type.split(';').next().unwrap_or("").trim().to_lowercase();
        if mime == "application/vnd.apple.mpegurl" || mime == "application/x-mpegurl" || mime == "audio/mpegurl" {
            return Some(ManifestType::Hls);
        }
    }

    None
}

/// Create appropriate parser for a manifest type
pub fn create_parser(manifest_type: ManifestType, client: reqwest::Client) -> Box<dyn ManifestParser> {
    match manifest_type {
        ManifestType::Hls => Box::new(HlsParser::with_client(client)),
    }
}
