//! HLS (HTTP Live Streaming) manifest parser
//!
//! Reads master playlists into a bitrate ladder. A media playlist used as
//! the entry point becomes a single synthetic rendition.

use super::{Manifest, ManifestParser, ManifestType};
use crate::{error::Error, types::*, Result};
use async_trait::async_trait;
use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use url::Url;

const DEFAULT_TARGET_DURATION: Duration = Duration::from_secs(6);

/// HLS manifest parser
pub struct HlsParser {
    client: Client,
}

impl HlsParser {
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Parse an already fetched playlist
    pub fn parse_content(content: &[u8], base_url: &Url) -> Result<Manifest> {
        let playlist = m3u8_rs::parse_playlist_res(content)
            .map_err(|e| Error::ManifestParse(format!("Failed to parse HLS playlist: {:?}", e)))?;

        let manifest = match playlist {
            Playlist::MasterPlaylist(master) => Self::from_master(&master, base_url)?,
            Playlist::MediaPlaylist(media) => Self::from_media(&media, base_url),
        };

        if manifest.renditions.is_empty() {
            return Err(Error::NoSuitableRendition);
        }

        Ok(Manifest {
            fetched_bytes: content.len(),
            ..manifest
        })
    }

    fn from_master(master: &MasterPlaylist, base_url: &Url) -> Result<Manifest> {
        let mut renditions = Vec::with_capacity(master.variants.len());

        // I-frame variants are trick-play only
        for (idx, variant) in master.variants.iter().filter(|v| !v.is_i_frame).enumerate() {
            let uri = resolve_uri(base_url, &variant.uri)?;

            renditions.push(Rendition {
                id: format!("variant_{}", idx),
                bandwidth: variant.bandwidth,
                resolution: variant.resolution.map(|r| Resolution::new(r.width as u32, r.height as u32)),
                frame_rate: variant.frame_rate.map(|f| f as f32),
                video_codec: variant.codecs.as_deref().and_then(parse_video_codec),
                audio_codec: variant.codecs.as_deref().and_then(parse_audio_codec),
                uri,
            });
        }

        renditions.sort_by_key(|r| r.bandwidth);

        Ok(Manifest {
            manifest_type: ManifestType::Hls,
            renditions,
            // Liveness is only known from media playlists
            is_live: false,
            duration: None,
            target_duration: DEFAULT_TARGET_DURATION,
            base_url: base_url.clone(),
            fetched_bytes: 0,
            fetch_time: Duration::ZERO,
        })
    }

    fn from_media(media: &MediaPlaylist, base_url: &Url) -> Manifest {
        let duration = media
            .end_list
            .then(|| Duration::from_secs_f32(media.segments.iter().map(|s| s.duration).sum()));

        let rendition = Rendition {
            id: "default".to_string(),
            bandwidth: 0,
            resolution: None,
            frame_rate: None,
            video_codec: None,
            audio_codec: None,
            uri: base_url.clone(),
        };

        Manifest {
            manifest_type: ManifestType::Hls,
            renditions: vec![rendition],
            is_live: !media.end_list,
            duration,
            target_duration: Duration::from_secs(media.target_duration),
            base_url: base_url.clone(),
            fetched_bytes: 0,
            fetch_time: Duration::ZERO,
        }
    }
}

#[async_trait]
impl ManifestParser for HlsParser {
    #[instrument(skip(self))]
    async fn parse(&self, url: &Url) -> Result<Manifest> {
        debug!("Fetching HLS manifest: {}", url);
        let started = Instant::now();

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::ManifestFetch(e.to_string()))?;

        // Redirects move the base for relative URIs
        let base_url = response.url().clone();

        let content = response
            .bytes()
            .await
            .map_err(|e| Error::ManifestFetch(e.to_string()))?;

        let manifest = Self::parse_content(&content, &base_url)?;
        Ok(Manifest {
            fetch_time: started.elapsed(),
            ..manifest
        })
    }
}

/// Resolve relative URI against base URL
fn resolve_uri(base: &Url, relative: &str) -> Result<Url> {
    base.join(relative)
        .map_err(|e| Error::InvalidManifest(format!("Invalid URI '{}': {}", relative, e)))
}

/// Parse video codec from codecs string
fn parse_video_codec(codecs: &str) -> Option<VideoCodec> {
    let codecs_lower = codecs.to_lowercase();
    if codecs_lower.contains("avc1") || codecs_lower.contains("avc3") {
        Some(VideoCodec::H264)
    } else if codecs_lower.contains("hvc1") || codecs_lower.contains("hev1") {
        Some(VideoCodec::H265)
    } else if codecs_lower.contains("vp09") {
        Some(VideoCodec::Vp9)
    } else if codecs_lower.contains("av01") {
        Some(VideoCodec::Av1)
    } else {
        None
    }
}

/// Parse audio codec from codecs string
fn parse_audio_codec(codecs: &str) -> Option<AudioCodec> {
    let codecs_lower = codecs.to_lowercase();
    if codecs_lower.contains("mp4a.40") {
        Some(AudioCodec::Aac)
    } else if codecs_lower.contains("ec-3") {
        Some(AudioCodec::Eac3)
    } else if codecs_lower.contains("ac-3") {
        Some(AudioCodec::Ac3)
    } else if codecs_lower.contains("opus") {
        Some(AudioCodec::Opus)
    } else {
        None
    }
}
