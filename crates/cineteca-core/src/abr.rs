//! Adaptive Bitrate (ABR) selection for the initial rendition
//!
//! The streaming engine adapts during playback; the controller only picks
//! where to start and enforces the configured bitrate cap.

use crate::types::Rendition;
use std::time::Duration;
use tracing::{debug, instrument};

/// Fraction of the estimated throughput a rendition may consume
const SAFETY_FACTOR: f64 = 0.8;

/// EWMA weight given to the newest sample
const EWMA_ALPHA: f64 = 0.2;

/// Bandwidth measurement sample
#[derive(Debug, Clone)]
pub struct BandwidthMeasurement {
    /// Bytes downloaded
    pub bytes: usize,
    /// Time taken
    pub duration: Duration,
}

impl BandwidthMeasurement {
    /// Calculate throughput in bits per second
    pub fn throughput_bps(&self) -> u64 {
        if self.duration.as_secs_f64() > 0.0 {
            ((self.bytes as f64 * 8.0) / self.duration.as_secs_f64()) as u64
        } else {
            0
        }
    }
}

/// Context for ABR decisions
#[derive(Debug, Clone, Default)]
pub struct AbrContext {
    /// Maximum allowed bitrate (0 = unlimited)
    pub max_bitrate: u64,
    /// Ignore the estimate and start at the bottom of the ladder
    pub start_at_lowest: bool,
}

/// Throughput-based rendition selection
#[derive(Debug)]
pub struct AbrEngine {
    bandwidth_estimate: u64,
}

impl AbrEngine {
    pub fn new() -> Self {
        Self { bandwidth_estimate: 0 }
    }

    /// Record a bandwidth measurement
    #[instrument(skip(self))]
    pub fn record_measurement(&mut self, bytes: usize, duration: Duration) {
        let sample = BandwidthMeasurement { bytes, duration }.throughput_bps();
        if sample == 0 {
            return;
        }

        self.bandwidth_estimate = if self.bandwidth_estimate == 0 {
            sample
        } else {
            ((self.bandwidth_estimate as f64 * (1.0 - EWMA_ALPHA)) + (sample as f64 * EWMA_ALPHA)) as u64
        };

        debug!(
            throughput_mbps = sample as f64 / 1_000_000.0,
            estimate_mbps = self.bandwidth_estimate as f64 / 1_000_000.0,
            "Bandwidth measurement recorded"
        );
    }

    /// Select the starting rendition from a ladder sorted by bandwidth
    pub fn select_rendition<'a>(&self, renditions: &'a [Rendition], context: &AbrContext) -> Option<&'a Rendition> {
        let lowest = renditions.first()?;
        if context.start_at_lowest {
            return Some(lowest);
        }

        let capped = |r: &&Rendition| context.max_bitrate == 0 || r.bandwidth <= context.max_bitrate;

        let selected = if self.bandwidth_estimate == 0 {
            // No sample yet: the middle of the allowed ladder is a safe start
            let allowed: Vec<&Rendition> = renditions.iter().filter(capped).collect();
            allowed.get(allowed.len().saturating_sub(1) / 2).copied()
        } else {
            let budget = (self.bandwidth_estimate as f64 * SAFETY_FACTOR) as u64;
            renditions
                .iter()
                .filter(capped)
                .filter(|r| r.bandwidth <= budget)
                .next_back()
        };

        let selected = selected.unwrap_or(lowest);
        debug!(
            selected_id = %selected.id,
            bandwidth = selected.bandwidth,
            estimate = self.bandwidth_estimate,
            "Rendition selected"
        );
        Some(selected)
    }

    /// Get current bandwidth estimate
    pub fn bandwidth_estimate(&self) -> u64 {
        self.bandwidth_estimate
    }
}

impl Default for AbrEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Resolution;
    use url::Url;

    fn ladder() -> Vec<Rendition> {
        [(400_000, 240), (1_400_000, 480), (2_800_000, 720), (5_000_000, 1080)]
            .into_iter()
            .map(|(bandwidth, height)| Rendition {
                id: format!("{height}p"),
                bandwidth,
                resolution: Some(Resolution::new(height * 16 / 9, height)),
                frame_rate: None,
                video_codec: None,
                audio_codec: None,
                uri: Url::parse(&format!("https://cdn.example.com/{height}p.m3u8")).unwrap(),
            })
            .collect()
    }

    #[test]
    fn test_throughput_selection() {
        let mut abr = AbrEngine::new();
        // 4 Mbps measured -> 3.2 Mbps budget -> 720p
        abr.record_measurement(500_000, Duration::from_secs(1));
        let renditions = ladder();
        let selected = abr.select_rendition(&renditions, &AbrContext::default()).unwrap();
        assert_eq!(selected.id, "720p");
    }

    #[test]
    fn test_bitrate_cap_and_no_estimate() {
        let abr = AbrEngine::new();
        let renditions = ladder();
        let context = AbrContext {
            max_bitrate: 1_500_000,
            start_at_lowest: false,
        };
        // Allowed: 240p, 480p -> middle is 240p
        assert_eq!(abr.select_rendition(&renditions, &context).unwrap().id, "240p");
        let uncapped = abr.select_rendition(&renditions, &AbrContext::default()).unwrap();
        assert_eq!(uncapped.id, "480p");
    }

    #[test]
    fn test_estimate_blends_samples() {
        let mut abr = AbrEngine::new();
        abr.record_measurement(0, Duration::from_secs(1));
        assert_eq!(abr.bandwidth_estimate(), 0);

        abr.record_measurement(500_000, Duration::from_secs(1));
        assert_eq!(abr.bandwidth_estimate(), 4_000_000);
        // 0.8 * 4 Mbps + 0.2 * 1 Mbps
        abr.record_measurement(125_000, Duration::from_secs(1));
        let blended = abr.bandwidth_estimate();
        assert!(blended.abs_diff(3_400_000) <= 1);
        // Zero-length timings carry no information
        abr.record_measurement(125_000, Duration::ZERO);
        assert_eq!(abr.bandwidth_estimate(), blended);
    }

    #[test]
    fn test_slow_network_falls_back_to_lowest() {
        let mut abr = AbrEngine::new();
        abr.record_measurement(10_000, Duration::from_secs(1));
        let renditions = ladder();
        assert_eq!(abr.select_rendition(&renditions, &AbrContext::default()).unwrap().id, "240p");
        assert!(abr.select_rendition(&[], &AbrContext::default()).is_none());
    }
}
