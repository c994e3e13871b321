//! Source Resolver - decides how a media URL reaches the sink
//!
//! Every resolution starts with a cheap reachability probe. Manifest URLs
//! are fetched and parsed into a [`StreamPlan`] when the sink can drive an
//! adaptive session; everything else is handed over as a progressive source.

use crate::{
    abr::{AbrContext, AbrEngine},
    error::Error,
    manifest::{create_parser, detect_manifest_type, Manifest},
    types::{PlayerConfig, Rendition},
    Result,
};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// How the sink should consume a source
#[derive(Debug, Clone)]
pub enum ResolvedSource {
    /// Progressive file assigned straight to the sink
    Direct(Url),
    /// Manifest-based session driven by the platform's streaming engine
    Adaptive(StreamPlan),
}

impl ResolvedSource {
    pub fn url(&self) -> &Url {
        match self {
            ResolvedSource::Direct(url) => url,
            ResolvedSource::Adaptive(plan) => &plan.manifest_url,
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, ResolvedSource::Adaptive(_))
    }
}

/// Everything a streaming session needs to start
#[derive(Debug, Clone)]
pub struct StreamPlan {
    pub manifest_url: Url,
    pub manifest: Manifest,
    /// Rendition to start on; the engine adapts from there
    pub initial_rendition: Rendition,
}

/// Result of the reachability probe
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

/// Asynchronous source resolution, run off the controller's event loop
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, url: &Url, adaptive_supported: bool) -> Result<ResolvedSource>;
}

/// Resolver backed by HTTP probes and manifest fetches
pub struct HttpSourceResolver {
    client: Client,
    abr_context: AbrContext,
}

impl HttpSourceResolver {
    pub fn new(config: &PlayerConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &PlayerConfig) -> Self {
        Self {
            client,
            abr_context: AbrContext {
                max_bitrate: config.max_bitrate,
                start_at_lowest: config.start_at_lowest,
            },
        }
    }

    /// Lightweight existence check. Servers that refuse HEAD get a one-byte
    /// ranged GET instead.
    #[instrument(skip(self))]
    pub async fn probe(&self, url: &Url) -> Result<ProbeOutcome> {
        let unreachable = |reason: String| Error::SourceUnreachable {
            url: url.to_string(),
            reason,
        };

        let mut response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        if matches!(response.status(), StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED) {
            debug!(status = %response.status(), "HEAD refused, probing with ranged GET");
            response = self
                .client
                .get(url.clone())
                .header(header::RANGE, "bytes=0-0")
                .send()
                .await
                .map_err(|e| unreachable(e.to_string()))?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(unreachable(status.to_string()));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ProbeOutcome {
            status: status.as_u16(),
            content_type,
            content_length: response.content_length(),
        })
    }

    /// Fetch the manifest and choose the starting rendition
    #[instrument(skip(self))]
    pub async fn open_stream(&self, url: &Url, manifest_type: crate::manifest::ManifestType) -> Result<StreamPlan> {
        let parser = create_parser(manifest_type, self.client.clone());
        let manifest = parser.parse(url).await?;

        let mut abr = AbrEngine::new();
        abr.record_measurement(manifest.fetched_bytes, manifest.fetch_time);
        let initial_rendition = abr
            .select_rendition(&manifest.renditions, &self.abr_context)
            .cloned()
            .ok_or(Error::NoSuitableRendition)?;

        info!(
            renditions = manifest.renditions.len(),
            is_live = manifest.is_live,
            initial = %initial_rendition.label(),
            "Manifest parsed"
        );

        Ok(StreamPlan {
            manifest_url: url.clone(),
            manifest,
            initial_rendition,
        })
    }
}

#[async_trait]
impl SourceResolver for HttpSourceResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, url: &Url, adaptive_supported: bool) -> Result<ResolvedSource> {
        let probe = self.probe(url).await?;
        debug!(status = probe.status, content_type = ?probe.content_type, "Probe succeeded");

        match detect_manifest_type(url, probe.content_type.as_deref()) {
            Some(manifest_type) if adaptive_supported => {
                let plan = self.open_stream(url, manifest_type).await?;
                Ok(ResolvedSource::Adaptive(plan))
            }
            Some(_) => {
                warn!("Sink has no adaptive engine, assigning manifest directly");
                Ok(ResolvedSource::Direct(url.clone()))
            }
            None => Ok(ResolvedSource::Direct(url.clone())),
        }
    }
}
