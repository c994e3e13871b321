//! Recording doubles for the platform capabilities
//!
//! Each double is a cheap clone around shared state, so a host or test can
//! hand one copy to the controller and keep another to inspect calls and
//! steer what the "platform" reports.

use crate::{
    error::Error,
    manifest::{Manifest, ManifestType},
    platform::{DisplayControl, MediaSink, PlaybackNavigator, StreamingSession},
    resolver::{ResolvedSource, SourceResolver, StreamPlan},
    types::{MediaId, Rendition, SessionToken},
    Result,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Every call the controller made on the sink or its streaming session
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    AttachDirect(Url, SessionToken),
    AttachStream(Url, SessionToken),
    Detach,
    Play,
    Pause,
    Seek(f64),
    SetVolume(f64),
    SetMuted(bool),
    SetPlaybackRate(f64),
    StartLoad,
    RecoverMediaError,
    ReleaseStream,
}

#[derive(Debug)]
struct SinkShared {
    calls: Vec<SinkCall>,
    current_time: f64,
    paused: bool,
    adaptive: bool,
    reject_attach: bool,
}

/// Sink that records calls and tracks a simulated playhead
#[derive(Debug, Clone)]
pub struct RecordingSink {
    shared: Arc<Mutex<SinkShared>>,
}

impl RecordingSink {
    pub fn new(adaptive: bool) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SinkShared {
                calls: Vec::new(),
                current_time: 0.0,
                paused: true,
                adaptive,
                reject_attach: false,
            })),
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        lock(&self.shared).calls.clone()
    }

    pub fn count(&self, call: &SinkCall) -> usize {
        lock(&self.shared).calls.iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        lock(&self.shared).calls.clear();
    }

    /// Move the simulated playhead, as if media had played
    pub fn set_time(&self, position: f64) {
        lock(&self.shared).current_time = position;
    }

    pub fn set_paused(&self, paused: bool) {
        lock(&self.shared).paused = paused;
    }

    /// Make the next attaches fail
    pub fn reject_attach(&self, reject: bool) {
        lock(&self.shared).reject_attach = reject;
    }

    fn record(&self, call: SinkCall) {
        lock(&self.shared).calls.push(call);
    }
}

impl MediaSink for RecordingSink {
    fn supports_adaptive(&self) -> bool {
        lock(&self.shared).adaptive
    }

    fn attach_direct(&mut self, url: &Url, token: SessionToken) -> Result<()> {
        let mut shared = lock(&self.shared);
        shared.calls.push(SinkCall::AttachDirect(url.clone(), token));
        if shared.reject_attach {
            return Err(Error::SinkAttach(format!("{url} rejected")));
        }
        shared.current_time = 0.0;
        shared.paused = true;
        Ok(())
    }

    fn attach_stream(&mut self, plan: &StreamPlan, token: SessionToken) -> Result<Box<dyn StreamingSession>> {
        let mut shared = lock(&self.shared);
        shared.calls.push(SinkCall::AttachStream(plan.manifest_url.clone(), token));
        if shared.reject_attach {
            return Err(Error::SinkAttach(format!("{} rejected", plan.manifest_url)));
        }
        shared.current_time = 0.0;
        shared.paused = true;
        Ok(Box::new(RecordingStream { sink: self.clone() }))
    }

    fn detach(&mut self) {
        let mut shared = lock(&self.shared);
        shared.calls.push(SinkCall::Detach);
        shared.paused = true;
    }

    fn play(&mut self) {
        let mut shared = lock(&self.shared);
        shared.calls.push(SinkCall::Play);
        shared.paused = false;
    }

    fn pause(&mut self) {
        let mut shared = lock(&self.shared);
        shared.calls.push(SinkCall::Pause);
        shared.paused = true;
    }

    fn seek(&mut self, position: f64) {
        let mut shared = lock(&self.shared);
        shared.calls.push(SinkCall::Seek(position));
        shared.current_time = position;
    }

    fn set_volume(&mut self, volume: f64) {
        self.record(SinkCall::SetVolume(volume));
    }

    fn set_muted(&mut self, muted: bool) {
        self.record(SinkCall::SetMuted(muted));
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.record(SinkCall::SetPlaybackRate(rate));
    }

    fn current_time(&self) -> f64 {
        lock(&self.shared).current_time
    }

    fn is_paused(&self) -> bool {
        lock(&self.shared).paused
    }
}

/// Streaming session that logs into its sink's call list
#[derive(Debug)]
pub struct RecordingStream {
    sink: RecordingSink,
}

impl StreamingSession for RecordingStream {
    fn start_load(&mut self) {
        self.sink.record(SinkCall::StartLoad);
    }

    fn recover_media_error(&mut self) {
        self.sink.record(SinkCall::RecoverMediaError);
    }

    fn release(&mut self) {
        self.sink.record(SinkCall::ReleaseStream);
    }
}

#[derive(Debug, Default)]
struct DisplayShared {
    fullscreen: bool,
    picture_in_picture: bool,
    deny: bool,
}

/// Display capability with switchable denial
#[derive(Debug, Clone, Default)]
pub struct RecordingDisplay {
    shared: Arc<Mutex<DisplayShared>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every request, like a browser without a user gesture
    pub fn deny_requests(&self, deny: bool) {
        lock(&self.shared).deny = deny;
    }

    pub fn is_fullscreen(&self) -> bool {
        lock(&self.shared).fullscreen
    }

    pub fn is_picture_in_picture(&self) -> bool {
        lock(&self.shared).picture_in_picture
    }

    fn set(&self, apply: impl FnOnce(&mut DisplayShared)) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.deny {
            return Err(Error::Internal("request denied".into()));
        }
        apply(&mut shared);
        Ok(())
    }
}

impl DisplayControl for RecordingDisplay {
    fn request_fullscreen(&mut self) -> Result<()> {
        self.set(|d| d.fullscreen = true)
    }

    fn exit_fullscreen(&mut self) -> Result<()> {
        self.set(|d| d.fullscreen = false)
    }

    fn request_picture_in_picture(&mut self) -> Result<()> {
        self.set(|d| d.picture_in_picture = true)
    }

    fn exit_picture_in_picture(&mut self) -> Result<()> {
        self.set(|d| d.picture_in_picture = false)
    }
}

#[derive(Debug, Default)]
struct NavigatorShared {
    ended: Vec<MediaId>,
    next_calls: usize,
}

/// Catalogue double counting end-of-title callbacks
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    shared: Arc<Mutex<NavigatorShared>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ended(&self) -> Vec<MediaId> {
        lock(&self.shared).ended.clone()
    }

    pub fn next_calls(&self) -> usize {
        lock(&self.shared).next_calls
    }
}

impl PlaybackNavigator for RecordingNavigator {
    fn on_ended(&mut self, media_id: &MediaId) {
        lock(&self.shared).ended.push(media_id.clone());
    }

    fn on_next(&mut self) {
        lock(&self.shared).next_calls += 1;
    }
}

/// Resolver that replays queued outcomes, then falls back to direct sources
#[derive(Default)]
pub struct ScriptedResolver {
    outcomes: Mutex<VecDeque<Result<ResolvedSource>>>,
    delay: Duration,
    calls: Mutex<Vec<Url>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated network latency per resolution
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, outcome: Result<ResolvedSource>) {
        lock(&self.outcomes).push_back(outcome);
    }

    pub fn calls(&self) -> Vec<Url> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl SourceResolver for ScriptedResolver {
    async fn resolve(&self, url: &Url, _adaptive_supported: bool) -> Result<ResolvedSource> {
        lock(&self.calls).push(url.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = lock(&self.outcomes).pop_front();
        next.unwrap_or_else(|| Ok(ResolvedSource::Direct(url.clone())))
    }
}

/// Single-rendition plan for a manifest URL
pub fn stream_plan(manifest_url: &Url) -> StreamPlan {
    let rendition = Rendition {
        id: "default".to_string(),
        bandwidth: 0,
        resolution: None,
        frame_rate: None,
        video_codec: None,
        audio_codec: None,
        uri: manifest_url.clone(),
    };
    StreamPlan {
        manifest_url: manifest_url.clone(),
        manifest: Manifest {
            manifest_type: ManifestType::Hls,
            renditions: vec![rendition.clone()],
            is_live: false,
            duration: None,
            target_duration: Duration::from_secs(6),
            base_url: manifest_url.clone(),
            fetched_bytes: 0,
            fetch_time: Duration::ZERO,
        },
        initial_rendition: rendition,
    }
}

/// Resolver failure reported by an unreachable source
pub fn unreachable(url: &Url) -> Error {
    Error::SourceUnreachable {
        url: url.to_string(),
        reason: "404 Not Found".to_string(),
    }
}
