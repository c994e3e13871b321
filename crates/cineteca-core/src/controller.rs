//! Playback State Machine
//!
//! [`Controller`] is the single owner of the sink and of the active
//! [`PlaybackSession`]. Every input (loads, commands, raw input, sink events,
//! resolver results) arrives as an [`Event`] through [`Controller::handle`],
//! and every timer through [`Controller::fire_due`]. Nothing else mutates
//! playback state, so the transitions below are the whole story:
//!
//! ```text
//! Idle ──load──▶ Loading ──ready──▶ Ready ──autoplay/play──▶ Playing ◀──▶ Paused
//!                  ▲  │                                        │  ▲
//!     retry/backoff│  │unreachable / exhausted         waiting │  │ playing
//!                  │  ▼                                        ▼  │
//!                 Error ◀───────── fatal fault, budget spent ── Buffering
//! ```
//!
//! The controller is synchronous. Async work (source resolution) is
//! requested through [`Effect`]s and comes back as [`Event::Resolved`].

use crate::{
    error::{Notice, PlaybackFault},
    input::{Command, InputEvent, InputRouter, RouteContext},
    persist::ProgressPersister,
    platform::{
        DisplayControl, MediaErrorCode, MediaSink, PlaybackNavigator, SinkEvent, StreamingError,
        StreamingErrorKind, StreamingSession,
    },
    resolver::ResolvedSource,
    store::PlaybackStore,
    timers::{TimerKind, TimerSet},
    types::{MediaId, Overlay, PlayableItem, PlaybackRate, PlaybackSettings, PlaybackState, PlayerConfig, SessionToken},
    Result,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// Position deltas below this are treated as "no progress"
const STALL_EPSILON: f64 = 0.001;

/// Everything the controller reacts to
#[derive(Debug)]
pub enum Event {
    /// Tear down the current session and start a new one
    Load(PlayableItem),
    /// A command from a controls surface
    Command(Command),
    /// Raw keyboard, pointer or touch input
    Input(InputEvent),
    /// Lifecycle event from the sink, tagged with the attach generation
    Sink { token: SessionToken, event: SinkEvent },
    /// Outcome of an [`Effect::Resolve`] request
    Resolved {
        token: SessionToken,
        result: Result<ResolvedSource>,
    },
    /// Tear down without loading anything else
    Unload,
    /// Tear down and stop the runtime driving this controller
    Shutdown,
}

/// Async work requested by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Resolve `url`, answering with `Event::Resolved { token, .. }`
    Resolve {
        token: SessionToken,
        url: Url,
        adaptive: bool,
    },
    /// Abandon any in-flight resolution
    CancelResolve,
}

/// Derived UI state published to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub media_id: Option<MediaId>,
    pub source_url: Option<Url>,
    #[serde(flatten)]
    pub state: PlaybackState,
    pub position: f64,
    pub duration: Option<f64>,
    pub volume: f64,
    pub muted: bool,
    pub playback_rate: PlaybackRate,
    pub autoplay: bool,
    /// Recovery attempts spent on the current item. Cleared only when the
    /// sink confirms playback with `Playing`, so a commanded play after a
    /// retry can briefly show `Playing` with a non-zero count.
    pub retry_count: u32,
    pub is_fullscreen: bool,
    pub is_picture_in_picture: bool,
    pub controls_visible: bool,
    pub overlay: Option<Overlay>,
    pub notice: Option<Notice>,
    pub adaptive: bool,
    /// Starting rendition of an adaptive session
    pub rendition: Option<String>,
}

/// One loaded item
struct PlaybackSession {
    item: PlayableItem,
    token: SessionToken,
    state: PlaybackState,
    position: f64,
    duration: Option<f64>,
    retry_count: u32,
    source: Option<ResolvedSource>,
    streaming: Option<Box<dyn StreamingSession>>,
    attached: bool,
    /// Start playing as soon as the sink is ready, regardless of autoplay
    play_on_ready: bool,
    /// Seek target applied once the sink is ready
    resume_at: Option<f64>,
    last_sample: Option<f64>,
    controls_visible: bool,
    overlay: Option<Overlay>,
    notice: Option<Notice>,
    timers: TimerSet,
}

impl PlaybackSession {
    fn new(item: PlayableItem, token: SessionToken, resume_at: Option<f64>) -> Self {
        Self {
            item,
            token,
            state: PlaybackState::Idle,
            position: 0.0,
            duration: None,
            retry_count: 0,
            source: None,
            streaming: None,
            attached: false,
            play_on_ready: false,
            resume_at,
            last_sample: None,
            controls_visible: true,
            overlay: None,
            notice: None,
            timers: TimerSet::new(),
        }
    }

    fn clamp_position(&self, t: f64) -> f64 {
        let t = t.max(0.0);
        match self.duration {
            Some(d) => t.min(d),
            None => t,
        }
    }
}

/// The playback controller
pub struct Controller {
    config: PlayerConfig,
    sink: Box<dyn MediaSink>,
    display: Box<dyn DisplayControl>,
    navigator: Option<Box<dyn PlaybackNavigator>>,
    router: InputRouter,
    persister: ProgressPersister,
    settings: PlaybackSettings,
    muted: bool,
    /// Volume restored when unmuting from zero
    last_audible_volume: f64,
    is_fullscreen: bool,
    is_picture_in_picture: bool,
    session: Option<PlaybackSession>,
    last_token: SessionToken,
    effects: Vec<Effect>,
}

impl Controller {
    pub fn new(
        config: PlayerConfig,
        sink: Box<dyn MediaSink>,
        display: Box<dyn DisplayControl>,
        store: Arc<dyn PlaybackStore>,
    ) -> Self {
        let persister = ProgressPersister::new(store);
        let settings = persister.load_settings();
        let router = InputRouter::new(&config);

        Self {
            config,
            sink,
            display,
            navigator: None,
            router,
            persister,
            muted: settings.volume == 0.0,
            last_audible_volume: if settings.volume > 0.0 { settings.volume } else { 1.0 },
            settings,
            is_fullscreen: false,
            is_picture_in_picture: false,
            session: None,
            last_token: SessionToken::default(),
            effects: Vec::new(),
        }
    }

    pub fn with_navigator(mut self, navigator: Box<dyn PlaybackNavigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    /// Current state; `Idle` when nothing is loaded
    pub fn state(&self) -> PlaybackState {
        self.session
            .as_ref()
            .map(|s| s.state.clone())
            .unwrap_or(PlaybackState::Idle)
    }

    pub fn retry_count(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.retry_count)
    }

    /// Attach generation of the active session
    pub fn token(&self) -> Option<SessionToken> {
        self.session.as_ref().map(|s| s.token)
    }

    pub fn is_timer_armed(&self, kind: TimerKind) -> bool {
        self.session.as_ref().is_some_and(|s| s.timers.is_armed(kind))
    }

    /// Earliest pending timer of the active session
    pub fn next_deadline(&self) -> Option<Instant> {
        self.session.as_ref().and_then(|s| s.timers.next_deadline())
    }

    /// Drain the async work requested since the last call
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let session = self.session.as_ref();
        PlayerSnapshot {
            media_id: session.map(|s| s.item.id.clone()),
            source_url: session.map(|s| s.item.source_url.clone()),
            state: self.state(),
            position: session.map_or(0.0, |s| s.position),
            duration: session.and_then(|s| s.duration),
            volume: self.settings.volume,
            muted: self.muted,
            playback_rate: self.settings.playback_rate,
            autoplay: self.settings.autoplay,
            retry_count: self.retry_count(),
            is_fullscreen: self.is_fullscreen,
            is_picture_in_picture: self.is_picture_in_picture,
            controls_visible: session.map_or(true, |s| s.controls_visible),
            overlay: session.and_then(|s| s.overlay),
            notice: session.and_then(|s| s.notice),
            adaptive: session.is_some_and(|s| s.source.as_ref().is_some_and(ResolvedSource::is_adaptive)),
            rendition: session.and_then(|s| match &s.source {
                Some(ResolvedSource::Adaptive(plan)) => Some(plan.initial_rendition.label()),
                _ => None,
            }),
        }
    }

    /// Apply one event
    pub fn handle(&mut self, event: Event, now: Instant) {
        match event {
            Event::Load(item) => self.load(item, now),
            Event::Command(command) => {
                if command != Command::ToggleControls {
                    self.note_activity(now);
                }
                self.apply(command, now);
            }
            Event::Input(input) => self.route_input(&input, now),
            Event::Sink { token, event } => self.on_sink_event(token, event, now),
            Event::Resolved { token, result } => self.on_resolved(token, result, now),
            Event::Unload | Event::Shutdown => self.teardown(),
        }
    }

    /// Run every timer due at `now`
    pub fn fire_due(&mut self, now: Instant) {
        let due = match self.session.as_mut() {
            Some(session) => session.timers.take_due(now),
            None => return,
        };
        for kind in due {
            match kind {
                TimerKind::RetryBackoff => self.on_retry_backoff(),
                TimerKind::BufferingSample => self.on_buffering_sample(now),
                TimerKind::ControlsHide => self.on_controls_hide(),
                TimerKind::ProgressPersist => self.on_progress_tick(now),
            }
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    fn load(&mut self, item: PlayableItem, now: Instant) {
        self.teardown();

        self.last_token = self.last_token.next();
        let resume_at = self.persister.restore(&item.id);
        info!(media_id = %item.id, url = %item.source_url, token = %self.last_token, "Loading item");

        self.session = Some(PlaybackSession::new(item, self.last_token, resume_at));
        self.transition(PlaybackState::Loading, now);
        self.request_resolve();
    }

    /// Release everything the active session holds. Timers die with it.
    pub fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if session.state.persists_progress() && session.attached {
            let position = session.clamp_position(self.sink.current_time());
            self.persister.write(&session.item.id, position);
        }
        session.timers.cancel_all();
        if let Some(mut streaming) = session.streaming.take() {
            streaming.release();
        }
        if session.attached {
            self.sink.detach();
        }
        self.effects.push(Effect::CancelResolve);
        debug!(media_id = %session.item.id, token = %session.token, "Session torn down");
    }

    fn request_resolve(&mut self) {
        let adaptive = self.sink.supports_adaptive();
        if let Some(session) = self.session.as_ref() {
            self.effects.push(Effect::Resolve {
                token: session.token,
                url: session.item.source_url.clone(),
                adaptive,
            });
        }
    }

    /// Drop the current attach and start a new generation
    fn detach_source(&mut self) {
        self.last_token = self.last_token.next();
        let token = self.last_token;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(mut streaming) = session.streaming.take() {
            streaming.release();
        }
        if session.attached {
            self.sink.detach();
            session.attached = false;
        }
        session.source = None;
        session.token = token;
    }

    fn on_resolved(&mut self, token: SessionToken, result: Result<ResolvedSource>, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.token != token || session.state != PlaybackState::Loading || session.attached {
            debug!(%token, current = %session.token, "Dropping stale resolution");
            return;
        }

        let source = match result {
            Ok(source) => source,
            Err(e) => {
                let fault = e.to_fault();
                warn!(error = %e, code = e.error_code(), "Source resolution failed");
                if fault.is_retryable() {
                    self.fail(fault, now);
                } else {
                    self.enter_error(fault, now);
                }
                return;
            }
        };

        let attached = match &source {
            ResolvedSource::Direct(url) => self.sink.attach_direct(url, token).map(|()| None),
            ResolvedSource::Adaptive(plan) => self.sink.attach_stream(plan, token).map(Some),
        };

        match attached {
            Ok(streaming) => {
                info!(url = %source.url(), adaptive = source.is_adaptive(), %token, "Source attached");
                session.streaming = streaming;
                session.source = Some(source);
                session.attached = true;
                self.apply_audio();
            }
            Err(e) => {
                warn!(error = %e, "Sink rejected source");
                self.fail(e.to_fault(), now);
            }
        }
    }

    // ------------------------------------------------------------------
    // State transitions
    // ------------------------------------------------------------------

    /// Move to `target` if the edge is legal. Returns whether it moved.
    fn transition(&mut self, target: PlaybackState, now: Instant) -> bool {
        let current_time = self.sink.current_time();
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        let from = session.state.clone();
        if from == target {
            return false;
        }
        if !from.can_transition_to(&target) {
            warn!(from = %from, to = %target, "Rejected state transition");
            return false;
        }

        info!(from = %from, to = %target, media_id = %session.item.id, "State transition");
        session.state = target;

        let state = &session.state;
        let timers = &mut session.timers;

        if state.persists_progress() {
            timers.arm_if_idle(TimerKind::ProgressPersist, now, self.config.progress_interval());
        } else {
            timers.cancel(TimerKind::ProgressPersist);
        }

        match state {
            PlaybackState::Playing | PlaybackState::Buffering => {
                if !timers.is_armed(TimerKind::BufferingSample) {
                    session.last_sample = Some(current_time);
                    timers.arm(TimerKind::BufferingSample, now, self.config.buffering_sample_interval());
                }
            }
            _ => timers.cancel(TimerKind::BufferingSample),
        }

        if *state != PlaybackState::Loading {
            timers.cancel(TimerKind::RetryBackoff);
        }

        if *state != PlaybackState::Playing {
            session.controls_visible = true;
        }
        self.sync_controls_timer(now);
        true
    }

    /// Generic fault path: bounded delayed retry, then a terminal error
    fn fail(&mut self, fault: PlaybackFault, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state.is_error() {
            return;
        }

        if session.retry_count >= self.config.max_retries {
            let fault = PlaybackFault::Playback(format!(
                "gave up after {} retries: {fault}",
                session.retry_count
            ));
            self.enter_error(fault, now);
            return;
        }

        session.retry_count += 1;
        session.play_on_ready |= matches!(session.state, PlaybackState::Playing | PlaybackState::Buffering);
        if session.attached && session.position > 0.0 {
            session.resume_at = Some(session.position);
        }
        warn!(
            fault = %fault,
            retry = session.retry_count,
            max = self.config.max_retries,
            "Playback fault, retrying"
        );

        self.detach_source();
        self.transition(PlaybackState::Loading, now);
        if let Some(session) = self.session.as_mut() {
            session
                .timers
                .arm(TimerKind::RetryBackoff, now, self.config.retry_delay());
        }
    }

    fn enter_error(&mut self, fault: PlaybackFault, now: Instant) {
        error!(code = fault.code(), fault = %fault, "Playback failed");
        self.detach_source();
        if let Some(session) = self.session.as_mut() {
            session.timers.cancel_all();
        }
        self.transition(PlaybackState::Error(fault), now);
    }

    /// In-place recovery on the streaming session, charged to the same budget
    fn recover_stream(&mut self, error: StreamingError, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let fault = match error.kind {
            StreamingErrorKind::Network => PlaybackFault::StreamingNetwork(error.details),
            StreamingErrorKind::Media => PlaybackFault::StreamingMedia(error.details),
            StreamingErrorKind::Other => PlaybackFault::Playback(error.details),
        };

        if matches!(fault, PlaybackFault::Playback(_)) {
            self.fail(fault, now);
            return;
        }
        let Some(streaming) = session.streaming.as_mut() else {
            self.fail(fault, now);
            return;
        };
        if session.retry_count >= self.config.max_retries {
            let fault = PlaybackFault::Playback(format!(
                "gave up after {} retries: {fault}",
                session.retry_count
            ));
            self.enter_error(fault, now);
            return;
        }

        session.retry_count += 1;
        warn!(
            fault = %fault,
            retry = session.retry_count,
            max = self.config.max_retries,
            "Recovering streaming session in place"
        );
        match error.kind {
            StreamingErrorKind::Network => streaming.start_load(),
            _ => streaming.recover_media_error(),
        }
    }

    fn on_ready(&mut self, now: Instant) {
        if !self.transition(PlaybackState::Ready, now) {
            return;
        }
        let autoplay = self.settings.autoplay;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let Some(at) = session.resume_at.take() {
            let at = session.clamp_position(at);
            debug!(position = at, "Resuming from saved position");
            session.position = at;
            session.last_sample = Some(at);
            self.sink.seek(at);
        }

        if std::mem::take(&mut session.play_on_ready) || autoplay {
            self.start_playback(now);
        }
    }

    fn start_playback(&mut self, now: Instant) {
        self.sink.play();
        if self.transition(PlaybackState::Playing, now) {
            if let Some(session) = self.session.as_mut() {
                session.notice = None;
            }
        }
    }

    fn pause_playback(&mut self, now: Instant) {
        self.sink.pause();
        self.transition(PlaybackState::Paused, now);
    }

    fn clear_buffering(&mut self, now: Instant) {
        let target = if self.sink.is_paused() {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        };
        self.transition(target, now);
    }

    fn on_ended(&mut self, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let media_id = session.item.id.clone();
        session.position = session.duration.unwrap_or(session.position);
        self.persister.write(&media_id, 0.0);

        if !self.transition(PlaybackState::Idle, now) {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.timers.cancel_all();
        }
        info!(media_id = %media_id, "Playback ended");
        if let Some(navigator) = self.navigator.as_mut() {
            navigator.on_ended(&media_id);
            navigator.on_next();
        }
    }

    // ------------------------------------------------------------------
    // Sink events
    // ------------------------------------------------------------------

    fn on_sink_event(&mut self, token: SessionToken, event: SinkEvent, now: Instant) {
        // Presentation changes belong to the player, not to an attach
        match event {
            SinkEvent::FullscreenChanged { active } => {
                self.is_fullscreen = active;
                return;
            }
            SinkEvent::PictureInPictureChanged { active } => {
                self.is_picture_in_picture = active;
                return;
            }
            _ => {}
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.token != token || !session.attached {
            debug!(%token, current = %session.token, ?event, "Dropping stale sink event");
            return;
        }

        match event {
            SinkEvent::LoadedMetadata { duration } => {
                if let Some(d) = duration.filter(|d| d.is_finite() && *d > 0.0) {
                    session.duration = Some(d);
                }
                if session.state == PlaybackState::Loading {
                    self.on_ready(now);
                }
            }
            SinkEvent::CanPlay => match session.state {
                PlaybackState::Loading => self.on_ready(now),
                PlaybackState::Buffering => self.clear_buffering(now),
                _ => {}
            },
            SinkEvent::Playing => {
                if session.retry_count > 0 {
                    info!(retries = session.retry_count, "Playback recovered");
                }
                session.retry_count = 0;
                session.notice = None;
                if matches!(
                    session.state,
                    PlaybackState::Ready | PlaybackState::Paused | PlaybackState::Buffering
                ) {
                    self.transition(PlaybackState::Playing, now);
                }
            }
            SinkEvent::Waiting => {
                if matches!(session.state, PlaybackState::Playing | PlaybackState::Paused) {
                    self.transition(PlaybackState::Buffering, now);
                }
            }
            SinkEvent::Pause => {
                if matches!(session.state, PlaybackState::Playing | PlaybackState::Buffering) {
                    self.transition(PlaybackState::Paused, now);
                }
            }
            SinkEvent::TimeUpdate { position } => {
                if position.is_finite() {
                    session.position = session.clamp_position(position);
                }
            }
            SinkEvent::DurationChange { duration } => {
                if duration.is_finite() && duration > 0.0 {
                    session.duration = Some(duration);
                    session.position = session.clamp_position(session.position);
                }
            }
            SinkEvent::Ended => {
                if matches!(session.state, PlaybackState::Playing | PlaybackState::Buffering) {
                    self.on_ended(now);
                }
            }
            SinkEvent::Error { code, message } => {
                let fault = match code {
                    MediaErrorCode::Network => PlaybackFault::StreamingNetwork(message),
                    MediaErrorCode::Decode => PlaybackFault::StreamingMedia(message),
                    MediaErrorCode::Aborted | MediaErrorCode::SourceNotSupported => {
                        PlaybackFault::Playback(format!("{code:?}: {message}"))
                    }
                };
                self.fail(fault, now);
            }
            SinkEvent::PlayRejected => {
                if matches!(session.state, PlaybackState::Ready | PlaybackState::Playing) {
                    info!("Autoplay rejected by platform");
                    session.notice = Some(Notice::AutoplayRejected);
                    session.play_on_ready = false;
                    self.sink.pause();
                    self.transition(PlaybackState::Paused, now);
                }
            }
            SinkEvent::Streaming(error) if !error.fatal => {
                debug!(kind = ?error.kind, details = %error.details, "Non-fatal streaming error");
            }
            SinkEvent::Streaming(error) => self.recover_stream(error, now),
            SinkEvent::FullscreenChanged { .. } | SinkEvent::PictureInPictureChanged { .. } => {}
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn on_retry_backoff(&mut self) {
        if self.session.as_ref().is_some_and(|s| s.state == PlaybackState::Loading) {
            debug!("Retry backoff elapsed, resolving again");
            self.request_resolve();
        }
    }

    fn on_buffering_sample(&mut self, now: Instant) {
        let current = self.sink.current_time();
        let sink_paused = self.sink.is_paused();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let advanced = session
            .last_sample
            .map_or(true, |prev| (current - prev).abs() > STALL_EPSILON);
        session.last_sample = Some(current);
        session.position = session.clamp_position(current);

        match session.state {
            PlaybackState::Playing if !advanced && !sink_paused => {
                debug!(position = current, "Position stalled, buffering");
                self.transition(PlaybackState::Buffering, now);
            }
            PlaybackState::Buffering if advanced => self.clear_buffering(now),
            _ => {}
        }

        if let Some(session) = self.session.as_mut() {
            if matches!(session.state, PlaybackState::Playing | PlaybackState::Buffering) {
                session
                    .timers
                    .arm_if_idle(TimerKind::BufferingSample, now, self.config.buffering_sample_interval());
            }
        }
    }

    fn on_controls_hide(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.state == PlaybackState::Playing && session.overlay.is_none() {
                session.controls_visible = false;
            }
        }
    }

    fn on_progress_tick(&mut self, now: Instant) {
        let current = self.sink.current_time();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.state.persists_progress() || !session.attached {
            return;
        }
        session.position = session.clamp_position(current);
        self.persister.write(&session.item.id, session.position);
        session
            .timers
            .arm(TimerKind::ProgressPersist, now, self.config.progress_interval());
    }

    // ------------------------------------------------------------------
    // Controls visibility
    // ------------------------------------------------------------------

    fn note_activity(&mut self, now: Instant) {
        if let Some(session) = self.session.as_mut() {
            session.controls_visible = true;
            // Restart the idle countdown
            session.timers.cancel(TimerKind::ControlsHide);
        }
        self.sync_controls_timer(now);
    }

    fn sync_controls_timer(&mut self, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.overlay.is_some() {
            session.controls_visible = true;
        }
        let auto_hide =
            session.state == PlaybackState::Playing && session.overlay.is_none() && session.controls_visible;
        if auto_hide {
            session
                .timers
                .arm_if_idle(TimerKind::ControlsHide, now, self.config.controls_hide_delay());
        } else {
            session.timers.cancel(TimerKind::ControlsHide);
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn route_context(&self) -> RouteContext {
        let session = self.session.as_ref();
        RouteContext {
            position: session.map_or(0.0, |s| s.position),
            duration: session.and_then(|s| s.duration),
            volume: self.settings.volume,
        }
    }

    fn route_input(&mut self, input: &InputEvent, now: Instant) {
        let ctx = self.route_context();
        let command = self.router.route(input, &ctx);
        // Raw touch samples are not activity until they classify; a tap
        // must reach ToggleControls with the visibility it started from.
        let is_activity = match input {
            InputEvent::Touch(_) => command.is_some_and(|c| c != Command::ToggleControls),
            _ => command != Some(Command::ToggleControls),
        };
        if is_activity {
            self.note_activity(now);
        }
        if let Some(command) = command {
            self.apply(command, now);
        }
    }

    fn apply(&mut self, command: Command, now: Instant) {
        debug!(?command, "Applying command");
        match command {
            Command::TogglePlay => match self.state() {
                PlaybackState::Playing | PlaybackState::Buffering => self.pause_playback(now),
                PlaybackState::Ready | PlaybackState::Paused => self.start_playback(now),
                PlaybackState::Loading => self.set_play_on_ready(|p| !p),
                other => debug!(state = %other, "Toggle play ignored"),
            },
            Command::Play => match self.state() {
                PlaybackState::Ready | PlaybackState::Paused => self.start_playback(now),
                PlaybackState::Loading => self.set_play_on_ready(|_| true),
                _ => {}
            },
            Command::Pause => match self.state() {
                PlaybackState::Playing | PlaybackState::Buffering => self.pause_playback(now),
                PlaybackState::Loading => self.set_play_on_ready(|_| false),
                _ => {}
            },
            Command::SeekBy(delta) => {
                let base = self.sink.current_time();
                self.seek_to(base + delta);
            }
            Command::SeekTo(t) => self.seek_to(t),
            Command::SetVolume(v) => self.set_volume(v),
            Command::ToggleMute => self.toggle_mute(),
            Command::ToggleFullscreen => self.toggle_fullscreen(),
            Command::TogglePictureInPicture => self.toggle_picture_in_picture(),
            Command::SetPlaybackRate(rate) => {
                self.settings.playback_rate = rate;
                self.sink.set_playback_rate(rate.as_f64());
                self.persister.save_settings(&self.settings);
            }
            Command::ToggleControls => {
                if let Some(session) = self.session.as_mut() {
                    session.controls_visible = !session.controls_visible;
                }
                self.sync_controls_timer(now);
            }
            Command::ToggleOverlay(overlay) => {
                if let Some(session) = self.session.as_mut() {
                    session.overlay = if session.overlay == Some(overlay) {
                        None
                    } else {
                        Some(overlay)
                    };
                }
                self.sync_controls_timer(now);
            }
            Command::CloseOverlay => {
                if let Some(session) = self.session.as_mut() {
                    session.overlay = None;
                }
                self.sync_controls_timer(now);
            }
            Command::SetAutoplay(autoplay) => {
                self.settings.autoplay = autoplay;
                self.persister.save_settings(&self.settings);
            }
            Command::Retry => self.retry(now),
        }
    }

    fn set_play_on_ready(&mut self, f: impl FnOnce(bool) -> bool) {
        if let Some(session) = self.session.as_mut() {
            session.play_on_ready = f(session.play_on_ready);
        }
    }

    fn retry(&mut self, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.state.is_error() {
            debug!(state = %session.state, "Retry ignored outside error state");
            return;
        }
        session.retry_count = 0;
        session.play_on_ready = true;
        info!(media_id = %session.item.id, "Retrying after error");
        self.detach_source();
        self.transition(PlaybackState::Loading, now);
        self.request_resolve();
    }

    fn seek_to(&mut self, t: f64) {
        if !t.is_finite() {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.state.accepts_seek() {
            debug!(state = %session.state, "Seek ignored");
            return;
        }
        let target = session.clamp_position(t);
        session.position = target;
        session.last_sample = Some(target);
        self.sink.seek(target);
    }

    fn set_volume(&mut self, volume: f64) {
        if !volume.is_finite() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.settings.volume = volume;
        self.muted = volume == 0.0;
        if volume > 0.0 {
            self.last_audible_volume = volume;
        }
        self.sink.set_volume(volume);
        self.sink.set_muted(self.muted);
        self.persister.save_settings(&self.settings);
    }

    fn toggle_mute(&mut self) {
        if self.muted && self.settings.volume == 0.0 {
            // Unmuting from zero brings back the last audible level
            self.set_volume(self.last_audible_volume);
            return;
        }
        self.muted = !self.muted;
        self.sink.set_muted(self.muted);
    }

    fn toggle_fullscreen(&mut self) {
        let result = if self.is_fullscreen {
            self.display.exit_fullscreen()
        } else {
            self.display.request_fullscreen()
        };
        match result {
            Ok(()) => self.is_fullscreen = !self.is_fullscreen,
            Err(e) => warn!(error = %e, "Fullscreen request failed"),
        }
    }

    fn toggle_picture_in_picture(&mut self) {
        let result = if self.is_picture_in_picture {
            self.display.exit_picture_in_picture()
        } else {
            self.display.request_picture_in_picture()
        };
        match result {
            Ok(()) => self.is_picture_in_picture = !self.is_picture_in_picture,
            Err(e) => warn!(error = %e, "Picture-in-picture request failed"),
        }
    }

    fn apply_audio(&mut self) {
        self.sink.set_volume(self.settings.volume);
        self.sink.set_muted(self.muted);
        self.sink.set_playback_rate(self.settings.playback_rate.as_f64());
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.teardown();
    }
}
