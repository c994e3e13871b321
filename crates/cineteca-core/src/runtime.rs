//! Async driver for the controller
//!
//! One task owns the [`Controller`] and feeds it from a single queue, so
//! events are applied strictly in delivery order. Timers become a
//! `sleep_until` on the controller's earliest deadline, resolutions run as
//! spawned tasks whose results come back through the same queue, and the
//! derived UI state is published on a `watch` channel.

use crate::{
    controller::{Controller, Effect, Event, PlayerSnapshot},
    error::Error,
    input::{Command, InputEvent},
    platform::SinkEvent,
    resolver::SourceResolver,
    types::{PlayableItem, SessionId, SessionToken},
    Result,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument};

/// Sending half of the controller queue
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Receiving half of the controller queue
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Create the controller queue. Hosts hand clones of the sender to whatever
/// emits sink events before the runtime exists.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Cloneable front end to a running [`PlayerRuntime`]
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    events: EventSender,
    snapshots: watch::Receiver<PlayerSnapshot>,
}

impl PlayerHandle {
    fn send(&self, event: Event) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| Error::Internal("player runtime has stopped".into()))
    }

    pub fn load(&self, item: PlayableItem) -> Result<()> {
        self.send(Event::Load(item))
    }

    pub fn command(&self, command: Command) -> Result<()> {
        self.send(Event::Command(command))
    }

    pub fn input(&self, input: InputEvent) -> Result<()> {
        self.send(Event::Input(input))
    }

    pub fn sink_event(&self, token: SessionToken, event: SinkEvent) -> Result<()> {
        self.send(Event::Sink { token, event })
    }

    pub fn unload(&self) -> Result<()> {
        self.send(Event::Unload)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Event::Shutdown)
    }

    /// Latest published state
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshots.clone()
    }

    pub fn events(&self) -> EventSender {
        self.events.clone()
    }
}

pub struct PlayerRuntime {
    id: SessionId,
    controller: Controller,
    resolver: Arc<dyn SourceResolver>,
    events_tx: mpsc::WeakUnboundedSender<Event>,
    events_rx: EventReceiver,
    snapshot_tx: watch::Sender<PlayerSnapshot>,
    resolve_task: Option<JoinHandle<()>>,
}

impl PlayerRuntime {
    pub fn new(
        controller: Controller,
        resolver: Arc<dyn SourceResolver>,
        channel: (EventSender, EventReceiver),
    ) -> (Self, PlayerHandle) {
        let (events_tx, events_rx) = channel;
        let (snapshot_tx, snapshots) = watch::channel(controller.snapshot());

        let runtime = Self {
            id: SessionId::new(),
            controller,
            resolver,
            events_tx: events_tx.downgrade(),
            events_rx,
            snapshot_tx,
            resolve_task: None,
        };
        let handle = PlayerHandle {
            events: events_tx,
            snapshots,
        };
        (runtime, handle)
    }

    /// Process events until shutdown or until every sender is gone.
    /// Returns the final state.
    #[instrument(skip(self), fields(player = %self.id))]
    pub async fn run(mut self) -> PlayerSnapshot {
        info!("Player runtime started");

        loop {
            self.publish();
            let deadline = self.controller.next_deadline();

            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(Event::Shutdown) | None => break,
                    Some(event) => self.controller.handle(event, now()),
                },
                _ = wait_until(deadline) => self.controller.fire_due(now()),
            }

            self.run_effects();
        }

        self.controller.teardown();
        self.run_effects();
        self.publish();
        info!("Player runtime stopped");
        self.snapshot_tx.borrow().clone()
    }

    fn publish(&self) {
        let snapshot = self.controller.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    fn run_effects(&mut self) {
        for effect in self.controller.take_effects() {
            match effect {
                Effect::Resolve { token, url, adaptive } => {
                    self.cancel_resolve();
                    let Some(tx) = self.events_tx.upgrade() else {
                        return;
                    };
                    let resolver = Arc::clone(&self.resolver);
                    debug!(%token, %url, adaptive, "Spawning resolution");
                    self.resolve_task = Some(tokio::spawn(async move {
                        let result = resolver.resolve(&url, adaptive).await;
                        // The runtime may be gone; nothing left to tell.
                        let _ = tx.send(Event::Resolved { token, result });
                    }));
                }
                Effect::CancelResolve => self.cancel_resolve(),
            }
        }
    }

    fn cancel_resolve(&mut self) {
        if let Some(task) = self.resolve_task.take() {
            task.abort();
        }
    }
}

impl Drop for PlayerRuntime {
    fn drop(&mut self) {
        self.cancel_resolve();
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn wait_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => sleep_until(Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testkit::{RecordingDisplay, RecordingSink, ScriptedResolver, SinkCall};
    use crate::types::{PlaybackState, PlayerConfig};
    use std::time::Duration;
    use url::Url;

    fn runtime(
        sink: &RecordingSink,
        resolver: Arc<ScriptedResolver>,
    ) -> (PlayerRuntime, PlayerHandle) {
        let controller = Controller::new(
            PlayerConfig::default(),
            Box::new(sink.clone()),
            Box::new(RecordingDisplay::new()),
            Arc::new(MemoryStore::new()),
        );
        PlayerRuntime::new(controller, resolver, event_channel())
    }

    async fn attached_token(sink: &RecordingSink) -> SessionToken {
        loop {
            let token = sink.calls().iter().rev().find_map(|c| match c {
                SinkCall::AttachDirect(_, token) | SinkCall::AttachStream(_, token) => Some(*token),
                _ => None,
            });
            if let Some(token) = token {
                return token;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_to_playing_through_queue() {
        let sink = RecordingSink::new(false);
        let resolver = Arc::new(ScriptedResolver::new().with_delay(Duration::from_millis(200)));
        let (runtime, handle) = runtime(&sink, resolver.clone());

        let driver = async {
            handle
                .load(PlayableItem::new("tt01", "https://cdn.example.com/film.mp4").unwrap())
                .unwrap();
            let token = attached_token(&sink).await;
            handle
                .sink_event(token, SinkEvent::LoadedMetadata { duration: Some(90.0) })
                .unwrap();

            let mut rx = handle.subscribe();
            let snap = rx.wait_for(|s| s.state == PlaybackState::Playing).await.unwrap().clone();
            assert_eq!(snap.duration, Some(90.0));
            handle.shutdown().unwrap();
        };

        let (final_snapshot, ()) = tokio::join!(runtime.run(), driver);
        assert_eq!(final_snapshot.state, PlaybackState::Idle);
        assert_eq!(resolver.calls().len(), 1);
        assert_eq!(sink.count(&SinkCall::Detach), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_resolution_is_aborted() {
        let sink = RecordingSink::new(false);
        let resolver = Arc::new(ScriptedResolver::new().with_delay(Duration::from_millis(500)));
        let (runtime, handle) = runtime(&sink, resolver.clone());

        let driver = async {
            handle
                .load(PlayableItem::new("tt01", "https://cdn.example.com/first.mp4").unwrap())
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle
                .load(PlayableItem::new("tt02", "https://cdn.example.com/second.mp4").unwrap())
                .unwrap();
            attached_token(&sink).await;
            tokio::time::sleep(Duration::from_secs(2)).await;
            handle.shutdown().unwrap();
        };

        tokio::join!(runtime.run(), driver);
        let attaches: Vec<Url> = sink
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::AttachDirect(url, _) => Some(url),
                _ => None,
            })
            .collect();
        assert_eq!(attaches, vec![Url::parse("https://cdn.example.com/second.mp4").unwrap()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_for_backoff() {
        let sink = RecordingSink::new(false);
        let resolver = Arc::new(ScriptedResolver::new());
        let (runtime, handle) = runtime(&sink, resolver.clone());

        let driver = async {
            handle
                .load(PlayableItem::new("tt01", "https://cdn.example.com/film.mp4").unwrap())
                .unwrap();
            let token = attached_token(&sink).await;
            sink.clear_calls();

            let failed_at = Instant::now();
            handle
                .sink_event(
                    token,
                    SinkEvent::Error {
                        code: crate::platform::MediaErrorCode::Network,
                        message: "connection reset".into(),
                    },
                )
                .unwrap();
            attached_token(&sink).await;
            assert!(failed_at.elapsed() >= Duration::from_secs(1));
            assert_eq!(handle.snapshot().retry_count, 1);
            handle.shutdown().unwrap();
        };

        tokio::join!(runtime.run(), driver);
        assert_eq!(resolver.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_runtime() {
        let sink = RecordingSink::new(false);
        let (runtime, handle) = runtime(&sink, Arc::new(ScriptedResolver::new()));
        drop(runtime);
        assert!(handle.command(Command::Play).is_err());
    }
}
