//! Integration tests for Cineteca Core

use cineteca_core::testkit::{self, RecordingDisplay, RecordingNavigator, RecordingSink, SinkCall};
use cineteca_core::{
    CatalogueEntry, Command, Controller, Effect, Event, JsonFileStore, MediaErrorCode, MediaId, MemoryStore,
    PlayableItem, PlaybackFault, PlaybackState, PlaybackStore, PlayerConfig, ResolvedSource, SinkEvent,
    StreamingError, StreamingErrorKind,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Player {
    controller: Controller,
    sink: RecordingSink,
    navigator: RecordingNavigator,
    now: Instant,
}

impl Player {
    fn new(adaptive: bool, store: Arc<dyn PlaybackStore>) -> Self {
        let sink = RecordingSink::new(adaptive);
        let navigator = RecordingNavigator::new();
        let controller = Controller::new(
            PlayerConfig::default(),
            Box::new(sink.clone()),
            Box::new(RecordingDisplay::new()),
            store,
        )
        .with_navigator(Box::new(navigator.clone()));
        Self {
            controller,
            sink,
            navigator,
            now: Instant::now(),
        }
    }

    fn handle(&mut self, event: Event) {
        self.controller.handle(event, self.now);
    }

    fn sink(&mut self, event: SinkEvent) {
        let token = self.controller.token().unwrap();
        self.handle(Event::Sink { token, event });
    }

    fn tick(&mut self, ms: u64) {
        self.now += Duration::from_millis(ms);
        self.controller.fire_due(self.now);
    }

    fn pending_resolve(&mut self) -> Option<Effect> {
        self.controller
            .take_effects()
            .into_iter()
            .find(|e| matches!(e, Effect::Resolve { .. }))
    }

    fn answer(&mut self, result: cineteca_core::Result<ResolvedSource>) {
        match self.pending_resolve() {
            Some(Effect::Resolve { token, .. }) => self.handle(Event::Resolved { token, result }),
            other => panic!("expected a resolve request, got {other:?}"),
        }
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_scenario_unreachable_source() {
    let mut player = Player::new(true, Arc::new(MemoryStore::new()));
    assert_eq!(player.controller.state(), PlaybackState::Idle);

    let item = PlayableItem::new("tt01", "https://cdn.example.com/gone.mp4").unwrap();
    let url = item.source_url.clone();
    player.handle(Event::Load(item));
    assert_eq!(player.controller.state(), PlaybackState::Loading);

    player.answer(Err(testkit::unreachable(&url)));
    assert_eq!(
        player.controller.state(),
        PlaybackState::Error(PlaybackFault::SourceUnreachable { url: url.to_string() })
    );

    // No retry is ever scheduled
    assert_eq!(player.controller.next_deadline(), None);
    player.tick(10_000);
    assert!(player.pending_resolve().is_none());
    assert_eq!(player.controller.retry_count(), 0);
}

#[test]
fn test_scenario_streaming_network_recovery() {
    let mut player = Player::new(true, Arc::new(MemoryStore::new()));
    let item = PlayableItem::new("tt02", "https://cdn.example.com/show/master.m3u8").unwrap();
    let url = item.source_url.clone();
    player.handle(Event::Load(item));
    player.answer(Ok(ResolvedSource::Adaptive(testkit::stream_plan(&url))));

    let mut counts = Vec::new();
    for _ in 0..2 {
        player.sink(SinkEvent::Streaming(StreamingError::fatal(
            StreamingErrorKind::Network,
            "level load timeout",
        )));
        counts.push(player.controller.retry_count());
    }
    assert_eq!(counts, vec![1, 2]);

    player.sink(SinkEvent::LoadedMetadata { duration: Some(1800.0) });
    player.sink(SinkEvent::Playing);
    assert_eq!(player.controller.retry_count(), 0);
    assert_eq!(player.controller.state(), PlaybackState::Playing);
    assert_eq!(player.sink.count(&SinkCall::StartLoad), 2);
}

#[test]
fn test_scenario_ended_advances_once() {
    let mut player = Player::new(false, Arc::new(MemoryStore::new()));
    let item = PlayableItem::new("tt03", "https://cdn.example.com/short.mp4").unwrap();
    let url = item.source_url.clone();
    player.handle(Event::Load(item));
    player.answer(Ok(ResolvedSource::Direct(url)));
    player.sink(SinkEvent::LoadedMetadata { duration: Some(30.0) });
    assert_eq!(player.controller.state(), PlaybackState::Playing);

    player.sink(SinkEvent::Ended);
    assert_eq!(player.controller.state(), PlaybackState::Idle);
    assert_eq!(player.navigator.next_calls(), 1);

    player.sink(SinkEvent::Ended);
    player.tick(5_000);
    assert_eq!(player.navigator.next_calls(), 1);
}

// =============================================================================
// Retry Budget Tests
// =============================================================================

#[test]
fn test_retry_count_never_exceeds_budget() {
    let mut player = Player::new(false, Arc::new(MemoryStore::new()));
    let item = PlayableItem::new("tt04", "https://cdn.example.com/flaky.mp4").unwrap();
    let url = item.source_url.clone();
    player.handle(Event::Load(item));

    let mut max_seen = 0;
    for _ in 0..10 {
        if player.controller.state().is_error() {
            break;
        }
        if let Some(Effect::Resolve { token, .. }) = player.pending_resolve() {
            player.handle(Event::Resolved {
                token,
                result: Ok(ResolvedSource::Direct(url.clone())),
            });
        }
        player.sink(SinkEvent::Error {
            code: MediaErrorCode::Decode,
            message: "corrupt".into(),
        });
        max_seen = max_seen.max(player.controller.retry_count());
        player.tick(1_000);
    }

    assert!(max_seen <= 3);
    assert!(matches!(
        player.controller.state(),
        PlaybackState::Error(PlaybackFault::Playback(_))
    ));

    player.handle(Event::Command(Command::Retry));
    assert_eq!(player.controller.state(), PlaybackState::Loading);
    assert_eq!(player.controller.retry_count(), 0);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_progress_round_trip_through_json_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cineteca.json");
    let item = PlayableItem::new("tt05", "https://cdn.example.com/feature.mp4").unwrap();

    {
        let store = Arc::new(JsonFileStore::open(&path).unwrap());
        let mut player = Player::new(false, store);
        player.handle(Event::Load(item.clone()));
        player.answer(Ok(ResolvedSource::Direct(item.source_url.clone())));
        player.sink(SinkEvent::LoadedMetadata { duration: Some(5400.0) });
        player.handle(Event::Command(Command::SetVolume(0.25)));

        for second in 1..=5 {
            player.sink.set_time(600.0 + second as f64);
            player.tick(1_000);
        }
    }

    let store = Arc::new(JsonFileStore::open(&path).unwrap());
    let saved = store.load_progress(&MediaId::from("tt05")).unwrap().unwrap();
    assert!((saved.position - 605.0).abs() <= 1.0);

    let mut player = Player::new(false, store);
    assert_eq!(player.controller.settings().volume, 0.25);
    player.handle(Event::Load(item.clone()));
    player.answer(Ok(ResolvedSource::Direct(item.source_url.clone())));
    player.sink(SinkEvent::LoadedMetadata { duration: Some(5400.0) });
    assert!((player.controller.snapshot().position - 605.0).abs() <= 1.0);
}

// =============================================================================
// Catalogue Tests
// =============================================================================

#[test]
fn test_catalogue_entries_become_playable_items() {
    let json = r#"[
        {"id": "1", "title": "Nosferatu", "vimeo_url": "https://cdn.example.com/nosferatu.mp4", "duration": 94},
        {"id": "2", "title": "Sunrise", "source_url": "https://cdn.example.com/sunrise/master.m3u8",
         "genre": ["Drama"], "year": 1927, "rating": 8.1}
    ]"#;
    let entries: Vec<CatalogueEntry> = serde_json::from_str(json).unwrap();
    let items: Vec<PlayableItem> = entries.iter().map(|e| PlayableItem::try_from(e).unwrap()).collect();

    assert_eq!(items[0].id, MediaId::from("1"));
    assert!(items[1].source_url.path().ends_with(".m3u8"));
}

#[test]
fn test_snapshot_serializes_flat_state() {
    let player = Player::new(false, Arc::new(MemoryStore::new()));
    let json = serde_json::to_value(player.controller.snapshot()).unwrap();
    assert_eq!(json["state"], "idle");
    assert_eq!(json["volume"], 1.0);
    assert_eq!(json["playback_rate"], 1.0);
}
