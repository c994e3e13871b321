//! Benchmarks for cineteca-core hot paths
//!
//! Run with: cargo bench -p cineteca-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use cineteca_core::abr::{AbrContext, AbrEngine};
use cineteca_core::input::{InputEvent, InputRouter, RouteContext, SurfaceSize, TouchInput, TouchPhase};
use cineteca_core::manifest::detect_manifest_type;
use cineteca_core::testkit::{RecordingDisplay, RecordingSink};
use cineteca_core::types::*;
use cineteca_core::{Command, Controller, Effect, Event, MemoryStore, ResolvedSource, SinkEvent};

// ============================================================================
// Helpers
// ============================================================================

fn ladder() -> Vec<Rendition> {
    [(400_000u64, 240u32), (800_000, 360), (1_400_000, 480), (2_800_000, 720), (5_000_000, 1080)]
        .into_iter()
        .map(|(bandwidth, height)| Rendition {
            id: format!("{height}p"),
            bandwidth,
            resolution: Some(Resolution::new(height * 16 / 9, height)),
            frame_rate: None,
            video_codec: Some(VideoCodec::H264),
            audio_codec: Some(AudioCodec::Aac),
            uri: Url::parse(&format!("https://cdn.example.com/{height}p.m3u8")).unwrap(),
        })
        .collect()
}

fn touch(phase: TouchPhase, x: f64, y: f64, at: Instant) -> InputEvent {
    InputEvent::Touch(TouchInput {
        phase,
        x,
        y,
        at,
        surface: SurfaceSize::new(1280.0, 720.0),
    })
}

fn playing_controller() -> (Controller, Instant) {
    let now = Instant::now();
    let mut controller = Controller::new(
        PlayerConfig::default(),
        Box::new(RecordingSink::new(false)),
        Box::new(RecordingDisplay::new()),
        Arc::new(MemoryStore::new()),
    );
    let item = PlayableItem::new("bench", "https://cdn.example.com/bench.mp4").unwrap();
    let url = item.source_url.clone();
    controller.handle(Event::Load(item), now);
    let token = controller
        .take_effects()
        .into_iter()
        .find_map(|e| match e {
            Effect::Resolve { token, .. } => Some(token),
            _ => None,
        })
        .unwrap();
    controller.handle(
        Event::Resolved {
            token,
            result: Ok(ResolvedSource::Direct(url)),
        },
        now,
    );
    controller.handle(
        Event::Sink {
            token,
            event: SinkEvent::LoadedMetadata { duration: Some(3600.0) },
        },
        now,
    );
    (controller, now)
}

// ============================================================================
// Input Benchmarks
// ============================================================================

fn bench_gesture_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("gestures");
    let ctx = RouteContext {
        position: 120.0,
        duration: Some(3600.0),
        volume: 0.8,
    };

    group.bench_function("tap", |b| {
        let mut router = InputRouter::new(&PlayerConfig::default());
        let t0 = Instant::now();
        b.iter(|| {
            router.route(&touch(TouchPhase::Start, 200.0, 200.0, t0), &ctx);
            black_box(router.route(&touch(TouchPhase::End, 201.0, 200.0, t0 + Duration::from_millis(90)), &ctx))
        })
    });

    for moves in [4usize, 32] {
        group.bench_with_input(BenchmarkId::new("horizontal_drag", moves), &moves, |b, &moves| {
            let mut router = InputRouter::new(&PlayerConfig::default());
            let t0 = Instant::now();
            b.iter(|| {
                router.route(&touch(TouchPhase::Start, 100.0, 360.0, t0), &ctx);
                for i in 1..=moves {
                    let at = t0 + Duration::from_millis(16 * i as u64);
                    black_box(router.route(&touch(TouchPhase::Move, 100.0 + 20.0 * i as f64, 362.0, at), &ctx));
                }
                router.route(&touch(TouchPhase::End, 100.0 + 20.0 * moves as f64, 362.0, t0), &ctx)
            })
        });
    }

    group.finish();
}

// ============================================================================
// Controller Benchmarks
// ============================================================================

fn bench_controller_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller");

    group.bench_function("time_update", |b| {
        let (mut controller, now) = playing_controller();
        let token = controller.token().unwrap();
        let mut position = 0.0;
        b.iter(|| {
            position = (position + 0.25) % 3600.0;
            controller.handle(
                Event::Sink {
                    token,
                    event: SinkEvent::TimeUpdate { position },
                },
                now,
            );
        })
    });

    group.bench_function("seek_command", |b| {
        let (mut controller, now) = playing_controller();
        b.iter(|| controller.handle(Event::Command(Command::SeekBy(black_box(5.0))), now))
    });

    group.bench_function("snapshot", |b| {
        let (controller, _) = playing_controller();
        b.iter(|| black_box(controller.snapshot()))
    });

    group.finish();
}

// ============================================================================
// Source Benchmarks
// ============================================================================

fn bench_source_selection(c: &mut Criterion) {
    let renditions = ladder();
    let mut abr = AbrEngine::new();
    abr.record_measurement(450_000, Duration::from_secs(1));

    c.bench_function("abr_select", |b| {
        b.iter(|| abr.select_rendition(black_box(&renditions), &AbrContext::default()))
    });

    let urls: Vec<Url> = [
        "https://cdn.example.com/master.m3u8",
        "https://cdn.example.com/film.mp4",
        "https://cdn.example.com/stream?id=7",
    ]
    .iter()
    .map(|u| Url::parse(u).unwrap())
    .collect();

    c.bench_function("detect_manifest_type", |b| {
        b.iter(|| {
            for url in &urls {
                black_box(detect_manifest_type(url, Some("application/vnd.apple.mpegurl")));
            }
        })
    });
}

criterion_group!(benches, bench_gesture_classification, bench_controller_events, bench_source_selection);
criterion_main!(benches);
