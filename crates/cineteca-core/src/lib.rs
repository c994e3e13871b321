//! Cineteca Core - adaptive playback controller
//!
//! This crate provides the playback controller behind the Cineteca viewer:
//! - Source resolution (reachability probe, HLS manifest parsing, initial rendition)
//! - The playback state machine with bounded retry and stall detection
//! - Keyboard, pointer and touch gesture routing
//! - Durable progress and settings
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Cineteca Core                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Source     │  │   Manifest   │  │     ABR      │           │
//! │  │   Resolver   │──│    Parser    │──│   Engine     │           │
//! │  └──────┬───────┘  └──────────────┘  └──────────────┘           │
//! │         │ Resolved                                              │
//! │  ┌──────┴───────┐  events   ┌──────────────┐                    │
//! │  │   Player     │◀──────────│    Input     │                    │
//! │  │   Runtime    │           │    Router    │                    │
//! │  └──────┬───────┘           └──────────────┘                    │
//! │         │                                                       │
//! │  ┌──────┴───────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │  Controller  │──│   Progress   │──│  Playback    │           │
//! │  │ (state mach.)│  │  Persister   │  │   Store      │           │
//! │  └──────┬───────┘  └──────────────┘  └──────────────┘           │
//! │         │ MediaSink / DisplayControl / PlaybackNavigator        │
//! └─────────┼───────────────────────────────────────────────────────┘
//!           ▼
//!     platform (media element, streaming engine, catalogue)
//! ```

pub mod error;
pub mod types;
pub mod manifest;
pub mod abr;
pub mod resolver;
pub mod platform;
pub mod timers;
pub mod input;
pub mod store;
pub mod persist;
pub mod controller;
pub mod runtime;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use error::{Error, Notice, PlaybackFault, Result};
pub use types::*;
pub use manifest::{HlsParser, Manifest, ManifestParser, ManifestType};
pub use abr::{AbrContext, AbrEngine};
pub use resolver::{HttpSourceResolver, ResolvedSource, SourceResolver, StreamPlan};
pub use platform::{
    DisplayControl, MediaErrorCode, MediaSink, NoDisplay, PlaybackNavigator, SinkEvent, StreamingError,
    StreamingErrorKind, StreamingSession,
};
pub use timers::{TimerKind, TimerSet};
pub use input::{Command, InputEvent, InputRouter, Key, KeyInput, PointerInput, RouteContext};
pub use store::{JsonFileStore, MemoryStore, PlaybackStore};
pub use persist::ProgressPersister;
pub use controller::{Controller, Effect, Event, PlayerSnapshot};
pub use runtime::{event_channel, EventReceiver, EventSender, PlayerHandle, PlayerRuntime};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log library start-up
pub fn init() {
    tracing::info!(version = VERSION, "Cineteca Core initialized");
}
