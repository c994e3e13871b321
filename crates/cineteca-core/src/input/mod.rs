//! Input Router
//!
//! Keyboard, pointer and touch all funnel into [`Command`]. Nothing here
//! touches the sink: commands go back to the controller, which owns it.

mod gesture;
mod keyboard;

pub use gesture::{
    DragAxis, Gesture, GestureRecognizer, Side, SurfaceSize, TouchInput, TouchPhase, DOUBLE_TAP_WINDOW,
    DRAG_THRESHOLD_PX, TAP_MAX_DURATION,
};
pub use keyboard::{Key, KeyBindings, KeyInput};

use crate::types::{Overlay, PlaybackRate, PlayerConfig};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Playback commands shared by every input surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum Command {
    TogglePlay,
    Play,
    Pause,
    /// Relative seek in seconds
    SeekBy(f64),
    /// Absolute seek in seconds
    SeekTo(f64),
    SetVolume(f64),
    ToggleMute,
    ToggleFullscreen,
    TogglePictureInPicture,
    SetPlaybackRate(PlaybackRate),
    ToggleControls,
    ToggleOverlay(Overlay),
    CloseOverlay,
    SetAutoplay(bool),
    Retry,
}

/// Mouse input on the player
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum PointerInput {
    /// Click on the progress track, `x` measured from its left edge
    TrackClick { x: f64, track_width: f64 },
    /// Click on the video surface
    SurfaceClick,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Key(KeyInput),
    Pointer(PointerInput),
    Touch(TouchInput),
}

/// Player values the router needs to turn relative input into commands
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RouteContext {
    pub position: f64,
    pub duration: Option<f64>,
    pub volume: f64,
}

#[derive(Debug)]
pub struct InputRouter {
    keys: KeyBindings,
    gestures: GestureRecognizer,
    /// Context captured when the current touch began
    touch_anchor: Option<RouteContext>,
    double_tap_step: f64,
}

impl InputRouter {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            keys: KeyBindings::new(config),
            gestures: GestureRecognizer::new(),
            touch_anchor: None,
            double_tap_step: config.seek_step_large,
        }
    }

    pub fn route(&mut self, input: &InputEvent, ctx: &RouteContext) -> Option<Command> {
        let command = match input {
            InputEvent::Key(key) => self.keys.map(key, ctx.volume),
            InputEvent::Pointer(pointer) => route_pointer(pointer, ctx),
            InputEvent::Touch(touch) => self.route_touch(touch, ctx),
        };
        trace!(?input, ?command, "Input routed");
        command
    }

    fn route_touch(&mut self, touch: &TouchInput, ctx: &RouteContext) -> Option<Command> {
        if touch.phase == TouchPhase::Start {
            self.touch_anchor = Some(*ctx);
        }
        let anchor = self.touch_anchor.unwrap_or(*ctx);

        match self.gestures.feed(touch)? {
            Gesture::Tap => Some(Command::ToggleControls),
            Gesture::DoubleTap(Side::Left) => Some(Command::SeekBy(-self.double_tap_step)),
            Gesture::DoubleTap(Side::Right) => Some(Command::SeekBy(self.double_tap_step)),
            Gesture::Drag {
                axis: DragAxis::Horizontal,
                fraction,
            } => {
                let duration = anchor.duration?;
                Some(Command::SeekTo(anchor.position + fraction * duration))
            }
            Gesture::Drag {
                axis: DragAxis::Vertical,
                fraction,
            } => Some(Command::SetVolume((anchor.volume - fraction).clamp(0.0, 1.0))),
        }
    }
}

fn route_pointer(pointer: &PointerInput, ctx: &RouteContext) -> Option<Command> {
    match *pointer {
        PointerInput::TrackClick { x, track_width } => {
            let duration = ctx.duration?;
            if track_width <= 0.0 {
                return None;
            }
            let fraction = (x / track_width).clamp(0.0, 1.0);
            Some(Command::SeekTo(fraction * duration))
        }
        PointerInput::SurfaceClick => Some(Command::TogglePlay),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    const SURFACE: SurfaceSize = SurfaceSize {
        width: 640.0,
        height: 360.0,
    };

    fn touch(phase: TouchPhase, x: f64, y: f64, at: Instant) -> InputEvent {
        InputEvent::Touch(TouchInput {
            phase,
            x,
            y,
            at,
            surface: SURFACE,
        })
    }

    fn ctx(position: f64, duration: Option<f64>, volume: f64) -> RouteContext {
        RouteContext {
            position,
            duration,
            volume,
        }
    }

    #[test]
    fn test_track_click_seeks_to_fraction() {
        let mut router = InputRouter::new(&PlayerConfig::default());
        let click = InputEvent::Pointer(PointerInput::TrackClick {
            x: 150.0,
            track_width: 600.0,
        });
        assert_eq!(router.route(&click, &ctx(0.0, Some(120.0), 1.0)), Some(Command::SeekTo(30.0)));
        assert_eq!(router.route(&click, &ctx(0.0, None, 1.0)), None);
    }

    #[test]
    fn test_surface_click_toggles_play() {
        let mut router = InputRouter::new(&PlayerConfig::default());
        let click = InputEvent::Pointer(PointerInput::SurfaceClick);
        assert_eq!(router.route(&click, &RouteContext::default()), Some(Command::TogglePlay));
    }

    #[test]
    fn test_vertical_drag_half_height_halves_volume() {
        let t0 = Instant::now();
        let mut router = InputRouter::new(&PlayerConfig::default());
        let start_ctx = ctx(10.0, Some(100.0), 1.0);

        router.route(&touch(TouchPhase::Start, 320.0, 90.0, t0), &start_ctx);
        let mut last = None;
        for (i, y) in [120.0, 180.0, 270.0].into_iter().enumerate() {
            let at = t0 + Duration::from_millis(40 * (i as u64 + 1));
            // Volume in the live context changes as commands apply; the
            // anchor keeps the drag relative to where it started.
            last = router.route(&touch(TouchPhase::Move, 321.0, y, at), &ctx(10.0, Some(100.0), 0.7));
        }
        match last {
            Some(Command::SetVolume(v)) => assert!((v - 0.5).abs() < 1e-9),
            other => panic!("expected volume command, got {other:?}"),
        }
    }

    #[test]
    fn test_horizontal_drag_seeks_relative_to_start() {
        let t0 = Instant::now();
        let mut router = InputRouter::new(&PlayerConfig::default());
        let start_ctx = ctx(30.0, Some(200.0), 1.0);
        router.route(&touch(TouchPhase::Start, 100.0, 100.0, t0), &start_ctx);
        let cmd = router.route(
            &touch(TouchPhase::Move, 260.0, 105.0, t0 + Duration::from_millis(60)),
            &start_ctx,
        );
        // 160 / 640 * 200 = 50
        assert_eq!(cmd, Some(Command::SeekTo(80.0)));
    }

    #[test]
    fn test_double_tap_skips_large_step() {
        let t0 = Instant::now();
        let mut router = InputRouter::new(&PlayerConfig::default());
        let c = ctx(50.0, Some(100.0), 1.0);
        router.route(&touch(TouchPhase::Start, 50.0, 50.0, t0), &c);
        assert_eq!(
            router.route(&touch(TouchPhase::End, 50.0, 50.0, t0 + Duration::from_millis(60)), &c),
            Some(Command::ToggleControls)
        );
        router.route(&touch(TouchPhase::Start, 50.0, 50.0, t0 + Duration::from_millis(150)), &c);
        assert_eq!(
            router.route(&touch(TouchPhase::End, 50.0, 50.0, t0 + Duration::from_millis(200)), &c),
            Some(Command::SeekBy(-10.0))
        );
    }
}
