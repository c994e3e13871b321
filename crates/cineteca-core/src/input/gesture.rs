//! Touch gesture classification
//!
//! A small state machine over touch start/move/end. It knows nothing about
//! the player: it reports gestures in surface-relative terms and the router
//! turns them into commands.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Longest press that still counts as a tap
pub const TAP_MAX_DURATION: Duration = Duration::from_millis(250);

/// Maximum gap between two taps for a double tap
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(300);

/// Movement below this many pixels is not a drag
pub const DRAG_THRESHOLD_PX: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// Size of the video surface in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: f64,
    pub height: f64,
}

impl SurfaceSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchInput {
    pub phase: TouchPhase,
    pub x: f64,
    pub y: f64,
    pub at: Instant,
    pub surface: SurfaceSize,
}

/// Half of the surface a tap landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragAxis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Tap,
    DoubleTap(Side),
    /// Displacement along the locked axis as a fraction of the surface size.
    /// Positive is right / down.
    Drag { axis: DragAxis, fraction: f64 },
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Pressed { origin: (f64, f64), started_at: Instant },
    Dragging { origin: (f64, f64), axis: DragAxis },
}

#[derive(Debug)]
pub struct GestureRecognizer {
    phase: Phase,
    last_tap: Option<Instant>,
}

impl Default for GestureRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureRecognizer {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            last_tap: None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, Phase::Dragging { .. })
    }

    /// Feed one touch sample; returns a gesture once one is recognised
    pub fn feed(&mut self, touch: &TouchInput) -> Option<Gesture> {
        match (touch.phase, self.phase) {
            (TouchPhase::Start, _) => {
                self.phase = Phase::Pressed {
                    origin: (touch.x, touch.y),
                    started_at: touch.at,
                };
                None
            }

            (TouchPhase::Move, Phase::Pressed { origin, .. }) => {
                let (dx, dy) = (touch.x - origin.0, touch.y - origin.1);
                if dx.hypot(dy) < DRAG_THRESHOLD_PX {
                    return None;
                }
                let axis = if dx.abs() >= dy.abs() {
                    DragAxis::Horizontal
                } else {
                    DragAxis::Vertical
                };
                self.phase = Phase::Dragging { origin, axis };
                self.last_tap = None;
                Some(drag(axis, origin, touch))
            }

            (TouchPhase::Move, Phase::Dragging { origin, axis }) => Some(drag(axis, origin, touch)),

            (TouchPhase::End, Phase::Pressed { started_at, .. }) => {
                self.phase = Phase::Idle;
                if touch.at.saturating_duration_since(started_at) >= TAP_MAX_DURATION {
                    self.last_tap = None;
                    return None;
                }

                match self.last_tap.take() {
                    Some(prev) if touch.at.saturating_duration_since(prev) <= DOUBLE_TAP_WINDOW => {
                        let side = if touch.x < touch.surface.width / 2.0 {
                            Side::Left
                        } else {
                            Side::Right
                        };
                        Some(Gesture::DoubleTap(side))
                    }
                    _ => {
                        self.last_tap = Some(touch.at);
                        Some(Gesture::Tap)
                    }
                }
            }

            (TouchPhase::End, Phase::Dragging { origin, axis }) => {
                self.phase = Phase::Idle;
                Some(drag(axis, origin, touch))
            }

            (TouchPhase::Cancel, _) => {
                self.phase = Phase::Idle;
                None
            }

            (TouchPhase::Move | TouchPhase::End, Phase::Idle) => None,
        }
    }
}

fn drag(axis: DragAxis, origin: (f64, f64), touch: &TouchInput) -> Gesture {
    let (delta, extent) = match axis {
        DragAxis::Horizontal => (touch.x - origin.0, touch.surface.width),
        DragAxis::Vertical => (touch.y - origin.1, touch.surface.height),
    };
    let fraction = if extent > 0.0 { delta / extent } else { 0.0 };
    Gesture::Drag { axis, fraction }
}
