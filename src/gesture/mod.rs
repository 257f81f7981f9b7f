//! Touch gesture recognition for mirrorplay
//!
//! Raw pointer samples go in, player intents come out. Recognition is a pure
//! state machine over `{phase, x, y, t}` samples; time only advances through
//! the timestamps it is given, so synthetic sequences fully determine the
//! result.

mod recognizer;

pub use recognizer::GestureRecognizer;

use std::time::Instant;

/// Pointer phase of a touch sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Down,
    Move,
    Up,
    Cancel,
}

/// One pointer sample in logical pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchSample {
    pub phase: TouchPhase,
    pub x: f64,
    pub y: f64,
    pub at: Instant,
}

impl TouchSample {
    pub fn new(phase: TouchPhase, x: f64, y: f64, at: Instant) -> Self {
        Self { phase, x, y, at }
    }

    pub fn down(x: f64, y: f64, at: Instant) -> Self {
        Self::new(TouchPhase::Down, x, y, at)
    }

    pub fn moved(x: f64, y: f64, at: Instant) -> Self {
        Self::new(TouchPhase::Move, x, y, at)
    }

    pub fn up(x: f64, y: f64, at: Instant) -> Self {
        Self::new(TouchPhase::Up, x, y, at)
    }

    pub fn cancel(x: f64, y: f64, at: Instant) -> Self {
        Self::new(TouchPhase::Cancel, x, y, at)
    }
}

/// Direction of a double-tap skip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipDirection {
    Backward,
    Forward,
}

/// What a vertical drag controls; fixed when the drag starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragTarget {
    Brightness,
    Volume,
}

/// Recognized player intent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureIntent {
    /// Toggle controls visibility
    SingleTap,

    /// Skip backward (left half) or forward (right half)
    DoubleTap(SkipDirection),

    /// Incremental change since the previous frame; upward is positive
    Drag { target: DragTarget, delta: f64 },
}

/// Logical size of the touch surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        // Landscape phone in logical pixels
        Self {
            width: 844.0,
            height: 390.0,
        }
    }
}

impl Viewport {
    pub fn midpoint_x(&self) -> f64 {
        self.width / 2.0
    }

    pub fn is_left_half(&self, x: f64) -> bool {
        x < self.midpoint_x()
    }
}
