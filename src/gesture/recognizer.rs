//! Tap, double-tap and drag recognizer
//!
//! Single and double taps are mutually exclusive: a finished tap is parked
//! until either a second tap arrives inside the double-tap window, or the
//! window runs out ([`GestureRecognizer::poll`]) or something else proves no
//! double tap is coming. Only then does the single tap surface.

use crate::gesture::{DragTarget, GestureIntent, SkipDirection, TouchPhase, TouchSample, Viewport};
use crate::utils::config::GestureConfig;
use log::debug;
use std::time::Instant;

/// Current finger-down, before it is classified
#[derive(Debug, Clone, Copy)]
struct Press {
    start_x: f64,
    start_y: f64,
    last_y: f64,
    down_at: Instant,
}

/// Completed tap waiting to learn whether it is half of a double tap
#[derive(Debug, Clone, Copy)]
struct ParkedTap {
    x: f64,
    y: f64,
    up_at: Instant,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    Pressed {
        press: Press,
        parked: Option<ParkedTap>,
    },
    Dragging {
        target: DragTarget,
        last_y: f64,
    },
    /// Horizontal pan or long press; swallowed until release
    Ignoring,
    AwaitingSecondTap(ParkedTap),
}

pub struct GestureRecognizer {
    config: GestureConfig,
    viewport: Viewport,
    state: State,
}

impl GestureRecognizer {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            viewport: Viewport::default(),
            state: State::Idle,
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Whether no gesture is in progress or pending
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// When [`poll`](Self::poll) next has something to resolve
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            State::AwaitingSecondTap(tap) => Some(tap.up_at + self.config.double_tap_window()),
            _ => None,
        }
    }

    /// Drop any gesture in progress without emitting intents
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    /// Resolve a parked tap whose double-tap window has elapsed
    pub fn poll(&mut self, now: Instant) -> Vec<GestureIntent> {
        match self.state {
            State::AwaitingSecondTap(tap) if self.window_elapsed(&tap, now) => {
                self.state = State::Idle;
                vec![GestureIntent::SingleTap]
            }
            _ => Vec::new(),
        }
    }

    /// Feed one touch sample
    pub fn handle(&mut self, sample: TouchSample) -> Vec<GestureIntent> {
        let mut intents = Vec::new();

        self.state = match sample.phase {
            TouchPhase::Down => self.on_down(sample, &mut intents),
            TouchPhase::Move => self.on_move(sample, &mut intents),
            TouchPhase::Up => self.on_up(sample, &mut intents),
            TouchPhase::Cancel => self.on_cancel(),
        };

        if !intents.is_empty() {
            debug!("Gesture intents: {:?}", intents);
        }
        intents
    }

    fn on_down(&self, sample: TouchSample, intents: &mut Vec<GestureIntent>) -> State {
        let press = Press {
            start_x: sample.x,
            start_y: sample.y,
            last_y: sample.y,
            down_at: sample.at,
        };

        let parked = match self.state {
            State::AwaitingSecondTap(tap) => {
                let too_late = self.window_elapsed(&tap, sample.at);
                let too_far = distance(tap.x, tap.y, sample.x, sample.y) > self.config.double_tap_slop_px;
                if too_late || too_far {
                    intents.push(GestureIntent::SingleTap);
                    None
                } else {
                    Some(tap)
                }
            }
            // A second pointer-down without a release: start over
            State::Pressed {
                parked: Some(_), ..
            } => {
                intents.push(GestureIntent::SingleTap);
                None
            }
            _ => None,
        };

        State::Pressed { press, parked }
    }

    fn on_move(&self, sample: TouchSample, intents: &mut Vec<GestureIntent>) -> State {
        match self.state {
            State::Pressed { mut press, parked } => {
                let dx = sample.x - press.start_x;
                let dy = sample.y - press.start_y;

                if dy.abs() > self.config.slop_px {
                    if parked.is_some() {
                        intents.push(GestureIntent::SingleTap);
                    }
                    // The target is locked here for the rest of the drag,
                    // even if the finger crosses the midpoint later.
                    let target = if self.viewport.is_left_half(press.start_x) {
                        DragTarget::Brightness
                    } else {
                        DragTarget::Volume
                    };
                    self.push_drag(target, press.last_y, sample.y, intents);
                    State::Dragging {
                        target,
                        last_y: sample.y,
                    }
                } else if dx.abs() > self.config.slop_px {
                    if parked.is_some() {
                        intents.push(GestureIntent::SingleTap);
                    }
                    State::Ignoring
                } else {
                    press.last_y = sample.y;
                    State::Pressed { press, parked }
                }
            }
            State::Dragging { target, last_y } => {
                self.push_drag(target, last_y, sample.y, intents);
                State::Dragging {
                    target,
                    last_y: sample.y,
                }
            }
            other => other,
        }
    }

    fn on_up(&self, sample: TouchSample, intents: &mut Vec<GestureIntent>) -> State {
        match self.state {
            State::Pressed { press, parked } => {
                let moved = (sample.x - press.start_x).abs() > self.config.slop_px
                    || (sample.y - press.start_y).abs() > self.config.slop_px;
                let held = sample.at.saturating_duration_since(press.down_at)
                    > self.config.tap_max_duration();

                if moved || held {
                    if parked.is_some() {
                        intents.push(GestureIntent::SingleTap);
                    }
                    return State::Idle;
                }

                match parked {
                    Some(first) => {
                        let x = (first.x + sample.x) / 2.0;
                        let direction = if self.viewport.is_left_half(x) {
                            SkipDirection::Backward
                        } else {
                            SkipDirection::Forward
                        };
                        intents.push(GestureIntent::DoubleTap(direction));
                        State::Idle
                    }
                    None => State::AwaitingSecondTap(ParkedTap {
                        x: sample.x,
                        y: sample.y,
                        up_at: sample.at,
                    }),
                }
            }
            State::AwaitingSecondTap(tap) => State::AwaitingSecondTap(tap),
            _ => State::Idle,
        }
    }

    fn on_cancel(&self) -> State {
        match self.state {
            State::Pressed {
                parked: Some(tap), ..
            } => State::AwaitingSecondTap(tap),
            State::AwaitingSecondTap(tap) => State::AwaitingSecondTap(tap),
            _ => State::Idle,
        }
    }

    fn push_drag(&self, target: DragTarget, from_y: f64, to_y: f64, intents: &mut Vec<GestureIntent>) {
        // Screen y grows downward; dragging up raises the value
        let delta = (from_y - to_y) * self.config.drag_sensitivity;
        if delta != 0.0 {
            intents.push(GestureIntent::Drag { target, delta });
        }
    }

    fn window_elapsed(&self, tap: &ParkedTap, now: Instant) -> bool {
        now.saturating_duration_since(tap.up_at) >= self.config.double_tap_window()
    }
}

fn distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt()
}
