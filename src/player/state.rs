//! Playback state and the latest-intent position cache

use log::debug;
use std::time::{Duration, Instant};

/// Progress reports may overshoot the reported duration by this much
pub const POSITION_SLACK_SECONDS: f64 = 0.5;

/// Last error shown to the user
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub message: String,

    /// Playback is stopped until retry
    pub fatal: bool,
}

/// Observable playback state
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    /// Last engine-confirmed position in seconds
    pub position_seconds: f64,

    /// Zero until the engine reports a duration
    pub duration_seconds: f64,

    pub paused: bool,
    pub playback_rate: f32,
    pub volume: f32,
    pub brightness: f32,
    pub buffering_or_loading: bool,
    pub last_error: Option<ErrorInfo>,
    pub ended: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            position_seconds: 0.0,
            duration_seconds: 0.0,
            paused: true,
            playback_rate: 1.0,
            volume: 1.0,
            brightness: 0.5,
            buffering_or_loading: false,
            last_error: None,
            ended: false,
        }
    }
}

impl PlaybackState {
    pub fn has_duration(&self) -> bool {
        self.duration_seconds > 0.0
    }

    /// Store a confirmed position, clamped to what the content allows
    pub fn set_position(&mut self, seconds: f64) {
        let mut position = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if self.has_duration() {
            position = position.min(self.duration_seconds + POSITION_SLACK_SECONDS);
        }
        self.position_seconds = position;
    }

    /// Clamp a seek target into `[0, duration]`
    pub fn clamp_target(&self, seconds: f64) -> f64 {
        let target = seconds.max(0.0);
        if self.has_duration() {
            target.min(self.duration_seconds)
        } else {
            target
        }
    }

    pub fn is_failed(&self) -> bool {
        self.last_error.as_ref().is_some_and(|e| e.fatal)
    }
}

/// How a progress tick was treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick is the current position
    Accepted,

    /// The tick predates a pending seek and was dropped
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct PendingSeek {
    target: f64,
    issued_at: Instant,
}

/// Latest seek intent versus engine progress.
///
/// Right after a seek the engine keeps reporting the old position for a
/// moment. Those ticks must not move the displayed position back, nor be
/// saved as the resume position. A pending target is cleared by a tick close
/// to it, or after the settle timeout as a fallback for engines that never
/// land exactly.
#[derive(Debug, Clone)]
pub struct PositionTracker {
    tolerance: f64,
    settle: Duration,
    pending: Option<PendingSeek>,
}

impl PositionTracker {
    pub fn new(tolerance_seconds: f64, settle: Duration) -> Self {
        Self {
            tolerance: tolerance_seconds,
            settle,
            pending: None,
        }
    }

    pub fn seek_issued(&mut self, target: f64, now: Instant) {
        self.pending = Some(PendingSeek {
            target,
            issued_at: now,
        });
    }

    /// Restart the settle window of a pending seek that was held back and
    /// has only now been handed to the engine
    pub fn restamp(&mut self, now: Instant) {
        if let Some(pending) = self.pending.as_mut() {
            pending.issued_at = now;
        }
    }

    pub fn pending_target(&self) -> Option<f64> {
        self.pending.map(|p| p.target)
    }

    pub fn on_tick(&mut self, position: f64, now: Instant) -> TickOutcome {
        let Some(pending) = self.pending else {
            return TickOutcome::Accepted;
        };

        if (position - pending.target).abs() <= self.tolerance {
            self.pending = None;
            return TickOutcome::Accepted;
        }
        if now.saturating_duration_since(pending.issued_at) >= self.settle {
            debug!(
                "Seek to {:.1}s never confirmed, accepting {:.1}s",
                pending.target, position
            );
            self.pending = None;
            return TickOutcome::Accepted;
        }

        debug!("Dropping stale tick {:.1}s (seeking to {:.1}s)", position, pending.target);
        TickOutcome::Stale
    }

    /// Position to act on: the pending target if any, else `confirmed`
    pub fn authoritative(&self, confirmed: f64) -> f64 {
        self.pending_target().unwrap_or(confirmed)
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}
