//! Player session for mirrorplay
//!
//! The session owns every component of the player core and routes inputs
//! between them: engine events, touch samples, explicit commands and timer
//! polls. It never reads the clock; each input carries `now`. The
//! [`SessionDriver`] supplies real time and runs the session on a tokio task.

mod driver;
mod session;
mod state;

pub use driver::{SessionCommand, SessionDriver, SessionHandle, SessionInput};
pub use session::{PlayerSession, PlayerSessionBuilder};
pub use state::{ErrorInfo, PlaybackState, PositionTracker, TickOutcome, POSITION_SLACK_SECONDS};

use crate::controls::ControlsState;
use crate::tracks::{TrackId, TrackKind, TrackSnapshot};
use tokio::sync::mpsc;

/// Player event for external event handling
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Source opened
    MediaLoaded { duration_seconds: f64 },

    /// The track list or the selection changed
    TracksChanged { tracks: TrackSnapshot },

    /// Playback started
    PlaybackStarted,

    /// Playback paused
    PlaybackPaused,

    /// A seek was sent to the engine
    SeekIssued { target_seconds: f64 },

    /// Engine-confirmed position changed
    PositionChanged { position_seconds: f64 },

    /// Buffering started or stopped
    BufferingChanged { is_buffering: bool },

    /// Volume changed
    VolumeChanged { volume: f32 },

    /// Brightness changed; the host applies it to the screen
    BrightnessChanged { brightness: f32 },

    /// Playback speed changed
    RateChanged { rate: f32 },

    /// Controls overlay changed
    ControlsChanged { state: ControlsState },

    FullscreenChanged { fullscreen: bool },

    PipChanged { active: bool },

    /// The engine refused a track; the selection is left as requested
    TrackRejected {
        kind: TrackKind,
        track_id: TrackId,
        reason: String,
    },

    /// Error occurred
    Error { message: String, fatal: bool },

    /// A fresh load was started after an error
    Retrying,

    /// End of media reached
    Ended,

    /// Session closed; no further events follow
    Closed,
}

/// Player event handler trait
pub trait PlayerEventHandler: Send + Sync {
    /// Handle player event
    ///
    /// # Arguments
    ///
    /// * `event` - Player event
    fn handle_event(&mut self, event: PlayerEvent);
}

/// Forwards events into a tokio channel
pub struct ChannelEventHandler {
    tx: mpsc::UnboundedSender<PlayerEvent>,
}

impl PlayerEventHandler for ChannelEventHandler {
    fn handle_event(&mut self, event: PlayerEvent) {
        // A dropped receiver just means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

/// Handler plus the receiving end of its channel
pub fn event_channel() -> (ChannelEventHandler, mpsc::UnboundedReceiver<PlayerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelEventHandler { tx }, rx)
}
