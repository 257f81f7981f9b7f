//! Error types for mirrorplay
//!
//! This module defines the error taxonomy of the player core. We use
//! thiserror for the library error type and anyhow at the binary level.
//!
//! Only [`PlayerError::Load`] is fatal to playback. Every other kind is
//! recovered locally by the component that produced it.

use crate::tracks::{TrackId, TrackKind};
use thiserror::Error;

/// Main error type for mirrorplay
#[derive(Error, Debug)]
pub enum PlayerError {
    /// The engine could not open the source (bad URL, rejected cookies,
    /// unsupported codec). Cleared only by an explicit retry.
    #[error("Load error: {0}")]
    Load(String),

    /// A track id that is not part of the current snapshot was requested
    #[error("Invalid track selection: {kind:?} track {id:?} is not available")]
    InvalidTrackSelection {
        kind: TrackKind,
        id: Option<TrackId>,
    },

    /// Storage read or write failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The engine refused to activate a track
    #[error("Engine rejected {kind:?} track {id}: {reason}")]
    EngineTrackRejected {
        kind: TrackKind,
        id: TrackId,
        reason: String,
    },

    /// An engine command failed outside of loading
    #[error("Engine error: {0}")]
    Engine(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PlayerError {
    /// Whether this error stops playback until the user retries or closes
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlayerError::Load(_))
    }
}

/// Convenience type alias for Results in mirrorplay
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Extension trait for converting other errors to PlayerError
pub trait IntoPlayerError<T> {
    /// Convert this error into a PlayerError with the given context
    fn persistence_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlayerError<T> for std::result::Result<T, E> {
    fn persistence_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Persistence(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Config(format!("{}: {}", context, e)))
    }
}
