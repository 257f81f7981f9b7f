//! mirrorplay: playback and control core for a touch-driven streaming player
//!
//! The crate covers everything between the user's finger and the media
//! engine: track selection, gesture recognition, the controls overlay,
//! fullscreen and picture-in-picture, resume positions and next-episode
//! lookup. Decoding, networking and rendering belong to the host.

pub mod chrome;
pub mod controls;
pub mod engine;
pub mod episodes;
pub mod gesture;
pub mod player;
pub mod resume;
pub mod tracks;
pub mod utils;

pub use player::{
    PlaybackState, PlayerEvent, PlayerEventHandler, PlayerSession, PlayerSessionBuilder, SessionCommand,
    SessionDriver, SessionHandle, SessionInput,
};
pub use utils::{Config, PlayerError, Result};
