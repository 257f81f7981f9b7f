//! Playback engine contract for mirrorplay
//!
//! The actual decoder is an external collaborator. This module defines the
//! command surface the core drives ([`MediaEngine`]), the events it consumes
//! ([`EngineEvent`]), the stream-resolver shape it is fed with, and the
//! [`EngineAdapter`] that enforces command ordering around loads and errors.

mod adapter;
mod recording;

pub use adapter::{AdapterPhase, EngineAdapter, EngineCommand};
pub use recording::{CommandLog, RecordedCommand, RecordingEngine, RecordingEngineFactory};

use crate::tracks::{RawDetectedTrack, Track, TrackId, TrackKind};
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Interface of the underlying media engine
pub trait MediaEngine: Send {
    /// Open a source. Completion is reported with [`EngineEvent::Loaded`].
    fn load(&mut self, source: &MediaSource) -> Result<()>;

    /// Start or resume playback
    fn play(&mut self) -> Result<()>;

    /// Pause playback
    fn pause(&mut self) -> Result<()>;

    /// Seek to an absolute position
    ///
    /// # Arguments
    ///
    /// * `to_seconds` - Target position in seconds
    fn seek(&mut self, to_seconds: f64) -> Result<()>;

    /// Set playback rate (1.0 = normal)
    fn set_rate(&mut self, rate: f32) -> Result<()>;

    /// Set volume (0.0 to 1.0)
    fn set_volume(&mut self, volume: f32) -> Result<()>;

    /// Activate a track, or switch text tracks off with `None`
    fn select_track(&mut self, kind: TrackKind, track: Option<&Track>) -> Result<()>;
}

/// Produces engine instances. An engine that reported an error is never
/// reused; retrying asks the factory for a fresh one.
pub trait EngineFactory: Send {
    fn create(&mut self) -> Result<Box<dyn MediaEngine>>;
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Source opened; duration and embedded tracks are known
    Loaded {
        duration_seconds: f64,
        detected_tracks: Vec<RawDetectedTrack>,
    },

    /// Periodic position report
    Progress { position_seconds: f64 },

    /// Buffering started or stopped
    Buffering { is_buffering: bool },

    /// The source could not be played
    Error { message: String },

    /// A requested track could not be activated
    TrackRejected {
        kind: TrackKind,
        track_id: TrackId,
        reason: String,
    },

    /// Playback reached the end of the stream
    Ended,
}

/// What the engine is asked to open
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaSource {
    pub uri: String,
    pub headers: BTreeMap<String, String>,
}

/// Alternate source offered by the resolver (usually a quality level)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOption {
    pub uri: String,
    pub label: String,
}

/// Track descriptor supplied by the resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestTrack {
    pub uri: String,
    pub label: String,
    pub kind: TrackKind,
}

/// Output of the stream resolver for one piece of content
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSource {
    pub primary_uri: String,
    pub sources: Vec<SourceOption>,
    pub tracks: Vec<ManifestTrack>,
    pub headers: BTreeMap<String, String>,
}

impl StreamSource {
    /// The primary source with the resolver's headers attached
    pub fn primary(&self) -> MediaSource {
        MediaSource {
            uri: self.primary_uri.clone(),
            headers: self.headers.clone(),
        }
    }

    /// Alternate source by label, e.g. "720p"
    pub fn source_labeled(&self, label: &str) -> Option<MediaSource> {
        self.sources
            .iter()
            .find(|s| s.label.eq_ignore_ascii_case(label))
            .map(|s| MediaSource {
                uri: s.uri.clone(),
                headers: self.headers.clone(),
            })
    }

    /// Manifest tracks in normalized form
    pub fn manifest_tracks(&self) -> Vec<Track> {
        self.tracks
            .iter()
            .enumerate()
            .map(|(i, t)| Track::from_manifest(i, t.kind, &t.label, &t.uri))
            .collect()
    }
}
