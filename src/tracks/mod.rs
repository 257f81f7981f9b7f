//! Track model for mirrorplay
//!
//! Audio, text and video tracks come from two places: the stream resolver's
//! manifest, known before playback starts, and the engine, which reports the
//! tracks it finds inside the container after loading. This module merges
//! both into one immutable [`TrackSnapshot`] with a per-kind selection.

use crate::utils::error::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Text,
    Video,
}

impl TrackKind {
    /// Only text tracks may be switched off entirely
    pub fn allows_none(self) -> bool {
        matches!(self, TrackKind::Text)
    }
}

/// Stable track identifier, derived from source, index and label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(String);

impl TrackId {
    pub fn derive(source: &str, index: usize, label: &str) -> Self {
        TrackId(format!("{}:{}:{}", source, index, label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized track descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub kind: TrackKind,
    pub label: String,
    pub source_uri: String,
    pub is_default: bool,
}

impl Track {
    /// Build a track from the `index`-th manifest entry
    pub fn from_manifest(index: usize, kind: TrackKind, label: &str, uri: &str) -> Self {
        let label = normalize_label(label, index);
        Self {
            id: TrackId::derive("manifest", index, &label),
            kind,
            label,
            source_uri: uri.to_string(),
            is_default: false,
        }
    }

    fn same_slot(&self, kind: TrackKind, label: &str) -> bool {
        self.kind == kind && self.label.trim().eq_ignore_ascii_case(label.trim())
    }
}

/// Track as reported by the engine after parsing the container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetectedTrack {
    pub kind: TrackKind,

    /// Engine-side index of the stream
    pub index: usize,

    pub title: Option<String>,
    pub language: Option<String>,
    pub is_default: bool,
}

impl RawDetectedTrack {
    /// Display label: title, then language, then a positional fallback
    pub fn label(&self) -> String {
        let raw = self
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.language.as_deref().filter(|l| !l.trim().is_empty()))
            .unwrap_or("");
        normalize_label(raw, self.index)
    }

    fn to_track(&self) -> Track {
        let label = self.label();
        Track {
            id: TrackId::derive("detected", self.index, &label),
            kind: self.kind,
            label,
            // Embedded streams have no separate URI
            source_uri: String::new(),
            is_default: self.is_default,
        }
    }
}

fn normalize_label(label: &str, index: usize) -> String {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        format!("Track {}", index + 1)
    } else {
        trimmed.to_string()
    }
}

/// Merge manifest tracks with engine-detected tracks.
///
/// Manifest tracks keep their order and come first. A detected track is
/// appended only when no track already in the result shares its kind and
/// label, so re-merging a merged list never adds anything.
pub fn merge_tracks(manifest: &[Track], detected: &[RawDetectedTrack]) -> Vec<Track> {
    let mut merged: Vec<Track> = manifest.to_vec();

    for raw in detected {
        let label = raw.label();
        if merged.iter().any(|t| t.same_slot(raw.kind, &label)) {
            continue;
        }
        merged.push(raw.to_track());
    }

    merged
}

/// Currently selected track per kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSelection {
    audio: Option<TrackId>,
    text: Option<TrackId>,
    video: Option<TrackId>,
}

impl TrackSelection {
    pub fn get(&self, kind: TrackKind) -> Option<&TrackId> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Text => self.text.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    fn set(&mut self, kind: TrackKind, id: Option<TrackId>) {
        match kind {
            TrackKind::Audio => self.audio = id,
            TrackKind::Text => self.text = id,
            TrackKind::Video => self.video = id,
        }
    }
}

/// Immutable list of tracks plus the selection pointer.
///
/// The list is shared behind an `Arc` and never modified; discovering new
/// tracks produces a new snapshot through [`TrackSnapshot::replaced`].
#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    tracks: Arc<[Track]>,
    selection: TrackSelection,
}

impl Default for TrackSnapshot {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl TrackSnapshot {
    /// Create a snapshot with default selections
    pub fn new(tracks: Vec<Track>) -> Self {
        let mut snapshot = Self {
            tracks: tracks.into(),
            selection: TrackSelection::default(),
        };
        for kind in [TrackKind::Audio, TrackKind::Text, TrackKind::Video] {
            let default = snapshot.default_for(kind);
            snapshot.selection.set(kind, default);
        }
        snapshot
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn of_kind(&self, kind: TrackKind) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }

    pub fn find(&self, kind: TrackKind, id: &TrackId) -> Option<&Track> {
        self.of_kind(kind).find(|t| &t.id == id)
    }

    pub fn selection(&self) -> &TrackSelection {
        &self.selection
    }

    pub fn selected(&self, kind: TrackKind) -> Option<&Track> {
        self.selection.get(kind).and_then(|id| self.find(kind, id))
    }

    /// Point the selection for `kind` at `id`, or at nothing for text tracks.
    ///
    /// Leaves the selection untouched and returns `InvalidTrackSelection`
    /// when the id is not part of this snapshot.
    pub fn select(&mut self, kind: TrackKind, id: Option<&TrackId>) -> Result<Option<&Track>> {
        let invalid = || PlayerError::InvalidTrackSelection {
            kind,
            id: id.cloned(),
        };

        match id {
            None if kind.allows_none() => {
                self.selection.set(kind, None);
                Ok(None)
            }
            None => Err(invalid()),
            Some(id) => {
                if self.find(kind, id).is_none() {
                    return Err(invalid());
                }
                self.selection.set(kind, Some(id.clone()));
                Ok(self.find(kind, id))
            }
        }
    }

    /// New snapshot over `tracks`, carrying over selections that still exist
    pub fn replaced(&self, tracks: Vec<Track>) -> Self {
        let mut next = Self {
            tracks: tracks.into(),
            selection: TrackSelection::default(),
        };

        for kind in [TrackKind::Audio, TrackKind::Text, TrackKind::Video] {
            let carried = self
                .selection
                .get(kind)
                .filter(|id| next.find(kind, id).is_some())
                .cloned();
            let switched_off = kind.allows_none()
                && self.selection.get(kind).is_none()
                && self.of_kind(kind).next().is_some();

            let chosen = match carried {
                Some(id) => Some(id),
                None if switched_off => None,
                None => next.default_for(kind),
            };
            next.selection.set(kind, chosen);
        }

        next
    }

    fn default_for(&self, kind: TrackKind) -> Option<TrackId> {
        let flagged = self.of_kind(kind).find(|t| t.is_default);
        let chosen = if kind.allows_none() {
            flagged
        } else {
            flagged.or_else(|| self.of_kind(kind).next())
        };
        chosen.map(|t| t.id.clone())
    }
}
