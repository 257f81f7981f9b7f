//! Resume and progress persistence for mirrorplay
//!
//! While playing, the position is saved at most once per throttle interval
//! under `progress_<content key>`, together with a history entry. At mount
//! the stored position is looked up once; when it arrives and the duration
//! is known, at most one resume-seek is issued for the lifetime of the
//! player, however many times the engine reports `Loaded`.
//!
//! Storage is best-effort. Failures are logged and swallowed; the accepted
//! cost is a lost resume position, never interrupted playback.

mod history;
mod store;

pub use history::{HistoryEntry, HistoryStore, KeyValueHistory, HISTORY_KEY};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};

use crate::utils::config::ResumeConfig;
use crate::utils::error::{IntoPlayerError, Result};
use crate::utils::unix_timestamp;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Persisted playback position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRecord {
    pub content_key: String,
    pub position_seconds: f64,
    pub saved_at_epoch: u64,
}

/// Identity and display data of what is being played.
///
/// `content_key` must be stable across sessions; resolved stream URLs are
/// provider-specific and change between sessions, so they make poor keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentInfo {
    pub content_key: String,
    pub title: String,
    pub image_url: Option<String>,
    pub provider: Option<String>,
}

/// Storage key of the resume record for `content_key`
pub fn storage_key(content_key: &str) -> String {
    format!("progress_{}", content_key)
}

/// Decode a stored value: a [`ResumeRecord`] or a bare number of seconds
pub fn parse_stored_position(raw: &str) -> Option<f64> {
    let position = match serde_json::from_str::<ResumeRecord>(raw) {
        Ok(record) => record.position_seconds,
        Err(_) => raw.trim().parse::<f64>().ok()?,
    };
    (position.is_finite() && position >= 0.0).then_some(position)
}

/// Deferred read of the stored position, runnable off the player's thread
pub struct ResumeLookup {
    store: Arc<dyn KeyValueStore>,
    key: String,
    enabled: bool,
}

impl ResumeLookup {
    /// Perform the read. Failures count as "nothing stored".
    pub fn run(self) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        match self.store.get(&self.key) {
            Ok(Some(raw)) => {
                let position = parse_stored_position(&raw);
                if position.is_none() {
                    warn!("Ignoring unreadable resume value under {}", self.key);
                }
                position
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Resume lookup failed for {}: {}", self.key, e);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Lookup {
    Pending,
    Done(Option<f64>),
}

pub struct ResumeTracker {
    config: ResumeConfig,
    content: ContentInfo,
    store: Arc<dyn KeyValueStore>,
    history: Arc<dyn HistoryStore>,
    lookup: Lookup,
    duration: Option<f64>,
    resume_consumed: bool,
    last_save_at: Option<Instant>,
    closed: bool,
}

impl ResumeTracker {
    pub fn new(
        config: ResumeConfig,
        content: ContentInfo,
        store: Arc<dyn KeyValueStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let enabled = config.enabled;
        Self {
            config,
            content,
            store,
            history,
            lookup: if enabled {
                Lookup::Pending
            } else {
                Lookup::Done(None)
            },
            duration: None,
            resume_consumed: false,
            last_save_at: None,
            closed: false,
        }
    }

    pub fn content(&self) -> &ContentInfo {
        &self.content
    }

    pub fn lookup_request(&self) -> ResumeLookup {
        ResumeLookup {
            store: Arc::clone(&self.store),
            key: storage_key(&self.content.content_key),
            enabled: self.config.enabled,
        }
    }

    /// Whether the resume decision has been made (seek issued or skipped)
    pub fn is_resolved(&self) -> bool {
        self.resume_consumed
    }

    /// The stored position arrived. Returns a seek target when one should
    /// be issued right now.
    pub fn lookup_completed(&mut self, stored: Option<f64>) -> Option<f64> {
        if self.lookup != Lookup::Pending {
            debug!("Ignoring repeated resume lookup result");
            return None;
        }
        self.lookup = Lookup::Done(stored);
        self.decide()
    }

    /// The engine reported `Loaded`. Returns a seek target when one should
    /// be issued right now.
    pub fn on_loaded(&mut self, duration_seconds: f64) -> Option<f64> {
        self.duration = Some(duration_seconds);
        self.decide()
    }

    fn decide(&mut self) -> Option<f64> {
        if self.resume_consumed {
            return None;
        }
        let (Lookup::Done(stored), Some(duration)) = (self.lookup, self.duration) else {
            return None;
        };
        self.resume_consumed = true;

        let stored = stored?;
        if duration <= 0.0 {
            debug!("Unknown duration, not resuming {}", self.content.content_key);
            return None;
        }
        if stored <= 0.0 {
            return None;
        }
        if stored >= self.config.watched_threshold * duration {
            info!(
                "{} was watched to {:.0}s of {:.0}s, starting from the beginning",
                self.content.content_key, stored, duration
            );
            return None;
        }

        info!("Resuming {} at {:.1}s", self.content.content_key, stored);
        Some(stored)
    }

    /// Save if the throttle interval has passed since the previous save
    pub fn on_progress(&mut self, now: Instant, position: f64, duration: f64) -> bool {
        if !self.save_due(now) {
            return false;
        }
        self.save(now, position, duration);
        true
    }

    /// Save regardless of the throttle, e.g. when playback ends
    pub fn save_now(&mut self, now: Instant, position: f64, duration: f64) -> bool {
        if !self.can_save() {
            return false;
        }
        self.save(now, position, duration);
        true
    }

    /// Final save attempt when the player closes, if one is overdue.
    /// No saves happen afterwards.
    pub fn close(&mut self, now: Instant, position: f64, duration: f64) -> bool {
        let saved = self.on_progress(now, position, duration);
        self.closed = true;
        saved
    }

    fn can_save(&self) -> bool {
        // Until the resume decision is made, positions reported by the
        // engine may be stale zeros that would clobber the stored value.
        self.config.enabled && !self.closed && self.resume_consumed
    }

    fn save_due(&self, now: Instant) -> bool {
        self.can_save()
            && match self.last_save_at {
                None => true,
                Some(last) => now.saturating_duration_since(last) >= self.config.save_interval(),
            }
    }

    fn save(&mut self, now: Instant, position: f64, duration: f64) {
        // The throttle counts attempts, so a failing store is not hammered
        self.last_save_at = Some(now);

        if let Err(e) = self.write_record(position) {
            warn!("Could not save progress for {}: {}", self.content.content_key, e);
        }

        let entry = HistoryEntry {
            id: self.content.content_key.clone(),
            title: self.content.title.clone(),
            image_url: self.content.image_url.clone(),
            progress: position,
            duration,
            timestamp: unix_timestamp() * 1000,
            provider: self.content.provider.clone(),
        };
        if let Err(e) = self.history.add_to_history(entry) {
            warn!("Could not update history for {}: {}", self.content.content_key, e);
        }

        debug!("Saved {} at {:.1}s", self.content.content_key, position);
    }

    fn write_record(&self, position: f64) -> Result<()> {
        let record = ResumeRecord {
            content_key: self.content.content_key.clone(),
            position_seconds: position,
            saved_at_epoch: unix_timestamp(),
        };
        let raw = serde_json::to_string(&record).persistence_err("Failed to encode resume record")?;
        self.store.set(&storage_key(&self.content.content_key), &raw)
    }
}
