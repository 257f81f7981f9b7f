//! Watch history ("continue watching") entries

use crate::resume::store::KeyValueStore;
use crate::utils::error::{IntoPlayerError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Key holding the serialized history list
pub const HISTORY_KEY: &str = "watch_history";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub progress: f64,
    pub duration: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub provider: Option<String>,
}

/// Sink for history updates. Screens outside the player read it.
pub trait HistoryStore: Send + Sync {
    fn add_to_history(&self, entry: HistoryEntry) -> Result<()>;
}

/// History kept as a most-recent-first JSON list inside a [`KeyValueStore`]
pub struct KeyValueHistory {
    store: Arc<dyn KeyValueStore>,
    limit: usize,
}

impl KeyValueHistory {
    pub fn new(store: Arc<dyn KeyValueStore>, limit: usize) -> Self {
        Self {
            store,
            limit: limit.max(1),
        }
    }

    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        match self.store.get(HISTORY_KEY)? {
            Some(raw) => serde_json::from_str(&raw).persistence_err("Failed to parse history"),
            None => Ok(Vec::new()),
        }
    }
}

impl HistoryStore for KeyValueHistory {
    fn add_to_history(&self, entry: HistoryEntry) -> Result<()> {
        // A read failure may be transient and must not clobber the list;
        // an unparseable list never recovers, so it is replaced
        let mut entries: Vec<HistoryEntry> = match self.store.get(HISTORY_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable watch history: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        entries.retain(|e| e.id != entry.id);
        entries.insert(0, entry);
        entries.truncate(self.limit);

        let raw = serde_json::to_string(&entries).persistence_err("Failed to encode history")?;
        self.store.set(HISTORY_KEY, &raw)
    }
}
