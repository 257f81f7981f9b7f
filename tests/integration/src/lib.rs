//! Integration test utilities for mirrorplay
//!
//! This module provides common utilities for integration testing including:
//! - A session harness wired to recording fakes
//! - Synthetic touch sequences
//! - Storage doubles that fail on demand

use mirrorplay::chrome::RecordingChrome;
use mirrorplay::engine::{CommandLog, EngineEvent, ManifestTrack, RecordingEngineFactory, SourceOption, StreamSource};
use mirrorplay::player::PlayerEventHandler;
use mirrorplay::resume::{ContentInfo, KeyValueStore, MemoryStore};
use mirrorplay::tracks::TrackKind;
use mirrorplay::utils::error::{PlayerError, Result};
use mirrorplay::{Config, PlayerEvent, PlayerSession};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Key used by every harness session
pub const CONTENT_KEY: &str = "tv-1399-s1e1";

/// Session plus handles on all of its collaborators
pub struct Harness {
    pub session: PlayerSession,
    pub log: CommandLog,
    pub chrome: RecordingChrome,
    pub events: EventLog,
}

/// Events received by the session's subscriber
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<PlayerEvent>>>,
}

impl EventLog {
    pub fn all(&self) -> Vec<PlayerEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&PlayerEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl PlayerEventHandler for EventLog {
    fn handle_event(&mut self, event: PlayerEvent) {
        self.events.lock().push(event);
    }
}

pub fn content() -> ContentInfo {
    ContentInfo {
        content_key: CONTENT_KEY.to_string(),
        title: "Winter Is Coming".to_string(),
        image_url: Some("https://img.example/s1e1.jpg".to_string()),
        provider: Some("mirror-a".to_string()),
    }
}

/// Resolver output with one alternate source and an English audio track
pub fn stream() -> StreamSource {
    StreamSource {
        primary_uri: "https://mirror.example/s1e1/master.m3u8".to_string(),
        sources: vec![SourceOption {
            uri: "https://mirror.example/s1e1/720.m3u8".to_string(),
            label: "720p".to_string(),
        }],
        tracks: vec![ManifestTrack {
            uri: "https://mirror.example/s1e1/audio-en.m3u8".to_string(),
            label: "English".to_string(),
            kind: TrackKind::Audio,
        }],
        ..Default::default()
    }
}

pub fn harness() -> Harness {
    harness_with(Config::default(), Arc::new(MemoryStore::new()))
}

pub fn harness_with(config: Config, store: Arc<dyn KeyValueStore>) -> Harness {
    let factory = RecordingEngineFactory::new();
    let log = factory.log();
    let chrome = RecordingChrome::new();
    let events = EventLog::default();

    let session = PlayerSession::builder(content(), stream())
        .with_config(config)
        .with_engine_factory(Box::new(factory))
        .with_store(store)
        .with_chrome(Arc::new(chrome.clone()))
        .with_event_handler(Box::new(events.clone()))
        .build()
        .expect("harness session builds");

    Harness {
        session,
        log,
        chrome,
        events,
    }
}

impl Harness {
    /// Mount, run the resume lookup inline and deliver its result
    pub fn mount(&mut self, now: Instant) {
        let lookup = self.session.mount(now, false);
        let stored = lookup.run();
        self.session.resume_lookup_completed(now, stored);
    }

    pub fn engine(&mut self, now: Instant, event: EngineEvent) {
        self.session.handle_engine_event(now, event);
    }

    pub fn touches(&mut self, samples: impl IntoIterator<Item = mirrorplay::gesture::TouchSample>) {
        for sample in samples {
            self.session.handle_touch(sample);
        }
    }
}

pub fn loaded(duration_seconds: f64) -> EngineEvent {
    EngineEvent::Loaded {
        duration_seconds,
        detected_tracks: Vec::new(),
    }
}

pub fn progress(position_seconds: f64) -> EngineEvent {
    EngineEvent::Progress { position_seconds }
}

pub fn ms(base: Instant, millis: u64) -> Instant {
    base + Duration::from_millis(millis)
}

/// Resume record JSON as the player writes it
pub fn stored_record(position_seconds: f64) -> String {
    serde_json::json!({
        "contentKey": CONTENT_KEY,
        "positionSeconds": position_seconds,
        "savedAtEpoch": 1_700_000_000u64,
    })
    .to_string()
}

/// Synthetic touch sequences
pub mod touch {
    use mirrorplay::gesture::TouchSample;
    use std::time::{Duration, Instant};

    /// Press and release in place, 50 ms apart
    pub fn tap(x: f64, y: f64, at: Instant) -> Vec<TouchSample> {
        vec![
            TouchSample::down(x, y, at),
            TouchSample::up(x, y, at + Duration::from_millis(50)),
        ]
    }

    /// Two taps whose presses are `gap_ms` apart
    pub fn two_taps(x: f64, y: f64, at: Instant, gap_ms: u64) -> Vec<TouchSample> {
        let mut samples = tap(x, y, at);
        samples.extend(tap(x, y, at + Duration::from_millis(gap_ms)));
        samples
    }

    /// Vertical drag from `from_y` to `to_y` in `steps` moves, 16 ms apart
    pub fn vertical_drag(x: f64, from_y: f64, to_y: f64, steps: u32, at: Instant) -> Vec<TouchSample> {
        let mut samples = vec![TouchSample::down(x, from_y, at)];
        let step_y = (to_y - from_y) / f64::from(steps);
        let mut t = at;
        for i in 1..=steps {
            t += Duration::from_millis(16);
            samples.push(TouchSample::moved(x, from_y + step_y * f64::from(i), t));
        }
        samples.push(TouchSample::up(x, to_y, t + Duration::from_millis(16)));
        samples
    }
}

/// Store whose reads and writes can be switched to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<bool>,
    failed_writes: Mutex<usize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn failed_writes(&self) -> usize {
        *self.failed_writes.lock()
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if *self.failing.lock() {
            return Err(PlayerError::Persistence("disk unavailable".to_string()));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if *self.failing.lock() {
            *self.failed_writes.lock() += 1;
            return Err(PlayerError::Persistence("disk unavailable".to_string()));
        }
        self.inner.set(key, value)
    }
}
