//! One playback of one piece of content
//!
//! [`PlayerSession`] is the single owner of the playback state. Engine
//! events, touch samples, timer polls and user commands all come through
//! `&mut self`, so there is exactly one writer and the order of inputs is
//! the order of effects.

use crate::chrome::{ChromeOrchestrator, DeviceChrome, RecordingChrome};
use crate::controls::{ControlsMachine, ControlsState, Overlay};
use crate::engine::{AdapterPhase, EngineAdapter, EngineCommand, EngineEvent, EngineFactory, StreamSource};
use crate::episodes::{compute_next_episode, Episode};
use crate::gesture::{DragTarget, GestureIntent, GestureRecognizer, SkipDirection, TouchPhase, TouchSample, Viewport};
use crate::player::state::{ErrorInfo, PlaybackState, PositionTracker, TickOutcome};
use crate::player::{PlayerEvent, PlayerEventHandler};
use crate::resume::{ContentInfo, HistoryStore, KeyValueHistory, KeyValueStore, MemoryStore, ResumeLookup, ResumeTracker};
use crate::tracks::{merge_tracks, RawDetectedTrack, Track, TrackId, TrackKind, TrackSnapshot};
use crate::utils::config::Config;
use crate::utils::error::{PlayerError, Result};
use crate::utils::format_seconds;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Builder for [`PlayerSession`]
pub struct PlayerSessionBuilder {
    content: ContentInfo,
    stream: StreamSource,
    config: Config,
    engine_factory: Option<Box<dyn EngineFactory>>,
    store: Option<Arc<dyn KeyValueStore>>,
    history: Option<Arc<dyn HistoryStore>>,
    chrome: Option<Arc<dyn DeviceChrome>>,
    episode: Option<Episode>,
    viewport: Viewport,
    event_handlers: Vec<Box<dyn PlayerEventHandler>>,
}

impl PlayerSessionBuilder {
    pub fn new(content: ContentInfo, stream: StreamSource) -> Self {
        Self {
            content,
            stream,
            config: Config::default(),
            engine_factory: None,
            store: None,
            history: None,
            chrome: None,
            episode: None,
            viewport: Viewport::default(),
            event_handlers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_engine_factory(mut self, factory: Box<dyn EngineFactory>) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    /// Progress store. Defaults to an in-memory store.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// History sink. Defaults to a history list inside the progress store.
    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_chrome(mut self, chrome: Arc<dyn DeviceChrome>) -> Self {
        self.chrome = Some(chrome);
        self
    }

    /// The episode being played, for next-episode lookups
    pub fn with_episode(mut self, episode: Episode) -> Self {
        self.episode = Some(episode);
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn with_event_handler(mut self, handler: Box<dyn PlayerEventHandler>) -> Self {
        self.event_handlers.push(handler);
        self
    }

    pub fn build(self) -> Result<PlayerSession> {
        let PlayerSessionBuilder {
            content,
            stream,
            config,
            engine_factory,
            store,
            history,
            chrome,
            episode,
            viewport,
            event_handlers,
        } = self;

        config.validate()?;
        if content.content_key.trim().is_empty() {
            return Err(PlayerError::InvalidInput("Content key must not be empty".to_string()));
        }
        let factory = engine_factory
            .ok_or_else(|| PlayerError::Config("An engine factory is required".to_string()))?;

        let store = store.unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let history = history.unwrap_or_else(|| {
            Arc::new(KeyValueHistory::new(Arc::clone(&store), config.resume.history_limit))
                as Arc<dyn HistoryStore>
        });
        let chrome = chrome.unwrap_or_else(|| Arc::new(RecordingChrome::new()) as Arc<dyn DeviceChrome>);

        let state = PlaybackState {
            paused: !config.player.auto_play,
            playback_rate: config.player.default_rate,
            volume: config.player.default_volume,
            brightness: config.player.default_brightness,
            ..PlaybackState::default()
        };

        let mut gestures = GestureRecognizer::new(config.gestures.clone());
        gestures.set_viewport(viewport);

        let manifest_tracks = stream.manifest_tracks();

        Ok(PlayerSession {
            positions: PositionTracker::new(
                config.player.seek_tolerance_seconds,
                config.player.seek_settle(),
            ),
            adapter: EngineAdapter::new(factory),
            tracks: TrackSnapshot::new(manifest_tracks.clone()),
            manifest_tracks,
            gestures,
            controls: ControlsMachine::new(config.controls.clone()),
            resume: ResumeTracker::new(config.resume.clone(), content.clone(), store, history),
            chrome: ChromeOrchestrator::new(chrome),
            handlers: event_handlers,
            state,
            config,
            content,
            stream,
            episode,
            mounted: false,
            closed: false,
        })
    }
}

pub struct PlayerSession {
    config: Config,
    content: ContentInfo,
    stream: StreamSource,
    episode: Option<Episode>,
    state: PlaybackState,
    positions: PositionTracker,
    adapter: EngineAdapter,
    manifest_tracks: Vec<Track>,
    tracks: TrackSnapshot,
    gestures: GestureRecognizer,
    controls: ControlsMachine,
    resume: ResumeTracker,
    chrome: ChromeOrchestrator,
    handlers: Vec<Box<dyn PlayerEventHandler>>,
    mounted: bool,
    closed: bool,
}

impl PlayerSession {
    pub fn builder(content: ContentInfo, stream: StreamSource) -> PlayerSessionBuilder {
        PlayerSessionBuilder::new(content, stream)
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn tracks(&self) -> &TrackSnapshot {
        &self.tracks
    }

    pub fn content(&self) -> &ContentInfo {
        &self.content
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn controls_state(&self) -> ControlsState {
        self.controls.state()
    }

    pub fn overlay(&self) -> Overlay {
        self.controls.overlay()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.chrome.is_fullscreen()
    }

    pub fn is_pip_active(&self) -> bool {
        self.chrome.is_pip_active()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn engine_phase(&self) -> AdapterPhase {
        self.adapter.phase()
    }

    /// Position to act on: a pending seek target, else the confirmed position
    pub fn authoritative_position(&self) -> f64 {
        self.positions.authoritative(self.state.position_seconds)
    }

    pub fn subscribe(&mut self, handler: Box<dyn PlayerEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.gestures.set_viewport(viewport);
    }

    /// Start the session: apply chrome, open the primary source and queue
    /// the initial commands.
    ///
    /// Returns the stored-position lookup. The caller runs it wherever
    /// blocking is acceptable and hands the result to
    /// [`resume_lookup_completed`](Self::resume_lookup_completed).
    pub fn mount(&mut self, now: Instant, start_in_pip: bool) -> ResumeLookup {
        if self.mounted || self.closed {
            warn!("Session for {} is already mounted", self.content.content_key);
            return self.resume.lookup_request();
        }
        self.mounted = true;
        info!("Mounting player for {}", self.content.content_key);

        self.chrome.mount(start_in_pip, self.config.player.fullscreen_on_mount);
        self.controls.set_pip(start_in_pip, now);
        self.controls.set_paused(self.state.paused, now);

        if let Err(e) = self.adapter.set_volume(self.state.volume) {
            warn!("Initial volume was not applied: {}", e);
        }

        self.state.buffering_or_loading = true;
        match self.adapter.load(self.stream.primary()) {
            Ok(()) => self.queue_start_commands(),
            Err(e) => self.fail_load(&e),
        }

        let tracks = self.tracks.clone();
        self.emit(PlayerEvent::TracksChanged { tracks });
        self.resume.lookup_request()
    }

    /// Result of the lookup returned by [`mount`](Self::mount)
    pub fn resume_lookup_completed(&mut self, now: Instant, stored: Option<f64>) {
        if self.closed {
            return;
        }
        if let Some(target) = self.resume.lookup_completed(stored) {
            self.resume_seek(target, now);
        }
    }

    pub fn handle_engine_event(&mut self, now: Instant, event: EngineEvent) {
        if self.closed {
            debug!("Ignoring {:?} after close", event);
            return;
        }
        // The failed engine is gone; anything it still reports is stale
        if self.adapter.phase() == AdapterPhase::Failed && !matches!(event, EngineEvent::Error { .. }) {
            debug!("Ignoring {:?} from failed engine", event);
            return;
        }

        match event {
            EngineEvent::Loaded {
                duration_seconds,
                detected_tracks,
            } => self.on_loaded(now, duration_seconds, &detected_tracks),
            EngineEvent::Progress { position_seconds } => self.on_progress(now, position_seconds),
            EngineEvent::Buffering { is_buffering } => {
                if self.state.buffering_or_loading != is_buffering {
                    self.state.buffering_or_loading = is_buffering;
                    self.emit(PlayerEvent::BufferingChanged { is_buffering });
                }
            }
            EngineEvent::Error { message } => {
                let err = self.adapter.on_error(&message);
                self.fail_load(&err);
            }
            EngineEvent::TrackRejected {
                kind,
                track_id,
                reason,
            } => {
                let err = PlayerError::EngineTrackRejected {
                    kind,
                    id: track_id.clone(),
                    reason: reason.clone(),
                };
                warn!("{}", err);
                self.state.last_error = Some(ErrorInfo {
                    message: err.to_string(),
                    fatal: false,
                });
                self.emit(PlayerEvent::TrackRejected {
                    kind,
                    track_id,
                    reason,
                });
            }
            EngineEvent::Ended => self.on_ended(now),
        }
    }

    /// Feed one touch sample; its timestamp is the current time
    pub fn handle_touch(&mut self, sample: TouchSample) {
        // The PiP host draws its own chrome and swallows touches
        if self.closed || self.chrome.is_pip_active() {
            return;
        }
        let now = sample.at;

        if self.controls.state().is_locked() {
            if sample.phase == TouchPhase::Down {
                let before = self.controls.state();
                self.controls.touch_while_locked(now);
                self.controls_changed(before);
            }
            self.gestures.reset();
            return;
        }

        let intents = self.gestures.handle(sample);
        self.apply_intents(intents, now);
    }

    /// Fire due timers
    pub fn poll(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        let intents = self.gestures.poll(now);
        self.apply_intents(intents, now);

        if let Some(state) = self.controls.poll(now) {
            self.emit(PlayerEvent::ControlsChanged { state });
        }
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.closed {
            return None;
        }
        match (self.gestures.next_deadline(), self.controls.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn play(&mut self, now: Instant) -> Result<()> {
        self.ensure_open()?;
        if self.state.ended {
            self.issue_seek(0.0, now)?;
        }
        self.adapter.play()?;

        self.state.paused = false;
        self.state.ended = false;
        self.controls.set_paused(false, now);
        self.emit(PlayerEvent::PlaybackStarted);
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) -> Result<()> {
        self.ensure_open()?;
        self.adapter.pause()?;

        self.state.paused = true;
        self.controls.set_paused(true, now);
        self.emit(PlayerEvent::PlaybackPaused);
        Ok(())
    }

    pub fn toggle_play(&mut self, now: Instant) -> Result<()> {
        if self.state.paused {
            self.play(now)
        } else {
            self.pause(now)
        }
    }

    /// Seek to an absolute position, clamped to the content
    pub fn seek(&mut self, to_seconds: f64, now: Instant) -> Result<()> {
        self.ensure_open()?;
        if !to_seconds.is_finite() {
            return Err(PlayerError::InvalidInput(format!(
                "Seek target {} is not a number",
                to_seconds
            )));
        }
        let target = self.state.clamp_target(to_seconds);
        self.issue_seek(target, now)?;
        self.controls.interaction(now);
        Ok(())
    }

    /// Skip by the configured step from the authoritative position
    pub fn skip(&mut self, direction: SkipDirection, now: Instant) -> Result<()> {
        let step = self.config.player.seek_step_seconds;
        let from = self.authoritative_position();
        let target = match direction {
            SkipDirection::Backward => from - step,
            SkipDirection::Forward => from + step,
        };
        debug!("Skip {:?} from {:.1}s", direction, from);
        self.seek(target, now)
    }

    pub fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.ensure_open()?;
        self.adapter.set_rate(rate)?;
        self.state.playback_rate = rate;
        self.emit(PlayerEvent::RateChanged { rate });
        Ok(())
    }

    /// Set volume, clamped to `[0, 1]`
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.ensure_open()?;
        if !volume.is_finite() {
            return Err(PlayerError::InvalidInput(format!("Volume {} is not a number", volume)));
        }
        let volume = volume.clamp(0.0, 1.0);
        self.adapter.set_volume(volume)?;
        if volume != self.state.volume {
            self.state.volume = volume;
            self.emit(PlayerEvent::VolumeChanged { volume });
        }
        Ok(())
    }

    /// Set screen brightness, clamped to `[0, 1]`. Applied by the host.
    pub fn set_brightness(&mut self, brightness: f32) {
        if self.closed || !brightness.is_finite() {
            return;
        }
        let brightness = brightness.clamp(0.0, 1.0);
        if brightness != self.state.brightness {
            self.state.brightness = brightness;
            self.emit(PlayerEvent::BrightnessChanged { brightness });
        }
    }

    /// Select a track, or switch text tracks off with `None`
    pub fn select_track(&mut self, kind: TrackKind, id: Option<&TrackId>) -> Result<()> {
        self.ensure_open()?;
        let track = self.tracks.select(kind, id)?.cloned();
        info!(
            "Selected {:?} track {}",
            kind,
            track.as_ref().map_or("off", |t| t.label.as_str())
        );

        let tracks = self.tracks.clone();
        self.emit(PlayerEvent::TracksChanged { tracks });
        // A rejection comes back later as an engine event; the selection stays
        self.adapter.select_track(kind, track)
    }

    pub fn open_settings(&mut self, now: Instant) -> ControlsState {
        let before = self.controls.state();
        self.controls.open_settings(now);
        self.controls_changed(before)
    }

    pub fn close_settings(&mut self, now: Instant) -> ControlsState {
        let before = self.controls.state();
        self.controls.close_settings(now);
        self.controls_changed(before)
    }

    pub fn lock(&mut self, now: Instant) -> ControlsState {
        let before = self.controls.state();
        self.controls.lock(now);
        self.gestures.reset();
        self.controls_changed(before)
    }

    pub fn unlock(&mut self, now: Instant) -> ControlsState {
        let before = self.controls.state();
        self.controls.unlock(now);
        self.controls_changed(before)
    }

    pub fn toggle_fullscreen(&mut self) -> bool {
        let fullscreen = self.chrome.toggle_fullscreen();
        self.emit(PlayerEvent::FullscreenChanged { fullscreen });
        fullscreen
    }

    pub fn enter_pip(&mut self, now: Instant) {
        if self.chrome.is_pip_active() {
            return;
        }
        self.chrome.enter_pip();
        self.controls.set_pip(true, now);
        self.gestures.reset();
        self.emit(PlayerEvent::PipChanged { active: true });
    }

    pub fn exit_pip(&mut self, now: Instant) {
        if !self.chrome.is_pip_active() {
            return;
        }
        self.chrome.exit_pip();
        self.controls.set_pip(false, now);
        self.emit(PlayerEvent::PipChanged { active: false });
        let fullscreen = self.chrome.is_fullscreen();
        self.emit(PlayerEvent::FullscreenChanged { fullscreen });
    }

    /// Switch to an alternate source (quality level) of the same content,
    /// continuing from the current position
    pub fn switch_source(&mut self, label: &str, now: Instant) -> Result<()> {
        self.ensure_open()?;
        let source = self
            .stream
            .source_labeled(label)
            .ok_or_else(|| PlayerError::InvalidInput(format!("No source labeled {}", label)))?;

        let continue_at = self.authoritative_position();
        let was_playing = !self.state.paused;

        self.state.buffering_or_loading = true;
        if self.state.is_failed() {
            self.state.last_error = None;
        }
        if let Err(e) = self.adapter.switch_source(source) {
            self.fail_load(&e);
            return Err(e);
        }

        if continue_at > 0.0 {
            self.issue_seek(continue_at, now)?;
        }
        if was_playing {
            self.adapter.play()?;
        }
        Ok(())
    }

    /// Load the source again with a fresh engine
    pub fn retry(&mut self, now: Instant) -> Result<()> {
        self.ensure_open()?;
        info!("Retrying {}", self.content.content_key);

        let continue_at = self.authoritative_position();
        self.state.last_error = None;
        self.state.buffering_or_loading = true;
        self.positions.clear();

        let result = if self.adapter.source().is_some() {
            self.adapter.retry()
        } else {
            self.adapter.load(self.stream.primary())
        };
        if let Err(e) = result {
            self.fail_load(&e);
            return Err(e);
        }
        self.emit(PlayerEvent::Retrying);

        // Before the resume decision the tracker still handles the position
        if self.resume.is_resolved() && continue_at > 0.0 {
            self.issue_seek(continue_at, now)?;
        }
        self.queue_start_commands();
        Ok(())
    }

    /// Tear down: cancel timers, save progress if due, revert device chrome.
    /// Nothing fires or saves afterwards.
    pub fn close(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        info!("Closing player for {}", self.content.content_key);

        self.controls.cancel_all();
        self.gestures.reset();
        let position = self.authoritative_position();
        self.resume.close(now, position, self.state.duration_seconds);
        self.chrome.unmount();

        self.closed = true;
        self.emit(PlayerEvent::Closed);
    }

    /// Episode to offer after the current one, if any
    pub fn next_episode<'a>(&self, all: &'a [Episode]) -> Option<&'a Episode> {
        self.episode
            .as_ref()
            .and_then(|current| compute_next_episode(current, all))
    }

    fn on_loaded(&mut self, now: Instant, duration_seconds: f64, detected: &[RawDetectedTrack]) {
        let duration = if duration_seconds.is_finite() && duration_seconds > 0.0 {
            duration_seconds
        } else {
            0.0
        };
        self.state.duration_seconds = duration;
        self.state.buffering_or_loading = false;

        let merged = merge_tracks(&self.manifest_tracks, detected);
        self.tracks = self.tracks.replaced(merged);

        match self.adapter.on_loaded() {
            Ok(true) => {
                info!(
                    "{} loaded, duration {}",
                    self.content.content_key,
                    format_seconds(duration)
                );
                // A queued seek only reaches the engine now
                self.positions.restamp(now);
            }
            Ok(false) => debug!("Repeated Loaded for {}", self.content.content_key),
            Err(e) if e.is_fatal() => {
                self.fail_load(&e);
                return;
            }
            Err(e) => {
                warn!("Queued command failed after load: {}", e);
                self.positions.restamp(now);
            }
        }

        self.emit(PlayerEvent::MediaLoaded {
            duration_seconds: duration,
        });
        let tracks = self.tracks.clone();
        self.emit(PlayerEvent::TracksChanged { tracks });

        if let Some(target) = self.resume.on_loaded(duration) {
            self.resume_seek(target, now);
        }
    }

    fn on_progress(&mut self, now: Instant, position_seconds: f64) {
        if !position_seconds.is_finite() {
            return;
        }
        // Until `Loaded`, ticks belong to the source being replaced
        if self.adapter.phase() == AdapterPhase::Loading {
            debug!("Ignoring tick {:.1}s while loading", position_seconds);
            return;
        }
        if self.positions.on_tick(position_seconds, now) == TickOutcome::Accepted {
            self.state.set_position(position_seconds);
            let position_seconds = self.state.position_seconds;
            self.emit(PlayerEvent::PositionChanged { position_seconds });
        }

        let position = self.authoritative_position();
        self.resume.on_progress(now, position, self.state.duration_seconds);
    }

    fn on_ended(&mut self, now: Instant) {
        info!("{} reached the end", self.content.content_key);
        self.positions.clear();
        if self.state.has_duration() {
            self.state.set_position(self.state.duration_seconds);
        }
        self.state.paused = true;
        self.state.ended = true;

        self.controls.set_paused(true, now);
        let before = self.controls.state();
        self.controls.show(now);
        self.controls_changed(before);

        let position = self.authoritative_position();
        self.resume.save_now(now, position, self.state.duration_seconds);
        self.emit(PlayerEvent::Ended);
    }

    fn apply_intents(&mut self, intents: Vec<GestureIntent>, now: Instant) {
        for intent in intents {
            match intent {
                GestureIntent::SingleTap => {
                    let before = self.controls.state();
                    self.controls.single_tap(now);
                    self.controls_changed(before);
                }
                GestureIntent::DoubleTap(direction) => {
                    if let Err(e) = self.skip(direction, now) {
                        warn!("Skip {:?} failed: {}", direction, e);
                    }
                }
                GestureIntent::Drag { target, delta } => {
                    let delta = delta as f32;
                    match target {
                        DragTarget::Brightness => self.set_brightness(self.state.brightness + delta),
                        DragTarget::Volume => {
                            if let Err(e) = self.set_volume(self.state.volume + delta) {
                                warn!("Volume drag failed: {}", e);
                            }
                        }
                    }
                    self.controls.interaction(now);
                }
            }
        }
    }

    fn issue_seek(&mut self, target: f64, now: Instant) -> Result<()> {
        self.adapter.seek(target)?;
        self.positions.seek_issued(target, now);
        self.state.ended = false;
        self.emit(PlayerEvent::SeekIssued {
            target_seconds: target,
        });
        Ok(())
    }

    fn resume_seek(&mut self, target: f64, now: Instant) {
        if let Err(e) = self.issue_seek(target, now) {
            warn!("Resume seek to {:.1}s failed: {}", target, e);
        }
    }

    /// Rate and autoplay for a fresh load; they wait in the adapter queue.
    /// Commands issued before the first load are already queued.
    fn queue_start_commands(&mut self) {
        let rate = EngineCommand::SetRate(self.state.playback_rate);
        if self.state.playback_rate != 1.0 && !self.adapter.is_queued(&rate) {
            if let Err(e) = self.adapter.set_rate(self.state.playback_rate) {
                warn!("Initial rate was not applied: {}", e);
            }
        }
        if !self.state.paused && !self.adapter.is_queued(&EngineCommand::Play) {
            if let Err(e) = self.adapter.play() {
                warn!("Autoplay was not queued: {}", e);
            }
        }
    }

    fn fail_load(&mut self, err: &PlayerError) {
        error!("Playback of {} failed: {}", self.content.content_key, err);
        self.state.buffering_or_loading = false;
        self.positions.clear();

        let message = err.to_string();
        self.state.last_error = Some(ErrorInfo {
            message: message.clone(),
            fatal: true,
        });
        self.emit(PlayerEvent::Error { message, fatal: true });
    }

    fn controls_changed(&mut self, before: ControlsState) -> ControlsState {
        let state = self.controls.state();
        if state != before {
            self.emit(PlayerEvent::ControlsChanged { state });
        }
        state
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(PlayerError::InvalidInput("Session is closed".to_string()));
        }
        Ok(())
    }

    fn emit(&mut self, event: PlayerEvent) {
        for handler in &mut self.handlers {
            handler.handle_event(event.clone());
        }
    }
}
