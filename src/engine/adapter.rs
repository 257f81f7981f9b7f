//! Ordering layer between the player and the media engine
//!
//! Commands issued before the engine has finished loading are queued and
//! flushed in order once it has. An engine error is terminal for that engine
//! instance; only [`EngineAdapter::retry`] brings playback back, with a fresh
//! engine from the factory.

use crate::engine::{EngineFactory, MediaEngine, MediaSource};
use crate::tracks::{Track, TrackKind};
use crate::utils::error::{PlayerError, Result};
use log::{debug, error, info, warn};
use std::collections::VecDeque;

/// Command held back until the engine has loaded
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Play,
    Pause,
    Seek(f64),
    SetRate(f32),
    SelectTrack {
        kind: TrackKind,
        track: Option<Track>,
    },
}

/// Lifecycle of the adapted engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterPhase {
    /// Nothing loaded yet
    Idle,

    /// `load` issued, `Loaded` not yet seen
    Loading,

    /// Commands go straight to the engine
    Ready,

    /// The engine reported an error and was discarded
    Failed,
}

pub struct EngineAdapter {
    factory: Box<dyn EngineFactory>,
    engine: Option<Box<dyn MediaEngine>>,
    source: Option<MediaSource>,
    phase: AdapterPhase,
    pending: VecDeque<EngineCommand>,
    volume: f32,
    last_error: Option<String>,
}

impl EngineAdapter {
    pub fn new(factory: Box<dyn EngineFactory>) -> Self {
        Self {
            factory,
            engine: None,
            source: None,
            phase: AdapterPhase::Idle,
            pending: VecDeque::new(),
            volume: 1.0,
            last_error: None,
        }
    }

    pub fn phase(&self) -> AdapterPhase {
        self.phase
    }

    pub fn source(&self) -> Option<&MediaSource> {
        self.source.as_ref()
    }

    /// Number of commands waiting for the load to complete
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_queued(&self, command: &EngineCommand) -> bool {
        self.pending.contains(command)
    }

    /// Open `source` on the current engine, creating one if needed.
    ///
    /// Commands issued before the first load stay queued for it; commands
    /// queued for a previous load are dropped.
    pub fn load(&mut self, source: MediaSource) -> Result<()> {
        if self.phase != AdapterPhase::Idle {
            self.pending.clear();
        }
        self.start_load(source)
    }

    /// Re-open the last source with a fresh engine after an error
    pub fn retry(&mut self) -> Result<()> {
        let source = self
            .source
            .clone()
            .ok_or_else(|| PlayerError::InvalidInput("Nothing to retry".to_string()))?;

        info!("Retrying load of {}", source.uri);
        // The failed instance is never trusted again
        self.engine = None;
        self.pending.clear();
        self.start_load(source)
    }

    /// Switch to another source of the same content, keeping queued commands
    pub fn switch_source(&mut self, source: MediaSource) -> Result<()> {
        if self.phase == AdapterPhase::Failed {
            self.engine = None;
            self.pending.clear();
        }
        info!("Switching source to {}", source.uri);
        self.start_load(source)
    }

    fn start_load(&mut self, source: MediaSource) -> Result<()> {
        if self.engine.is_none() {
            let mut engine = match self.factory.create() {
                Ok(engine) => engine,
                Err(e) => return Err(self.fail(e.to_string())),
            };
            if let Err(e) = engine.set_volume(self.volume) {
                warn!("Fresh engine refused volume: {}", e);
            }
            self.engine = Some(engine);
        }

        self.phase = AdapterPhase::Loading;
        self.last_error = None;
        self.source = Some(source.clone());

        let result = match self.engine.as_mut() {
            Some(engine) => engine.load(&source),
            None => Err(PlayerError::Load("No engine available".to_string())),
        };

        if let Err(e) = result {
            let message = e.to_string();
            return Err(self.fail(message));
        }

        debug!("Load issued for {}", source.uri);
        Ok(())
    }

    /// Handle the engine's `Loaded` event.
    ///
    /// Returns `true` when this completed a pending load. A `Loaded` while
    /// already ready (or after a failure) changes nothing.
    pub fn on_loaded(&mut self) -> Result<bool> {
        if self.phase != AdapterPhase::Loading {
            debug!("Ignoring Loaded in phase {:?}", self.phase);
            return Ok(false);
        }

        self.phase = AdapterPhase::Ready;
        debug!("Engine ready, flushing {} queued commands", self.pending.len());

        let mut first_error = None;
        while let Some(command) = self.pending.pop_front() {
            if let Err(e) = self.forward(&command) {
                warn!("Queued {:?} failed: {}", command, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }

    /// Handle the engine's `Error` event and return the resulting load error
    pub fn on_error(&mut self, message: &str) -> PlayerError {
        self.fail(message.to_string())
    }

    fn fail(&mut self, message: String) -> PlayerError {
        error!("Engine failed: {}", message);
        self.phase = AdapterPhase::Failed;
        self.engine = None;
        self.pending.clear();
        self.last_error = Some(message.clone());
        PlayerError::Load(message)
    }

    pub fn play(&mut self) -> Result<()> {
        self.dispatch(EngineCommand::Play)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.dispatch(EngineCommand::Pause)
    }

    pub fn seek(&mut self, to_seconds: f64) -> Result<()> {
        if !to_seconds.is_finite() || to_seconds < 0.0 {
            return Err(PlayerError::InvalidInput(format!(
                "Seek target {} is not a valid position",
                to_seconds
            )));
        }
        self.dispatch(EngineCommand::Seek(to_seconds))
    }

    pub fn set_rate(&mut self, rate: f32) -> Result<()> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(PlayerError::InvalidInput(format!(
                "Playback rate must be positive, got {}",
                rate
            )));
        }
        self.dispatch(EngineCommand::SetRate(rate))
    }

    pub fn select_track(&mut self, kind: TrackKind, track: Option<Track>) -> Result<()> {
        self.dispatch(EngineCommand::SelectTrack { kind, track })
    }

    /// Volume is not order-sensitive and is applied immediately
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.volume = volume.clamp(0.0, 1.0);
        match self.engine.as_mut() {
            Some(engine) => engine.set_volume(self.volume),
            None => Ok(()),
        }
    }

    fn dispatch(&mut self, command: EngineCommand) -> Result<()> {
        match self.phase {
            AdapterPhase::Ready => self.forward(&command),
            AdapterPhase::Idle | AdapterPhase::Loading => {
                debug!("Queueing {:?} until load completes", command);
                self.pending.push_back(command);
                Ok(())
            }
            AdapterPhase::Failed => Err(PlayerError::Load(
                self.last_error
                    .clone()
                    .unwrap_or_else(|| "Engine failed".to_string()),
            )),
        }
    }

    fn forward(&mut self, command: &EngineCommand) -> Result<()> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| PlayerError::Engine("No engine instance".to_string()))?;

        match command {
            EngineCommand::Play => engine.play(),
            EngineCommand::Pause => engine.pause(),
            EngineCommand::Seek(to) => engine.seek(*to),
            EngineCommand::SetRate(rate) => engine.set_rate(*rate),
            EngineCommand::SelectTrack { kind, track } => engine.select_track(*kind, track.as_ref()),
        }
    }
}
