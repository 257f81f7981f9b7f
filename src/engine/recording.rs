//! In-process engine that records every command it receives
//!
//! Used by the demo binary and by tests to observe exactly what reached the
//! engine, and in which order.

use crate::engine::{EngineFactory, MediaEngine, MediaSource};
use crate::tracks::{Track, TrackId, TrackKind};
use crate::utils::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// A command as seen by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Load(String),
    Play,
    Pause,
    Seek(f64),
    SetRate(f32),
    SetVolume(f32),
    SelectTrack(TrackKind, Option<TrackId>),
}

/// Shared, append-only log of `(engine instance, command)` pairs
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    entries: Arc<Mutex<Vec<(usize, RecordedCommand)>>>,
    instances: Arc<Mutex<usize>>,
}

impl CommandLog {
    fn push(&self, instance: usize, command: RecordedCommand) {
        self.entries.lock().push((instance, command));
    }

    /// All commands across engine instances
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.entries.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Commands received by the most recently created engine
    pub fn last_instance_commands(&self) -> Vec<RecordedCommand> {
        let last = *self.instances.lock();
        self.entries
            .lock()
            .iter()
            .filter(|(i, _)| *i == last)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Seek targets in order
    pub fn seeks(&self) -> Vec<f64> {
        self.entries
            .lock()
            .iter()
            .filter_map(|(_, c)| match c {
                RecordedCommand::Seek(to) => Some(*to),
                _ => None,
            })
            .collect()
    }

    /// Number of engines created so far
    pub fn instances(&self) -> usize {
        *self.instances.lock()
    }
}

pub struct RecordingEngine {
    instance: usize,
    log: CommandLog,
}

impl MediaEngine for RecordingEngine {
    fn load(&mut self, source: &MediaSource) -> Result<()> {
        self.log.push(self.instance, RecordedCommand::Load(source.uri.clone()));
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.log.push(self.instance, RecordedCommand::Play);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.log.push(self.instance, RecordedCommand::Pause);
        Ok(())
    }

    fn seek(&mut self, to_seconds: f64) -> Result<()> {
        self.log.push(self.instance, RecordedCommand::Seek(to_seconds));
        Ok(())
    }

    fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.log.push(self.instance, RecordedCommand::SetRate(rate));
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.log.push(self.instance, RecordedCommand::SetVolume(volume));
        Ok(())
    }

    fn select_track(&mut self, kind: TrackKind, track: Option<&Track>) -> Result<()> {
        self.log.push(
            self.instance,
            RecordedCommand::SelectTrack(kind, track.map(|t| t.id.clone())),
        );
        Ok(())
    }
}

/// Factory handing out [`RecordingEngine`]s that share one [`CommandLog`]
#[derive(Debug, Clone, Default)]
pub struct RecordingEngineFactory {
    log: CommandLog,
}

impl RecordingEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }
}

impl EngineFactory for RecordingEngineFactory {
    fn create(&mut self) -> Result<Box<dyn MediaEngine>> {
        let instance = {
            let mut count = self.log.instances.lock();
            *count += 1;
            *count
        };
        Ok(Box::new(RecordingEngine {
            instance,
            log: self.log.clone(),
        }))
    }
}
