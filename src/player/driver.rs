//! Async driver for a [`PlayerSession`]
//!
//! One tokio task owns the session. It waits on the input channel and on the
//! session's next timer deadline, whichever comes first. The stored-position
//! lookup runs on the blocking pool and comes back through the same channel,
//! so slow storage never delays touch or engine handling.

use crate::engine::EngineEvent;
use crate::gesture::{SkipDirection, TouchSample};
use crate::player::PlayerSession;
use crate::tracks::{TrackId, TrackKind};
use crate::utils::error::{PlayerError, Result};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const INPUT_CAPACITY: usize = 256;

/// Explicit user command
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Play,
    Pause,
    TogglePlay,
    Seek(f64),
    Skip(SkipDirection),
    SetRate(f32),
    SetVolume(f32),
    SetBrightness(f32),
    SelectTrack {
        kind: TrackKind,
        id: Option<TrackId>,
    },
    OpenSettings,
    CloseSettings,
    Lock,
    Unlock,
    ToggleFullscreen,
    EnterPip,
    ExitPip,
    SwitchSource(String),
    Retry,
}

/// Everything the driver task reacts to
#[derive(Debug, Clone)]
pub enum SessionInput {
    Engine(EngineEvent),
    Touch(TouchSample),
    Command(SessionCommand),
    ResumeLookup(Option<f64>),
    Close,
}

pub struct SessionDriver;

impl SessionDriver {
    /// Mount `session` and run it on a new task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(session: PlayerSession) -> SessionHandle {
        Self::spawn_with(session, false)
    }

    /// Like [`spawn`](Self::spawn), optionally starting in picture-in-picture
    pub fn spawn_with(mut session: PlayerSession, start_in_pip: bool) -> SessionHandle {
        let (tx, rx) = mpsc::channel(INPUT_CAPACITY);

        let lookup = session.mount(now(), start_in_pip);
        let lookup_tx = tx.clone();
        tokio::spawn(async move {
            let stored = match tokio::task::spawn_blocking(move || lookup.run()).await {
                Ok(stored) => stored,
                Err(e) => {
                    warn!("Resume lookup task failed: {}", e);
                    None
                }
            };
            // The session may already be gone
            let _ = lookup_tx.send(SessionInput::ResumeLookup(stored)).await;
        });

        let task = tokio::spawn(run(session, rx));
        SessionHandle { tx, task }
    }
}

/// Handle to a running session
pub struct SessionHandle {
    tx: mpsc::Sender<SessionInput>,
    task: JoinHandle<PlayerSession>,
}

impl SessionHandle {
    /// Sender for collaborators that report from elsewhere, e.g. an engine
    /// callback thread
    pub fn sender(&self) -> mpsc::Sender<SessionInput> {
        self.tx.clone()
    }

    pub async fn send(&self, input: SessionInput) -> Result<()> {
        self.tx
            .send(input)
            .await
            .map_err(|_| PlayerError::InvalidInput("Session is closed".to_string()))
    }

    pub async fn engine_event(&self, event: EngineEvent) -> Result<()> {
        self.send(SessionInput::Engine(event)).await
    }

    pub async fn touch(&self, sample: TouchSample) -> Result<()> {
        self.send(SessionInput::Touch(sample)).await
    }

    pub async fn command(&self, command: SessionCommand) -> Result<()> {
        self.send(SessionInput::Command(command)).await
    }

    /// Close the session and wait for the task to finish.
    ///
    /// Returns the closed session for inspection.
    pub async fn close(self) -> Result<PlayerSession> {
        // If the task already stopped, joining below reports why
        let _ = self.tx.send(SessionInput::Close).await;
        self.task
            .await
            .map_err(|e| PlayerError::Engine(format!("Session task failed: {}", e)))
    }
}

/// Current time as seen by the session. Follows tokio's clock, so paused
/// test time applies to the session as well.
pub(crate) fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn run(mut session: PlayerSession, mut rx: mpsc::Receiver<SessionInput>) -> PlayerSession {
    info!("Session driver started for {}", session.content().content_key);

    loop {
        let deadline = session.next_deadline();
        // Placeholder instant for the disabled branch; never awaited
        let wake_at = deadline
            .map(Instant::from_std)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            input = rx.recv() => match input {
                Some(SessionInput::Close) | None => break,
                Some(input) => apply(&mut session, input),
            },
            _ = tokio::time::sleep_until(wake_at), if deadline.is_some() => {
                session.poll(now());
            }
        }
    }

    session.close(now());
    info!("Session driver stopped for {}", session.content().content_key);
    session
}

fn apply(session: &mut PlayerSession, input: SessionInput) {
    let now = now();
    match input {
        SessionInput::Engine(event) => session.handle_engine_event(now, event),
        SessionInput::Touch(sample) => session.handle_touch(sample),
        SessionInput::ResumeLookup(stored) => session.resume_lookup_completed(now, stored),
        SessionInput::Command(command) => {
            debug!("Command {:?}", command);
            if let Err(e) = execute(session, command.clone(), now) {
                warn!("{:?} failed: {}", command, e);
            }
        }
        SessionInput::Close => {}
    }
}

fn execute(session: &mut PlayerSession, command: SessionCommand, now: std::time::Instant) -> Result<()> {
    match command {
        SessionCommand::Play => session.play(now),
        SessionCommand::Pause => session.pause(now),
        SessionCommand::TogglePlay => session.toggle_play(now),
        SessionCommand::Seek(to) => session.seek(to, now),
        SessionCommand::Skip(direction) => session.skip(direction, now),
        SessionCommand::SetRate(rate) => session.set_rate(rate),
        SessionCommand::SetVolume(volume) => session.set_volume(volume),
        SessionCommand::SetBrightness(brightness) => {
            session.set_brightness(brightness);
            Ok(())
        }
        SessionCommand::SelectTrack { kind, id } => session.select_track(kind, id.as_ref()),
        SessionCommand::OpenSettings => {
            session.open_settings(now);
            Ok(())
        }
        SessionCommand::CloseSettings => {
            session.close_settings(now);
            Ok(())
        }
        SessionCommand::Lock => {
            session.lock(now);
            Ok(())
        }
        SessionCommand::Unlock => {
            session.unlock(now);
            Ok(())
        }
        SessionCommand::ToggleFullscreen => {
            session.toggle_fullscreen();
            Ok(())
        }
        SessionCommand::EnterPip => {
            session.enter_pip(now);
            Ok(())
        }
        SessionCommand::ExitPip => {
            session.exit_pip(now);
            Ok(())
        }
        SessionCommand::SwitchSource(label) => session.switch_source(&label, now),
        SessionCommand::Retry => session.retry(now),
    }
}
