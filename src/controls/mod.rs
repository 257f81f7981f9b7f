//! Controls visibility state machine for mirrorplay
//!
//! Decides which overlay is on screen: the main controls, the settings
//! sheet, or (while locked) nothing but a briefly revealed unlock button.
//! Visible controls hide themselves after a delay, except while playback is
//! paused, the settings sheet is open, or picture-in-picture is active.

mod timer;

pub use timer::TimerSlot;

use crate::utils::config::ControlsConfig;
use log::debug;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlsState {
    Hidden,
    Shown,
    ShownWithSettings,
    Locked { affordance_visible: bool },
}

impl ControlsState {
    pub fn is_locked(&self) -> bool {
        matches!(self, ControlsState::Locked { .. })
    }
}

/// What the view layer should draw on top of the video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    None,
    Controls,
    Settings,
    UnlockButton,
}

pub struct ControlsMachine {
    config: ControlsConfig,
    state: ControlsState,
    paused: bool,
    pip: bool,
    auto_hide: TimerSlot,
    unlock_affordance: TimerSlot,
}

impl ControlsMachine {
    pub fn new(config: ControlsConfig) -> Self {
        Self {
            config,
            state: ControlsState::Hidden,
            paused: false,
            pip: false,
            auto_hide: TimerSlot::new(),
            unlock_affordance: TimerSlot::new(),
        }
    }

    pub fn state(&self) -> ControlsState {
        self.state
    }

    pub fn overlay(&self) -> Overlay {
        if self.pip {
            return Overlay::None;
        }
        match self.state {
            ControlsState::Hidden => Overlay::None,
            ControlsState::Shown => Overlay::Controls,
            ControlsState::ShownWithSettings => Overlay::Settings,
            ControlsState::Locked {
                affordance_visible: true,
            } => Overlay::UnlockButton,
            ControlsState::Locked {
                affordance_visible: false,
            } => Overlay::None,
        }
    }

    /// Tap on the video surface
    pub fn single_tap(&mut self, now: Instant) -> ControlsState {
        match self.state {
            ControlsState::Hidden => self.enter_shown(now),
            ControlsState::Shown => {
                self.auto_hide.cancel();
                self.transition(ControlsState::Hidden);
            }
            ControlsState::ShownWithSettings => self.enter_shown(now),
            ControlsState::Locked { .. } => self.reveal_unlock(now),
        }
        self.state
    }

    /// Touch anywhere while locked
    pub fn touch_while_locked(&mut self, now: Instant) -> ControlsState {
        if self.state.is_locked() {
            self.reveal_unlock(now);
        }
        self.state
    }

    /// Make the controls visible, e.g. when playback ends
    pub fn show(&mut self, now: Instant) -> ControlsState {
        if self.state == ControlsState::Hidden {
            self.enter_shown(now);
        }
        self.state
    }

    /// The user touched a control; restart the hide countdown
    pub fn interaction(&mut self, now: Instant) {
        if self.state == ControlsState::Shown {
            self.rearm(now);
        }
    }

    pub fn open_settings(&mut self, _now: Instant) -> ControlsState {
        match self.state {
            ControlsState::Hidden | ControlsState::Shown => {
                self.auto_hide.cancel();
                self.transition(ControlsState::ShownWithSettings);
            }
            ControlsState::ShownWithSettings | ControlsState::Locked { .. } => {}
        }
        self.state
    }

    pub fn close_settings(&mut self, now: Instant) -> ControlsState {
        if self.state == ControlsState::ShownWithSettings {
            self.enter_shown(now);
        }
        self.state
    }

    pub fn lock(&mut self, _now: Instant) -> ControlsState {
        self.auto_hide.cancel();
        self.unlock_affordance.cancel();
        self.transition(ControlsState::Locked {
            affordance_visible: false,
        });
        self.state
    }

    pub fn unlock(&mut self, now: Instant) -> ControlsState {
        if self.state.is_locked() {
            self.unlock_affordance.cancel();
            self.enter_shown(now);
        }
        self.state
    }

    pub fn set_paused(&mut self, paused: bool, now: Instant) {
        self.paused = paused;
        if self.state == ControlsState::Shown {
            self.rearm(now);
        }
    }

    pub fn set_pip(&mut self, active: bool, now: Instant) {
        self.pip = active;
        if self.state == ControlsState::Shown {
            self.rearm(now);
        }
    }

    /// Fire due timers. Returns the new state if it changed.
    pub fn poll(&mut self, now: Instant) -> Option<ControlsState> {
        let before = self.state;

        if self.auto_hide.fire_if_due(now) && self.state == ControlsState::Shown {
            self.transition(ControlsState::Hidden);
        }

        if self.unlock_affordance.fire_if_due(now)
            && self.state
                == (ControlsState::Locked {
                    affordance_visible: true,
                })
        {
            self.transition(ControlsState::Locked {
                affordance_visible: false,
            });
        }

        (self.state != before).then_some(self.state)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.auto_hide.deadline(), self.unlock_affordance.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Number of armed timers
    pub fn pending_timers(&self) -> usize {
        usize::from(self.auto_hide.is_armed()) + usize::from(self.unlock_affordance.is_armed())
    }

    pub fn auto_hide_deadline(&self) -> Option<Instant> {
        self.auto_hide.deadline()
    }

    /// Teardown: no timer may fire after this
    pub fn cancel_all(&mut self) {
        self.auto_hide.cancel();
        self.unlock_affordance.cancel();
    }

    fn enter_shown(&mut self, now: Instant) {
        self.transition(ControlsState::Shown);
        self.rearm(now);
    }

    fn reveal_unlock(&mut self, now: Instant) {
        self.transition(ControlsState::Locked {
            affordance_visible: true,
        });
        self.unlock_affordance.arm(now + self.config.unlock_affordance());
    }

    /// Re-arm auto-hide from scratch, or cancel it when hiding is suppressed
    fn rearm(&mut self, now: Instant) {
        if self.state == ControlsState::Shown && !self.paused && !self.pip {
            self.auto_hide.arm(now + self.config.auto_hide());
        } else {
            self.auto_hide.cancel();
        }
    }

    fn transition(&mut self, next: ControlsState) {
        if self.state != next {
            debug!("Controls {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
