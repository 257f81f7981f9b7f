//! Fullscreen and picture-in-picture orchestration
//!
//! Fullscreen means two device-level effects at once: orientation locked to
//! landscape and system bars hidden. They are only ever changed together,
//! through [`ChromeOrchestrator::apply_fullscreen`]. Whatever ends the player,
//! the device is put back into portrait with visible bars.

use crate::utils::error::Result;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Device chrome controls provided by the host platform
pub trait DeviceChrome: Send + Sync {
    fn lock_orientation(&self, orientation: Orientation) -> Result<()>;

    fn unlock_orientation(&self) -> Result<()>;

    fn set_system_bars_visible(&self, visible: bool) -> Result<()>;
}

pub struct ChromeOrchestrator {
    chrome: Arc<dyn DeviceChrome>,
    fullscreen: bool,
    pip: bool,
    mounted: bool,
}

impl ChromeOrchestrator {
    pub fn new(chrome: Arc<dyn DeviceChrome>) -> Self {
        Self {
            chrome,
            fullscreen: false,
            pip: false,
            mounted: false,
        }
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn is_pip_active(&self) -> bool {
        self.pip
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Player appeared. Unless it starts in PiP, `fullscreen` is applied.
    pub fn mount(&mut self, start_in_pip: bool, fullscreen: bool) {
        self.mounted = true;
        self.pip = start_in_pip;
        if start_in_pip {
            info!("Player mounted in picture-in-picture");
        } else if fullscreen {
            self.apply_fullscreen(true);
        }
    }

    /// While in PiP only the flag changes; `exit_pip` applies it
    pub fn toggle_fullscreen(&mut self) -> bool {
        if self.pip {
            self.fullscreen = !self.fullscreen;
        } else {
            self.apply_fullscreen(!self.fullscreen);
        }
        self.fullscreen
    }

    pub fn enter_pip(&mut self) {
        if !self.pip {
            debug!("Entering picture-in-picture");
            self.pip = true;
        }
    }

    /// Leave PiP and put the fullscreen effects back in place
    pub fn exit_pip(&mut self) {
        if self.pip {
            debug!("Leaving picture-in-picture");
            self.pip = false;
            self.apply_fullscreen(self.fullscreen);
        }
    }

    /// Player is going away: revert device chrome unconditionally
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.pip = false;
        self.fullscreen = false;

        if let Err(e) = self.chrome.unlock_orientation() {
            warn!("Failed to unlock orientation: {}", e);
        }
        if let Err(e) = self.chrome.set_system_bars_visible(true) {
            warn!("Failed to restore system bars: {}", e);
        }
        info!("Device chrome restored");
    }

    /// The only place orientation and bar visibility are changed
    fn apply_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;

        let orientation = if fullscreen {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        };
        if let Err(e) = self.chrome.lock_orientation(orientation) {
            warn!("Failed to lock orientation to {:?}: {}", orientation, e);
        }
        if let Err(e) = self.chrome.set_system_bars_visible(!fullscreen) {
            warn!("Failed to change system bars: {}", e);
        }
        debug!("Fullscreen {}", fullscreen);
    }
}

impl Drop for ChromeOrchestrator {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Device chrome call, as seen by [`RecordingChrome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromeCall {
    LockOrientation(Orientation),
    UnlockOrientation,
    SystemBarsVisible(bool),
}

/// In-process [`DeviceChrome`] that records every call
#[derive(Debug, Clone, Default)]
pub struct RecordingChrome {
    calls: Arc<Mutex<Vec<ChromeCall>>>,
}

impl RecordingChrome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ChromeCall> {
        self.calls.lock().clone()
    }

    /// Whether the last calls leave the device in its normal state
    pub fn is_reverted(&self) -> bool {
        let calls = self.calls.lock();
        let orientation_free = calls
            .iter()
            .rev()
            .find(|c| !matches!(c, ChromeCall::SystemBarsVisible(_)))
            .map_or(true, |c| {
                matches!(c, ChromeCall::UnlockOrientation | ChromeCall::LockOrientation(Orientation::Portrait))
            });
        let bars_visible = calls
            .iter()
            .rev()
            .find_map(|c| match c {
                ChromeCall::SystemBarsVisible(v) => Some(*v),
                _ => None,
            })
            .unwrap_or(true);
        orientation_free && bars_visible
    }
}

impl DeviceChrome for RecordingChrome {
    fn lock_orientation(&self, orientation: Orientation) -> Result<()> {
        self.calls.lock().push(ChromeCall::LockOrientation(orientation));
        Ok(())
    }

    fn unlock_orientation(&self) -> Result<()> {
        self.calls.lock().push(ChromeCall::UnlockOrientation);
        Ok(())
    }

    fn set_system_bars_visible(&self, visible: bool) -> Result<()> {
        self.calls.lock().push(ChromeCall::SystemBarsVisible(visible));
        Ok(())
    }
}
