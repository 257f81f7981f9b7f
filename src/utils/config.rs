//! Configuration management for mirrorplay
//!
//! This module handles loading and managing player configuration
//! from config files and environment variables. Every section and
//! field falls back to its default when absent from a file.

use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Playback behaviour
    pub player: PlayerConfig,

    /// Touch gesture thresholds
    pub gestures: GestureConfig,

    /// Overlay timers
    pub controls: ControlsConfig,

    /// Resume and progress persistence
    pub resume: ResumeConfig,

    /// General application settings
    pub general: GeneralConfig,
}

/// Playback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Start playing as soon as the source is loaded
    pub auto_play: bool,

    /// Initial volume (0.0 to 1.0)
    pub default_volume: f32,

    /// Initial screen brightness (0.0 to 1.0)
    pub default_brightness: f32,

    /// Initial playback rate
    pub default_rate: f32,

    /// Skip distance for double taps, in seconds
    pub seek_step_seconds: f64,

    /// A progress tick this close to a pending seek target confirms it
    pub seek_tolerance_seconds: f64,

    /// How long a pending seek target masks progress ticks, in milliseconds
    pub seek_settle_ms: u64,

    /// Enter fullscreen on mount
    pub fullscreen_on_mount: bool,
}

/// Gesture recognizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Movement below this many logical pixels still counts as a tap
    pub slop_px: f64,

    /// Maximum gap between first release and second press, in milliseconds
    pub double_tap_window_ms: u64,

    /// Maximum press duration of a tap, in milliseconds
    pub tap_max_duration_ms: u64,

    /// Maximum distance between the two taps of a double tap
    pub double_tap_slop_px: f64,

    /// Value change per logical pixel of vertical drag
    pub drag_sensitivity: f64,
}

/// Controls overlay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Delay before visible controls hide themselves, in milliseconds
    pub auto_hide_ms: u64,

    /// How long the unlock button stays visible while locked, in milliseconds
    pub unlock_affordance_ms: u64,
}

/// Resume persistence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeConfig {
    /// Remember playback positions at all
    pub enabled: bool,

    /// Minimum time between two saves, in milliseconds
    pub save_interval_ms: u64,

    /// Stored positions at or beyond this fraction of the duration count as watched
    pub watched_threshold: f64,

    /// Maximum number of history entries kept
    pub history_limit: usize,
}

/// General application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Override for the progress store file
    pub store_path: Option<PathBuf>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            auto_play: true,
            default_volume: 1.0,
            default_brightness: 0.5,
            default_rate: 1.0,
            seek_step_seconds: 10.0,
            seek_tolerance_seconds: 1.5,
            seek_settle_ms: 2000,
            fullscreen_on_mount: true,
        }
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            slop_px: 10.0,
            double_tap_window_ms: 300,
            tap_max_duration_ms: 300,
            double_tap_slop_px: 40.0,
            drag_sensitivity: 0.005,
        }
    }
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            auto_hide_ms: 4000,
            unlock_affordance_ms: 3000,
        }
    }
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            save_interval_ms: 5000,
            watched_threshold: 0.95,
            history_limit: 50,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            store_path: None,
        }
    }
}

impl PlayerConfig {
    pub fn seek_settle(&self) -> Duration {
        Duration::from_millis(self.seek_settle_ms)
    }
}

impl GestureConfig {
    pub fn double_tap_window(&self) -> Duration {
        Duration::from_millis(self.double_tap_window_ms)
    }

    pub fn tap_max_duration(&self) -> Duration {
        Duration::from_millis(self.tap_max_duration_ms)
    }
}

impl ControlsConfig {
    pub fn auto_hide(&self) -> Duration {
        Duration::from_millis(self.auto_hide_ms)
    }

    pub fn unlock_affordance(&self) -> Duration {
        Duration::from_millis(self.unlock_affordance_ms)
    }
}

impl ResumeConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/mirrorplay/config.toml on Linux)
    /// 3. User config file (~/.config/mirrorplay/config.toml on Linux)
    /// 4. Environment variables (MIRRORPLAY_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config = Self::from_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config = Self::from_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load a single TOML file, filling absent fields with defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).config_err("Failed to parse config file")
    }

    /// Save configuration to user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| PlayerError::Config("Cannot determine user config path".to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;
        std::fs::write(&path, toml).config_err("Failed to write config file")?;

        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(volume) = std::env::var("MIRRORPLAY_VOLUME") {
            self.player.default_volume = volume
                .parse()
                .map_err(|_| PlayerError::Config("Invalid MIRRORPLAY_VOLUME".to_string()))?;
        }

        if let Ok(step) = std::env::var("MIRRORPLAY_SEEK_STEP") {
            self.player.seek_step_seconds = step
                .parse()
                .map_err(|_| PlayerError::Config("Invalid MIRRORPLAY_SEEK_STEP".to_string()))?;
        }

        if let Ok(interval) = std::env::var("MIRRORPLAY_SAVE_INTERVAL_MS") {
            self.resume.save_interval_ms = interval.parse().map_err(|_| {
                PlayerError::Config("Invalid MIRRORPLAY_SAVE_INTERVAL_MS".to_string())
            })?;
        }

        if let Ok(store) = std::env::var("MIRRORPLAY_STORE") {
            self.general.store_path = Some(PathBuf::from(store));
        }

        if let Ok(log_level) = std::env::var("MIRRORPLAY_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.player.default_volume) {
            return Err(PlayerError::Config("Volume must be between 0.0 and 1.0".to_string()));
        }

        if !(0.0..=1.0).contains(&self.player.default_brightness) {
            return Err(PlayerError::Config(
                "Brightness must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.player.default_rate <= 0.0 {
            return Err(PlayerError::Config("Playback rate must be positive".to_string()));
        }

        if self.player.seek_step_seconds <= 0.0 {
            return Err(PlayerError::Config("Seek step must be positive".to_string()));
        }

        if self.gestures.slop_px <= 0.0 || self.gestures.double_tap_slop_px <= 0.0 {
            return Err(PlayerError::Config("Gesture slop must be positive".to_string()));
        }

        if self.gestures.double_tap_window_ms == 0 {
            return Err(PlayerError::Config("Double tap window must be non-zero".to_string()));
        }

        if !(0.0..=1.0).contains(&self.resume.watched_threshold) {
            return Err(PlayerError::Config(
                "Watched threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(PlayerError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/mirrorplay/config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/mirrorplay/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mirrorplay").join("config.toml"))
    }

    /// Default location of the progress store
    pub fn default_store_path() -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::config_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mirrorplay")
            .join("progress.json")
    }

    /// Progress store path after applying overrides
    pub fn store_path(&self) -> PathBuf {
        self.general
            .store_path
            .clone()
            .unwrap_or_else(Self::default_store_path)
    }
}
