//! Configuration management for avclock
//!
//! Every empirically tuned timing constant of the engine lives here as a named,
//! overridable field. Loading order (later sources override earlier):
//! defaults, system config file, user config file, `AVCLOCK_*` environment.

use crate::utils::error::{AvClockError, IntoAvClockError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame scheduling and drift correction
    pub scheduler: SchedulerConfig,

    /// Audio clock settings
    pub audio: AudioConfig,

    /// Edit decision list settings
    pub edl: EdlConfig,

    /// UDP master/slave sync
    pub udp: UdpConfig,

    /// General settings
    pub general: GeneralConfig,
}

/// What a permitted frame drop actually skips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameDropPolicy {
    /// Never drop, even when late
    Disabled,

    /// Decode the frame but do not present it
    SkipDisplay,

    /// Skip decoding and presentation
    SkipDecode,
}

/// Frame scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub framedrop: FrameDropPolicy,

    /// A-V lag tolerated before a frame becomes droppable (seconds)
    pub framedrop_slack: f64,

    /// Lower clamp for the device delay used to bound one sleep (seconds)
    pub device_delay_min: f64,

    /// Upper clamp for the device delay used to bound one sleep (seconds)
    pub device_delay_max: f64,

    /// Sleeps above this share of the clamped delay are split
    pub oversleep_ratio: f64,

    /// Share of the clamped delay slept when a sleep is split
    pub split_sleep_ratio: f64,

    /// Autosync strength; 0 disables smoothing
    pub autosync: u32,

    /// Proportional drift correction gain
    pub correction_gain: f64,

    /// Fixed per-step correction clamp; derived from frame time when absent
    pub max_pts_correction: Option<f64>,

    /// Share of a frame duration used as the derived correction clamp
    pub max_pts_correction_ratio: f64,

    /// A-V delay treated as broken timestamps (seconds)
    pub desync_threshold: f64,

    /// Drop count that must be exceeded before a desync hard-resets
    pub desync_drop_count: u64,

    /// Delay accumulator lag that also counts as broken timestamps (seconds)
    pub desync_stall_limit: f64,

    /// Without audio, lag beyond this is not caught up (seconds)
    pub catchup_limit: f64,

    /// Busy-wait the tail of each sleep
    pub softsleep: bool,

    /// Tail busy-waited in soft-sleep mode, one scheduler tick (seconds)
    pub softsleep_margin: f64,

    /// Remaining sleeps above this are chunked (seconds)
    pub chunk_threshold: f64,

    /// Length of one sleep chunk (seconds)
    pub sleep_chunk: f64,

    /// Sleeps shorter than this are skipped (seconds)
    pub min_sleep: f64,
}

/// Audio clock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// User audio delay, positive delays audio (seconds)
    pub audio_delay: f64,

    /// Playback speed multiplier
    pub speed: f64,

    /// Polls without free device space before the device counts as stuck
    pub stall_polls: u32,
}

/// Edit decision list configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdlConfig {
    /// EDL file loaded with each stream
    pub file: Option<PathBuf>,

    /// Extra distance before a skip window when landing inside it backwards (seconds)
    pub backward_delay: f64,
}

/// Role of this process in UDP sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRole {
    Off,
    Master,
    Slave,
}

/// UDP master/slave configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    pub role: SyncRole,

    /// Destination address for the master, may be a broadcast address
    pub ip: String,

    pub port: u16,

    /// Slave seeks when further than this from the master (seconds)
    pub seek_threshold: f64,

    /// Master counts as level with the slave within this (seconds)
    pub tolerance: f64,

    /// Longest blocking wait for a master datagram (seconds)
    pub timeout: f64,
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit the A-V status line every frame
    pub status_line: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            framedrop: FrameDropPolicy::Disabled,
            framedrop_slack: 0.100,
            device_delay_min: 0.10,
            device_delay_max: 0.25,
            oversleep_ratio: 0.6,
            split_sleep_ratio: 0.5,
            autosync: 0,
            correction_gain: 0.1,
            max_pts_correction: None,
            max_pts_correction_ratio: 0.10,
            desync_threshold: 0.5,
            desync_drop_count: 50,
            desync_stall_limit: 30.0,
            catchup_limit: 0.2,
            softsleep: false,
            softsleep_margin: 0.011,
            chunk_threshold: 0.3,
            sleep_chunk: 0.2,
            min_sleep: 0.001,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            audio_delay: 0.0,
            speed: 1.0,
            stall_polls: 10,
        }
    }
}

impl Default for EdlConfig {
    fn default() -> Self {
        Self {
            file: None,
            backward_delay: 2.0,
        }
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            role: SyncRole::Off,
            ip: "127.0.0.1".to_string(),
            port: 23867,
            seek_threshold: 1.0,
            tolerance: 0.02,
            timeout: 30.0,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            status_line: true,
        }
    }
}

impl Config {
    /// Load configuration from the standard locations and environment
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config.merge_from_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config.merge_from_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from one explicit file, then apply the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| AvClockError::Config("Cannot determine user config path".to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;
        std::fs::write(&path, toml).config_err("Failed to write config file")?;

        Ok(())
    }

    /// Replace this configuration with the contents of a TOML file.
    /// Sections and fields missing from the file take their defaults.
    fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        let file_config: Config = toml::from_str(&contents).config_err("Failed to parse config file")?;
        *self = file_config;
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(delay) = std::env::var("AVCLOCK_AUDIO_DELAY") {
            self.audio.audio_delay = delay
                .parse()
                .map_err(|_| AvClockError::Config("Invalid AVCLOCK_AUDIO_DELAY".to_string()))?;
        }

        if let Ok(autosync) = std::env::var("AVCLOCK_AUTOSYNC") {
            self.scheduler.autosync = autosync
                .parse()
                .map_err(|_| AvClockError::Config("Invalid AVCLOCK_AUTOSYNC".to_string()))?;
        }

        if let Ok(ip) = std::env::var("AVCLOCK_UDP_IP") {
            self.udp.ip = ip;
        }

        if let Ok(port) = std::env::var("AVCLOCK_UDP_PORT") {
            self.udp.port = port
                .parse()
                .map_err(|_| AvClockError::Config("Invalid AVCLOCK_UDP_PORT".to_string()))?;
        }

        if let Ok(log_level) = std::env::var("AVCLOCK_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;

        if !(self.audio.speed > 0.0) {
            return Err(AvClockError::Config("Playback speed must be positive".to_string()));
        }

        if s.device_delay_min <= 0.0 || s.device_delay_min > s.device_delay_max {
            return Err(AvClockError::Config(format!(
                "Invalid device delay clamp [{}, {}]",
                s.device_delay_min, s.device_delay_max
            )));
        }

        if s.sleep_chunk <= 0.0 || s.chunk_threshold < s.sleep_chunk {
            return Err(AvClockError::Config(
                "Sleep chunk must be positive and not exceed the chunk threshold".to_string(),
            ));
        }

        if let Some(max) = s.max_pts_correction {
            if max < 0.0 {
                return Err(AvClockError::Config("max_pts_correction must not be negative".to_string()));
            }
        }

        if self.edl.backward_delay < 0.0 {
            return Err(AvClockError::Config("EDL backward delay must not be negative".to_string()));
        }

        if self.udp.port == 0 {
            return Err(AvClockError::Config("UDP port must be non-zero".to_string()));
        }

        if self.udp.seek_threshold <= 0.0 || self.udp.tolerance < 0.0 || self.udp.timeout <= 0.0 {
            return Err(AvClockError::Config("Invalid UDP sync thresholds".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(AvClockError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/avclock/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA")
            .ok()
            .map(|p| PathBuf::from(p).join("avclock").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/avclock/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("avclock").join("config.toml"))
    }
}
