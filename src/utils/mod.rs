//! Utility module for avclock
//!
//! - Error handling with custom error types
//! - Configuration management
//! - Wall-clock time sources and relative timing

pub mod config;
pub mod error;
pub mod timer;

pub use config::{AudioConfig, Config, EdlConfig, FrameDropPolicy, SchedulerConfig, SyncRole, UdpConfig};
pub use error::{AvClockError, Result};
pub use timer::{RelativeClock, SystemTimeSource, TimeSource};

/// Initialize the application configuration
///
/// Loads defaults, then the system and user configuration files, then the
/// `AVCLOCK_*` environment variables.
pub fn load_config() -> Result<Config> {
    Config::load()
}

/// Format a media position for display
///
/// Formatted as "HH:MM:SS.t" or "MM:SS.t" for positions under an hour.
/// Negative positions are shown with a leading minus sign.
pub fn format_timestamp(seconds: f64) -> String {
    let sign = if seconds < 0.0 { "-" } else { "" };
    let tenths = (seconds.abs() * 10.0).round() as u64;
    let total_secs = tenths / 10;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}{:02}:{:02}:{:02}.{}", sign, hours, minutes, secs, tenths % 10)
    } else {
        format!("{}{:02}:{:02}.{}", sign, minutes, secs, tenths % 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00.0");
        assert_eq!(format_timestamp(59.94), "00:59.9");
        assert_eq!(format_timestamp(60.0), "01:00.0");
        assert_eq!(format_timestamp(3599.0), "59:59.0");
        assert_eq!(format_timestamp(3600.0), "01:00:00.0");
        assert_eq!(format_timestamp(7325.5), "02:02:05.5");
        assert_eq!(format_timestamp(-2.0), "-00:02.0");
    }
}
