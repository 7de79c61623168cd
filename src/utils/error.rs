//! Error types for avclock
//!
//! Timing anomalies (drift, stalls, broken timestamps) are handled locally and
//! never surface here. Only stream-level and setup failures are errors.

use crate::player::{TransportEvent, TransportState};
use thiserror::Error;

/// Main error type for avclock
#[derive(Error, Debug)]
pub enum AvClockError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    /// UDP sync socket errors
    #[error("Network error: {0}")]
    Network(String),

    /// The demuxer refused the seek
    #[error("Stream is not seekable")]
    NotSeekable,

    /// Transport event not allowed in the current state
    #[error("Invalid transition: {event:?} while {from:?}")]
    InvalidTransition {
        from: TransportState,
        event: TransportEvent,
    },

    /// Malformed edit decision list
    #[error("EDL parse error at line {line}: {reason}")]
    EdlParse { line: usize, reason: String },

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AvClockError {
    /// Create an EDL parse error for the given 1-based line
    pub fn edl<S: Into<String>>(line: usize, reason: S) -> Self {
        AvClockError::EdlParse {
            line,
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results in avclock
pub type Result<T> = std::result::Result<T, AvClockError>;

/// Extension trait for converting other errors to AvClockError
pub trait IntoAvClockError<T> {
    /// Convert this error into a configuration error with the given context
    fn config_err(self, context: &str) -> Result<T>;

    /// Convert this error into a network error with the given context
    fn network_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoAvClockError<T> for std::result::Result<T, E> {
    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| AvClockError::Config(format!("{}: {}", context, e)))
    }

    fn network_err(self, context: &str) -> Result<T> {
        self.map_err(|e| AvClockError::Network(format!("{}: {}", context, e)))
    }
}

/// Helper macro for creating internal errors with file and line information
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::utils::error::AvClockError::Internal(
            format!("{} at {}:{}", $msg, file!(), line!())
        )
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::utils::error::AvClockError::Internal(
            format!("{} at {}:{}", format!($fmt, $($arg)*), file!(), line!())
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AvClockError::NotSeekable;
        assert_eq!(err.to_string(), "Stream is not seekable");

        let err = AvClockError::edl(3, "stop before start");
        assert_eq!(err.to_string(), "EDL parse error at line 3: stop before start");

        let err = AvClockError::InvalidTransition {
            from: TransportState::Stopped,
            event: TransportEvent::Pause,
        };
        assert_eq!(err.to_string(), "Invalid transition: Pause while Stopped");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: AvClockError = io_err.into();
        assert!(matches!(err, AvClockError::Io(_)));
    }

    #[test]
    fn test_into_error_trait() {
        let result: std::result::Result<(), &str> = Err("address in use");
        match result.network_err("Binding sync socket") {
            Err(AvClockError::Network(msg)) => {
                assert_eq!(msg, "Binding sync socket: address in use");
            }
            _ => panic!("Expected Network error"),
        }
    }

    #[test]
    fn test_internal_error_macro() {
        let err = internal_error!("cursor out of range: {}", 7);
        let msg = err.to_string();
        assert!(msg.starts_with("Internal error: cursor out of range: 7 at "));
    }
}
