//! Custom error types for the rig.
//!
//! `RigError` is the single error type used across the library. Almost every
//! variant is non-fatal in practice: the scan orchestrator absorbs per-step
//! failures locally and turns them into a degraded-but-valid result (a zero
//! count, a skipped ack, a soft "continue"). Only setup failures, such as
//! never managing to open the motor link, end the program.
//!
//! ## Error Hierarchy
//!
//! - **`Config`** / **`Configuration`**: figment load failures and semantic
//!   validation failures respectively.
//! - **`LinkNotOpen`**, **`SerialOpen`**, **`LinkIo`**, **`AckTimeout`**: motor
//!   link problems.
//! - **`Capture`**: wraps [`CaptureError`], which keeps the timeout, transport
//!   and decode cases apart so logs can tell them apart.
//! - **`Detection`**, **`Storage`**: external collaborator failures.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the rig error type.
pub type AppResult<T> = std::result::Result<T, RigError>;

/// Library-wide error type.
#[derive(Error, Debug)]
pub enum RigError {
    /// Figment failed to load or extract the configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The configuration parsed but contains an unusable value.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Filesystem or other OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation needed the motor link but it is closed.
    #[error("Motor link not open")]
    LinkNotOpen,

    /// The serial port could not be opened.
    #[error("Failed to open serial port '{port}': {reason}")]
    SerialOpen {
        /// Port path that was attempted.
        port: String,
        /// Underlying failure description.
        reason: String,
    },

    /// Serial support was compiled out.
    #[error("Serial support not enabled. Rebuild with --features tokio_serial")]
    SerialFeatureDisabled,

    /// Reading from or writing to an open link failed.
    #[error("Motor link I/O error: {0}")]
    LinkIo(String),

    /// The expected acknowledgement did not arrive in time.
    #[error("Timed out after {waited:?} waiting for '{expected}'")]
    AckTimeout {
        /// Token that was awaited.
        expected: String,
        /// Time spent waiting.
        waited: Duration,
    },

    /// Frame acquisition failed.
    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    /// The detector could not process a frame.
    #[error("Detection failed: {0}")]
    Detection(String),

    /// A position label outside 1..=4.
    #[error("Invalid position {0}: expected 1..=4")]
    InvalidPosition(u8),

    /// Artifact persistence failed.
    #[error("Artifact storage error: {0}")]
    Storage(String),

    /// One or more cleanup steps failed during shutdown.
    #[error("Shutdown failed with errors")]
    ShutdownFailed(Vec<RigError>),
}

impl From<figment::Error> for RigError {
    fn from(err: figment::Error) -> Self {
        RigError::Config(Box::new(err))
    }
}

/// Why a frame could not be acquired for a position.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The camera did not answer within the request budget.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, HTTP status, or body transfer failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Bytes arrived but were not a decodable image.
    #[error("decode error: {0}")]
    Decode(String),
}

impl CaptureError {
    /// Short stable label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::Timeout(_) => "timeout",
            CaptureError::Transport(_) => "transport",
            CaptureError::Decode(_) => "decode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RigError::AckTimeout {
            expected: "TURN_DONE".to_string(),
            waited: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "Timed out after 10s waiting for 'TURN_DONE'");
    }

    #[test]
    fn test_capture_kinds_are_distinct() {
        let kinds = [
            CaptureError::Timeout(Duration::from_secs(10)).kind(),
            CaptureError::Transport("refused".into()).kind(),
            CaptureError::Decode("not a jpeg".into()).kind(),
        ];
        assert_eq!(kinds, ["timeout", "transport", "decode"]);
    }

    #[test]
    fn test_shutdown_failed_error() {
        let err = RigError::ShutdownFailed(vec![
            RigError::LinkNotOpen,
            RigError::Storage("raw dir busy".into()),
        ]);
        assert!(err.to_string().contains("Shutdown failed"));
    }
}
