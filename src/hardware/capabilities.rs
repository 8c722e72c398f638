//! Capability traits for the rig's external collaborators.
//!
//! The orchestrator only sees these traits, never a concrete camera or
//! detector, so tests can substitute the doubles in [`crate::hardware::mock`].
//!
//! Each capability:
//! - is async (uses `#[async_trait]`)
//! - is thread-safe (`Send + Sync`)
//! - reports failure as a value the orchestrator can absorb

use crate::error::{AppResult, CaptureError};
use crate::scan::types::Position;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// An encoded image taken at one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position the rig was facing.
    pub position: Position,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// JPEG-encoded image data.
    pub jpeg: Bytes,
}

/// Result of running detection on one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionReport {
    /// Number of vehicles that passed the filter.
    pub count: u32,
    /// JPEG with boxes and labels drawn, when the detector produces one.
    pub annotated_jpeg: Option<Bytes>,
}

/// Capability: frame acquisition.
///
/// # Contract
/// - May block up to the source's own request timeout.
/// - Timeout, transport, and decode failures are reported as distinct
///   [`CaptureError`] variants.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Acquires one frame for `position`.
    async fn capture(&self, position: Position) -> Result<Frame, CaptureError>;
}

/// Capability: vehicle detection.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Counts vehicles in `frame`.
    async fn detect(&self, frame: &Frame) -> AppResult<DetectionReport>;
}
