//! Mock Hardware Implementations
//!
//! Scripted stand-ins for the motor controller, camera, and detector, for
//! running full scan cycles without a rig attached. All timing goes through
//! `tokio::time`, so tests running on a paused clock finish instantly.
//!
//! # Available Mocks
//!
//! - `MockMotorTransport` - records written commands and replays scripted lines
//! - `MockFrameSource` - returns a small frame or a scripted capture failure
//! - `MockDetector` - returns a per-position vehicle count
//! - `MockReviewer` - records reviewed cycles and asks to stop after N of them
//! - `MockArtifactStore` - keeps saved artifacts in memory
//!
//! Every mock is `Clone` and shares its state between clones, so a test can
//! keep one handle for inspection after moving another into the code under test.

use crate::error::{AppResult, CaptureError, RigError};
use crate::hardware::capabilities::{DetectionReport, Detector, Frame, FrameSource};
use crate::hardware::motor_link::{MotorTransport, TURN_DONE};
use crate::scan::review::CycleReviewer;
use crate::scan::types::{CycleResult, Flow, Position};
use crate::storage::ArtifactStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// MockMotorTransport - Simulated Motor Controller
// =============================================================================

#[derive(Debug, Default)]
struct MotorScript {
    sent: Vec<String>,
    incoming: VecDeque<(Instant, String)>,
    turn_ack_delay: Option<Duration>,
    fail_next_write: bool,
}

impl MotorScript {
    fn schedule(&mut self, due: Instant, line: String) {
        let at = self
            .incoming
            .iter()
            .position(|(existing, _)| *existing > due)
            .unwrap_or(self.incoming.len());
        self.incoming.insert(at, (due, line));
    }
}

/// Mock motor controller transport.
///
/// # Example
///
/// ```rust,ignore
/// let transport = MockMotorTransport::new().with_turn_ack(Duration::from_secs(1));
/// let handle = transport.clone();
/// let mut link = MotorLink::new(transport);
/// link.send(&MotorCommand::Turn(ScanDirection::Forward)).await?;
/// link.wait_for_ack(TURN_DONE, Duration::from_secs(10)).await?; // ~1s
/// assert_eq!(handle.sent(), vec!["T"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockMotorTransport {
    script: Arc<Mutex<MotorScript>>,
}

impl MockMotorTransport {
    /// A controller that never answers unless lines are pushed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `T`/`R` with `TURN_DONE` after `delay`.
    pub fn with_turn_ack(self, delay: Duration) -> Self {
        lock(&self.script).turn_ack_delay = Some(delay);
        self
    }

    /// Queue a line that is available immediately.
    pub fn push_line(&self, line: &str) {
        self.push_line_after(Duration::ZERO, line);
    }

    /// Queue a line that becomes available `delay` from now.
    pub fn push_line_after(&self, delay: Duration, line: &str) {
        lock(&self.script).schedule(Instant::now() + delay, line.to_string());
    }

    /// Make the next write fail.
    pub fn fail_next_write(&self) {
        lock(&self.script).fail_next_write = true;
    }

    /// Every command written so far, without terminators.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.script).sent.clone()
    }

    /// Lines queued but not yet read.
    pub fn pending_lines(&self) -> usize {
        lock(&self.script).incoming.len()
    }
}

#[async_trait]
impl MotorTransport for MockMotorTransport {
    async fn write_line(&mut self, line: &str) -> AppResult<()> {
        let mut script = lock(&self.script);
        if std::mem::take(&mut script.fail_next_write) {
            return Err(RigError::LinkIo("injected write failure".to_string()));
        }
        script.sent.push(line.to_string());
        if matches!(line, "T" | "R") {
            if let Some(delay) = script.turn_ack_delay {
                script.schedule(Instant::now() + delay, TURN_DONE.to_string());
            }
        }
        Ok(())
    }

    async fn read_line(&mut self, wait: Duration) -> AppResult<Option<String>> {
        let deadline = Instant::now() + wait;
        let next_due = lock(&self.script).incoming.front().map(|(due, _)| *due);

        match next_due {
            Some(due) if due <= deadline => {
                sleep_until(due).await;
                Ok(lock(&self.script).incoming.pop_front().map(|(_, line)| line))
            }
            _ => {
                sleep_until(deadline).await;
                Ok(None)
            }
        }
    }
}

// =============================================================================
// MockFrameSource - Simulated Camera
// =============================================================================

#[derive(Debug, Default)]
struct CameraScript {
    failures: HashMap<Position, CaptureError>,
    captures: Vec<Position>,
    latency: Duration,
}

/// Mock camera returning a tiny placeholder frame.
#[derive(Debug, Clone, Default)]
pub struct MockFrameSource {
    script: Arc<Mutex<CameraScript>>,
}

impl MockFrameSource {
    /// A camera that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated request latency.
    pub fn with_latency(self, latency: Duration) -> Self {
        lock(&self.script).latency = latency;
        self
    }

    /// Make every capture at `position` fail with `error`.
    pub fn fail_at(&self, position: Position, error: CaptureError) {
        lock(&self.script).failures.insert(position, error);
    }

    /// Positions requested so far, in order.
    pub fn captures(&self) -> Vec<Position> {
        lock(&self.script).captures.clone()
    }
}

#[async_trait]
impl FrameSource for MockFrameSource {
    async fn capture(&self, position: Position) -> Result<Frame, CaptureError> {
        let latency = {
            let mut script = lock(&self.script);
            script.captures.push(position);
            script.latency
        };
        if !latency.is_zero() {
            sleep(latency).await;
        }
        if let Some(error) = lock(&self.script).failures.get(&position) {
            return Err(error.clone());
        }
        Ok(Frame {
            position,
            captured_at: chrono::Utc::now(),
            width: 4,
            height: 4,
            jpeg: Bytes::from(vec![0xFF, 0xD8, position.get(), 0xFF, 0xD9]),
        })
    }
}

// =============================================================================
// MockDetector - Simulated Vehicle Detector
// =============================================================================

#[derive(Debug, Default)]
struct DetectorScript {
    counts: HashMap<Position, u32>,
    failures: HashSet<Position>,
    annotate: bool,
}

/// Mock detector with a fixed count per position.
#[derive(Debug, Clone, Default)]
pub struct MockDetector {
    script: Arc<Mutex<DetectorScript>>,
}

impl MockDetector {
    /// Detector reporting zero everywhere and no annotations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Detector reporting `counts[i]` at position `i + 1`.
    pub fn with_counts(counts: [u32; 4]) -> Self {
        let detector = Self::new();
        for (position, count) in Position::ALL.into_iter().zip(counts) {
            detector.set_count(position, count);
        }
        detector
    }

    /// Also return an annotated image for every frame.
    pub fn annotating(self) -> Self {
        lock(&self.script).annotate = true;
        self
    }

    /// Sets the count reported at `position`.
    pub fn set_count(&self, position: Position, count: u32) {
        lock(&self.script).counts.insert(position, count);
    }

    /// Make detection at `position` fail.
    pub fn fail_at(&self, position: Position) {
        lock(&self.script).failures.insert(position);
    }
}

#[async_trait]
impl Detector for MockDetector {
    async fn detect(&self, frame: &Frame) -> AppResult<DetectionReport> {
        let script = lock(&self.script);
        if script.failures.contains(&frame.position) {
            return Err(RigError::Detection(format!(
                "mock detector failure at side {}",
                frame.position
            )));
        }
        Ok(DetectionReport {
            count: script.counts.get(&frame.position).copied().unwrap_or(0),
            annotated_jpeg: script.annotate.then(|| frame.jpeg.clone()),
        })
    }
}

// =============================================================================
// MockReviewer - Scripted Cycle Review
// =============================================================================

#[derive(Debug, Default)]
struct ReviewScript {
    reviewed: Vec<CycleResult>,
    stop_after: Option<usize>,
}

/// Mock reviewer that continues until its `stop_after`-th review.
#[derive(Debug, Clone, Default)]
pub struct MockReviewer {
    script: Arc<Mutex<ReviewScript>>,
}

impl MockReviewer {
    /// Reviewer that always continues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reviewer that returns [`Flow::Stop`] on review number `reviews` (1-based).
    pub fn stopping_after(reviews: usize) -> Self {
        let reviewer = Self::new();
        lock(&reviewer.script).stop_after = Some(reviews);
        reviewer
    }

    /// Every cycle handed over so far.
    pub fn reviewed(&self) -> Vec<CycleResult> {
        lock(&self.script).reviewed.clone()
    }
}

#[async_trait]
impl CycleReviewer for MockReviewer {
    async fn review(&self, cycle: &CycleResult) -> Flow {
        let mut script = lock(&self.script);
        script.reviewed.push(cycle.clone());
        match script.stop_after {
            Some(limit) if script.reviewed.len() >= limit => Flow::Stop,
            _ => Flow::Continue,
        }
    }
}

// =============================================================================
// MockArtifactStore - In-Memory Artifact Sink
// =============================================================================

#[derive(Debug, Default)]
struct StoreScript {
    files: Vec<(PathBuf, Bytes)>,
    resets: usize,
    fail_writes: bool,
}

/// Mock store keeping artifacts in memory under virtual paths.
#[derive(Debug, Clone, Default)]
pub struct MockArtifactStore {
    script: Arc<Mutex<StoreScript>>,
}

impl MockArtifactStore {
    /// Empty store where every save succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every save fail.
    pub fn failing() -> Self {
        let store = Self::new();
        lock(&store.script).fail_writes = true;
        store
    }

    /// Paths currently held, in save order.
    pub fn paths(&self) -> Vec<PathBuf> {
        lock(&self.script).files.iter().map(|(path, _)| path.clone()).collect()
    }

    /// Number of `reset` calls so far.
    pub fn resets(&self) -> usize {
        lock(&self.script).resets
    }

    fn save(&self, path: PathBuf, contents: &[u8]) -> AppResult<PathBuf> {
        let mut script = lock(&self.script);
        if script.fail_writes {
            return Err(RigError::Storage(format!(
                "injected failure writing {}",
                path.display()
            )));
        }
        script.files.retain(|(existing, _)| *existing != path);
        script.files.push((path.clone(), Bytes::copy_from_slice(contents)));
        Ok(path)
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    async fn reset(&self) -> AppResult<()> {
        let mut script = lock(&self.script);
        script.resets += 1;
        script
            .files
            .retain(|(path, _)| path.starts_with("preview"));
        Ok(())
    }

    async fn save_raw(&self, frame: &Frame) -> AppResult<PathBuf> {
        self.save(
            PathBuf::from(format!("raw/side_{}_raw.jpg", frame.position)),
            &frame.jpeg,
        )
    }

    async fn save_annotated(&self, position: Position, jpeg: &[u8]) -> AppResult<PathBuf> {
        self.save(
            PathBuf::from(format!("annotated/side_{position}_annotated.jpg")),
            jpeg,
        )
    }

    async fn save_preview(&self, frame: &Frame) -> AppResult<PathBuf> {
        self.save(PathBuf::from("preview/latest.jpg"), &frame.jpeg)
    }

    async fn cleanup(&self) -> AppResult<()> {
        lock(&self.script).files.clear();
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
