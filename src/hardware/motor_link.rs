//! Command/response link to the stepper motor controller.
//!
//! Wire format (ASCII, one newline-terminated line per command):
//!
//! | Command | Meaning |
//! |---|---|
//! | `P` | pause / idle the automatic behaviour |
//! | `T` | turn forward one quadrant |
//! | `R` | turn reverse one quadrant |
//! | `M<steps>` | move by a signed step offset, e.g. `M-200` |
//! | `O<digits>` | set signal priority, e.g. `O2314` |
//!
//! Responses are newline-terminated text. `TURN_DONE` marks a completed turn;
//! every other non-empty line is informational and gets logged, never
//! treated as an error.
//!
//! The link owns its transport exclusively, and every operation takes
//! `&mut self`, so a second command can never be issued while a wait for
//! acknowledgement is still outstanding.

use crate::error::{AppResult, RigError};
use crate::scan::priority::PriorityOrder;
use crate::scan::types::ScanDirection;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Response token that confirms a completed turn.
pub const TURN_DONE: &str = "TURN_DONE";

/// Default interval between reads while waiting for an acknowledgement.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Byte-level access to the motor controller.
///
/// Implementations append their own line terminator on write and strip it on
/// read. `read_line` must be cancel-safe: dropping the future must not lose
/// bytes that were already received.
#[async_trait]
pub trait MotorTransport: Send {
    /// Writes one command line.
    async fn write_line(&mut self, line: &str) -> AppResult<()>;

    /// Returns the next non-empty line if one completes within `wait`.
    async fn read_line(&mut self, wait: Duration) -> AppResult<Option<String>>;
}

/// A command understood by the motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCommand {
    /// Idle the controller's automatic behaviour.
    Pause,
    /// Advance one quadrant in the given direction.
    Turn(ScanDirection),
    /// Move by an explicit signed step offset.
    Move(i32),
    /// Apply a new signal priority order.
    SetPriority(PriorityOrder),
}

impl MotorCommand {
    /// Serialised command text, without terminator.
    pub fn to_wire(&self) -> String {
        match self {
            MotorCommand::Pause => "P".to_string(),
            MotorCommand::Turn(ScanDirection::Forward) => "T".to_string(),
            MotorCommand::Turn(ScanDirection::Reverse) => "R".to_string(),
            MotorCommand::Move(steps) => format!("M{steps}"),
            MotorCommand::SetPriority(order) => format!("O{}", order.digits()),
        }
    }
}

impl fmt::Display for MotorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// A line received from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotorAck {
    /// The turn in progress has finished.
    TurnDone,
    /// Anything else; informational only.
    Info(String),
}

impl MotorAck {
    /// Classifies a raw line. Blank lines carry nothing and yield `None`.
    pub fn from_line(line: &str) -> Option<Self> {
        match line.trim() {
            "" => None,
            TURN_DONE => Some(MotorAck::TurnDone),
            other => Some(MotorAck::Info(other.to_string())),
        }
    }

    /// The line as received (trimmed).
    pub fn as_str(&self) -> &str {
        match self {
            MotorAck::TurnDone => TURN_DONE,
            MotorAck::Info(text) => text,
        }
    }
}

impl fmt::Display for MotorAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exclusive handle on the motor controller.
pub struct MotorLink<T> {
    transport: Option<T>,
    poll_interval: Duration,
}

impl<T> fmt::Debug for MotorLink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotorLink")
            .field("open", &self.transport.is_some())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl<T: MotorTransport> MotorLink<T> {
    /// Wraps an already-open transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// A link with no transport. Every send fails with [`RigError::LinkNotOpen`].
    pub fn closed() -> Self {
        Self {
            transport: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the read interval used by [`MotorLink::wait_for_ack`].
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Interval between reads while waiting.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether a transport is attached.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Detaches and returns the transport, leaving the link closed.
    pub fn close(&mut self) -> Option<T> {
        let transport = self.transport.take();
        if transport.is_some() {
            debug!("motor link closed");
        }
        transport
    }

    /// Sends one command.
    ///
    /// Fails with [`RigError::LinkNotOpen`] when closed. Callers decide
    /// whether a failed send is worth more than a log line.
    pub async fn send(&mut self, command: &MotorCommand) -> AppResult<()> {
        let transport = self.transport.as_mut().ok_or(RigError::LinkNotOpen)?;
        let wire = command.to_wire();
        transport.write_line(&wire).await?;
        debug!(command = %wire, "sent motor command");
        Ok(())
    }

    /// Reads at most one line, waiting no longer than `wait`.
    pub async fn receive_line(&mut self, wait: Duration) -> AppResult<Option<MotorAck>> {
        let transport = self.transport.as_mut().ok_or(RigError::LinkNotOpen)?;
        let line = transport.read_line(wait).await?;
        Ok(line.as_deref().and_then(MotorAck::from_line))
    }

    /// Polls until `expected` arrives or `max_wait` elapses.
    ///
    /// Returns the time spent waiting on success. Non-matching lines are
    /// logged as informational output. Read errors are logged and polling
    /// continues until the budget runs out.
    pub async fn wait_for_ack(&mut self, expected: &str, max_wait: Duration) -> AppResult<Duration> {
        if !self.is_open() {
            return Err(RigError::LinkNotOpen);
        }
        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= max_wait {
                return Err(RigError::AckTimeout {
                    expected: expected.to_string(),
                    waited: elapsed,
                });
            }
            let budget = (max_wait - elapsed).min(self.poll_interval);

            match self.receive_line(budget).await {
                Ok(Some(ack)) if ack.as_str() == expected => return Ok(start.elapsed()),
                Ok(Some(ack)) => info!(target: "traffic_rig::motor", line = %ack, "motor controller"),
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "motor link read failed while waiting for {expected}");
                    tokio::time::sleep(budget).await;
                }
            }
        }
    }

    /// Reads and logs every line that arrives within successive `wait` windows.
    ///
    /// Stops at the first window with no data. Used to clear the controller's
    /// greeting after opening and to collect immediate replies.
    pub async fn drain(&mut self, wait: Duration) -> Vec<MotorAck> {
        let mut lines = Vec::new();
        loop {
            match self.receive_line(wait).await {
                Ok(Some(ack)) => {
                    info!(target: "traffic_rig::motor", line = %ack, "motor controller");
                    lines.push(ack);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "motor link read failed while draining");
                    break;
                }
            }
        }
        lines
    }
}
