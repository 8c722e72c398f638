//! Manual calibration: nudge the rig by explicit step counts.
//!
//! The session idles the controller with `P`, then executes operator lines
//! read from a channel:
//!
//! - `move <steps>` or `m <steps>` sends `M<steps>` (steps may be negative)
//! - `done` ends the session
//!
//! Input is case-insensitive and blank lines are ignored. A malformed line is
//! reported and skipped. While idle the session keeps reading the motor link,
//! so unsolicited controller output shows up in the log as it arrives.
//!
//! [`run_live_preview`] is meant to run next to the session and keeps
//! `preview/latest.jpg` fresh so the operator can see where the camera points.

use crate::config::CalibrationConfig;
use crate::error::{AppResult, RigError};
use crate::hardware::capabilities::FrameSource;
use crate::hardware::motor_link::{MotorAck, MotorCommand, MotorLink, MotorTransport};
use crate::scan::stop::StopSignal;
use crate::scan::types::Position;
use crate::storage::ArtifactStore;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One parsed operator line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationCommand {
    /// Relative move by a signed step count.
    Move(i32),
    /// Leave calibration.
    Done,
}

/// Why an operator line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalibrationInputError {
    /// Blank line.
    #[error("empty input")]
    Empty,

    /// Not a recognised command.
    #[error("unknown command '{0}', expected 'move <steps>' or 'done'")]
    Unknown(String),

    /// A move with no step count or extra tokens.
    #[error("'{0}' needs exactly one step count, e.g. 'move -200'")]
    MissingSteps(String),

    /// A step count that is not an integer.
    #[error("invalid step count '{0}', expected an integer")]
    InvalidSteps(String),
}

impl FromStr for CalibrationCommand {
    type Err = CalibrationInputError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let normalized = line.trim().to_lowercase();
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        match tokens.as_slice() {
            [] => Err(CalibrationInputError::Empty),
            ["done"] => Ok(CalibrationCommand::Done),
            ["move" | "m", steps] => steps
                .parse()
                .map(CalibrationCommand::Move)
                .map_err(|_| CalibrationInputError::InvalidSteps((*steps).to_string())),
            [verb @ ("move" | "m"), ..] => {
                Err(CalibrationInputError::MissingSteps((*verb).to_string()))
            }
            _ => Err(CalibrationInputError::Unknown(tokens.join(" "))),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationExit {
    /// The operator typed `done`.
    Done,
    /// A stop was requested.
    Stopped,
    /// The input channel closed.
    InputClosed,
}

/// What happened during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSummary {
    /// Move commands written to the link.
    pub moves_sent: u32,
    /// Lines that failed to parse.
    pub rejected_inputs: u32,
    /// Why the session ended.
    pub exit: CalibrationExit,
}

enum SessionEvent {
    Line(String),
    InputClosed,
    Stopped,
    Motor(AppResult<Option<MotorAck>>),
}

/// Interactive calibration over a motor link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSession {
    pause_grace: Duration,
    move_grace: Duration,
}

impl CalibrationSession {
    /// Session with explicit reply grace periods.
    pub fn new(pause_grace: Duration, move_grace: Duration) -> Self {
        Self {
            pause_grace,
            move_grace,
        }
    }

    /// Session using the configured grace periods.
    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(config.pause_grace, config.move_grace)
    }

    /// Runs until `done`, a stop request, or the input channel closing.
    ///
    /// Fails only if the link is not open on entry.
    pub async fn run<T: MotorTransport>(
        &self,
        link: &mut MotorLink<T>,
        input: &mut mpsc::Receiver<String>,
        stop: &mut StopSignal,
    ) -> AppResult<CalibrationSummary> {
        if !link.is_open() {
            return Err(RigError::LinkNotOpen);
        }
        info!("calibration mode: 'move <steps>' to adjust, 'done' to exit");

        if let Err(err) = link.send(&MotorCommand::Pause).await {
            warn!(error = %err, "failed to pause motor controller");
        }
        if link.drain(self.pause_grace).await.is_empty() {
            debug!("no reply to pause");
        }

        let poll = link.poll_interval();
        let mut moves_sent = 0;
        let mut rejected_inputs = 0;

        let exit = loop {
            let event = tokio::select! {
                biased;
                _ = stop.stopped() => SessionEvent::Stopped,
                line = input.recv() => match line {
                    Some(line) => SessionEvent::Line(line),
                    None => SessionEvent::InputClosed,
                },
                ack = link.receive_line(poll) => SessionEvent::Motor(ack),
            };

            match event {
                SessionEvent::Stopped => break CalibrationExit::Stopped,
                SessionEvent::InputClosed => break CalibrationExit::InputClosed,
                SessionEvent::Motor(Ok(Some(ack))) => {
                    info!(target: "traffic_rig::motor", line = %ack, "motor controller");
                }
                SessionEvent::Motor(Ok(None)) => {}
                SessionEvent::Motor(Err(err)) => {
                    warn!(error = %err, "motor link read failed");
                    tokio::time::sleep(poll).await;
                }
                SessionEvent::Line(line) => match line.parse::<CalibrationCommand>() {
                    Ok(CalibrationCommand::Done) => break CalibrationExit::Done,
                    Ok(CalibrationCommand::Move(steps)) => {
                        if self.send_move(link, steps).await {
                            moves_sent += 1;
                        }
                    }
                    Err(CalibrationInputError::Empty) => {}
                    Err(err) => {
                        warn!(input = %line.trim(), "{err}");
                        rejected_inputs += 1;
                    }
                },
            }
        };

        info!(?exit, moves_sent, rejected_inputs, "calibration finished");
        Ok(CalibrationSummary {
            moves_sent,
            rejected_inputs,
            exit,
        })
    }

    async fn send_move<T: MotorTransport>(&self, link: &mut MotorLink<T>, steps: i32) -> bool {
        let command = MotorCommand::Move(steps);
        if let Err(err) = link.send(&command).await {
            warn!(error = %err, %command, "failed to send move");
            return false;
        }
        info!(%command, "move sent");

        match link.receive_line(self.move_grace).await {
            Ok(Some(ack)) => info!(target: "traffic_rig::motor", line = %ack, "motor controller"),
            Ok(None) => info!("no immediate reply to move"),
            Err(err) => warn!(error = %err, "motor link read failed"),
        }
        true
    }
}

/// Keeps the preview image fresh until stopped.
///
/// Failed captures are logged and retried after `interval`. Returns the number
/// of previews written.
pub async fn run_live_preview(
    frames: &dyn FrameSource,
    store: &dyn ArtifactStore,
    interval: Duration,
    mut stop: StopSignal,
) -> u64 {
    let mut written = 0;
    while !stop.is_stopped() {
        match frames.capture(Position::ALL[0]).await {
            Ok(frame) => match store.save_preview(&frame).await {
                Ok(_) => written += 1,
                Err(err) => warn!(error = %err, "could not save preview"),
            },
            Err(err) => warn!(kind = err.kind(), error = %err, "preview capture failed, retrying"),
        }
        if !stop.sleep(interval).await {
            break;
        }
    }
    debug!(written, "live preview ended");
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move_forms() {
        assert_eq!("move 50".parse::<CalibrationCommand>(), Ok(CalibrationCommand::Move(50)));
        assert_eq!("m -200".parse::<CalibrationCommand>(), Ok(CalibrationCommand::Move(-200)));
        assert_eq!("  MOVE   +15 ".parse::<CalibrationCommand>(), Ok(CalibrationCommand::Move(15)));
        assert_eq!("Done".parse::<CalibrationCommand>(), Ok(CalibrationCommand::Done));
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(
            "".parse::<CalibrationCommand>(),
            Err(CalibrationInputError::Empty)
        );
        assert_eq!(
            "   ".parse::<CalibrationCommand>(),
            Err(CalibrationInputError::Empty)
        );
        assert_eq!(
            "move".parse::<CalibrationCommand>(),
            Err(CalibrationInputError::MissingSteps("move".into()))
        );
        assert_eq!(
            "m 1 2".parse::<CalibrationCommand>(),
            Err(CalibrationInputError::MissingSteps("m".into()))
        );
        assert_eq!(
            "m ten".parse::<CalibrationCommand>(),
            Err(CalibrationInputError::InvalidSteps("ten".into()))
        );
        assert_eq!(
            "m 1.5".parse::<CalibrationCommand>(),
            Err(CalibrationInputError::InvalidSteps("1.5".into()))
        );
        assert_eq!(
            "turn 90".parse::<CalibrationCommand>(),
            Err(CalibrationInputError::Unknown("turn 90".into()))
        );
    }
}
