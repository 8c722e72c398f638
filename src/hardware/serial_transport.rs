//! Serial transport for the Arduino-class motor controller.
//!
//! Protocol Overview:
//! - 9600 baud, 8N1, no flow control
//! - Commands are ASCII lines terminated with `\n`
//! - Responses are ASCII lines terminated with `\n` (a trailing `\r` is tolerated)
//! - Opening the port resets the controller, so callers should wait
//!   `motor.startup_delay` before the first command
//!
//! # Example Usage
//!
//! ```no_run
//! use traffic_rig::hardware::motor_link::{MotorCommand, MotorLink};
//! use traffic_rig::hardware::serial_transport::SerialMotorTransport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = SerialMotorTransport::open("/dev/ttyACM0", 9600)?;
//!     let mut link = MotorLink::new(transport);
//!     link.send(&MotorCommand::Pause).await?;
//!     Ok(())
//! }
//! ```

use crate::error::{AppResult, RigError};
use crate::hardware::motor_link::MotorTransport;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, trace};

/// Line-oriented serial port to the motor controller.
pub struct SerialMotorTransport {
    port: SerialStream,
    port_name: String,
    /// Bytes received but not yet returned as a complete line.
    pending: Vec<u8>,
}

impl std::fmt::Debug for SerialMotorTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialMotorTransport")
            .field("port_name", &self.port_name)
            .field("pending_bytes", &self.pending.len())
            .finish()
    }
}

impl SerialMotorTransport {
    /// Opens `port_path` with the controller's fixed framing.
    ///
    /// # Errors
    /// Returns [`RigError::SerialOpen`] if the port cannot be opened.
    pub fn open(port_path: &str, baud_rate: u32) -> AppResult<Self> {
        let port = tokio_serial::new(port_path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|err| RigError::SerialOpen {
                port: port_path.to_string(),
                reason: err.to_string(),
            })?;

        debug!(port = port_path, baud_rate, "serial port opened");
        Ok(Self {
            port,
            port_name: port_path.to_string(),
            pending: Vec::with_capacity(64),
        })
    }

    fn take_line(&mut self) -> Option<String> {
        take_line(&mut self.pending)
    }
}

/// Pops the first complete, non-blank line out of `pending`.
///
/// Bytes after the last newline stay buffered for the next read.
fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
        let raw: Vec<u8> = pending.drain(..=newline).collect();
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if !line.is_empty() {
            return Some(line);
        }
    }
    None
}

#[async_trait]
impl MotorTransport for SerialMotorTransport {
    async fn write_line(&mut self, line: &str) -> AppResult<()> {
        let payload = format!("{line}\n");
        self.port
            .write_all(payload.as_bytes())
            .await
            .map_err(|err| RigError::LinkIo(format!("write to {} failed: {err}", self.port_name)))?;
        self.port
            .flush()
            .await
            .map_err(|err| RigError::LinkIo(format!("flush of {} failed: {err}", self.port_name)))?;
        Ok(())
    }

    async fn read_line(&mut self, wait: Duration) -> AppResult<Option<String>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let deadline = Instant::now() + wait;
        let mut buf = [0u8; 64];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match tokio::time::timeout(remaining, self.port.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    return Err(RigError::LinkIo(format!(
                        "unexpected EOF from {}",
                        self.port_name
                    )))
                }
                Ok(Ok(n)) => {
                    trace!(bytes = n, "serial bytes received");
                    self.pending.extend_from_slice(&buf[..n]);
                    if let Some(line) = self.take_line() {
                        return Ok(Some(line));
                    }
                }
                Ok(Err(err)) => {
                    return Err(RigError::LinkIo(format!(
                        "read from {} failed: {err}",
                        self.port_name
                    )))
                }
                Err(_) => return Ok(None),
            }
        }
    }
}
