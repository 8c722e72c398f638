//! Hardware access: the motor link, the camera, and their test doubles.

pub mod capabilities;
pub mod http_camera;
pub mod mock;
pub mod motor_link;
#[cfg(feature = "tokio_serial")]
pub mod serial_transport;

pub use capabilities::{DetectionReport, Detector, Frame, FrameSource};
pub use motor_link::{MotorAck, MotorCommand, MotorLink, MotorTransport, TURN_DONE};
