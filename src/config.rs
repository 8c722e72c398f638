//! Configuration using Figment
//!
//! Configuration is merged from, lowest to highest priority:
//! 1. Built-in defaults (the values the rig was tuned with)
//! 2. A TOML file (`config/traffic_rig.toml` unless another path is given)
//! 3. Environment variables prefixed with `TRAFFIC_RIG_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated with a double underscore:
//!
//! ```text
//! TRAFFIC_RIG_MOTOR__PORT=/dev/ttyUSB0
//! TRAFFIC_RIG_SCAN__SETTLE_DELAY=2s
//! TRAFFIC_RIG_APPLICATION__LOG_LEVEL=debug
//! ```
//!
//! Durations are written as humantime strings (`100ms`, `3s`, `1m`).

use crate::error::{AppResult, RigError};
use crate::error_recovery::RetryPolicy;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/traffic_rig.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TRAFFIC_RIG_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Logging settings.
    pub application: ApplicationConfig,
    /// Motor controller link.
    pub motor: MotorConfig,
    /// Scan timing.
    pub scan: ScanConfig,
    /// Snapshot camera.
    pub camera: CameraConfig,
    /// Detection service and vehicle filter.
    pub detector: DetectorConfig,
    /// End-of-cycle review.
    pub review: ReviewConfig,
    /// Calibration session timing.
    pub calibration: CalibrationConfig,
    /// Per-cycle image artifacts.
    pub artifacts: ArtifactConfig,
}

/// Application-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,
    /// `pretty` or `json`.
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Motor controller serial link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Serial port (e.g. "/dev/ttyACM0", "COM6").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Wait after opening; the controller resets when the port opens.
    #[serde(with = "humantime_serde")]
    pub startup_delay: Duration,
    /// Read interval while waiting for acknowledgements.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Attempts to open the port at startup.
    pub connect_attempts: u32,
    /// Pause between open attempts.
    #[serde(with = "humantime_serde")]
    pub connect_backoff: Duration,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 9600,
            startup_delay: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            connect_attempts: 5,
            connect_backoff: Duration::from_secs(2),
        }
    }
}

impl MotorConfig {
    /// Retry policy for opening the port.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_attempts,
            backoff_delay: self.connect_backoff,
        }
    }
}

/// Scan timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Longest wait for `TURN_DONE` after a turn command.
    #[serde(with = "humantime_serde")]
    pub turn_ack_timeout: Duration,
    /// Mechanical settle time after every turn, acknowledged or not.
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    /// Pause between completed cycles.
    #[serde(with = "humantime_serde")]
    pub cycle_delay: Duration,
    /// Pause before the first cycle of continuous mode.
    #[serde(with = "humantime_serde")]
    pub start_delay: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            turn_ack_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(3),
            cycle_delay: Duration::from_secs(5),
            start_delay: Duration::from_secs(3),
        }
    }
}

/// Snapshot camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Snapshot URL.
    pub url: String,
    /// Request timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Rotate frames 180° (camera mounted upside down).
    pub rotate_180: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "http://192.168.180.242/cam-hi.jpg".to_string(),
            timeout: Duration::from_secs(10),
            rotate_180: true,
        }
    }
}

/// Detection service and vehicle filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Endpoint accepting a JPEG body and returning labelled boxes.
    pub url: String,
    /// Request timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Labels counted as vehicles.
    pub vehicle_classes: Vec<String>,
    /// Confidence must be strictly above this after rounding up to 2 decimals.
    pub min_confidence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8500/detect".to_string(),
            timeout: Duration::from_secs(30),
            vehicle_classes: ["car", "truck", "bus", "motorbike"]
                .map(String::from)
                .to_vec(),
            min_confidence: 0.3,
        }
    }
}

/// End-of-cycle review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// How long each annotated image is presented.
    #[serde(with = "humantime_serde")]
    pub display_duration: Duration,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            display_duration: Duration::from_secs(3),
        }
    }
}

/// Calibration session timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Wait for a reply after the entry pause command.
    #[serde(with = "humantime_serde")]
    pub pause_grace: Duration,
    /// Wait for a reply after each move command.
    #[serde(with = "humantime_serde")]
    pub move_grace: Duration,
    /// Live preview refresh interval, also the retry delay after a failed capture.
    #[serde(with = "humantime_serde")]
    pub preview_interval: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            pause_grace: Duration::from_millis(500),
            move_grace: Duration::from_millis(100),
            preview_interval: Duration::from_secs(1),
        }
    }
}

/// Per-cycle image artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Root directory; `raw/`, `annotated/`, and `preview/` live below it.
    pub root: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("traffic_artifacts"),
        }
    }
}

impl RigConfig {
    /// Loads from `path`, or from [`DEFAULT_CONFIG_PATH`] if it exists, then the environment.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(RigConfig::default()));
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(RigError::Configuration(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                figment = figment.merge(Toml::file(path));
            }
            None => figment = figment.merge(Toml::file(DEFAULT_CONFIG_PATH)),
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Parses a TOML string over the defaults. No environment overrides.
    pub fn from_toml_str(toml: &str) -> AppResult<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(RigConfig::default())).merge(Toml::string(toml)),
        )
    }

    fn from_figment(figment: Figment) -> AppResult<Self> {
        let config: RigConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that parse but cannot work.
    pub fn validate(&self) -> AppResult<()> {
        let fail = |msg: &str| Err(RigError::Configuration(msg.to_string()));

        if self.motor.baud_rate == 0 {
            return fail("motor.baud_rate must be greater than zero");
        }
        if self.motor.poll_interval.is_zero() {
            return fail("motor.poll_interval must be greater than zero");
        }
        if self.motor.connect_attempts == 0 {
            return fail("motor.connect_attempts must be at least 1");
        }
        if self.scan.turn_ack_timeout < self.motor.poll_interval {
            return fail("scan.turn_ack_timeout must be at least motor.poll_interval");
        }
        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            return fail("detector.min_confidence must be within [0, 1]");
        }
        if self.detector.vehicle_classes.is_empty() {
            return fail("detector.vehicle_classes must not be empty");
        }
        if !matches!(self.application.log_format.as_str(), "pretty" | "json") {
            return fail("application.log_format must be 'pretty' or 'json'");
        }
        Ok(())
    }
}
