//! Core library for the traffic_rig application.
//!
//! A camera on a motorised mount turns through four fixed headings, counts
//! vehicles at each, and tells the downstream signal controller which approach
//! to serve first. This library contains the motor link protocol, the scan
//! orchestration, and the calibration session, with the camera, detector, and
//! artifact storage behind traits so they can be replaced in tests.

pub mod calibration;
pub mod config;
pub mod detection;
pub mod error;
pub mod error_recovery;
pub mod hardware;
pub mod logging;
pub mod scan;
pub mod storage;
