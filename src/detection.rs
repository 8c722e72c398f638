//! Vehicle counting on top of an external object-detection service.
//!
//! The service does the vision work and returns labelled boxes; this module
//! decides which boxes count as vehicles.
//!
//! Service contract: `POST <url>` with a JPEG body (`Content-Type: image/jpeg`),
//! answered with
//!
//! ```json
//! {
//!   "detections": [{"label": "car", "confidence": 0.87, "bbox": [12, 40, 180, 140]}],
//!   "annotated_jpeg": "<optional base64 JPEG with boxes drawn>"
//! }
//! ```

use crate::config::DetectorConfig;
use crate::error::{AppResult, RigError};
use crate::hardware::capabilities::{DetectionReport, Detector, Frame};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// One labelled bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Class label, e.g. "car".
    pub label: String,
    /// Model confidence in [0, 1].
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in pixels.
    #[serde(default)]
    pub bbox: [i32; 4],
}

/// Decides which detections are vehicles.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleFilter {
    classes: HashSet<String>,
    min_confidence: f32,
}

impl VehicleFilter {
    /// Filter accepting `classes` above `min_confidence`.
    pub fn new<I, S>(classes: I, min_confidence: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
            min_confidence,
        }
    }

    /// Whether `object` counts.
    ///
    /// Confidence is rounded up to two decimals before the strict comparison.
    pub fn accepts(&self, object: &DetectedObject) -> bool {
        let rounded = (object.confidence * 100.0).ceil() / 100.0;
        self.classes.contains(&object.label) && rounded > self.min_confidence
    }

    /// Number of accepted detections.
    pub fn count(&self, detections: &[DetectedObject]) -> u32 {
        detections.iter().filter(|d| self.accepts(d)).count() as u32
    }
}

impl From<&DetectorConfig> for VehicleFilter {
    fn from(config: &DetectorConfig) -> Self {
        VehicleFilter::new(config.vehicle_classes.iter().cloned(), config.min_confidence)
    }
}

#[derive(Debug, Deserialize)]
struct DetectorResponse {
    #[serde(default)]
    detections: Vec<DetectedObject>,
    #[serde(default)]
    annotated_jpeg: Option<String>,
}

/// [`Detector`] backed by an HTTP detection service.
#[derive(Debug, Clone)]
pub struct HttpDetector {
    client: reqwest::Client,
    url: String,
    filter: VehicleFilter,
}

impl HttpDetector {
    /// Builds a detector from configuration.
    pub fn new(config: &DetectorConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| RigError::Detection(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            filter: VehicleFilter::from(config),
        })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, frame: &Frame) -> AppResult<DetectionReport> {
        let response: DetectorResponse = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(frame.jpeg.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| RigError::Detection(format!("request to {} failed: {err}", self.url)))?
            .json()
            .await
            .map_err(|err| RigError::Detection(format!("malformed detector response: {err}")))?;

        let count = self.filter.count(&response.detections);
        debug!(
            position = %frame.position,
            boxes = response.detections.len(),
            vehicles = count,
            "detection complete"
        );

        let annotated_jpeg = response.annotated_jpeg.and_then(|encoded| {
            match base64::engine::general_purpose::STANDARD.decode(encoded) {
                Ok(raw) => Some(Bytes::from(raw)),
                Err(err) => {
                    warn!(position = %frame.position, error = %err, "annotated image was not valid base64");
                    None
                }
            }
        });

        Ok(DetectionReport {
            count,
            annotated_jpeg,
        })
    }
}
