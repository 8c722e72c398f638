//! HTTP snapshot camera (ESP32-CAM style `GET /cam-hi.jpg`).
//!
//! Every position maps to the same endpoint: the camera rides on the rig, so
//! the position only labels the frame. The camera is mounted upside down and
//! frames are rotated 180° before use.

use crate::config::CameraConfig;
use crate::error::CaptureError;
use crate::hardware::capabilities::{Frame, FrameSource};
use crate::scan::types::Position;
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// Frame source backed by a single HTTP snapshot endpoint.
#[derive(Debug, Clone)]
pub struct HttpFrameSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    rotate_180: bool,
}

impl HttpFrameSource {
    /// Builds a source from the camera section of the configuration.
    pub fn new(config: &CameraConfig) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| CaptureError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            timeout: config.timeout,
            rotate_180: config.rotate_180,
        })
    }

    /// Endpoint being polled.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Bytes, CaptureError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| self.classify(err))?
            .error_for_status()
            .map_err(|err| self.classify(err))?;
        response.bytes().await.map_err(|err| self.classify(err))
    }

    fn classify(&self, err: reqwest::Error) -> CaptureError {
        if err.is_timeout() {
            CaptureError::Timeout(self.timeout)
        } else {
            CaptureError::Transport(err.to_string())
        }
    }
}

/// Decodes a snapshot, optionally rotates it, and re-encodes it as JPEG.
pub fn prepare_frame(
    position: Position,
    body: &[u8],
    rotate_180: bool,
) -> Result<Frame, CaptureError> {
    let decoded = image::load_from_memory(body).map_err(|err| CaptureError::Decode(err.to_string()))?;
    let oriented = if rotate_180 { decoded.rotate180() } else { decoded };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(oriented.to_rgb8());
    let mut encoded = Cursor::new(Vec::with_capacity(body.len()));
    rgb.write_to(&mut encoded, ImageFormat::Jpeg)
        .map_err(|err| CaptureError::Decode(format!("re-encode failed: {err}")))?;

    Ok(Frame {
        position,
        captured_at: chrono::Utc::now(),
        width: rgb.width(),
        height: rgb.height(),
        jpeg: Bytes::from(encoded.into_inner()),
    })
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn capture(&self, position: Position) -> Result<Frame, CaptureError> {
        let body = self.fetch().await?;
        debug!(%position, bytes = body.len(), url = %self.url, "snapshot received");
        prepare_frame(position, &body, self.rotate_180)
    }
}
