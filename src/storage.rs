//! Transient image artifacts.
//!
//! Layout below the configured root:
//!
//! ```text
//! raw/side_<n>_raw_<unix>.jpg
//! annotated/side_<n>_annotated_<unix>.jpg
//! preview/latest.jpg
//! ```
//!
//! `raw/` and `annotated/` hold the current cycle only and are emptied by
//! [`ArtifactStore::reset`].

use crate::config::ArtifactConfig;
use crate::error::{AppResult, RigError};
use crate::hardware::capabilities::Frame;
use crate::scan::types::Position;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Sink for per-cycle images.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Discards the previous cycle's images.
    async fn reset(&self) -> AppResult<()>;

    /// Persists a raw capture.
    async fn save_raw(&self, frame: &Frame) -> AppResult<PathBuf>;

    /// Persists an annotated image for `position`.
    async fn save_annotated(&self, position: Position, jpeg: &[u8]) -> AppResult<PathBuf>;

    /// Overwrites the live preview image.
    async fn save_preview(&self, frame: &Frame) -> AppResult<PathBuf>;

    /// Removes everything the store created.
    async fn cleanup(&self) -> AppResult<()>;
}

/// [`ArtifactStore`] writing plain files under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    raw_dir: PathBuf,
    annotated_dir: PathBuf,
    preview_dir: PathBuf,
}

impl DirectoryStore {
    /// Store rooted at `root`. Nothing is created until the first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            raw_dir: root.join("raw"),
            annotated_dir: root.join("annotated"),
            preview_dir: root.join("preview"),
        }
    }

    /// Store rooted at the configured artifact directory.
    pub fn from_config(config: &ArtifactConfig) -> Self {
        Self::new(&config.root)
    }

    /// Directory for raw captures.
    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    /// Directory for annotated images.
    pub fn annotated_dir(&self) -> &Path {
        &self.annotated_dir
    }

    /// Directory holding the live preview.
    pub fn preview_dir(&self) -> &Path {
        &self.preview_dir
    }

    async fn write(&self, dir: &Path, name: String, contents: &[u8]) -> AppResult<PathBuf> {
        fs::create_dir_all(dir)
            .await
            .map_err(|err| RigError::Storage(format!("cannot create {}: {err}", dir.display())))?;
        let path = dir.join(name);
        fs::write(&path, contents)
            .await
            .map_err(|err| RigError::Storage(format!("cannot write {}: {err}", path.display())))?;
        debug!(path = %path.display(), bytes = contents.len(), "artifact saved");
        Ok(path)
    }
}

async fn remove_dir(dir: &Path) -> AppResult<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(RigError::Storage(format!(
            "cannot remove {}: {err}",
            dir.display()
        ))),
    }
}

#[async_trait]
impl ArtifactStore for DirectoryStore {
    async fn reset(&self) -> AppResult<()> {
        for dir in [&self.raw_dir, &self.annotated_dir] {
            remove_dir(dir).await?;
            fs::create_dir_all(dir)
                .await
                .map_err(|err| RigError::Storage(format!("cannot create {}: {err}", dir.display())))?;
        }
        Ok(())
    }

    async fn save_raw(&self, frame: &Frame) -> AppResult<PathBuf> {
        let name = format!(
            "side_{}_raw_{}.jpg",
            frame.position,
            frame.captured_at.timestamp()
        );
        self.write(&self.raw_dir, name, &frame.jpeg).await
    }

    async fn save_annotated(&self, position: Position, jpeg: &[u8]) -> AppResult<PathBuf> {
        let name = format!(
            "side_{}_annotated_{}.jpg",
            position,
            chrono::Utc::now().timestamp()
        );
        self.write(&self.annotated_dir, name, jpeg).await
    }

    async fn save_preview(&self, frame: &Frame) -> AppResult<PathBuf> {
        self.write(&self.preview_dir, "latest.jpg".to_string(), &frame.jpeg)
            .await
    }

    async fn cleanup(&self) -> AppResult<()> {
        for dir in [&self.raw_dir, &self.annotated_dir, &self.preview_dir] {
            remove_dir(dir).await?;
        }
        info!("artifact directories removed");
        Ok(())
    }
}
