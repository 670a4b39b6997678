//! [`FrameSource`] trait and a file-backed camera driver.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

/// Anything that can hand the autopilot the most recent camera image.
///
/// Implementations must return promptly: "no frame right now" is an expected
/// outcome and is reported as `None`, never by blocking.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Return the latest JPEG-encoded frame, or `None` if nothing is
    /// available.  An empty buffer is treated the same as `None` by callers.
    async fn capture(&self) -> Option<Vec<u8>>;
}

/// A camera that reads whatever JPEG an external capture tool last wrote to
/// `path` (e.g. `fswebcam --loop 1 /tmp/rover.jpg`).
///
/// A missing or unreadable file yields `None`.
pub struct SnapshotCamera {
    path: PathBuf,
}

impl SnapshotCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl FrameSource for SnapshotCamera {
    async fn capture(&self) -> Option<Vec<u8>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "snapshot not readable");
                None
            }
        }
    }
}
