//! [`ByteLinkSink`] – drives the base over a single-byte serial protocol.
//!
//! The microcontroller on the other end reads one byte per command (see
//! [`Command::wire_byte`]) and echoes it back.  Port discovery and baud-rate
//! setup happen outside this crate; callers hand an already configured
//! writer to [`ByteLinkSink::open`] and take it back down with
//! [`ByteLinkSink::close`].
//!
//! Writes may block (a slow or stalled tty), so [`CommandSink::send`] runs
//! them on Tokio's blocking pool.  `open` and `close` flush synchronously
//! and are meant for setup and teardown, not the control loop.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rover_types::{Command, RoverError};
use tracing::{info, instrument, warn};

use crate::drive::CommandSink;

type Link = Box<dyn Write + Send>;

/// Command sink over an explicitly opened byte link.
pub struct ByteLinkSink {
    id: String,
    link: Arc<Mutex<Option<Link>>>,
}

impl ByteLinkSink {
    /// Create a sink named `id` with no link attached yet.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            link: Arc::new(Mutex::new(None)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Attach `link`, replacing (and flushing) any previously attached one.
    pub fn open(&self, link: impl Write + Send + 'static) {
        let mut guard = self.lock();
        if let Some(mut old) = guard.take() {
            let _ = old.flush();
        }
        *guard = Some(Box::new(link));
        info!(sink = %self.id, "byte link opened");
    }

    /// Open a character device (e.g. `/dev/ttyACM0`) for writing.
    ///
    /// The device must already be configured for the firmware's baud rate.
    pub fn open_device(&self, path: impl AsRef<Path>) -> Result<(), RoverError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| self.fault(format!("cannot open {}: {e}", path.display())))?;
        self.open(file);
        Ok(())
    }

    /// Flush and detach the link.  No-op when already closed.
    pub fn close(&self) {
        if let Some(mut link) = self.lock().take() {
            if let Err(e) = link.flush() {
                warn!(sink = %self.id, error = %e, "flush on close failed");
            }
            info!(sink = %self.id, "byte link closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Link>> {
        lock_link(&self.link)
    }

    fn fault(&self, details: String) -> RoverError {
        RoverError::HardwareFault {
            component: self.id.clone(),
            details,
        }
    }
}

#[async_trait]
impl CommandSink for ByteLinkSink {
    #[instrument(skip(self), fields(sink = %self.id))]
    async fn send(&self, command: Command) -> Result<(), RoverError> {
        let shared = Arc::clone(&self.link);
        let byte = command.wire_byte();
        let written = tokio::task::spawn_blocking(move || {
            let mut guard = lock_link(&shared);
            guard
                .as_mut()
                .map(|link| link.write_all(&[byte]).and_then(|_| link.flush()))
        })
        .await
        .map_err(|e| self.fault(format!("write task failed: {e}")))?;

        match written {
            None => Err(self.fault("link not open".to_string())),
            Some(Err(e)) => Err(self.fault(format!("write failed: {e}"))),
            Some(Ok(())) => Ok(()),
        }
    }
}

fn lock_link(link: &Mutex<Option<Link>>) -> MutexGuard<'_, Option<Link>> {
    link.lock().unwrap_or_else(|e| e.into_inner())
}

impl Drop for ByteLinkSink {
    fn drop(&mut self) {
        self.close();
    }
}
