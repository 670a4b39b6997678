//! In-process simulated hardware for CI and tests.
//!
//! [`SimCamera`] serves scripted frames and [`SimDriveBase`] records every
//! command it receives, so the full autopilot can run headless without a
//! camera or a serial link.
//!
//! # Example
//!
//! ```rust
//! use rover_hal::{CommandSink, FrameSource};
//! use rover_hal::sim::{SimCamera, SimDriveBase};
//! use rover_types::Command;
//!
//! # tokio_test_block_on(async {
//! let cam = SimCamera::blank();
//! assert!(cam.capture().await.is_some());
//!
//! let base = SimDriveBase::new();
//! base.send(Command::Forward).await.unwrap();
//! assert_eq!(base.commands(), vec![Command::Forward]);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rover_types::{Command, RoverError};

use crate::camera::FrameSource;
use crate::drive::CommandSink;

/// Smallest well-formed JPEG (SOI + EOI markers).
pub const BLANK_JPEG: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

// ────────────────────────────────────────────────────────────────────────────
// Simulated camera
// ────────────────────────────────────────────────────────────────────────────

/// A simulated camera.
///
/// Scripted frames are served first, in order; once the script is exhausted
/// every capture returns the fallback frame (which may itself be `None`).
pub struct SimCamera {
    script: Mutex<VecDeque<Option<Vec<u8>>>>,
    fallback: Option<Vec<u8>>,
    captures: AtomicUsize,
}

impl SimCamera {
    /// Always returns [`BLANK_JPEG`].
    pub fn blank() -> Self {
        Self::with_fallback(Some(BLANK_JPEG.to_vec()))
    }

    /// Never has a frame.
    pub fn offline() -> Self {
        Self::with_fallback(None)
    }

    pub fn with_fallback(fallback: Option<Vec<u8>>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            captures: AtomicUsize::new(0),
        }
    }

    /// Queue frames to serve before the fallback.
    pub fn scripted(mut self, frames: impl IntoIterator<Item = Option<Vec<u8>>>) -> Self {
        self.script
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .extend(frames);
        self
    }

    /// Number of times [`FrameSource::capture`] has been called.
    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::Acquire)
    }
}

#[async_trait]
impl FrameSource for SimCamera {
    async fn capture(&self) -> Option<Vec<u8>> {
        self.captures.fetch_add(1, Ordering::AcqRel);
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match scripted {
            Some(frame) => frame,
            None => self.fallback.clone(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated drive base
// ────────────────────────────────────────────────────────────────────────────

/// A simulated drive base that records every command.
///
/// Call [`set_failing`][Self::set_failing] to make subsequent sends return a
/// [`RoverError::HardwareFault`], as an unplugged serial cable would.
#[derive(Default)]
pub struct SimDriveBase {
    received: Mutex<Vec<Command>>,
    failing: AtomicBool,
}

impl SimDriveBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// All commands accepted so far, oldest first.
    pub fn commands(&self) -> Vec<Command> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<Command> {
        self.commands().last().copied()
    }
}

#[async_trait]
impl CommandSink for SimDriveBase {
    async fn send(&self, command: Command) -> Result<(), RoverError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(RoverError::HardwareFault {
                component: "sim_drive_base".to_string(),
                details: "simulated link failure".to_string(),
            });
        }
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
