//! `rover-hal` – collaborator contracts for the autopilot.
//!
//! The decision loop never touches a camera or a serial port directly.  It is
//! handed two externally owned collaborators:
//!
//! - [`FrameSource`] – supplies the latest JPEG frame, or nothing.
//! - [`CommandSink`] – performs a validated [`Command`][rover_types::Command].
//!
//! # Modules
//!
//! - [`camera`] – the [`FrameSource`] trait and [`SnapshotCamera`].
//! - [`drive`] – the [`CommandSink`] trait.
//! - [`serial_link`] – [`ByteLinkSink`], the single-byte firmware protocol
//!   with an explicit open/close lifecycle.
//! - [`sim`] – simulated camera and drive base for CI.

pub mod camera;
pub mod drive;
pub mod serial_link;
pub mod sim;

pub use camera::{FrameSource, SnapshotCamera};
pub use drive::CommandSink;
pub use serial_link::ByteLinkSink;
pub use sim::{SimCamera, SimDriveBase};
