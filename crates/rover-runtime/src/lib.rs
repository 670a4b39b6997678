//! `rover-runtime` – the autopilot decision loop.
//!
//! Perceive, decide, act, pace.  A camera frame goes to a vision-language
//! model, the reply becomes one motion command, the command goes to the
//! drive base, and the decision is logged for observers.
//!
//! # Modules
//!
//! - [`autopilot`] – [`Autopilot`][autopilot::Autopilot]: owns the single
//!   background worker, start/stop lifecycle and the status snapshot.
//! - [`oracle`] – [`VisionOracle`][oracle::VisionOracle] and
//!   [`OracleConnector`][oracle::OracleConnector] seams plus the
//!   [`GeminiOracle`][oracle::GeminiOracle] REST client.
//! - [`interpreter`] – [`interpret`][interpreter::interpret]: turns free-form
//!   oracle text into a validated [`Command`][rover_types::Command], first as
//!   JSON and then by keyword scan.
//! - [`decision_log`] – [`DecisionLog`][decision_log::DecisionLog]: bounded
//!   FIFO of recent decisions.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod autopilot;
pub mod decision_log;
pub mod interpreter;
pub mod oracle;
pub mod telemetry;

pub use autopilot::{Autopilot, AutopilotConfig, CycleFailure, CycleOutcome, StatusHandle};
pub use decision_log::DecisionLog;
pub use interpreter::{Interpretation, ParseRoute, interpret};
pub use oracle::{GeminiConnector, GeminiOracle, OracleConnector, OracleError, VisionOracle};
pub use telemetry::{TracerProviderGuard, init_tracing};
