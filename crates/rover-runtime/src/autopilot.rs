//! [`Autopilot`] – the perceive/decide/act loop.
//!
//! One background worker per instance repeats:
//!
//! 1. **Capture** – pull a frame from the [`FrameSource`].  No frame →
//!    record `last_error`, wait the short retry delay, try again.  This does
//!    not count as a cycle and logs no decision.
//! 2. **Consult** – send the frame and [`SYSTEM_PROMPT`] to the
//!    [`VisionOracle`].
//! 3. **Interpret** – run [`interpret`] on the reply.
//! 4. **Act** – update status, log the [`Decision`], dispatch to the
//!    [`CommandSink`].
//! 5. **Pace** – sleep the configured interval, whatever happened above.
//!
//! Every per-cycle failure becomes a [`CycleFailure`] recorded in the status
//! snapshot; nothing escapes the worker.  Only [`Autopilot::start`] can
//! return an error.
//!
//! # Shutdown
//!
//! [`Autopilot::stop`] raises a stop signal that the worker observes between
//! stages and while sleeping or waiting on the oracle, waits for the worker
//! with a bounded timeout, then always commands the sink to
//! [`Command::Stop`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rover_hal::sim::{SimCamera, SimDriveBase};
//! use rover_runtime::autopilot::{Autopilot, AutopilotConfig};
//! use rover_runtime::oracle::GeminiConnector;
//!
//! # async fn demo() -> Result<(), rover_types::RoverError> {
//! let mut pilot = Autopilot::new(
//!     AutopilotConfig::default(),
//!     Some(Arc::new(GeminiConnector::default())),
//! );
//! pilot.start(Arc::new(SimCamera::blank()), Arc::new(SimDriveBase::new()), 3.0, "")?;
//! let status = pilot.status();
//! # let _ = status;
//! pilot.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use rover_hal::{CommandSink, FrameSource};
use rover_types::{Command, Decision, LoopState, LoopStatus, RoverError};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::decision_log::{DEFAULT_CAPACITY, DEFAULT_STATUS_WINDOW, DecisionLog};
use crate::interpreter::{excerpt, interpret};
use crate::oracle::{DEFAULT_MODEL, OracleConnector, OracleError, SYSTEM_PROMPT, VisionOracle};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Characters of an oracle / dispatch error kept in status and the log.
pub const ERROR_MESSAGE_CHARS: usize = 200;

/// Characters of unparseable oracle text kept in a parse error.
pub const PARSE_ERROR_EXCERPT_CHARS: usize = 100;

/// Interval reported before the first start.
const INITIAL_INTERVAL: Duration = Duration::from_secs(3);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`Autopilot`].
#[derive(Debug, Clone)]
pub struct AutopilotConfig {
    /// Environment variable holding the oracle credential.
    pub credential_env: String,
    /// Model used when `start` is given an empty identifier.
    pub default_model: String,
    /// Decisions retained per run.
    pub decision_capacity: usize,
    /// Decisions exposed in each status snapshot.
    pub status_window: usize,
    /// Floor applied to the requested pacing interval.
    pub min_interval: Duration,
    /// Wait after a missing frame before trying again.
    pub frame_retry_delay: Duration,
    /// How long `stop` waits for the worker before giving up on it.
    pub join_timeout: Duration,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            credential_env: "GEMINI_API_KEY".to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            decision_capacity: DEFAULT_CAPACITY,
            status_window: DEFAULT_STATUS_WINDOW,
            min_interval: Duration::from_secs(1),
            frame_retry_delay: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Clamp a requested interval in seconds to at least `floor`.
///
/// NaN and negative values fall back to `floor`; values too large for a
/// [`Duration`] (including infinity) saturate to [`Duration::MAX`].
pub fn clamp_interval(secs: f64, floor: Duration) -> Duration {
    if secs.is_nan() || secs < 0.0 {
        return floor;
    }
    Duration::try_from_secs_f64(secs)
        .unwrap_or(Duration::MAX)
        .max(floor)
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-cycle result
// ─────────────────────────────────────────────────────────────────────────────

/// Why a cycle did not end in a dispatched command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleFailure {
    #[error("No camera frame")]
    FrameUnavailable,
    #[error("{0}")]
    OracleCall(String),
    #[error("Parse error: {0}")]
    Interpretation(String),
    #[error("{0}")]
    Dispatch(String),
}

impl CycleFailure {
    /// Frame misses only touch `last_error`; everything else is also logged.
    fn logs_decision(&self) -> bool {
        !matches!(self, CycleFailure::FrameUnavailable)
    }
}

/// Result of one decision cycle.
pub type CycleOutcome = Result<Decision, CycleFailure>;

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a status reader can see.  Written only by the owner (start /
/// stop) and the worker, always under one short write lock.
#[derive(Debug)]
struct Shared {
    /// Incremented on every start; a worker only touches state of its own run.
    run_id: u64,
    running: bool,
    state: LoopState,
    interval: Duration,
    model: String,
    last_command: Option<Command>,
    last_reason: Option<String>,
    last_error: Option<String>,
    log: DecisionLog,
}

type SharedState = Arc<RwLock<Shared>>;

fn read(shared: &SharedState) -> RwLockReadGuard<'_, Shared> {
    shared.read().unwrap_or_else(|e| e.into_inner())
}

fn write(shared: &SharedState) -> RwLockWriteGuard<'_, Shared> {
    shared.write().unwrap_or_else(|e| e.into_inner())
}

fn credential_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Cheap, cloneable read handle for status queries.
///
/// Hand clones of this to any number of observers (e.g. an HTTP status
/// endpoint); they never contend with `start`/`stop` and only briefly with
/// the worker.
#[derive(Clone)]
pub struct StatusHandle {
    shared: SharedState,
    credential_env: String,
    oracle_client_available: bool,
    window: usize,
}

impl StatusHandle {
    /// A consistent point-in-time copy of the loop status.
    pub fn snapshot(&self) -> LoopStatus {
        let credential_present = credential_from_env(&self.credential_env).is_some();
        let s = read(&self.shared);
        LoopStatus {
            running: s.running,
            state: s.state,
            interval_secs: s.interval.as_secs_f64(),
            model: s.model.clone(),
            last_command: s.last_command,
            last_reason: s.last_reason.clone(),
            last_error: s.last_error.clone(),
            decisions: s.log.recent(self.window),
            oracle_client_available: self.oracle_client_available,
            credential_present,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Autopilot
// ─────────────────────────────────────────────────────────────────────────────

struct Worker {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

/// Owner of the decision loop.
///
/// Holds at most one worker at a time.  Dropping the autopilot signals the
/// worker to exit but does not command a stop; call [`stop`][Self::stop]
/// for that.
pub struct Autopilot {
    config: AutopilotConfig,
    connector: Option<Arc<dyn OracleConnector>>,
    shared: SharedState,
    worker: Option<Worker>,
    /// Sink of the most recent run, used for the safety stop.
    sink: Option<Arc<dyn CommandSink>>,
}

impl Autopilot {
    /// Build an idle autopilot.  `connector` is `None` when no oracle client
    /// is available; [`start`][Self::start] will then refuse to run.
    pub fn new(config: AutopilotConfig, connector: Option<Arc<dyn OracleConnector>>) -> Self {
        let shared = Shared {
            run_id: 0,
            running: false,
            state: LoopState::Stopped,
            interval: INITIAL_INTERVAL,
            model: config.default_model.clone(),
            last_command: None,
            last_reason: None,
            last_error: None,
            log: DecisionLog::new(config.decision_capacity),
        };
        Self {
            config,
            connector,
            shared: Arc::new(RwLock::new(shared)),
            worker: None,
            sink: None,
        }
    }

    pub fn config(&self) -> &AutopilotConfig {
        &self.config
    }

    /// A read handle that outlives borrows of `self`.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            shared: Arc::clone(&self.shared),
            credential_env: self.config.credential_env.clone(),
            oracle_client_available: self.connector.is_some(),
            window: self.config.status_window,
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> LoopStatus {
        self.status_handle().snapshot()
    }

    /// `true` while a worker task is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Start the loop.  Must be called from within a Tokio runtime.
    ///
    /// `interval_secs` is clamped to [`AutopilotConfig::min_interval`]; an
    /// empty `model` keeps the current model (initially
    /// [`AutopilotConfig::default_model`]).
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Configuration`] when no oracle client is
    /// available, the credential is missing, the oracle session cannot be
    /// created, or a worker is already running.  The loop does not start in
    /// any of these cases.
    pub fn start(
        &mut self,
        frames: Arc<dyn FrameSource>,
        sink: Arc<dyn CommandSink>,
        interval_secs: f64,
        model: &str,
    ) -> Result<(), RoverError> {
        if self.is_running() {
            return Err(RoverError::Configuration(
                "autopilot is already running".to_string(),
            ));
        }
        // Reap a worker that exited on its own.
        self.worker = None;

        let connector = self.connector.as_ref().ok_or_else(|| {
            RoverError::Configuration("oracle client is not available".to_string())
        })?;
        let credential = credential_from_env(&self.config.credential_env).ok_or_else(|| {
            RoverError::Configuration(format!(
                "{} environment variable not set",
                self.config.credential_env
            ))
        })?;

        let model = match model.trim() {
            "" => read(&self.shared).model.clone(),
            m => m.to_string(),
        };
        let interval = clamp_interval(interval_secs, self.config.min_interval);

        let oracle = connector.connect(&credential, &model).map_err(|e| {
            RoverError::Configuration(format!("oracle client init failed: {e}"))
        })?;

        let run_id = {
            let mut s = write(&self.shared);
            s.run_id += 1;
            s.state = LoopState::Starting;
            s.interval = interval;
            s.model = model.clone();
            s.last_error = None;
            s.log = DecisionLog::new(self.config.decision_capacity);
            s.run_id
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let runner = CycleRunner {
            run_id,
            oracle,
            frames,
            sink: Arc::clone(&sink),
            shared: Arc::clone(&self.shared),
            interval,
            frame_retry_delay: self.config.frame_retry_delay,
        };

        {
            let mut s = write(&self.shared);
            s.running = true;
            s.state = LoopState::Running;
        }
        let handle = tokio::spawn(runner.run(stop_rx));
        self.worker = Some(Worker { handle, stop_tx });
        self.sink = Some(sink);

        info!(
            model = %model,
            interval_secs = interval.as_secs_f64(),
            "autopilot started"
        );
        Ok(())
    }

    /// Stop the loop and command the drive base to halt.
    ///
    /// Waits up to [`AutopilotConfig::join_timeout`] for the worker; if it is
    /// still busy after that it is aborted and shutdown proceeds anyway.  The
    /// final [`Command::Stop`] is best-effort: a sink failure is logged and
    /// swallowed.  Ends in [`LoopState::Stopped`] in every case.
    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            write(&self.shared).state = LoopState::Stopping;
            let _ = worker.stop_tx.send(true);

            let mut handle = worker.handle;
            match tokio::time::timeout(self.config.join_timeout, &mut handle).await {
                Ok(Ok(())) => debug!("autopilot worker exited"),
                Ok(Err(e)) => warn!(error = %e, "autopilot worker ended abnormally"),
                Err(_) => {
                    warn!(
                        timeout_secs = self.config.join_timeout.as_secs_f64(),
                        "autopilot worker did not exit in time; abandoning it"
                    );
                    handle.abort();
                }
            }
        }

        {
            let mut s = write(&self.shared);
            s.running = false;
            s.state = LoopState::Stopped;
        }

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.send(Command::Stop).await {
                warn!(error = %e, "safety stop command failed");
            }
        }
        info!("autopilot stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the worker owns for one run.
struct CycleRunner {
    run_id: u64,
    oracle: Arc<dyn VisionOracle>,
    frames: Arc<dyn FrameSource>,
    sink: Arc<dyn CommandSink>,
    shared: SharedState,
    interval: Duration,
    frame_retry_delay: Duration,
}

/// Marks the run stopped when the worker future ends, however it ends.
struct ExitGuard {
    shared: SharedState,
    run_id: u64,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut s = write(&self.shared);
        if s.run_id == self.run_id {
            s.running = false;
            s.state = LoopState::Stopped;
        }
    }
}

/// Resolves once a stop is requested or the owner is gone.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Sleep for `duration`; returns `true` if a stop arrived first.
async fn pause(duration: Duration, rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = stop_requested(rx) => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

impl CycleRunner {
    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        let _guard = ExitGuard {
            shared: Arc::clone(&self.shared),
            run_id: self.run_id,
        };
        let mut cycle: u64 = 0;

        loop {
            if *stop_rx.borrow() {
                break;
            }

            let Some(frame) = self.frames.capture().await.filter(|f| !f.is_empty()) else {
                let failure = self.fail(CycleFailure::FrameUnavailable);
                debug!(error = %failure, "no frame; retrying");
                if pause(self.frame_retry_delay, &mut stop_rx).await {
                    break;
                }
                continue;
            };

            cycle += 1;
            let span = info_span!("autopilot_cycle", run = self.run_id, cycle);

            let reply = tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break,
                reply = self.oracle.decide(&frame, SYSTEM_PROMPT).instrument(span.clone()) => reply,
            };

            match self.conclude(reply).instrument(span).await {
                Ok(decision) => info!(
                    cycle,
                    command = %decision.tag.as_str(),
                    reason = %decision.reason,
                    "command dispatched"
                ),
                Err(failure) => warn!(cycle, error = %failure, "decision cycle failed"),
            }

            if pause(self.interval, &mut stop_rx).await {
                break;
            }
        }
        debug!(run = self.run_id, cycles = cycle, "autopilot worker exiting");
    }

    /// Interpret an oracle reply, record it, and dispatch.
    async fn conclude(&self, reply: Result<String, OracleError>) -> CycleOutcome {
        let raw = match reply {
            Ok(raw) => raw,
            Err(e) => {
                return Err(self.fail(CycleFailure::OracleCall(excerpt(
                    &e.to_string(),
                    ERROR_MESSAGE_CHARS,
                ))));
            }
        };
        debug!(raw = %raw, "oracle reply");

        let Some(hit) = interpret(&raw) else {
            return Err(self.fail(CycleFailure::Interpretation(excerpt(
                raw.trim(),
                PARSE_ERROR_EXCERPT_CHARS,
            ))));
        };

        let decision = Decision::command(hit.command, hit.reason.clone());
        {
            let mut s = write(&self.shared);
            s.last_command = Some(hit.command);
            s.last_reason = Some(hit.reason);
            s.last_error = None;
            s.log.record(decision.clone());
        }

        match self.sink.send(hit.command).await {
            Ok(()) => Ok(decision),
            Err(e) => Err(self.fail(CycleFailure::Dispatch(excerpt(
                &e.to_string(),
                ERROR_MESSAGE_CHARS,
            )))),
        }
    }

    /// Record `failure` in status (and the log, where applicable).
    fn fail(&self, failure: CycleFailure) -> CycleFailure {
        let message = failure.to_string();
        let mut s = write(&self.shared);
        if failure.logs_decision() {
            s.log.record(Decision::error(message.clone()));
        }
        s.last_error = Some(message);
        failure
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
