//! `rover` – headless autopilot binary.
//!
//! 1. Loads `~/.rover/config.toml` (writing defaults on first run) and applies
//!    `ROVER_*` overrides.
//! 2. Wires the camera and drive base: a snapshot file and a serial device
//!    when configured, simulated hardware otherwise.
//! 3. Starts the [`Autopilot`] and prints a status line periodically.
//! 4. On **Ctrl-C** stops the loop, which always commands the drive base to
//!    halt, and exits.

mod config;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, warn};

use rover_hal::{ByteLinkSink, CommandSink, FrameSource, SimCamera, SimDriveBase, SnapshotCamera};
use rover_runtime::autopilot::{Autopilot, AutopilotConfig};
use rover_runtime::oracle::GeminiConnector;
use rover_types::{LoopStatus, RoverError};

/// How often the main task checks for Ctrl-C.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

fn main() {
    // Tracing first: the simple OTLP exporter needs no runtime.
    let _telemetry = rover_runtime::telemetry::init_tracing("rover");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the rover …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::resolve() {
        Ok((cfg, true)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok((cfg, false)) => {
            match config::save(&config::Config::default()) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(drive(cfg, shutdown)) {
        println!("{} {}", "✗".red().bold(), e);
        std::process::exit(1);
    }
    println!("{}", "  ✓ Rover stopped.".green());
}

/// Run the autopilot until `shutdown` is raised or the worker exits.
async fn drive(cfg: config::Config, shutdown: Arc<AtomicBool>) -> Result<(), RoverError> {
    let frames: Arc<dyn FrameSource> = match &cfg.snapshot_path {
        Some(path) => {
            let camera = SnapshotCamera::new(path);
            println!(
                "  Camera:     snapshot {}",
                camera.path().display().to_string().bold()
            );
            Arc::new(camera)
        }
        None => {
            println!("  Camera:     {}", "simulated".yellow());
            Arc::new(SimCamera::blank())
        }
    };

    let sink: Arc<dyn CommandSink> = match &cfg.serial_device {
        Some(device) => {
            let link = ByteLinkSink::new("drive_base");
            link.open_device(device)?;
            println!(
                "  Drive base: serial {} ({})",
                device.display().to_string().bold(),
                link.id()
            );
            Arc::new(link)
        }
        None => {
            println!("  Drive base: {}", "simulated".yellow());
            Arc::new(SimDriveBase::new())
        }
    };

    let autopilot_config = AutopilotConfig {
        credential_env: cfg.credential_env.clone(),
        default_model: cfg.model.clone(),
        ..AutopilotConfig::default()
    };
    let connector = Arc::new(GeminiConnector::new(cfg.oracle_url.clone()));
    let mut pilot = Autopilot::new(autopilot_config, Some(connector));

    pilot.start(frames, sink, cfg.interval_secs, &cfg.model)?;
    let status = pilot.status();
    println!(
        "  Autopilot:  {} (model {}, every {:.1}s)\n",
        "running".green().bold(),
        status.model.bold(),
        status.interval_secs
    );

    let status_every = Duration::from_secs(cfg.status_every_secs.max(1));
    let mut ticker = tokio::time::interval(SHUTDOWN_POLL);
    let mut since_status = Duration::ZERO;

    while !shutdown.load(Ordering::SeqCst) {
        ticker.tick().await;
        if !pilot.is_running() {
            warn!("autopilot worker exited unexpectedly");
            break;
        }
        since_status += SHUTDOWN_POLL;
        if since_status >= status_every {
            since_status = Duration::ZERO;
            println!("{}", status_line(&pilot.status()));
        }
    }

    println!(
        "  Stopping (waiting up to {:.0}s for the current cycle) …",
        pilot.config().join_timeout.as_secs_f64()
    );
    pilot.stop().await;
    println!("{}", status_line(&pilot.status()));
    Ok(())
}

/// One-line, colored summary of a status snapshot.
fn status_line(status: &LoopStatus) -> String {
    let state = if status.running {
        "RUNNING".green().bold()
    } else {
        "STOPPED".red().bold()
    };
    let command = status
        .last_command
        .map(|c| c.as_str().cyan().bold().to_string())
        .unwrap_or_else(|| "-".dimmed().to_string());
    let reason = status.last_reason.as_deref().unwrap_or("");
    let mut line = format!(
        "  [{}] cmd={} decisions={} {}",
        state,
        command,
        status.decisions.len(),
        reason.dimmed()
    );
    if let Some(err) = &status.last_error {
        line.push_str(&format!(" {}", format!("error: {err}").red()));
    }
    line
}

fn print_banner() {
    println!();
    println!("{}", r#"   ________  _   _____ ____ "#.bold().cyan());
    println!("{}", r#"  / ___/ _ \| | / / _ / __/"#.bold().cyan());
    println!("{}", r#" / /  / (_) | |/ /  __/ /   "#.bold().cyan());
    println!("{}", r#"/_/   \___/|___/\___/_/    "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Rover".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Vision-guided autopilot");
    println!();
}
