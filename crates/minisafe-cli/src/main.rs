//! `minisafe-cli` – minisafe Command Line Interface
//!
//! Runs the safety supervisor against simulated hardware so the whole stack
//! can be exercised from a terminal.  It:
//!
//! 1. Loads `~/.minisafe/config.toml`, writing the defaults on first run.
//!    An unreadable or invalid configuration is the only startup failure.
//! 2. Wires the simulated actuator, the selected hazard source and the mock
//!    battery into a [`Supervisor`].
//! 3. Reads operator commands from stdin (see [`console`]) and prints every
//!    state change as it happens.
//! 4. Treats **Ctrl-C** as an emergency stop.

mod config;
mod console;

use std::process::ExitCode;
use std::time::Duration;

use colored::Colorize;
use minisafe_hal::{LogAnnouncer, MockBattery, SimActuator, SimAttitudeSensor, SimDistanceSensor};
use minisafe_perception::HazardSource;
use minisafe_runtime::{CancelFlag, HazardSourceKind, Supervisor, SupervisorParts, init_tracing};
use minisafe_types::{SafetyState, TransitionEvent};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, warn};

use crate::config::Config;
use crate::console::Console;

/// Operator commands buffered between the console and the loop.
const COMMAND_CAPACITY: usize = 16;

fn main() -> ExitCode {
    let _tracing = init_tracing("minisafe");
    print_banner();

    let cfg = match load_config() {
        Some(cfg) => cfg,
        None => return ExitCode::FAILURE,
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(run(cfg));
    // The blocking stdin reader never returns on its own.
    runtime.shutdown_timeout(Duration::from_millis(100));
    code
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

fn load_config() -> Option<Config> {
    let path = config::config_path();
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                path.display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                ),
                Err(e) => println!("  {}: {}", "Could not save default config".yellow(), e),
            }
            cfg
        }
        Err(e) => {
            println!("  {}: {}", "Config error".red().bold(), e);
            return None;
        }
    };

    if let Err(e) = cfg.safety.validate() {
        println!("  {}: {}", "Invalid configuration".red().bold(), e);
        return None;
    }
    Some(cfg)
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

async fn run(cfg: Config) -> ExitCode {
    let cancel = CancelFlag::new();

    let ctrlc_flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – emergency stop".yellow().bold());
        ctrlc_flag.trigger();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; use 'e' to stop");
    }

    // ── Simulated hardware ────────────────────────────────────────────────
    let actuator =
        SimActuator::new().with_latency(Duration::from_millis(cfg.sim.actuator_latency_ms));
    let distance = SimDistanceSensor::new(cfg.sim.start_distance_cm);
    let attitude = SimAttitudeSensor::new();
    let battery = MockBattery::new(
        cfg.sim.battery_start_percent,
        cfg.sim.battery_drain_per_poll,
    );

    let hazard: Box<dyn HazardSource> = match cfg.safety.hazard_source {
        HazardSourceKind::Proximity => {
            Box::new(cfg.safety.proximity_source(Box::new(distance.clone())))
        }
        HazardSourceKind::Posture => Box::new(cfg.safety.tilt_source(Box::new(attitude.clone()))),
    };

    let parts = SupervisorParts {
        actuator: Box::new(actuator),
        hazard,
        battery: Some(Box::new(battery)),
        announcer: Box::new(LogAnnouncer),
        cancel: cancel.clone(),
    };
    let mut sup = match Supervisor::new(cfg.safety.clone(), parts) {
        Ok(sup) => sup,
        Err(e) => {
            println!("  {}: {}", "Supervisor error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn(report_transitions(sup.subscribe()));

    // ── Operator console ──────────────────────────────────────────────────
    let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
    let console = Console {
        cancel,
        commands: tx,
        distance,
        attitude,
    };
    tokio::spawn(console.listen(tokio::io::BufReader::new(tokio::io::stdin())));

    println!();
    println!("{}", console::HELP_TEXT);
    println!();

    let final_state = sup.run(rx).await;
    let stats = sup.gateway_stats();

    println!();
    println!(
        "  Session ended in {} ({} sent, {} failed, {} suppressed)",
        paint(final_state),
        stats.dispatched,
        stats.failed,
        stats.suppressed
    );
    ExitCode::SUCCESS
}

async fn report_transitions(mut events: broadcast::Receiver<TransitionEvent>) {
    loop {
        match events.recv().await {
            Ok(ev) => println!(
                "  {} {} → {}  {}",
                ev.timestamp.format("%H:%M:%S").to_string().dimmed(),
                paint(ev.from),
                paint(ev.to),
                format!("({})", ev.cause).dimmed()
            ),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "transition reporter lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn paint(state: SafetyState) -> colored::ColoredString {
    let label = state.to_string();
    match state {
        SafetyState::Normal => label.green().bold(),
        SafetyState::Avoiding => label.yellow().bold(),
        SafetyState::HardStopped => label.red().bold(),
        SafetyState::Overridden => label.cyan().bold(),
        SafetyState::Returning => label.blue().bold(),
        SafetyState::EStopped => label.on_red().white().bold(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", "  minisafe".bold().cyan());
    println!(
        "  {}",
        "safety-supervised motion for small walking robots".dimmed()
    );
    println!();
}
