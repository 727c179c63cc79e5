//! Operator console: one command per stdin line.
//!
//! `e` sets the e-stop flag directly so it never queues behind other input.
//! Everything else that concerns the supervisor travels over its command
//! channel; simulator controls act on the sim handles straight away.

use colored::Colorize;
use minisafe_hal::{SimAttitudeSensor, SimDistanceSensor, SimTiltCommand};
use minisafe_runtime::{CancelFlag, OperatorCommand};
use minisafe_types::Direction;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub const HELP_TEXT: &str = "\
Controls:
  e = EMERGENCY STOP      o = toggle override      q = quit
While overridden:
  w = forward  s = backward  a = left  d = right  x = stop
Simulation:
  tp / tm = pitch +/-5 deg   rp / rm = roll +/-5 deg   r0 = level
  dist <cm> = set simulated obstacle distance        ? = this help";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    EStop,
    Operator(OperatorCommand),
    Tilt(SimTiltCommand),
    SetDistance(f32),
    Help,
    Empty,
    Unknown(String),
}

/// Parse a single line.  Matching is case-insensitive.
pub fn parse_line(line: &str) -> ConsoleInput {
    let cmd = line.trim().to_ascii_lowercase();
    let mut parts = cmd.split_whitespace();
    let Some(head) = parts.next() else {
        return ConsoleInput::Empty;
    };

    if head == "dist" {
        return match (parts.next().map(str::parse::<f32>), parts.next()) {
            (Some(Ok(cm)), None) => ConsoleInput::SetDistance(cm),
            _ => ConsoleInput::Unknown(cmd),
        };
    }
    if parts.next().is_some() {
        return ConsoleInput::Unknown(cmd);
    }
    if let Some(tilt) = SimTiltCommand::parse(head) {
        return ConsoleInput::Tilt(tilt);
    }
    match head {
        "e" => ConsoleInput::EStop,
        "o" => ConsoleInput::Operator(OperatorCommand::ToggleOverride),
        "q" => ConsoleInput::Operator(OperatorCommand::Quit),
        "w" => ConsoleInput::Operator(OperatorCommand::Step(Direction::Forward)),
        "s" => ConsoleInput::Operator(OperatorCommand::Step(Direction::Backward)),
        "a" => ConsoleInput::Operator(OperatorCommand::Step(Direction::Left)),
        "d" => ConsoleInput::Operator(OperatorCommand::Step(Direction::Right)),
        "x" => ConsoleInput::Operator(OperatorCommand::Stop),
        "?" | "h" | "help" => ConsoleInput::Help,
        _ => ConsoleInput::Unknown(cmd),
    }
}

/// Everything the console can act on.
#[derive(Clone)]
pub struct Console {
    pub cancel: CancelFlag,
    pub commands: mpsc::Sender<OperatorCommand>,
    pub distance: SimDistanceSensor,
    pub attitude: SimAttitudeSensor,
}

impl Console {
    /// Read lines until EOF, quit, or e-stop.
    pub async fn listen<R>(self, reader: R)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("console input closed");
                    break;
                }
                Err(e) => {
                    info!(error = %e, "console read failed");
                    break;
                }
            };
            if !self.handle(parse_line(&line)).await {
                break;
            }
        }
    }

    /// Act on one input.  Returns `false` when the console should stop.
    pub async fn handle(&self, input: ConsoleInput) -> bool {
        match input {
            ConsoleInput::EStop => {
                println!("{}", "  ⛔ EMERGENCY STOP".red().bold());
                self.cancel.trigger();
                false
            }
            ConsoleInput::Operator(cmd) => {
                let quit = cmd == OperatorCommand::Quit;
                if self.commands.send(cmd).await.is_err() {
                    debug!("supervisor gone; console stopping");
                    return false;
                }
                !quit
            }
            ConsoleInput::Tilt(cmd) => {
                let (pitch, roll) = self.attitude.adjust(cmd);
                println!(
                    "  {} pitch={:+.1}° roll={:+.1}°",
                    "[SIM]".dimmed(),
                    pitch,
                    roll
                );
                true
            }
            ConsoleInput::SetDistance(cm) => {
                self.distance.set_distance(cm);
                println!("  {} obstacle at {:.1} cm", "[SIM]".dimmed(), cm);
                true
            }
            ConsoleInput::Help => {
                println!("{HELP_TEXT}");
                true
            }
            ConsoleInput::Empty => true,
            ConsoleInput::Unknown(cmd) => {
                println!(
                    "  {} '{}'. Type {} for help.",
                    "Unknown command".yellow(),
                    cmd,
                    "?".bold()
                );
                true
            }
        }
    }
}
