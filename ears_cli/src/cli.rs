//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use ears_core::{Command, Side};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "ears", version, about = "Ear controller CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/ears.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EarArg {
    Left,
    Right,
}

impl From<EarArg> for Side {
    fn from(arg: EarArg) -> Self {
        match arg {
            EarArg::Left => Side::Left,
            EarArg::Right => Side::Right,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Calibrate one ear, then run commands against it
    Exec {
        /// Which ear to drive
        #[arg(long, value_enum, default_value = "left")]
        ear: EarArg,
        /// Give up on calibration, a move or a reading after this many ms
        #[arg(long, value_name = "MS", default_value_t = 30_000)]
        timeout_ms: u64,
        /// Commands in text form, e.g. `? ! +3 -2 >5 <0 .`
        #[arg(
            required = true,
            num_args = 1..,
            allow_hyphen_values = true,
            value_name = "CMD",
            long_help = "Commands in text form, run in order once the ear is calibrated.\n\n  .    no-op (waits until the ear is idle)\n  ?    report the position, -1 if unknown\n  !    report the position, detecting it first if unknown\n  +N   move N holes forward\n  -N   move N holes backward\n  >P   go to position P turning forward\n  <P   go to position P turning backward"
        )]
        commands: Vec<Command>,
    },
    /// Quick health check: calibrate both ears and report pass/fail
    SelfCheck,
    /// Calibrate both ears and print their full status
    Health,
}
