//! `ears`: calibrate and drive the two ears from the command line.

mod cli;
mod error_fmt;
mod exec;
mod rig;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use ears_config::Config;
use ears_core::Side;
use eyre::{Result, WrapErr};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

/// Upper bound for start-up calibration in self-check and health.
const CALIBRATION_TIMEOUT: Duration = Duration::from_secs(60);

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    match run(cli) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&err));
            } else {
                eprintln!("{}", humanize(&err));
            }
            tracing::error!(error = %format!("{err:#}"), "command failed");
            std::process::exit(exit_code_for_error(&err));
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&text).wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Console logs go to stderr (stdout carries results); the optional file
/// sink always writes JSON lines.
fn init_tracing(cli: &Cli, cfg: &Config) -> Result<()> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let console = if cli.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };

    let file = match cfg.logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file {} has no file name", path.display()))?;
            let appender = match cfg.logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let level = cfg.logging.level.as_deref().unwrap_or("info");
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(EnvFilter::new(level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}

fn run(cli: Cli) -> Result<i32> {
    let cfg = load_config(&cli.config)?;
    init_tracing(&cli, &cfg)?;
    info!(config = %cli.config.display(), "config loaded");

    let sides: Vec<Side> = match &cli.cmd {
        Commands::Exec { ear, .. } => vec![Side::from(*ear)],
        Commands::SelfCheck | Commands::Health => Side::ALL.to_vec(),
    };
    let rig = rig::start(&cfg, &sides)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let ears_for_ctrlc = rig.ears().to_vec();
    if let Err(e) = ctrlc::set_handler(move || {
        for ear in &ears_for_ctrlc {
            ear.stop();
        }
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; motors will only stop on exit");
    }

    let outcome = match cli.cmd {
        Commands::Exec {
            ear,
            timeout_ms,
            commands,
        } => {
            let side = Side::from(ear);
            let handle = rig
                .ear(side)
                .ok_or_else(|| eyre::eyre!("{side} ear was not started"))?;
            exec::run_exec(
                handle,
                &commands,
                Duration::from_millis(timeout_ms),
                cli.json,
                &shutdown,
            )
            .map(|()| 0)
        }
        Commands::SelfCheck => {
            exec::self_check(rig.ears(), CALIBRATION_TIMEOUT, cli.json, &shutdown).map(|()| 0)
        }
        Commands::Health => exec::health(rig.ears(), CALIBRATION_TIMEOUT, cli.json, &shutdown)
            .map(|ok| if ok { 0 } else { 3 }),
    };
    rig.stop_all();
    outcome
}
