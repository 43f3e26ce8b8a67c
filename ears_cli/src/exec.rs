//! Subcommand bodies: running commands against an ear, self-check and health.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ears_core::{Command, EarError, EarSnapshot, Position, Reading};
use eyre::{Result, WrapErr};
use serde_json::json;

use crate::rig::EarHandle;

/// Slice used when waiting, so Ctrl-C is noticed promptly.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Raised when Ctrl-C interrupts a wait.
#[derive(Debug, Clone, Copy)]
pub struct Interrupted;

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("interrupted")
    }
}

impl std::error::Error for Interrupted {}

fn position_text(position: Option<Position>) -> String {
    position.map_or_else(|| "-1".to_string(), |p| p.to_string())
}

fn position_json(position: Option<Position>) -> serde_json::Value {
    position.map_or(json!(-1), |p| json!(p.get()))
}

/// Wait until the ear is idle or broken, in slices so a shutdown request
/// can cut the wait short.
pub fn wait_settled(ear: &dyn EarHandle, timeout: Duration, shutdown: &AtomicBool) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Err(Interrupted.into());
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(EarError::Timeout.into());
        }
        match ear.wait_settled_timeout(left.min(WAIT_SLICE)) {
            Ok(()) => return Ok(()),
            Err(EarError::Timeout) => {}
            Err(e) => return Err(e.into()),
        }
    }
}

fn read_reading(ear: &dyn EarHandle, timeout: Duration, shutdown: &AtomicBool) -> Result<Reading> {
    let deadline = Instant::now() + timeout;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Err(Interrupted.into());
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(EarError::Timeout.into());
        }
        match ear.read_timeout(left.min(WAIT_SLICE)) {
            Ok(Some(reading)) => return Ok(reading),
            // End of stream: the ear broke while we were waiting.
            Ok(None) => return Err(broken_error(ear)),
            Err(EarError::Timeout) => {}
            Err(e) => return Err(e.into()),
        }
    }
}

/// `Broken`, with the recorded cause attached when there is one.
fn broken_error(ear: &dyn EarHandle) -> eyre::Report {
    let snap = ear.snapshot();
    let report = eyre::Report::new(EarError::Broken);
    match (snap.fault, ear.last_error()) {
        (Some(fault), _) => report.wrap_err(format!("{} ear: {fault}", ear.side())),
        (None, Some(err)) => report.wrap_err(format!("{} ear: {err}", ear.side())),
        (None, None) => report.wrap_err(format!("{} ear", ear.side())),
    }
}

/// Wait for start-up calibration, failing if the ear came out broken.
fn calibrated(ear: &dyn EarHandle, timeout: Duration, shutdown: &AtomicBool) -> Result<EarSnapshot> {
    wait_settled(ear, timeout, shutdown)
        .wrap_err_with(|| format!("calibrating {} ear", ear.side()))?;
    let snap = ear.snapshot();
    if snap.state == "broken" {
        return Err(broken_error(ear));
    }
    tracing::info!(
        side = %ear.side(),
        position = %position_text(snap.position),
        boundary = ?snap.boundary,
        "calibrated"
    );
    Ok(snap)
}

/// Outcome of one command, printed as a text or JSON line.
struct Outcome {
    command: Command,
    reading: Option<Reading>,
    position: Option<Position>,
    state: &'static str,
}

impl Outcome {
    fn render(&self, side: ears_core::Side, json_mode: bool) -> String {
        if json_mode {
            let reading = self.reading.map(|r| match r {
                Reading::Position(p) => position_json(p),
                Reading::Moved => json!("moved"),
            });
            json!({
                "ear": side.name(),
                "command": self.command.to_string(),
                "reading": reading,
                "position": position_json(self.position),
                "state": self.state,
            })
            .to_string()
        } else {
            match self.reading {
                Some(r) => format!("{side} {}: {r}", self.command),
                None => format!(
                    "{side} {}: at {} ({})",
                    self.command,
                    position_text(self.position),
                    self.state
                ),
            }
        }
    }
}

/// Calibrate, then run `commands` in order on one ear.
pub fn run_exec(
    ear: &Arc<dyn EarHandle>,
    commands: &[Command],
    timeout: Duration,
    json_mode: bool,
    shutdown: &AtomicBool,
) -> Result<()> {
    let ear = ear.as_ref();
    calibrated(ear, timeout, shutdown)?;
    for &command in commands {
        tracing::debug!(side = %ear.side(), %command, "submit");
        ear.submit_timeout(command, timeout)
            .map_err(|e| match e {
                EarError::Broken => broken_error(ear),
                other => other.into(),
            })
            .wrap_err_with(|| format!("running {command}"))?;

        let reading = if matches!(command, Command::Query | Command::QueryOrDetect) {
            let reading = read_reading(ear, timeout, shutdown)
                .wrap_err_with(|| format!("reading after {command}"))?;
            Some(reading)
        } else {
            None
        };
        wait_settled(ear, timeout, shutdown).wrap_err_with(|| format!("running {command}"))?;

        let snap = ear.snapshot();
        if snap.state == "broken" {
            return Err(broken_error(ear)).wrap_err_with(|| format!("running {command}"));
        }
        let outcome = Outcome {
            command,
            reading,
            position: snap.position,
            state: snap.state,
        };
        println!("{}", outcome.render(ear.side(), json_mode));
    }
    Ok(())
}

/// Calibrate every ear; fail with the first broken one.
pub fn self_check(
    ears: &[Arc<dyn EarHandle>],
    timeout: Duration,
    json_mode: bool,
    shutdown: &AtomicBool,
) -> Result<()> {
    for ear in ears {
        calibrated(ear.as_ref(), timeout, shutdown)?;
    }
    if json_mode {
        println!("{}", json!({ "status": "ok" }));
    } else {
        println!("OK");
    }
    Ok(())
}

fn snapshot_json(ear: &dyn EarHandle, snap: &EarSnapshot) -> serde_json::Value {
    json!({
        "ear": ear.side().name(),
        "state": snap.state,
        "position": position_json(snap.position),
        "boundary_ms": snap.boundary.map(|b| u64::try_from(b.as_millis()).unwrap_or(u64::MAX)),
        "fault": snap.fault.map(|f| f.to_string()),
        "last_error": ear.last_error().map(|e| e.to_string()),
        "edges": snap.edges,
    })
}

/// Calibrate every ear and print its status. Broken ears are reported, not
/// raised; the caller turns `false` into a failing exit code.
pub fn health(
    ears: &[Arc<dyn EarHandle>],
    timeout: Duration,
    json_mode: bool,
    shutdown: &AtomicBool,
) -> Result<bool> {
    let mut all_ok = true;
    let mut reports = Vec::with_capacity(ears.len());
    for ear in ears {
        let ear = ear.as_ref();
        wait_settled(ear, timeout, shutdown)?;
        let snap = ear.snapshot();
        all_ok &= snap.state != "broken";
        reports.push(snapshot_json(ear, &snap));
    }
    if json_mode {
        println!(
            "{}",
            json!({ "status": if all_ok { "ok" } else { "degraded" }, "ears": reports })
        );
    } else {
        for r in &reports {
            println!(
                "{}: {} position={} boundary_ms={} fault={}",
                r["ear"].as_str().unwrap_or("?"),
                r["state"].as_str().unwrap_or("?"),
                r["position"],
                r["boundary_ms"],
                r["fault"].as_str().unwrap_or("none"),
            );
        }
    }
    Ok(all_ok)
}
