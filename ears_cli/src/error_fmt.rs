//! Human-readable error descriptions and structured JSON error formatting.

use ears_core::error::{BuildError, EarError, FaultKind};

use crate::exec::Interrupted;

/// The whole chain on one line, outermost context first.
fn chain_text(err: &eyre::Report) -> String {
    err.chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

fn find_ear_error(err: &eyre::Report) -> Option<&EarError> {
    err.chain().find_map(|e| e.downcast_ref::<EarError>())
}

fn fault_text(fault: FaultKind) -> &'static str {
    match fault {
        FaultKind::CalibrationAmbiguous => {
            "Likely causes: The gap after the last hole could not be told apart from ordinary holes (dirty or misaligned disc, motor speed varying a lot over one turn).\nHow to fix: Clean the disc and check the sensor alignment, then restart."
        }
        FaultKind::DirectionMismatch => {
            "Likely causes: The backward check step after calibration landed on the wrong hole (slipping disc or a missed edge).\nHow to fix: Check that the disc is tight on the shaft, then restart."
        }
        FaultKind::WatchdogTimeout => {
            "Likely causes: The ear did not turn during calibration (jammed, unpowered motor, or disconnected encoder).\nHow to fix: Free the ear, check motor power and the encoder wiring, then restart."
        }
        FaultKind::Hardware => {
            "Likely causes: A motor or encoder line could not be driven or read.\nHow to fix: Check the GPIO pins in the config and the process permissions, then restart."
        }
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingMotor => {
                "What happened: No motor driver was provided for the ear.\nLikely causes: Motor pins failed to initialize or were not wired into the builder.\nHow to fix: Ensure the motor is created successfully and passed via with_motor(...).".to_string()
            }
            BuildError::MissingEncoder => {
                "What happened: No encoder was provided for the ear.\nLikely causes: The encoder pin failed to initialize or was not wired into the builder.\nHow to fix: Ensure the encoder is created successfully and passed via with_encoder(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/ears.toml for a sample."
            ),
        };
    }

    if err.chain().any(|e| e.downcast_ref::<Interrupted>().is_some()) {
        return "What happened: Interrupted by Ctrl-C.\nHow to fix: Nothing to fix; the motors were stopped.".to_string();
    }

    if let Some(ee) = find_ear_error(err) {
        return match ee {
            EarError::Broken => {
                let what = err.to_string();
                let hint = fault_in(err).map_or(
                    "Likely causes: Calibration failed or the hardware reported an error.\nHow to fix: Re-run with --log-level=debug to see the transitions, then restart.",
                    fault_text,
                );
                format!("What happened: The ear is broken ({what}).\n{hint}")
            }
            EarError::Timeout => {
                "What happened: Timed out waiting for the ear.\nLikely causes: A move or a calibration took longer than --timeout-ms, or the sim is configured very slow.\nHow to fix: Increase --timeout-ms or check that the ear turns freely.".to_string()
            }
            EarError::Busy(state) => format!(
                "What happened: The ear was busy ({state}).\nLikely causes: A command arrived while the ear was still moving.\nHow to fix: Wait for the previous command to finish."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(te) = err.chain().find_map(|e| e.downcast_ref::<toml::de::Error>()) {
        return format!(
            "What happened: The config file is not valid TOML for this program ({}).\nLikely causes: A typo, a missing [left]/[right] section, or a value of the wrong type.\nHow to fix: Compare the file with etc/ears.toml and try again.",
            te.message()
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = chain_text(err).to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: Could not read the config file ({msg}).\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config with the path to a readable TOML file."
        );
    }

    if lower.contains("open motor pins") || lower.contains("open encoder pin") || lower.contains("gpio") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [left]/[right] pins in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("invalid config") || lower.contains("must be") || lower.contains("assigned to both") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range values or a pin used twice.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Error: {msg}"
    )
}

/// The broken ear's fault, recovered from the wrap_err context.
fn fault_in(err: &eyre::Report) -> Option<FaultKind> {
    let text = chain_text(err);
    [
        FaultKind::CalibrationAmbiguous,
        FaultKind::DirectionMismatch,
        FaultKind::WatchdogTimeout,
        FaultKind::Hardware,
    ]
    .into_iter()
    .find(|f| text.contains(&f.to_string()))
}

/// Stable exit codes: broken ear 3, timeout 4, Ctrl-C 130, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.chain().any(|e| e.downcast_ref::<Interrupted>().is_some()) {
        return 130;
    }
    match find_ear_error(err) {
        Some(EarError::Broken) => 3,
        Some(EarError::Timeout) => 4,
        _ => 1,
    }
}

/// Stable reason name for JSON output.
fn reason_name(err: &eyre::Report) -> &'static str {
    if err.chain().any(|e| e.downcast_ref::<Interrupted>().is_some()) {
        return "Interrupted";
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match find_ear_error(err) {
        Some(EarError::Broken) => "Broken",
        Some(EarError::Timeout) => "Timeout",
        Some(EarError::Busy(_)) => "Busy",
        Some(EarError::Hardware(_) | EarError::HardwareFault(_)) => "Hardware",
        Some(EarError::Config(_)) => "Config",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = reason_name(err);
    match fault_in(err) {
        Some(fault) if reason == "Broken" => json!({
            "reason": reason,
            "details": { "fault": fault.to_string() },
            "message": humanize(err),
        })
        .to_string(),
        _ => json!({ "reason": reason, "message": humanize(err) }).to_string(),
    }
}
