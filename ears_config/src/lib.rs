#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the ear controllers.
//!
//! `Config` and its sections are deserialized from TOML and validated before
//! anything touches the hardware.
use serde::Deserialize;

/// Number of holes on the encoder disc; bounds `reference_hole`.
pub const DISC_HOLES: u8 = 17;

/// GPIO lines for one ear.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct EarPins {
    /// Encoder input (falling edge per hole)
    pub encoder: u8,
    /// H-bridge line that turns the ear forward
    pub motor_forward: u8,
    /// H-bridge line that turns the ear backward
    pub motor_backward: u8,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Timing {
    /// Max time without an encoder edge while motion is expected
    pub watchdog_ms: u64,
    /// Calibration boundaries above this are logged as an abnormally slow ear
    pub slow_boundary_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            watchdog_ms: 4000,
            slow_boundary_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Raw hole index (0 = first hole after the gap, turning forward)
    /// reported as position 0.
    pub reference_hole: u8,
}

/// Parameters of the simulated backend; ignored on real hardware.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SimCfg {
    /// Duration of one angle unit in microseconds
    pub unit_us: u64,
    /// Units between two ordinary holes
    pub pitch: u32,
    /// Units across the gap
    pub gap: u32,
    /// Units of encoder-low per hole
    pub hole: u32,
    /// Units the disc coasts after the motor stops
    pub overrun: u32,
    pub start_hole_left: u8,
    pub start_hole_right: u8,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            unit_us: 1000,
            pitch: 200,
            gap: 750,
            hole: 70,
            overrun: 0,
            start_hole_left: 0,
            start_hole_right: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub left: EarPins,
    pub right: EarPins,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub sim: SimCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        let pins = [
            ("left.encoder", self.left.encoder),
            ("left.motor_forward", self.left.motor_forward),
            ("left.motor_backward", self.left.motor_backward),
            ("right.encoder", self.right.encoder),
            ("right.motor_forward", self.right.motor_forward),
            ("right.motor_backward", self.right.motor_backward),
        ];
        for (i, (name_a, pin_a)) in pins.iter().enumerate() {
            if let Some((name_b, _)) = pins[i + 1..].iter().find(|(_, pin_b)| pin_b == pin_a) {
                eyre::bail!("pin {pin_a} is assigned to both {name_a} and {name_b}");
            }
        }

        // Timing
        if self.timing.watchdog_ms < 100 {
            eyre::bail!("timing.watchdog_ms must be >= 100");
        }
        if self.timing.watchdog_ms > 60_000 {
            eyre::bail!("timing.watchdog_ms is unreasonably large (>60s)");
        }
        if self.timing.slow_boundary_ms == 0 {
            eyre::bail!("timing.slow_boundary_ms must be >= 1");
        }

        // Calibration
        if self.calibration.reference_hole >= DISC_HOLES {
            eyre::bail!("calibration.reference_hole must be in [0, {DISC_HOLES})");
        }

        // Sim
        if self.sim.unit_us == 0 {
            eyre::bail!("sim.unit_us must be >= 1");
        }
        if self.sim.hole == 0 || self.sim.hole >= self.sim.pitch {
            eyre::bail!("sim.hole must be in [1, sim.pitch)");
        }
        if self.sim.gap <= self.sim.pitch {
            eyre::bail!("sim.gap must be larger than sim.pitch");
        }
        if self.sim.start_hole_left >= DISC_HOLES || self.sim.start_hole_right >= DISC_HOLES {
            eyre::bail!("sim.start_hole_* must be in [0, {DISC_HOLES})");
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rotation}");
        }

        Ok(())
    }
}
