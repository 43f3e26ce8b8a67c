#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Ear controller core (hardware-agnostic).
//!
//! Each ear is a DC motor turning a disc with 17 holes, one of them followed
//! by a wider gap, in front of a single encoder line. All hardware access goes
//! through `ears_traits::MotorDriver` and `ears_traits::EncoderLevel`.
//!
//! ## Architecture
//!
//! - **Position**: modular arithmetic over the 17 holes (`position` module)
//! - **Calibration**: gap/hole timing boundary from one revolution (`calibration`)
//! - **State machine**: testing, detecting, idle, running, broken (`machine`, `state`)
//! - **Watchdog**: edge deadline and its timer thread (`watchdog`)
//! - **Mailbox**: the single pending reading (`mailbox`)
//! - **Commands**: opcodes and byte framing (`command`)
//! - **Ear**: thread-safe handle with blocking read/write (`ear`)

use std::fmt;
use std::str::FromStr;

pub mod calibration;
pub mod command;
pub mod config;
pub mod conversions;
pub mod ear;
pub mod error;
pub mod hw_error;
pub mod machine;
pub mod mailbox;
pub mod mocks;
pub mod position;
pub mod state;
pub mod watchdog;

pub use calibration::{CalibrationBoundary, CalibrationError};
pub use command::{Command, CommandFramer, Decoded, ParseCommandError};
pub use config::EarConfig;
pub use ear::{Ear, EarBuilder, EdgeSink, Readiness};
pub use error::{BuildError, EarError, FaultKind, Report, Result};
pub use machine::{EarMachine, EarSnapshot, Wake};
pub use mailbox::{Mailbox, Reading};
pub use position::{Direction, HoleMap, NUM_HOLES, Position};
pub use state::ActuatorState;

/// Which ear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    pub fn name(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Side {
    type Err = EarError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Side::Left),
            "right" | "r" => Ok(Side::Right),
            other => Err(EarError::Config(format!("unknown ear {other:?}"))),
        }
    }
}

#[cfg(test)]
mod side_tests {
    use super::*;

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("Left".parse::<Side>().unwrap(), Side::Left);
        assert_eq!("r".parse::<Side>().unwrap(), Side::Right);
        assert!("middle".parse::<Side>().is_err());
        assert_eq!(Side::Right.to_string(), "right");
    }
}
