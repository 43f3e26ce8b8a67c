//! Runtime configuration for one ear controller.
//!
//! Separate from the TOML-deserialized config in `ears_config`; see
//! `conversions` for the bridge.

use std::time::Duration;

use crate::error::BuildError;
use crate::position::NUM_HOLES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarConfig {
    /// Longest tolerated silence between encoder edges while moving.
    pub watchdog_timeout: Duration,
    /// Raw hole index reported as position 0.
    pub reference_hole: u8,
    /// A calibration boundary above this is suspicious (motor too slow).
    pub slow_boundary: Duration,
}

impl Default for EarConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout: Duration::from_millis(4000),
            reference_hole: 0,
            slow_boundary: Duration::from_millis(1000),
        }
    }
}

impl EarConfig {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.watchdog_timeout.is_zero() {
            return Err(BuildError::InvalidConfig("watchdog_timeout must be > 0"));
        }
        if self.reference_hole >= NUM_HOLES {
            return Err(BuildError::InvalidConfig("reference_hole must be < 17"));
        }
        if self.slow_boundary.is_zero() {
            return Err(BuildError::InvalidConfig("slow_boundary must be > 0"));
        }
        Ok(())
    }
}
