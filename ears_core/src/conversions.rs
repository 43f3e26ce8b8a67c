//! `From` implementations bridging `ears_config` types to `ears_core` types.

use std::time::Duration;

use crate::config::EarConfig;

impl From<&ears_config::Config> for EarConfig {
    fn from(c: &ears_config::Config) -> Self {
        Self {
            watchdog_timeout: Duration::from_millis(c.timing.watchdog_ms),
            reference_hole: c.calibration.reference_hole,
            slow_boundary: Duration::from_millis(c.timing.slow_boundary_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_agree_across_crates() {
        let cfg = ears_config::load_toml(
            "[left]\nencoder = 24\nmotor_forward = 5\nmotor_backward = 6\n\
             [right]\nencoder = 23\nmotor_forward = 12\nmotor_backward = 13\n",
        )
        .unwrap();
        assert_eq!(EarConfig::from(&cfg), EarConfig::default());
    }

    #[test]
    fn timing_and_reference_are_carried_over() {
        let cfg = ears_config::load_toml(
            "[left]\nencoder = 24\nmotor_forward = 5\nmotor_backward = 6\n\
             [right]\nencoder = 23\nmotor_forward = 12\nmotor_backward = 13\n\
             [timing]\nwatchdog_ms = 250\n[calibration]\nreference_hole = 4\n",
        )
        .unwrap();
        let ear = EarConfig::from(&cfg);
        assert_eq!(ear.watchdog_timeout, Duration::from_millis(250));
        assert_eq!(ear.reference_hole, 4);
    }
}
