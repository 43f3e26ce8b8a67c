use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EarError {
    #[error("ear is broken")]
    Broken,
    #[error("ear is busy ({0})")]
    Busy(&'static str),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timed out waiting for the ear")]
    Timeout,
}

/// Why an ear ended up `Broken` (or, for the watchdog outside calibration,
/// why it gave up on its position).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    #[error("calibration gap is not distinguishable from ordinary holes")]
    CalibrationAmbiguous,
    #[error("backward validation step disagrees with forward calibration")]
    DirectionMismatch,
    #[error("no encoder edge before the watchdog expired")]
    WatchdogTimeout,
    #[error("motor or encoder hardware fault")]
    Hardware,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing motor driver")]
    MissingMotor,
    #[error("missing encoder")]
    MissingEncoder,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
