//! Test and helper mocks for ears_core
//!
//! Both mocks are cheap clones over shared state so a test can keep one
//! handle and give the other to the state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ears_traits::{Drive, EncoderLevel, HalError, MotorDriver};

/// Motor that records every drive request and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingMotor {
    log: Arc<Mutex<Vec<Drive>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingMotor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drives(&self) -> Vec<Drive> {
        self.log.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn last(&self) -> Drive {
        self.drives().last().copied().unwrap_or_default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl MotorDriver for RecordingMotor {
    fn drive(&mut self, drive: Drive) -> Result<(), HalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Box::new(std::io::Error::other("motor line stuck")));
        }
        self.log
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(drive);
        Ok(())
    }
}

/// Encoder whose level is set by hand. Starts low (inside a hole).
#[derive(Debug, Clone, Default)]
pub struct FixedEncoder {
    high: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
}

impl FixedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_high(&self, high: bool) {
        self.high.store(high, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl EncoderLevel for FixedEncoder {
    fn is_high(&self) -> Result<bool, HalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Box::new(std::io::Error::other("encoder unreadable")));
        }
        Ok(self.high.load(Ordering::SeqCst))
    }
}
