use std::sync::{Arc, Mutex};
use std::time::Instant;

use ears_traits::{Drive, EncoderLevel, HalError, MotorDriver};
use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use tracing::{debug, trace};

use crate::error::{HwError, Result};

fn gpio() -> Result<Gpio> {
    Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))
}

/// Two-wire H-bridge driven by a pair of GPIO outputs.
pub struct HardwareMotor {
    forward: OutputPin,
    backward: OutputPin,
}

impl HardwareMotor {
    pub fn new(forward_pin: u8, backward_pin: u8) -> Result<Self> {
        let gpio = gpio()?;
        let mut forward = gpio
            .get(forward_pin)
            .map_err(|e| HwError::Gpio(format!("open motor pin {forward_pin}: {e}")))?
            .into_output();
        let mut backward = gpio
            .get(backward_pin)
            .map_err(|e| HwError::Gpio(format!("open motor pin {backward_pin}: {e}")))?
            .into_output();
        forward.set_low();
        backward.set_low();
        Ok(Self { forward, backward })
    }
}

impl MotorDriver for HardwareMotor {
    fn drive(&mut self, drive: Drive) -> std::result::Result<(), HalError> {
        // Release both lines before asserting one so they never overlap.
        self.forward.set_low();
        self.backward.set_low();
        if drive.forward_line() {
            self.forward.set_high();
        }
        if drive.backward_line() {
            self.backward.set_high();
        }
        trace!(?drive, "motor drive");
        Ok(())
    }
}

impl Drop for HardwareMotor {
    fn drop(&mut self) {
        self.forward.set_low();
        self.backward.set_low();
    }
}

/// Encoder input line, shared between level reads and the edge interrupt.
#[derive(Clone)]
pub struct HardwareEncoder {
    pin_no: u8,
    pin: Arc<Mutex<InputPin>>,
}

impl HardwareEncoder {
    pub fn new(pin_no: u8) -> Result<Self> {
        let pin = gpio()?
            .get(pin_no)
            .map_err(|e| HwError::Gpio(format!("open encoder pin {pin_no}: {e}")))?
            .into_input();
        Ok(Self {
            pin_no,
            pin: Arc::new(Mutex::new(pin)),
        })
    }

    /// Deliver a timestamp for every falling edge on the encoder line.
    ///
    /// The callback runs on rppal's interrupt thread.
    pub fn on_falling_edge<F>(&self, mut on_edge: F) -> Result<()>
    where
        F: FnMut(Instant) + Send + 'static,
    {
        let mut pin = self
            .pin
            .lock()
            .map_err(|_| HwError::Gpio("encoder pin lock poisoned".into()))?;
        pin.set_async_interrupt(Trigger::FallingEdge, move |_level: Level| {
            on_edge(Instant::now());
        })
        .map_err(|e| HwError::Interrupt {
            pin: self.pin_no,
            reason: e.to_string(),
        })?;
        debug!(pin = self.pin_no, "encoder interrupt armed");
        Ok(())
    }
}

impl EncoderLevel for HardwareEncoder {
    fn is_high(&self) -> std::result::Result<bool, HalError> {
        let pin = self
            .pin
            .lock()
            .map_err(|_| HwError::Gpio("encoder pin lock poisoned".into()))?;
        Ok(pin.is_high())
    }
}
