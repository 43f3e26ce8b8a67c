pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Boxed error used at every hardware trait boundary.
pub type HalError = Box<dyn std::error::Error + Send + Sync>;

/// Requested state of the two-wire H-bridge.
///
/// The enum makes it impossible to assert both lines at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Drive {
    #[default]
    Stop,
    Forward,
    Backward,
}

impl Drive {
    /// Level of the "forward" motor line for this drive.
    #[inline]
    pub fn forward_line(self) -> bool {
        matches!(self, Drive::Forward)
    }

    /// Level of the "backward" motor line for this drive.
    #[inline]
    pub fn backward_line(self) -> bool {
        matches!(self, Drive::Backward)
    }
}

pub trait MotorDriver {
    fn drive(&mut self, drive: Drive) -> Result<(), HalError>;

    fn stop(&mut self) -> Result<(), HalError> {
        self.drive(Drive::Stop)
    }
}

/// Instantaneous level of the encoder input.
///
/// High means the disc is between two holes; a falling edge marks a hole.
pub trait EncoderLevel {
    fn is_high(&self) -> Result<bool, HalError>;
}
