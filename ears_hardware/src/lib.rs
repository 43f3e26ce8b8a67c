//! Hardware backends for the ear controllers.
//!
//! The simulated backend is always available and is what tests and the
//! default CLI build use. Real GPIO (rppal) sits behind the `hardware`
//! feature on Linux.
pub mod error;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

pub use sim::{DiscGeometry, SimDisc, SimEncoder, SimMotor, SimRunner};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::{HardwareEncoder, HardwareMotor};
