//! Maps `Box<dyn Error>` from trait boundaries to typed `EarError`.
//!
//! The traits in `ears_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `ears_hardware::HwError` downcasting.

use crate::error::EarError;

/// Map a trait-boundary error to a typed `EarError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> EarError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<ears_hardware::error::HwError>() {
            return match hw {
                ears_hardware::error::HwError::Io(io) => EarError::Hardware(io.to_string()),
                other => EarError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        EarError::Timeout
    } else {
        EarError::Hardware(s)
    }
}
