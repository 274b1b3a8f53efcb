//! Maps `Box<dyn Error>` from trait boundaries to typed `ThermalError`.
//!
//! `RemoteLink` returns `Box<dyn Error + Send + Sync>`; this module converts
//! those to the typed enum, with an optional feature-gated path for
//! `thermal_hardware::HwError` downcasting.

use crate::error::ThermalError;

/// Map a trait-boundary error to a typed `ThermalError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ThermalError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<thermal_hardware::error::HwError>() {
            return match hw {
                thermal_hardware::error::HwError::LinkTimeout => ThermalError::Timeout,
                thermal_hardware::error::HwError::Link(msg) => ThermalError::Remote(msg.clone()),
                other => ThermalError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ThermalError::Timeout
    } else {
        ThermalError::Hardware(s)
    }
}
