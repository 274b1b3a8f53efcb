//! Hardware seams for the thermal-control core.
//!
//! The core never touches registers or pins directly: sensors are read through
//! [`AnalogInput`], heater pins are driven through [`HeaterOutputs`], channels
//! hosted on a secondary board go through [`RemoteLink`], and all time comes
//! from a [`Clock`].
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Analog front end, driven from the periodic tick.
///
/// A conversion is started on one tick and collected on the next, so neither
/// call may block.
pub trait AnalogInput {
    /// Route `input` to the converter and start a conversion.
    fn start_conversion(&mut self, input: u8);
    /// Result of the conversion last started on `input`, in 10-bit counts.
    fn read_conversion(&mut self, input: u8) -> u16;
}

/// One digital output per heater.
pub trait HeaterOutputs {
    fn set(&mut self, pin: u8, on: bool);
}

/// Link to a secondary board that regulates its own heater channels.
///
/// `channel` is the command-surface number (bed = 0, extruders = 1..N).
pub trait RemoteLink {
    fn set_target(
        &mut self,
        channel: u8,
        celsius: f32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn target(&mut self, channel: u8) -> Result<f32, Box<dyn std::error::Error + Send + Sync>>;
    fn celsius(&mut self, channel: u8) -> Result<f32, Box<dyn std::error::Error + Send + Sync>>;
    /// Replace the remote thermistor constants `(beta, series_ohms, r_inf)`.
    fn set_thermistor(
        &mut self,
        channel: u8,
        beta: f32,
        series_ohms: f32,
        r_inf: f32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn thermistor(
        &mut self,
        channel: u8,
    ) -> Result<(f32, f32, f32), Box<dyn std::error::Error + Send + Sync>>;
}
