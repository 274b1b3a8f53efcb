//! Hardware backends for the thermal core.
//!
//! The simulated plant and remote board run anywhere and back the CLI's
//! `simulate` and `autotune` commands. Real heater pins on a Raspberry Pi are
//! available behind the `hardware` feature.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod plant;
pub mod remote;

pub use error::HwError;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::GpioHeaters;
pub use plant::{ADC_MAX, Probe, SimulatedPlant, Zone};
pub use remote::SimulatedRemote;
