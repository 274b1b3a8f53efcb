#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Heater control core (hardware-agnostic).
//!
//! This crate keeps printer heaters at their target temperatures and shuts
//! them off when a reading leaves its safe range. All hardware interactions
//! go through `thermal_traits::AnalogInput`, `HeaterOutputs` and `RemoteLink`.
//!
//! ## Architecture
//!
//! - **Tick side** (`isr`): an 8-phase sampling scheduler (`sampling`) sums 16
//!   conversions per channel into one window, and a 128-step software PWM
//!   (`pwm`) drives the heater pins.
//! - **Main-loop side** (`controller`): consumes each window, runs the range
//!   monitor (`safety`), regulates with PID or bang-bang (`pid`) and publishes
//!   duty values back to the tick side.
//! - **Shared state** (`state`): the only data both sides touch, guarded by a
//!   `critical_section::Mutex`.
//! - **Autotune** (`autotune`): relay-feedback tuning that reports
//!   Ziegler-Nichols gains.
//! - **Conversion** (`conversion`): runtime-adjustable thermistor model and
//!   linear sensors, both mapping to a common raw scale where hotter is higher.
//!
//! Build a system with [`ThermalSystem::builder`], then run the tick handler
//! on a timer (see `runner`) and call [`ThermalController::manage`] from the
//! main loop.

pub mod autotune;
pub mod builder;
pub mod channel;
pub mod config;
pub mod controller;
pub mod conversion;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod isr;
pub mod mocks;
pub mod notify;
pub mod pid;
pub mod pwm;
pub mod runner;
pub mod safety;
pub mod sampling;
pub mod state;
pub mod status;
pub mod timer;
pub mod util;

pub use autotune::{AutotuneResult, AutotuneStatus, Autotuner, CycleReport};
pub use builder::{ThermalSystem, ThermalSystemBuilder};
pub use channel::{ChannelCfg, ChannelId, ChannelKind, MAX_CHANNELS, PID_MAX, RegulationMode};
pub use config::{AutotuneCfg, PidCfg, SafetyCfg, SamplingCfg};
pub use controller::ThermalController;
pub use conversion::{FULL_SCALE, SensorKind, ThermistorModel};
pub use error::{AutotuneError, BuildError, Report, Result, ThermalError};
pub use isr::TickHandler;
pub use notify::{CollectingNotifier, Notification, Notifier, TracingNotifier};
pub use pid::{PidParams, PidRegulator, PidState};
pub use status::ChannelStatus;
pub use timer::TimerTask;
