use thiserror::Error;

use crate::channel::ChannelId;

#[derive(Debug, Error, Clone)]
pub enum ThermalError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("remote link error: {0}")]
    Remote(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for remote board")]
    Timeout,
    #[error("no such channel: {0}")]
    InvalidChannel(ChannelId),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing analog input")]
    MissingAnalogInput,
    #[error("missing heater outputs")]
    MissingHeaterOutputs,
    #[error("no channels configured")]
    MissingChannels,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Why an autotune session ended without gains.
///
/// None of these touch the live PID parameters.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum AutotuneError {
    #[error("temperature too high: {celsius:.1} C exceeds the {limit:.1} C abort limit")]
    Runaway { celsius: f32, limit: f32 },
    #[error("timeout: no relay cycle completed within {minutes} minutes")]
    Timeout { minutes: u64 },
    #[error("channel {0} cannot be tuned (remote, missing or fault-latched)")]
    ChannelUnavailable(ChannelId),
    #[error("no oscillation observed (temperature amplitude is zero)")]
    NoOscillation,
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
