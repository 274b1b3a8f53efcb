//! Runtime configuration for the thermal core.
//!
//! These are separate from the TOML-deserialized config in `thermal_config`;
//! see `conversions` for the mapping.

use crate::pid::PidParams;

/// Timer tick configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingCfg {
    /// Period of the timer tick in microseconds. One window takes 128 ticks.
    pub tick_us: u32,
}

impl Default for SamplingCfg {
    fn default() -> Self {
        Self { tick_us: 1024 }
    }
}

/// PID gains plus the regulator's fixed shaping constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidCfg {
    /// Per-second gains and the integral drive ceiling.
    pub gains: PidParams,
    /// Outside `setpoint +/- band_c` the regulator is bypassed.
    pub band_c: f32,
    /// Derivative smoothing; `0.0` disables filtering.
    pub k1: f32,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            gains: PidParams::default(),
            band_c: 15.0,
            k1: 0.95,
        }
    }
}

/// Safety monitor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyCfg {
    /// Consecutive out-of-range windows before a channel latches.
    pub debounce: u8,
    /// Check interval applied to the bed when its channel sets none.
    pub bed_check_interval_ms: u64,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            debounce: 3,
            bed_check_interval_ms: 5000,
        }
    }
}

/// Relay autotune configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutotuneCfg {
    /// Minimum time between relay flips.
    pub min_half_period_ms: u64,
    /// Cadence of `ok T: @:` progress lines.
    pub progress_interval_ms: u64,
    /// Abort above `target + runaway_margin_c`.
    pub runaway_margin_c: f32,
    /// Abort when no relay flip happens for this long.
    pub timeout_ms: u64,
    /// Keep the relay bias this far from 0 and from full duty.
    pub bias_margin: u8,
    /// Succeed once more than this many cycles completed.
    pub cycles: u32,
}

impl Default for AutotuneCfg {
    fn default() -> Self {
        Self {
            min_half_period_ms: 5000,
            progress_interval_ms: 2000,
            runaway_margin_c: 20.0,
            timeout_ms: 10 * 60 * 1000,
            bias_margin: 20,
            cycles: 5,
        }
    }
}
