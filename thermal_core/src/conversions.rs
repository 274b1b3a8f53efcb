//! `From` implementations bridging `thermal_config` types to `thermal_core` types.

use crate::channel::{ChannelCfg, ChannelKind, RegulationMode};
use crate::config::{AutotuneCfg, PidCfg, SafetyCfg, SamplingCfg};
use crate::conversion::{SensorKind, ThermistorModel};
use crate::error::ThermalError;
use crate::pid::PidParams;

// ── SamplingCfg ──────────────────────────────────────────────────────────────

impl From<&thermal_config::SamplingCfg> for SamplingCfg {
    fn from(c: &thermal_config::SamplingCfg) -> Self {
        Self { tick_us: c.tick_us }
    }
}

// ── PidCfg ───────────────────────────────────────────────────────────────────

impl From<&thermal_config::PidCfg> for PidCfg {
    fn from(c: &thermal_config::PidCfg) -> Self {
        Self {
            gains: PidParams {
                kp: c.kp,
                ki: c.ki,
                kd: c.kd,
                ki_max: c.ki_max,
            },
            band_c: c.band_c,
            k1: c.k1,
        }
    }
}

// ── SafetyCfg ────────────────────────────────────────────────────────────────

impl From<&thermal_config::Safety> for SafetyCfg {
    fn from(c: &thermal_config::Safety) -> Self {
        Self {
            debounce: c.debounce,
            bed_check_interval_ms: c.bed_check_interval_ms,
        }
    }
}

// ── AutotuneCfg ──────────────────────────────────────────────────────────────

impl From<&thermal_config::AutotuneCfg> for AutotuneCfg {
    fn from(c: &thermal_config::AutotuneCfg) -> Self {
        Self {
            min_half_period_ms: c.min_half_period_ms,
            progress_interval_ms: c.progress_interval_ms,
            runaway_margin_c: c.runaway_margin_c,
            timeout_ms: c.timeout_ms,
            bias_margin: c.bias_margin,
            cycles: c.cycles,
        }
    }
}

// ── Sensors ──────────────────────────────────────────────────────────────────

impl From<&thermal_config::SensorCfg> for SensorKind {
    fn from(c: &thermal_config::SensorCfg) -> Self {
        match *c {
            thermal_config::SensorCfg::Thermistor {
                beta,
                series_ohms,
                r25,
            } => Self::Thermistor(ThermistorModel::from_reference(beta, series_ohms, r25)),
            thermal_config::SensorCfg::Linear { gain, offset } => Self::Linear { gain, offset },
        }
    }
}

impl From<thermal_config::RegulationMode> for RegulationMode {
    fn from(m: thermal_config::RegulationMode) -> Self {
        match m {
            thermal_config::RegulationMode::Pid => Self::Pid,
            thermal_config::RegulationMode::BangBang => Self::BangBang,
            thermal_config::RegulationMode::Remote => Self::Remote,
        }
    }
}

// ── ChannelCfg ───────────────────────────────────────────────────────────────

impl TryFrom<&thermal_config::ChannelCfg> for ChannelCfg {
    type Error = ThermalError;

    fn try_from(c: &thermal_config::ChannelCfg) -> Result<Self, Self::Error> {
        let kind = match c.kind {
            thermal_config::ChannelKind::Bed => ChannelKind::Bed,
            thermal_config::ChannelKind::Hotend => ChannelKind::Hotend(
                c.index
                    .ok_or_else(|| ThermalError::Config("hotend channel needs an index".into()))?,
            ),
        };
        Ok(Self {
            kind,
            mode: c.mode.into(),
            sensor: SensorKind::from(&c.sensor),
            input: c.input,
            heater_pin: c.heater_pin,
            min_c: c.min_c,
            max_c: c.max_c,
            check_interval_ms: c.check_interval_ms,
            absolute_max_c: c.absolute_max_c,
        })
    }
}

/// Map every configured channel, failing on the first that cannot be expressed.
pub fn channels_from_config(cfg: &thermal_config::Config) -> Result<Vec<ChannelCfg>, ThermalError> {
    cfg.channels.iter().map(ChannelCfg::try_from).collect()
}
