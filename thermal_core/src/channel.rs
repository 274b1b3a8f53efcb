//! Channel identity and per-channel runtime record.
use core::fmt;

use crate::conversion::SensorKind;
use crate::pid::PidState;
use crate::safety::RangeGuard;

/// Bed plus three extruders.
pub const MAX_CHANNELS: usize = 4;

/// Largest duty value; `0..=PID_MAX` is the full duty range.
pub const PID_MAX: u8 = 255;

/// Command-surface channel number: bed = 0, extruders = 1..N.
///
/// Also the index into the channel arena and the shared state arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u8);

impl ChannelId {
    pub const BED: Self = Self(0);

    /// Channel for a command-surface number, if it fits the arena.
    pub fn new(n: u8) -> Option<Self> {
        (usize::from(n) < MAX_CHANNELS).then_some(Self(n))
    }

    /// Channel of extruder `n` (0-based).
    pub fn hotend(n: u8) -> Option<Self> {
        n.checked_add(1).and_then(Self::new)
    }

    #[inline]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    #[inline]
    pub fn number(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Bed,
    /// Extruder heater, 0-based.
    Hotend(u8),
}

impl ChannelKind {
    pub fn id(self) -> Option<ChannelId> {
        match self {
            Self::Bed => Some(ChannelId::BED),
            Self::Hotend(n) => ChannelId::hotend(n),
        }
    }

    /// Position in the fixed sampling order {hotend 0, bed, hotend 1, hotend 2}.
    pub fn sampling_slot(self) -> Option<usize> {
        match self {
            Self::Hotend(0) => Some(0),
            Self::Bed => Some(1),
            Self::Hotend(1) => Some(2),
            Self::Hotend(2) => Some(3),
            Self::Hotend(_) => None,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bed => f.write_str("bed"),
            Self::Hotend(n) => write!(f, "extruder {n}"),
        }
    }
}

/// How a channel's duty is produced each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegulationMode {
    #[default]
    Pid,
    /// Full duty below target, off at or above it.
    BangBang,
    /// Regulated by a secondary board; targets are forwarded over `RemoteLink`.
    Remote,
}

/// Static description of one heater channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelCfg {
    pub kind: ChannelKind,
    pub mode: RegulationMode,
    pub sensor: SensorKind,
    /// Analog input number handed to `AnalogInput`.
    pub input: u8,
    /// Output number handed to `HeaterOutputs`.
    pub heater_pin: u8,
    pub min_c: f32,
    pub max_c: f32,
    /// Evaluate range checks (and bang-bang) only this often. Beds default to
    /// `SafetyCfg::bed_check_interval_ms` when unset.
    pub check_interval_ms: Option<u64>,
    /// Immediate, undebounced cut-off.
    pub absolute_max_c: Option<f32>,
}

impl ChannelCfg {
    pub fn hotend(n: u8, sensor: SensorKind, input: u8, heater_pin: u8) -> Self {
        Self {
            kind: ChannelKind::Hotend(n),
            mode: RegulationMode::Pid,
            sensor,
            input,
            heater_pin,
            min_c: 5.0,
            max_c: 275.0,
            check_interval_ms: None,
            absolute_max_c: None,
        }
    }

    pub fn bed(sensor: SensorKind, input: u8, heater_pin: u8) -> Self {
        Self {
            kind: ChannelKind::Bed,
            mode: RegulationMode::BangBang,
            sensor,
            input,
            heater_pin,
            min_c: 5.0,
            max_c: 150.0,
            check_interval_ms: None,
            absolute_max_c: None,
        }
    }

    pub fn with_mode(mut self, mode: RegulationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_range(mut self, min_c: f32, max_c: f32) -> Self {
        self.min_c = min_c;
        self.max_c = max_c;
        self
    }

    pub fn with_check_interval_ms(mut self, ms: u64) -> Self {
        self.check_interval_ms = Some(ms);
        self
    }

    pub fn with_absolute_max(mut self, celsius: f32) -> Self {
        self.absolute_max_c = Some(celsius);
        self
    }

    pub fn is_local(&self) -> bool {
        self.mode != RegulationMode::Remote
    }
}

/// Main-loop side of a channel: everything the tick handler never touches.
#[derive(Debug, Clone)]
pub(crate) struct Channel {
    pub(crate) cfg: ChannelCfg,
    pub(crate) min_raw: u16,
    pub(crate) max_raw: u16,
    pub(crate) current_raw: u16,
    pub(crate) target_raw: u16,
    pub(crate) setpoint_c: f32,
    pub(crate) duty: u8,
    /// Bang-bang decision from the last interval check, before range gating.
    pub(crate) relay: u8,
    pub(crate) guard: RangeGuard,
    pub(crate) pid: PidState,
    pub(crate) check_interval_ms: u64,
    pub(crate) last_check_ms: u64,
}

impl Channel {
    pub(crate) fn new(cfg: ChannelCfg, check_interval_ms: u64, debounce: u8, now_ms: u64) -> Self {
        let mut ch = Self {
            cfg,
            min_raw: 0,
            max_raw: 0,
            current_raw: 0,
            target_raw: 0,
            setpoint_c: 0.0,
            duty: 0,
            relay: 0,
            guard: RangeGuard::new(debounce),
            pid: PidState::default(),
            check_interval_ms,
            last_check_ms: now_ms,
        };
        ch.recompute_bounds();
        ch
    }

    /// Raw bounds follow the sensor model; call after any calibration change.
    pub(crate) fn recompute_bounds(&mut self) {
        self.min_raw = self.cfg.sensor.celsius_to_raw(self.cfg.min_c);
        self.max_raw = self.cfg.sensor.celsius_to_raw(self.cfg.max_c);
        self.target_raw = if self.setpoint_c > 0.0 {
            self.cfg.sensor.celsius_to_raw(self.setpoint_c)
        } else {
            0
        };
    }

    pub(crate) fn set_target(&mut self, celsius: f32) {
        if celsius > 0.0 {
            self.setpoint_c = celsius;
            self.target_raw = self.cfg.sensor.celsius_to_raw(celsius);
        } else {
            self.clear_target();
        }
    }

    pub(crate) fn clear_target(&mut self) {
        self.setpoint_c = 0.0;
        self.target_raw = 0;
        self.relay = 0;
    }

    pub(crate) fn celsius(&self) -> f32 {
        self.cfg.sensor.raw_to_celsius(self.current_raw)
    }

    /// Valid readings lie in `[min_raw, max_raw)`.
    pub(crate) fn in_range(&self) -> bool {
        self.current_raw >= self.min_raw && self.current_raw < self.max_raw
    }

    pub(crate) fn id(&self) -> Option<ChannelId> {
        self.cfg.kind.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_puts_bed_first() {
        assert_eq!(ChannelKind::Bed.id(), Some(ChannelId::BED));
        assert_eq!(ChannelKind::Hotend(0).id().map(ChannelId::number), Some(1));
        assert_eq!(ChannelKind::Hotend(2).id().map(ChannelId::number), Some(3));
        assert_eq!(ChannelKind::Hotend(3).id(), None);
        assert_eq!(ChannelId::new(4), None);
    }

    #[test]
    fn sampling_order_is_hotend0_bed_hotend1_hotend2() {
        let order: Vec<_> = [
            ChannelKind::Hotend(0),
            ChannelKind::Bed,
            ChannelKind::Hotend(1),
            ChannelKind::Hotend(2),
        ]
        .iter()
        .map(|k| k.sampling_slot())
        .collect();
        assert_eq!(order, vec![Some(0), Some(1), Some(2), Some(3)]);
    }
}
