//! First-order thermal plant behind a simulated ADC and heater pins.
//!
//! Each zone couples one analog input to one heater pin. While the pin is
//! high the zone gains `heat_rate` degrees per second; it always loses
//! `loss` of its excess over ambient per second. Clones share the plant, so
//! one clone can be handed to the tick side as both `AnalogInput` and
//! `HeaterOutputs` while another is stepped and inspected.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thermal_traits::{AnalogInput, HeaterOutputs};

use crate::error::{HwError, Result};

/// Largest 10-bit conversion result.
pub const ADC_MAX: u16 = 1023;
/// Full scale of 16 summed conversions.
const WINDOW_FULL_SCALE: f64 = 16383.0;
const SAMPLES_PER_WINDOW: f64 = 16.0;
const KELVIN_OFFSET: f64 = 273.15;
const T25_KELVIN: f64 = 298.15;

/// How a zone's temperature shows up at its analog input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Probe {
    /// NTC thermistor at the bottom of a divider with a `series_ohms` pull-up.
    Thermistor {
        beta: f32,
        series_ohms: f32,
        r_inf: f32,
    },
    /// Amplifier output; `celsius = window_sum * gain + offset`.
    Linear { gain: f32, offset: f32 },
}

impl Probe {
    /// Thermistor from its datasheet `(beta, rs, R25)` triple.
    pub fn thermistor(beta: f32, series_ohms: f32, r25: f32) -> Self {
        let r_inf = f64::from(r25) * (-f64::from(beta) / T25_KELVIN).exp();
        Self::Thermistor {
            beta,
            series_ohms,
            r_inf: r_inf as f32,
        }
    }

    /// Conversion result at `celsius`, in 10-bit counts.
    pub fn counts(&self, celsius: f32) -> u16 {
        let sum = match *self {
            Self::Thermistor {
                beta,
                series_ohms,
                r_inf,
            } => {
                let kelvin = f64::from(celsius) + KELVIN_OFFSET;
                if kelvin <= 0.0 {
                    return ADC_MAX;
                }
                let r = f64::from(r_inf) * (f64::from(beta) / kelvin).exp();
                WINDOW_FULL_SCALE * r / (r + f64::from(series_ohms))
            }
            Self::Linear { gain, offset } => f64::from((celsius - offset) / gain),
        };
        if sum.is_nan() {
            return 0;
        }
        (sum / SAMPLES_PER_WINDOW).round().clamp(0.0, f64::from(ADC_MAX)) as u16
    }

    /// Reading of a disconnected probe.
    fn open_circuit(&self) -> u16 {
        match self {
            Self::Thermistor { .. } => ADC_MAX,
            Self::Linear { .. } => 0,
        }
    }
}

impl Default for Probe {
    /// 100k NTC, beta 3960, 4.7k pull-up.
    fn default() -> Self {
        Self::thermistor(3960.0, 4700.0, 100_000.0)
    }
}

/// One heated mass with its sensor and heater.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zone {
    pub input: u8,
    pub heater_pin: u8,
    pub probe: Probe,
    /// Temperature rise per second at full power.
    pub heat_rate: f32,
    /// Fraction of the excess over ambient lost per second.
    pub loss: f32,
}

impl Zone {
    /// A small hotend block: fast to heat, settles near 290 C at full power.
    pub fn hotend(input: u8, heater_pin: u8, probe: Probe) -> Self {
        Self {
            input,
            heater_pin,
            probe,
            heat_rate: 4.0,
            loss: 0.015,
        }
    }

    /// A heated bed: slow, settles near 140 C at full power.
    pub fn bed(input: u8, heater_pin: u8, probe: Probe) -> Self {
        Self {
            input,
            heater_pin,
            probe,
            heat_rate: 0.6,
            loss: 0.005,
        }
    }
}

#[derive(Debug)]
struct ZoneState {
    zone: Zone,
    celsius: f32,
    heater_on: bool,
    open: bool,
    on_time: Duration,
}

#[derive(Debug)]
struct PlantState {
    ambient_c: f32,
    zones: Vec<ZoneState>,
    elapsed: Duration,
}

/// Simulated board: analog inputs and heater pins over a set of zones.
#[derive(Debug, Clone)]
pub struct SimulatedPlant {
    inner: Arc<Mutex<PlantState>>,
}

impl SimulatedPlant {
    pub fn new(ambient_c: f32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlantState {
                ambient_c,
                zones: Vec::new(),
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// Add a zone at ambient temperature. Inputs and pins may not be shared.
    pub fn add_zone(&self, zone: Zone) -> Result<()> {
        let mut s = self.lock()?;
        if s.zones.iter().any(|z| z.zone.input == zone.input) {
            return Err(HwError::Gpio(format!("analog input {} already in use", zone.input)));
        }
        if s.zones.iter().any(|z| z.zone.heater_pin == zone.heater_pin) {
            return Err(HwError::Gpio(format!("heater pin {} already in use", zone.heater_pin)));
        }
        let celsius = s.ambient_c;
        s.zones.push(ZoneState {
            zone,
            celsius,
            heater_on: false,
            open: false,
            on_time: Duration::ZERO,
        });
        tracing::debug!(input = zone.input, pin = zone.heater_pin, "plant zone added");
        Ok(())
    }

    /// Integrate every zone over `dt` with the current heater levels.
    pub fn advance(&self, dt: Duration) {
        let Ok(mut s) = self.inner.lock() else {
            return;
        };
        let secs = dt.as_secs_f32();
        let ambient = s.ambient_c;
        for z in &mut s.zones {
            let gain = if z.heater_on { z.zone.heat_rate } else { 0.0 };
            z.celsius += (gain - (z.celsius - ambient) * z.zone.loss) * secs;
            if z.heater_on {
                z.on_time += dt;
            }
        }
        s.elapsed += dt;
    }

    pub fn celsius(&self, input: u8) -> Option<f32> {
        self.with_zone(input, |z| z.celsius)
    }

    pub fn set_celsius(&self, input: u8, celsius: f32) -> Result<()> {
        self.with_zone_mut(input, |z| z.celsius = celsius)
    }

    /// Disconnect (or reconnect) the probe on `input`.
    pub fn set_open(&self, input: u8, open: bool) -> Result<()> {
        self.with_zone_mut(input, |z| z.open = open)
    }

    pub fn heater_on(&self, pin: u8) -> bool {
        self.inner
            .lock()
            .ok()
            .and_then(|s| s.zones.iter().find(|z| z.zone.heater_pin == pin).map(|z| z.heater_on))
            .unwrap_or(false)
    }

    /// Share of the simulated time the heater on `input`'s zone has been on.
    pub fn duty(&self, input: u8) -> Option<f32> {
        let s = self.inner.lock().ok()?;
        let elapsed = s.elapsed.as_secs_f32();
        let z = s.zones.iter().find(|z| z.zone.input == input)?;
        Some(if elapsed > 0.0 {
            z.on_time.as_secs_f32() / elapsed
        } else {
            0.0
        })
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.lock().map(|s| s.elapsed).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PlantState>> {
        self.inner
            .lock()
            .map_err(|_| HwError::Io(std::io::Error::other("plant state poisoned")))
    }

    fn with_zone<T>(&self, input: u8, f: impl FnOnce(&ZoneState) -> T) -> Option<T> {
        let s = self.inner.lock().ok()?;
        s.zones.iter().find(|z| z.zone.input == input).map(f)
    }

    fn with_zone_mut(&self, input: u8, f: impl FnOnce(&mut ZoneState)) -> Result<()> {
        let mut s = self.lock()?;
        let z = s
            .zones
            .iter_mut()
            .find(|z| z.zone.input == input)
            .ok_or_else(|| HwError::Gpio(format!("no zone on analog input {input}")))?;
        f(z);
        Ok(())
    }
}

impl AnalogInput for SimulatedPlant {
    fn start_conversion(&mut self, _input: u8) {}

    fn read_conversion(&mut self, input: u8) -> u16 {
        self.with_zone(input, |z| {
            if z.open {
                z.zone.probe.open_circuit()
            } else {
                z.zone.probe.counts(z.celsius)
            }
        })
        .unwrap_or(0)
    }
}

impl HeaterOutputs for SimulatedPlant {
    fn set(&mut self, pin: u8, on: bool) {
        if let Ok(mut s) = self.inner.lock()
            && let Some(z) = s.zones.iter_mut().find(|z| z.zone.heater_pin == pin)
        {
            z.heater_on = on;
        }
    }
}
