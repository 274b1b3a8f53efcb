//! Heater pins on a Raspberry Pi header.
use rppal::gpio::{Gpio, OutputPin};
use thermal_traits::HeaterOutputs;

use crate::error::{HwError, Result};

/// One output per heater, all driven low on creation and on drop.
pub struct GpioHeaters {
    pins: Vec<(u8, OutputPin)>,
}

impl GpioHeaters {
    pub fn new(pins: &[u8]) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut out = Vec::with_capacity(pins.len());
        for &pin in pins {
            let p = gpio
                .get(pin)
                .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))?
                .into_output_low();
            out.push((pin, p));
        }
        tracing::info!(?pins, "gpio heater outputs ready");
        Ok(Self { pins: out })
    }
}

impl HeaterOutputs for GpioHeaters {
    fn set(&mut self, pin: u8, on: bool) {
        if let Some((_, p)) = self.pins.iter_mut().find(|(n, _)| *n == pin) {
            if on {
                p.set_high();
            } else {
                p.set_low();
            }
        }
    }
}

impl Drop for GpioHeaters {
    fn drop(&mut self) {
        for (_, p) in &mut self.pins {
            p.set_low();
        }
    }
}
