//! Test and helper mocks for thermal_core.
use std::sync::{Arc, Mutex};

use thermal_traits::{AnalogInput, HeaterOutputs};

/// Number of analog inputs / heater outputs the mocks track.
pub const MOCK_PINS: usize = 8;

/// Analog front end returning a settable 10-bit value per input.
/// Clones share the values.
#[derive(Debug, Clone, Default)]
pub struct SharedAdc {
    values: Arc<Mutex<[u16; MOCK_PINS]>>,
}

impl SharedAdc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, input: u8, value: u16) {
        if let Ok(mut v) = self.values.lock() {
            if let Some(slot) = v.get_mut(usize::from(input)) {
                *slot = value;
            }
        }
    }
}

impl AnalogInput for SharedAdc {
    fn start_conversion(&mut self, _input: u8) {}

    fn read_conversion(&mut self, input: u8) -> u16 {
        self.values
            .lock()
            .ok()
            .and_then(|v| v.get(usize::from(input)).copied())
            .unwrap_or(0)
    }
}

/// Heater outputs that remember the current level and count rising edges.
/// Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct PinLog {
    inner: Arc<Mutex<([bool; MOCK_PINS], [u32; MOCK_PINS])>>,
}

impl PinLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self, pin: u8) -> bool {
        self.inner
            .lock()
            .ok()
            .and_then(|g| g.0.get(usize::from(pin)).copied())
            .unwrap_or(false)
    }

    pub fn rising_edges(&self, pin: u8) -> u32 {
        self.inner
            .lock()
            .ok()
            .and_then(|g| g.1.get(usize::from(pin)).copied())
            .unwrap_or(0)
    }
}

impl HeaterOutputs for PinLog {
    fn set(&mut self, pin: u8, on: bool) {
        if let Ok(mut g) = self.inner.lock() {
            let i = usize::from(pin);
            if i >= MOCK_PINS {
                return;
            }
            if on && !g.0[i] {
                g.1[i] += 1;
            }
            g.0[i] = on;
        }
    }
}
