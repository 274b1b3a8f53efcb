//! Oversampling phase machine driven from the periodic tick.
//!
//! Every tick either starts a conversion or collects one, walking the fixed
//! slot order {hotend 0, bed, hotend 1, hotend 2}. Unused slots still take
//! their two ticks so the window length never depends on the channel set.
//! After [`PASSES_PER_WINDOW`] passes the accumulators are turned into one
//! averaged raw reading per channel.
use thermal_traits::AnalogInput;

use crate::channel::{ChannelId, MAX_CHANNELS};
use crate::conversion::FULL_SCALE;

pub const SLOTS: usize = 4;
pub const PHASES: usize = 2 * SLOTS;
pub const PASSES_PER_WINDOW: u8 = 16;
/// Largest single 10-bit conversion.
pub const ADC_MAX: u16 = 1023;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare(usize),
    Read(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartConversion(usize),
    Collect(usize),
}

/// Result of one pure phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub next: Phase,
    pub action: Action,
    /// Set on the transition that completes a pass over all slots.
    pub wrapped: bool,
}

/// Pure transition function of the sampling phase machine.
pub const fn advance(phase: Phase) -> Step {
    match phase {
        Phase::Prepare(slot) => Step {
            next: Phase::Read(slot),
            action: Action::StartConversion(slot),
            wrapped: false,
        },
        Phase::Read(slot) if slot + 1 < SLOTS => Step {
            next: Phase::Prepare(slot + 1),
            action: Action::Collect(slot),
            wrapped: false,
        },
        Phase::Read(slot) => Step {
            next: Phase::Prepare(0),
            action: Action::Collect(slot),
            wrapped: true,
        },
    }
}

/// Binds a sampling slot to a channel's analog input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBinding {
    pub channel: ChannelId,
    pub input: u8,
    /// Publish `FULL_SCALE - sum` (thermistor dividers) instead of the sum.
    pub inverted: bool,
}

/// Raw averages of one completed window, indexed by channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    pub raw: [Option<u16>; MAX_CHANNELS],
}

#[derive(Debug, Clone)]
pub struct SamplingScheduler {
    phase: Phase,
    passes: u8,
    slots: [Option<SlotBinding>; SLOTS],
    accum: [u32; SLOTS],
}

impl SamplingScheduler {
    pub fn new(slots: [Option<SlotBinding>; SLOTS]) -> Self {
        Self {
            phase: Phase::Prepare(0),
            passes: 0,
            slots,
            accum: [0; SLOTS],
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn passes(&self) -> u8 {
        self.passes
    }

    /// Advance one phase. Returns the finished window on the tick that
    /// completes it.
    pub fn tick(&mut self, adc: &mut dyn AnalogInput) -> Option<Window> {
        let step = advance(self.phase);
        match step.action {
            Action::StartConversion(slot) => {
                if let Some(b) = self.slots[slot] {
                    adc.start_conversion(b.input);
                }
            }
            Action::Collect(slot) => {
                if let Some(b) = self.slots[slot] {
                    let sample = adc.read_conversion(b.input).min(ADC_MAX);
                    self.accum[slot] = self.accum[slot].saturating_add(u32::from(sample));
                }
            }
        }
        self.phase = step.next;

        if !step.wrapped {
            return None;
        }
        self.passes += 1;
        if self.passes < PASSES_PER_WINDOW {
            return None;
        }
        self.passes = 0;
        Some(self.finish_window())
    }

    fn finish_window(&mut self) -> Window {
        let mut window = Window::default();
        for (binding, acc) in self.slots.iter().zip(self.accum.iter_mut()) {
            let sum = u16::try_from(*acc).unwrap_or(FULL_SCALE).min(FULL_SCALE);
            *acc = 0;
            if let Some(b) = binding {
                let raw = if b.inverted { FULL_SCALE - sum } else { sum };
                window.raw[b.channel.index()] = Some(raw);
            }
        }
        tracing::trace!(raw = ?window.raw, "sampling window complete");
        window
    }
}
