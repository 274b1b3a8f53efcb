//! The periodic tick: sampling phase machine plus soft PWM on one timer.
use std::sync::Arc;

use thermal_traits::{AnalogInput, HeaterOutputs};

use crate::channel::MAX_CHANNELS;
use crate::pwm::SoftPwm;
use crate::sampling::{PASSES_PER_WINDOW, PHASES, Phase, SLOTS, SamplingScheduler};
use crate::state::{self, Shared};

/// Ticks in one sampling window.
pub const TICKS_PER_WINDOW: usize = PHASES * PASSES_PER_WINDOW as usize;

/// Owns the analog front end and the heater outputs. Call [`TickHandler::tick`]
/// from the timer callback (or a [`crate::timer::TimerTask`] on a host).
pub struct TickHandler {
    adc: Box<dyn AnalogInput + Send>,
    outputs: Box<dyn HeaterOutputs + Send>,
    sampler: SamplingScheduler,
    pwm: SoftPwm,
    shared: Arc<Shared>,
    ticks: u64,
}

impl core::fmt::Debug for TickHandler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TickHandler")
            .field("phase", &self.sampler.phase())
            .field("pwm_counter", &self.pwm.counter())
            .field("ticks", &self.ticks)
            .finish()
    }
}

impl TickHandler {
    pub(crate) fn new(
        adc: Box<dyn AnalogInput + Send>,
        outputs: Box<dyn HeaterOutputs + Send>,
        sampler: SamplingScheduler,
        pwm: SoftPwm,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            adc,
            outputs,
            sampler,
            pwm,
            shared,
            ticks: 0,
        }
    }

    pub fn tick(&mut self) {
        if let Some(window) = self.sampler.tick(self.adc.as_mut()) {
            state::publish(&self.shared, &window);
        }
        let (duty, heat_enable) = state::load_outputs(&self.shared);
        self.pwm.tick(&duty, heat_enable, self.outputs.as_mut());
        self.ticks = self.ticks.wrapping_add(1);
    }

    /// Run ticks until the next window has been published.
    pub fn run_window(&mut self) {
        loop {
            let before = self.sampler.passes();
            let phase = self.sampler.phase();
            self.tick();
            if before + 1 == PASSES_PER_WINDOW && phase == Phase::Read(SLOTS - 1) {
                break;
            }
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn output_levels(&self) -> [bool; MAX_CHANNELS] {
        self.pwm.levels()
    }
}
