#![allow(dead_code)]
//! Test rig: a built system on mock hardware with a manual clock.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thermal_core::mocks::{PinLog, SharedAdc};
use thermal_core::{
    ChannelCfg, ChannelId, CollectingNotifier, FULL_SCALE, SensorKind, ThermalController,
    ThermalSystem, TickHandler,
};
use thermal_traits::ManualClock;

pub const HOT_INPUT: u8 = 0;
pub const HOT_PIN: u8 = 4;
pub const BED_INPUT: u8 = 1;
pub const BED_PIN: u8 = 3;
/// Every conversion at full scale: an open thermistor.
pub const OPEN_CIRCUIT: u16 = 1023;

/// Per-conversion ADC counts that make a thermistor channel read `celsius`.
pub fn counts_for(sensor: &SensorKind, celsius: f32) -> u16 {
    let sum = FULL_SCALE - sensor.celsius_to_raw(celsius);
    (f32::from(sum) / 16.0).round() as u16
}

pub struct Rig {
    pub adc: SharedAdc,
    pub pins: PinLog,
    pub notes: CollectingNotifier,
    pub clock: ManualClock,
    pub tick: TickHandler,
    pub ctl: ThermalController,
}

impl Rig {
    pub fn new(channels: &[ChannelCfg]) -> Self {
        Self::with_stop(channels, None)
    }

    pub fn with_stop(channels: &[ChannelCfg], stop: Option<Arc<AtomicBool>>) -> Self {
        let adc = SharedAdc::new();
        let pins = PinLog::new();
        let notes = CollectingNotifier::new();
        let clock = ManualClock::new();
        let mut b = ThermalSystem::builder()
            .with_analog_input(adc.clone())
            .with_heater_outputs(pins.clone())
            .with_notifier(notes.clone())
            .with_clock(Box::new(clock.clone()));
        if let Some(flag) = stop {
            b = b.with_stop_check(move || flag.load(Ordering::SeqCst));
        }
        let mut b = b.with_channel(channels[0]);
        for c in &channels[1..] {
            b = b.with_channel(*c);
        }
        let (tick, ctl) = b.build().expect("build").into_parts();
        Self {
            adc,
            pins,
            notes,
            clock,
            tick,
            ctl,
        }
    }

    pub fn read(&self, input: u8, celsius: f32) {
        self.adc.set(input, counts_for(&SensorKind::default(), celsius));
    }

    pub fn window(&mut self, advance_ms: u64) {
        self.clock.advance_ms(advance_ms);
        self.tick.run_window();
        assert!(self.ctl.manage(), "a window should be ready");
    }
}

pub fn hotend() -> ChannelCfg {
    ChannelCfg::hotend(0, SensorKind::default(), HOT_INPUT, HOT_PIN)
}

pub fn bed() -> ChannelCfg {
    ChannelCfg::bed(SensorKind::default(), BED_INPUT, BED_PIN)
}

pub fn hot_id() -> ChannelId {
    ChannelId::hotend(0).expect("hotend 0")
}
