//! Time-sliced heater outputs without hardware PWM.
//!
//! A free-running counter spans [`PWM_PERIOD`] ticks. Duties are latched at
//! counter 0 so they cannot change mid-period; an output is asserted at the
//! start of the period when its latched duty is nonzero and heating is
//! enabled, and released on the first tick where `latched <= counter`.
//! Losing heat-enable or a duty dropping to zero releases the output on the
//! very next tick; outputs only ever rise at counter 0.
use thermal_traits::HeaterOutputs;

use crate::channel::MAX_CHANNELS;

pub const PWM_PERIOD: u8 = 128;

#[derive(Debug, Clone)]
pub struct SoftPwm {
    counter: u8,
    pins: [Option<u8>; MAX_CHANNELS],
    latched: [u8; MAX_CHANNELS],
    level: [bool; MAX_CHANNELS],
}

impl SoftPwm {
    pub fn new(pins: [Option<u8>; MAX_CHANNELS]) -> Self {
        Self {
            counter: 0,
            pins,
            latched: [0; MAX_CHANNELS],
            level: [false; MAX_CHANNELS],
        }
    }

    pub fn counter(&self) -> u8 {
        self.counter
    }

    /// Output levels as last written, indexed by channel number.
    pub fn levels(&self) -> [bool; MAX_CHANNELS] {
        self.level
    }

    /// `duty` is in `0..=PID_MAX`; the period compares `duty >> 1`.
    pub fn tick(
        &mut self,
        duty: &[u8; MAX_CHANNELS],
        heat_enable: bool,
        outputs: &mut dyn HeaterOutputs,
    ) {
        if self.counter == 0 {
            for (i, pin) in self.pins.iter().enumerate() {
                let Some(pin) = *pin else { continue };
                self.latched[i] = duty[i] >> 1;
                let on = heat_enable && self.latched[i] > 0;
                outputs.set(pin, on);
                self.level[i] = on;
            }
        }
        for (i, pin) in self.pins.iter().enumerate() {
            let Some(pin) = *pin else { continue };
            let cut = !heat_enable || duty[i] == 0;
            if self.level[i] && (cut || self.latched[i] <= self.counter) {
                outputs.set(pin, false);
                self.level[i] = false;
            }
        }
        self.counter = (self.counter + 1) % PWM_PERIOD;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Pins {
        on: [bool; 8],
        writes: usize,
    }

    impl HeaterOutputs for Pins {
        fn set(&mut self, pin: u8, on: bool) {
            self.on[usize::from(pin)] = on;
            self.writes += 1;
        }
    }

    fn on_ticks(duty: u8, enable: bool) -> usize {
        let mut pwm = SoftPwm::new([Some(3), None, None, None]);
        let mut pins = Pins::default();
        let mut on = 0;
        for _ in 0..PWM_PERIOD {
            pwm.tick(&[duty, 0, 0, 0], enable, &mut pins);
            if pins.on[3] {
                on += 1;
            }
        }
        on
    }

    #[test]
    fn on_time_tracks_duty() {
        assert_eq!(on_ticks(0, true), 0);
        assert_eq!(on_ticks(2, true), 1);
        assert_eq!(on_ticks(128, true), 64);
        assert_eq!(on_ticks(255, true), 127);
    }

    #[test]
    fn disabled_heat_skips_leading_edge() {
        assert_eq!(on_ticks(255, false), 0);
    }

    #[test]
    fn duty_change_mid_period_waits_for_next_period() {
        let mut pwm = SoftPwm::new([Some(0), None, None, None]);
        let mut pins = Pins::default();
        pwm.tick(&[40, 0, 0, 0], true, &mut pins);
        for _ in 1..PWM_PERIOD {
            pwm.tick(&[255, 0, 0, 0], true, &mut pins);
            if pwm.counter() == 25 {
                assert!(!pins.on[0], "released after latched duty 20");
            }
        }
        assert_eq!(pwm.counter(), 0);
        pwm.tick(&[255, 0, 0, 0], true, &mut pins);
        assert!(pins.on[0]);
    }

    #[test]
    fn lost_enable_releases_mid_period() {
        let mut pwm = SoftPwm::new([Some(2), None, None, None]);
        let mut pins = Pins::default();
        for _ in 0..4 {
            pwm.tick(&[200, 0, 0, 0], true, &mut pins);
        }
        assert!(pins.on[2]);
        pwm.tick(&[200, 0, 0, 0], false, &mut pins);
        assert!(!pins.on[2]);
        pwm.tick(&[200, 0, 0, 0], true, &mut pins);
        assert!(!pins.on[2], "no re-assert before the next period");
    }

    #[test]
    fn zero_duty_releases_mid_period() {
        let mut pwm = SoftPwm::new([Some(1), None, None, None]);
        let mut pins = Pins::default();
        for _ in 0..3 {
            pwm.tick(&[65, 0, 0, 0], true, &mut pins);
        }
        assert!(pins.on[1]);
        pwm.tick(&[0, 0, 0, 0], true, &mut pins);
        assert!(!pins.on[1]);
    }
}
