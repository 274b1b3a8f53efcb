//! Per-window PID regulation with band bypass and anti-windup.
//!
//! Gains are held in per-second units everywhere they are visible; the
//! regulator scales them to the sampling window internally
//! (`ki * dt`, `kd / dt`). The derivative acts on the measured temperature,
//! not the error, so setpoint steps do not kick it.
use crate::channel::PID_MAX;
use crate::config::PidCfg;

/// Process-wide PID gains, per-second units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidParams {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Ceiling of the integral term's drive, `0..=255`.
    pub ki_max: f32,
}

impl Default for PidParams {
    fn default() -> Self {
        Self {
            kp: 12.0,
            ki: 2.2,
            kd: 80.0,
            ki_max: 125.0,
        }
    }
}

impl PidParams {
    pub fn is_valid(&self) -> bool {
        [self.kp, self.ki, self.kd, self.ki_max]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Terms of the last in-band computation, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidTerms {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

/// Per-channel regulator memory.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidState {
    integral: f32,
    last_input: f32,
    d_term: f32,
    reset_pending: bool,
    primed: bool,
    terms: PidTerms,
}

impl PidState {
    /// Accumulated error, after clamping.
    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    pub fn terms(&self) -> PidTerms {
        self.terms
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidRegulator {
    gains: PidParams,
    band_c: f32,
    k1: f32,
    window_s: f32,
    ki_window: f32,
    kd_window: f32,
    integral_max: f32,
}

impl PidRegulator {
    pub fn new(cfg: &PidCfg, window_s: f32) -> Self {
        let mut r = Self {
            gains: cfg.gains,
            band_c: cfg.band_c,
            k1: cfg.k1,
            window_s,
            ki_window: 0.0,
            kd_window: 0.0,
            integral_max: 0.0,
        };
        r.set_gains(cfg.gains);
        r
    }

    pub fn gains(&self) -> PidParams {
        self.gains
    }

    /// Install new per-second gains. `ki_max` is clamped to `0..=255`.
    pub fn set_gains(&mut self, gains: PidParams) {
        let ki_max = gains.ki_max.clamp(0.0, f32::from(PID_MAX));
        self.gains = PidParams { ki_max, ..gains };
        self.ki_window = gains.ki * self.window_s;
        self.kd_window = if self.window_s > 0.0 {
            gains.kd / self.window_s
        } else {
            0.0
        };
        self.integral_max = if self.ki_window > 0.0 {
            ki_max / self.ki_window
        } else {
            0.0
        };
    }

    /// Upper clamp of the integral accumulator, `ki_max / (ki * dt)`.
    pub fn integral_limit(&self) -> f32 {
        self.integral_max
    }

    pub fn band(&self) -> f32 {
        self.band_c
    }

    /// Duty in `0..=PID_MAX` for one window.
    pub fn compute(&self, state: &mut PidState, setpoint_c: f32, input_c: f32) -> u8 {
        if input_c.is_nan() {
            state.reset_pending = true;
            return 0;
        }
        let error = setpoint_c - input_c;
        if error > self.band_c {
            state.reset_pending = true;
            return PID_MAX;
        }
        if error < -self.band_c {
            state.reset_pending = true;
            return 0;
        }

        if state.reset_pending || !state.primed {
            state.integral = 0.0;
            state.reset_pending = false;
        }
        if !state.primed {
            state.last_input = input_c;
            state.d_term = 0.0;
            state.primed = true;
        }

        let p = self.gains.kp * error;
        state.integral = (state.integral + error).clamp(0.0, self.integral_max);
        let i = self.ki_window * state.integral;
        state.d_term = self.kd_window * (input_c - state.last_input) * (1.0 - self.k1)
            + self.k1 * state.d_term;
        state.last_input = input_c;
        state.terms = PidTerms {
            p,
            i,
            d: state.d_term,
        };

        let out = (p + i - state.d_term).clamp(0.0, f32::from(PID_MAX));
        tracing::trace!(error, p, i, d = state.d_term, out, "pid");
        out as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regulator() -> PidRegulator {
        PidRegulator::new(&PidCfg::default(), 0.131)
    }

    #[test]
    fn far_below_setpoint_forces_full_duty() {
        let r = regulator();
        let mut s = PidState::default();
        assert_eq!(r.compute(&mut s, 200.0, 150.0), PID_MAX);
        assert!(s.reset_pending());
    }

    #[test]
    fn far_above_setpoint_forces_zero() {
        let r = regulator();
        let mut s = PidState::default();
        assert_eq!(r.compute(&mut s, 100.0, 140.0), 0);
        assert!(s.reset_pending());
    }

    #[test]
    fn gains_stay_per_second() {
        let mut r = regulator();
        let g = PidParams {
            kp: 10.0,
            ki: 1.0,
            kd: 50.0,
            ki_max: 400.0,
        };
        r.set_gains(g);
        let back = r.gains();
        assert_eq!(back.kp, 10.0);
        assert_eq!(back.ki, 1.0);
        assert_eq!(back.kd, 50.0);
        assert_eq!(back.ki_max, 255.0);
        assert!((r.integral_limit() - 255.0 / 0.131).abs() < 1e-2);
    }

    #[test]
    fn zero_ki_disables_integral() {
        let mut r = regulator();
        r.set_gains(PidParams {
            ki: 0.0,
            ..PidParams::default()
        });
        let mut s = PidState::default();
        r.compute(&mut s, 200.0, 195.0);
        assert_eq!(s.integral(), 0.0);
    }
}
