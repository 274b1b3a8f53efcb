//! Relay-feedback autotune as a cooperative state machine.
//!
//! The channel is driven between `bias + swing` and `bias - swing` around the
//! target. The relay flips when the temperature crosses the target and the
//! current half period has lasted at least `min_half_period_ms`. From the
//! oscillation amplitude and period the classic Ziegler-Nichols gains are
//! derived. Time is whatever the caller passes in; nothing here sleeps.
use crate::channel::{ChannelId, PID_MAX};
use crate::config::AutotuneCfg;
use crate::error::AutotuneError;
use crate::pid::PidParams;

/// Ultimate gain/period estimate and the derived gains, per-second units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutotuneResult {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub ku: f32,
    /// Oscillation period in seconds.
    pub tu: f32,
}

impl AutotuneResult {
    fn from_oscillation(swing: i64, min_c: f32, max_c: f32, period_ms: u64) -> Option<Self> {
        let amplitude = max_c - min_c;
        if amplitude.is_nan() || amplitude <= 0.0 || period_ms == 0 {
            return None;
        }
        let ku = (4.0 * swing as f32) / (core::f32::consts::PI * amplitude / 2.0);
        let tu = period_ms as f32 / 1000.0;
        let kp = 0.6 * ku;
        Some(Self {
            kp,
            ki: 2.0 * kp / tu,
            kd: kp * tu / 8.0,
            ku,
            tu,
        })
    }

    /// Gains ready for `ThermalController::set_pid`.
    pub fn params(&self, ki_max: f32) -> PidParams {
        PidParams {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
            ki_max,
        }
    }
}

/// Snapshot taken at every cooling-to-heating flip after the first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub cycle: u32,
    pub bias: u8,
    pub swing: u8,
    pub min_c: f32,
    pub max_c: f32,
    pub estimate: Option<AutotuneResult>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutotuneStatus {
    /// Keep going and drive the channel at `duty`.
    Running { duty: u8 },
    Done(AutotuneResult),
    Failed(AutotuneError),
}

impl AutotuneStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Autotuner {
    channel: ChannelId,
    target_c: f32,
    cfg: AutotuneCfg,
    heating: bool,
    bias: i64,
    swing: i64,
    cycles: u32,
    /// Time of the last heating-to-cooling flip.
    t_cool: u64,
    /// Time of the last cooling-to-heating flip.
    t_heat: u64,
    t_high: u64,
    t_low: u64,
    min_c: f32,
    max_c: f32,
    last_c: Option<f32>,
    last_progress_ms: u64,
    estimate: Option<AutotuneResult>,
    last_cycle: Option<CycleReport>,
    outcome: Option<AutotuneStatus>,
}

impl Autotuner {
    pub fn new(channel: ChannelId, target_c: f32, now_ms: u64, cfg: AutotuneCfg) -> Self {
        let half = i64::from(PID_MAX / 2);
        Self {
            channel,
            target_c,
            cfg,
            heating: true,
            bias: half,
            swing: half,
            cycles: 0,
            t_cool: now_ms,
            t_heat: now_ms,
            t_high: 0,
            t_low: 0,
            min_c: target_c,
            max_c: target_c,
            last_c: None,
            last_progress_ms: now_ms,
            estimate: None,
            last_cycle: None,
            outcome: None,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn target_c(&self) -> f32 {
        self.target_c
    }

    /// Completed cooling-to-heating flips.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn is_heating(&self) -> bool {
        self.heating
    }

    pub fn bias(&self) -> u8 {
        clamp_duty(self.bias)
    }

    pub fn swing(&self) -> u8 {
        clamp_duty(self.swing)
    }

    /// Relay output for the current half period.
    pub fn duty(&self) -> u8 {
        if self.heating {
            clamp_duty(self.bias + self.swing)
        } else {
            clamp_duty(self.bias - self.swing)
        }
    }

    /// Most recent gain estimate, available once more than two cycles completed.
    pub fn estimate(&self) -> Option<AutotuneResult> {
        self.estimate
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle
    }

    pub fn outcome(&self) -> Option<AutotuneStatus> {
        self.outcome
    }

    /// Returns `true` at most once per progress interval.
    pub fn progress_due(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.last_progress_ms) > self.cfg.progress_interval_ms {
            self.last_progress_ms = now_ms;
            return true;
        }
        false
    }

    /// Feed one converted window.
    pub fn update(&mut self, now_ms: u64, celsius: f32) -> AutotuneStatus {
        if let Some(done) = self.outcome {
            return done;
        }
        self.last_c = Some(celsius);
        self.max_c = self.max_c.max(celsius);
        self.min_c = self.min_c.min(celsius);

        if self.heating
            && celsius > self.target_c
            && now_ms.saturating_sub(self.t_heat) > self.cfg.min_half_period_ms
        {
            self.heating = false;
            self.t_cool = now_ms;
            self.t_high = self.t_cool.saturating_sub(self.t_heat);
            self.max_c = self.target_c;
        }

        if !self.heating
            && celsius < self.target_c
            && now_ms.saturating_sub(self.t_cool) > self.cfg.min_half_period_ms
        {
            self.heating = true;
            self.t_heat = now_ms;
            self.t_low = self.t_heat.saturating_sub(self.t_cool);
            if self.cycles > 0 {
                self.rebalance();
            }
            self.cycles += 1;
            self.min_c = self.target_c;
        }

        self.poll(now_ms)
    }

    /// End the session from outside (for example a latched channel).
    pub fn abort(&mut self, err: AutotuneError) -> AutotuneStatus {
        *self.outcome.get_or_insert(AutotuneStatus::Failed(err))
    }

    /// Time and limit checks without a new reading.
    pub fn poll(&mut self, now_ms: u64) -> AutotuneStatus {
        if let Some(done) = self.outcome {
            return done;
        }
        let limit = self.target_c + self.cfg.runaway_margin_c;
        let status = match self.last_c {
            Some(c) if c > limit => AutotuneStatus::Failed(AutotuneError::Runaway {
                celsius: c,
                limit,
            }),
            _ if self.timed_out(now_ms) => AutotuneStatus::Failed(AutotuneError::Timeout {
                minutes: self.cfg.timeout_ms / 60_000,
            }),
            _ if self.cycles > self.cfg.cycles => match self.estimate {
                Some(result) => AutotuneStatus::Done(result),
                None => AutotuneStatus::Failed(AutotuneError::NoOscillation),
            },
            _ => {
                return AutotuneStatus::Running { duty: self.duty() };
            }
        };
        self.outcome = Some(status);
        status
    }

    /// Both half periods grow together once flips stop, so their sum crosses
    /// twice the timeout roughly one timeout after the last flip.
    fn timed_out(&self, now_ms: u64) -> bool {
        let since_cool = now_ms.saturating_sub(self.t_cool);
        let since_heat = now_ms.saturating_sub(self.t_heat);
        since_cool.saturating_add(since_heat) > self.cfg.timeout_ms.saturating_mul(2)
    }

    fn rebalance(&mut self) {
        let full = i64::from(PID_MAX);
        let margin = i64::from(self.cfg.bias_margin);
        let t_high = i64::try_from(self.t_high).unwrap_or(i64::MAX);
        let t_low = i64::try_from(self.t_low).unwrap_or(i64::MAX);
        let period = t_high.saturating_add(t_low);
        if period > 0 {
            self.bias += (self.swing * (t_high - t_low)) / period;
        }
        self.bias = self.bias.clamp(margin, full - margin);
        self.swing = if self.bias > full / 2 {
            full - 1 - self.bias
        } else {
            self.bias
        };

        if self.cycles > 2 {
            let period_ms = self.t_high.saturating_add(self.t_low);
            self.estimate =
                AutotuneResult::from_oscillation(self.swing, self.min_c, self.max_c, period_ms);
        }
        let report = CycleReport {
            cycle: self.cycles,
            bias: self.bias(),
            swing: self.swing(),
            min_c: self.min_c,
            max_c: self.max_c,
            estimate: self.estimate,
        };
        tracing::debug!(
            cycle = report.cycle,
            bias = report.bias,
            swing = report.swing,
            min_c = report.min_c,
            max_c = report.max_c,
            "autotune cycle"
        );
        self.last_cycle = Some(report);
    }
}

fn clamp_duty(v: i64) -> u8 {
    u8::try_from(v.clamp(0, i64::from(PID_MAX))).unwrap_or(PID_MAX)
}
