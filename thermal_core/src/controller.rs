//! Main-loop side of the thermal system: window consumption, safety,
//! regulation and the command surface used by the outer firmware.
//!
//! Channel numbering follows the command surface: bed = 0, extruders = 1..N.
//! Remote channels are served by the `RemoteLink` instead of local sampling.
use std::sync::Arc;
use std::time::Instant;

use eyre::WrapErr;
use thermal_traits::RemoteLink;
use thermal_traits::clock::Clock;

use crate::autotune::{AutotuneStatus, Autotuner};
use crate::channel::{Channel, ChannelCfg, ChannelId, ChannelKind, MAX_CHANNELS, PID_MAX, RegulationMode};
use crate::config::AutotuneCfg;
use crate::conversion::ThermistorModel;
use crate::error::{AutotuneError, Result, ThermalError};
use crate::hw_error::map_hw_error;
use crate::notify::{Notification, Notifier};
use crate::pid::{PidParams, PidRegulator};
use crate::safety::{FaultKind, Verdict};
use crate::state::{self, Shared, WindowSnapshot};
use crate::status::ChannelStatus;

type StopCheck = Box<dyn Fn() -> bool + Send>;

pub struct ThermalController {
    pub(crate) shared: Arc<Shared>,
    pub(crate) channels: [Option<Channel>; MAX_CHANNELS],
    pub(crate) regulator: PidRegulator,
    pub(crate) autotune_cfg: AutotuneCfg,
    pub(crate) remote: Option<Box<dyn RemoteLink + Send>>,
    pub(crate) notifier: Box<dyn Notifier + Send>,
    pub(crate) stop_check: Option<StopCheck>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    pub(crate) stopped: bool,
    pub(crate) windows: u64,
}

impl core::fmt::Debug for ThermalController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThermalController")
            .field("channels", &self.channel_ids().collect::<Vec<_>>())
            .field("pid", &self.regulator.gains())
            .field("stopped", &self.stopped)
            .field("windows", &self.windows)
            .finish()
    }
}

impl ThermalController {
    // ── Command surface ─────────────────────────────────────────────────────

    /// Configured channels, bed first.
    pub fn channel_ids(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.iter().flatten().filter_map(Channel::id)
    }

    pub fn channel_cfg(&self, ch: ChannelId) -> Result<ChannelCfg> {
        Ok(self.channel(ch)?.cfg)
    }

    /// Set a channel's target. `0` (or below) switches it off.
    pub fn set_target(&mut self, ch: ChannelId, celsius: f32) -> Result<()> {
        if !celsius.is_finite() {
            return Err(eyre::Report::new(ThermalError::Config(format!(
                "target for channel {ch} must be finite"
            ))));
        }
        let c = self.channel_mut(ch)?;
        c.set_target(celsius);
        let remote = c.cfg.mode == RegulationMode::Remote;
        let latched = c.guard.is_latched();
        if remote {
            self.remote_call(|r| r.set_target(ch.number(), celsius))
                .wrap_err("set_target")?;
        } else if latched && celsius > 0.0 {
            tracing::warn!(channel = %ch, "target ignored until faults are reset");
        }
        tracing::debug!(channel = %ch, celsius, "target set");
        Ok(())
    }

    pub fn target_celsius(&mut self, ch: ChannelId) -> Result<f32> {
        let c = self.channel(ch)?;
        if c.cfg.mode == RegulationMode::Remote {
            return self.remote_call(|r| r.target(ch.number())).wrap_err("target");
        }
        Ok(c.setpoint_c)
    }

    /// Temperature of the last consumed window.
    pub fn celsius(&mut self, ch: ChannelId) -> Result<f32> {
        let c = self.channel(ch)?;
        if c.cfg.mode == RegulationMode::Remote {
            return self.remote_call(|r| r.celsius(ch.number())).wrap_err("celsius");
        }
        Ok(c.celsius())
    }

    pub fn is_heating(&mut self, ch: ChannelId) -> Result<bool> {
        let c = self.channel(ch)?;
        if c.cfg.mode == RegulationMode::Remote {
            return Ok(self.target_celsius(ch)? > self.celsius(ch)?);
        }
        Ok(c.target_raw > c.current_raw)
    }

    pub fn is_cooling(&mut self, ch: ChannelId) -> Result<bool> {
        let c = self.channel(ch)?;
        if c.cfg.mode == RegulationMode::Remote {
            return Ok(self.target_celsius(ch)? < self.celsius(ch)?);
        }
        Ok(c.target_raw < c.current_raw)
    }

    /// Duty in `0..=PID_MAX`. Remote channels report 0.
    pub fn heater_power(&self, ch: ChannelId) -> Result<u8> {
        Ok(self.channel(ch)?.duty)
    }

    pub fn thermistor(&mut self, ch: ChannelId) -> Result<ThermistorModel> {
        let c = self.channel(ch)?;
        if c.cfg.mode == RegulationMode::Remote {
            let (beta, rs, r_inf) = self
                .remote_call(|r| r.thermistor(ch.number()))
                .wrap_err("thermistor")?;
            return Ok(ThermistorModel::new(beta, rs, r_inf));
        }
        c.cfg.sensor.thermistor().copied().ok_or_else(|| {
            eyre::Report::new(ThermalError::Config(format!(
                "channel {ch} has no thermistor"
            )))
        })
    }

    /// Install thermistor constants given as `(beta, series resistor, R25)`.
    /// Raw bounds and the current target are recomputed.
    pub fn set_thermistor(&mut self, ch: ChannelId, beta: f32, series_ohms: f32, r25: f32) -> Result<()> {
        let model = ThermistorModel::from_reference(beta, series_ohms, r25);
        if !model.is_valid() {
            return Err(eyre::Report::new(ThermalError::Config(format!(
                "thermistor constants for channel {ch} must be finite and > 0"
            ))));
        }
        let c = self.channel_mut(ch)?;
        if c.cfg.mode == RegulationMode::Remote {
            return self
                .remote_call(|r| r.set_thermistor(ch.number(), beta, series_ohms, model.r_inf))
                .wrap_err("set_thermistor");
        }
        if c.cfg.sensor.thermistor().is_none() {
            return Err(eyre::Report::new(ThermalError::Config(format!(
                "channel {ch} has no thermistor"
            ))));
        }
        c.cfg.sensor = crate::conversion::SensorKind::Thermistor(model);
        c.recompute_bounds();
        tracing::info!(channel = %ch, beta, series_ohms, r25, r_inf = model.r_inf, "thermistor updated");
        Ok(())
    }

    /// Process-wide gains, per-second units.
    pub fn pid(&self) -> PidParams {
        self.regulator.gains()
    }

    /// Replace the process-wide gains. `ki_max` is clamped to `0..=255`;
    /// the applied values are returned.
    pub fn set_pid(&mut self, kp: f32, ki: f32, kd: f32, ki_max: f32) -> Result<PidParams> {
        let gains = PidParams { kp, ki, kd, ki_max };
        if !gains.is_valid() {
            return Err(eyre::Report::new(ThermalError::Config(
                "PID gains must be finite and >= 0".into(),
            )));
        }
        self.regulator.set_gains(gains);
        let applied = self.regulator.gains();
        tracing::info!(
            p = applied.kp,
            i = applied.ki,
            d = applied.kd,
            w = applied.ki_max,
            "PID gains updated"
        );
        Ok(applied)
    }

    /// Zero every target and duty. Remote channels are switched off best-effort.
    pub fn disable_heaters(&mut self) {
        let mut remote_ids: heapless::Vec<ChannelId, MAX_CHANNELS> = heapless::Vec::new();
        for c in self.channels.iter_mut().flatten() {
            c.clear_target();
            c.duty = 0;
            if c.cfg.mode == RegulationMode::Remote {
                if let Some(id) = c.id() {
                    let _ = remote_ids.push(id);
                }
            }
        }
        for id in remote_ids {
            if let Err(e) = self.remote_call(|r| r.set_target(id.number(), 0.0)) {
                tracing::warn!(channel = %id, error = %e, "remote heater off failed");
            }
        }
        self.commit();
        tracing::info!("all heaters disabled");
    }

    /// Acknowledge latched faults. Targets stay at zero until set again.
    pub fn reset_faults(&mut self) {
        for c in self.channels.iter_mut().flatten() {
            c.guard.reset();
        }
        self.commit();
        tracing::info!("fault latches cleared");
    }

    pub fn is_latched(&self, ch: ChannelId) -> Result<bool> {
        Ok(self.channel(ch)?.guard.is_latched())
    }

    pub fn any_latched(&self) -> bool {
        self.channels.iter().flatten().any(|c| c.guard.is_latched())
    }

    /// Stop predicate as last sampled.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// What the PWM driver is allowed to do: no latch and not stopped.
    pub fn heat_enabled(&self) -> bool {
        !self.stopped && !self.any_latched()
    }

    /// Windows consumed so far.
    pub fn windows(&self) -> u64 {
        self.windows
    }

    pub fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }

    /// Milliseconds on the controller's clock since construction.
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    pub fn status(&mut self, ch: ChannelId) -> Result<ChannelStatus> {
        let c = self.channel(ch)?;
        let (kind, mode, power, latched) = (c.cfg.kind, c.cfg.mode, c.duty, c.guard.is_latched());
        Ok(ChannelStatus {
            channel: ch,
            kind,
            mode,
            celsius: self.celsius(ch)?,
            target_c: self.target_celsius(ch)?,
            power,
            latched,
        })
    }

    pub fn statuses(&mut self) -> Result<Vec<ChannelStatus>> {
        let ids: Vec<ChannelId> = self.channel_ids().collect();
        ids.into_iter().map(|id| self.status(id)).collect()
    }

    // ── Regulation ──────────────────────────────────────────────────────────

    /// Consume the next published window, if any: safety checks, regulation
    /// and duty hand-off. Returns `false` when no window was ready.
    pub fn manage(&mut self) -> bool {
        let stopped = self.refresh_stopped();
        let Some(window) = state::take_window(&self.shared) else {
            return false;
        };
        let now_ms = self.now_ms();
        self.absorb(&window);
        let due = self.run_safety(now_ms, stopped);

        for (i, slot) in self.channels.iter_mut().enumerate() {
            let Some(c) = slot.as_mut() else { continue };
            if c.guard.is_latched() {
                c.clear_target();
                c.duty = 0;
                continue;
            }
            let out = match c.cfg.mode {
                RegulationMode::Remote => 0,
                RegulationMode::Pid => {
                    let input = c.celsius();
                    let out = self.regulator.compute(&mut c.pid, c.setpoint_c, input);
                    tracing::trace!(channel = i, terms = ?c.pid.terms(), out, "pid output");
                    out
                }
                RegulationMode::BangBang if c.check_interval_ms > 0 && !due[i] => c.relay,
                RegulationMode::BangBang => {
                    c.relay = if c.current_raw < c.target_raw { PID_MAX } else { 0 };
                    c.relay
                }
            };
            c.duty = if c.in_range() { out } else { 0 };
        }

        self.commit();
        self.windows += 1;
        tracing::trace!(window = window.window, "window managed");
        true
    }

    // ── Autotune ────────────────────────────────────────────────────────────

    /// Begin relay autotune on a local channel. All heaters are disabled
    /// first; the returned session is driven with [`Self::autotune_step`].
    pub fn start_autotune(&mut self, ch: ChannelId, target_c: f32) -> Result<Autotuner> {
        if !(target_c.is_finite() && target_c > 0.0) {
            return Err(eyre::Report::new(ThermalError::Config(
                "autotune target must be > 0".into(),
            )));
        }
        let c = self.channel(ch)?;
        if !c.cfg.is_local() || c.guard.is_latched() {
            return Err(eyre::Report::new(AutotuneError::ChannelUnavailable(ch)));
        }
        self.disable_heaters();
        let tuner = Autotuner::new(ch, target_c, self.now_ms(), self.autotune_cfg);
        self.notify(&Notification::AutotuneStarted {
            channel: ch,
            target_c,
        });
        self.drive(ch, tuner.duty());
        Ok(tuner)
    }

    /// One cooperative autotune iteration. Consumes a window when one is
    /// ready, otherwise only checks time limits.
    pub fn autotune_step(&mut self, tuner: &mut Autotuner) -> Result<AutotuneStatus> {
        let ch = tuner.channel();
        self.channel(ch)?;
        if let Some(done) = tuner.outcome() {
            return Ok(done);
        }
        let stopped = self.refresh_stopped();
        let now_ms = self.now_ms();
        let cycles_before = tuner.cycles();

        let status = match state::take_window(&self.shared) {
            Some(window) => {
                self.absorb(&window);
                self.run_safety(now_ms, stopped);
                self.windows += 1;
                let c = self.channel(ch)?;
                if c.guard.is_latched() {
                    tuner.abort(AutotuneError::ChannelUnavailable(ch))
                } else {
                    tuner.update(now_ms, c.celsius())
                }
            }
            None => tuner.poll(now_ms),
        };

        if tuner.cycles() != cycles_before {
            if let Some(report) = tuner.last_cycle().filter(|r| r.cycle == cycles_before) {
                self.notify(&Notification::AutotuneCycle(report));
            }
        }
        if tuner.progress_due(now_ms) {
            let c = self.channel(ch)?;
            let line = Notification::AutotuneProgress {
                channel: ch,
                celsius: c.celsius(),
                power: c.duty,
            };
            self.notify(&line);
        }

        match status {
            AutotuneStatus::Running { duty } => self.drive(ch, duty),
            AutotuneStatus::Done(result) => {
                self.drive(ch, 0);
                self.notify(&Notification::AutotuneFinished(result));
            }
            AutotuneStatus::Failed(err) => {
                self.drive(ch, 0);
                self.notify(&Notification::AutotuneFailed(err));
            }
        }
        Ok(status)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn channel(&self, ch: ChannelId) -> Result<&Channel> {
        self.channels
            .get(ch.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| eyre::Report::new(ThermalError::InvalidChannel(ch)))
    }

    fn channel_mut(&mut self, ch: ChannelId) -> Result<&mut Channel> {
        self.channels
            .get_mut(ch.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| eyre::Report::new(ThermalError::InvalidChannel(ch)))
    }

    fn remote_call<T>(
        &mut self,
        f: impl FnOnce(
            &mut (dyn RemoteLink + Send),
        ) -> std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>,
    ) -> Result<T> {
        let link = self.remote.as_deref_mut().ok_or_else(|| {
            eyre::Report::new(ThermalError::State("no remote link configured".into()))
        })?;
        f(link).map_err(|e| eyre::Report::new(map_hw_error(&*e)))
    }

    fn refresh_stopped(&mut self) -> bool {
        let stopped = self.stop_check.as_ref().is_some_and(|f| f());
        if stopped != self.stopped {
            tracing::info!(stopped, "stop state changed");
            self.stopped = stopped;
        }
        stopped
    }

    fn absorb(&mut self, window: &WindowSnapshot) {
        for (c, raw) in self.channels.iter_mut().zip(window.raw.iter()) {
            if let Some(c) = c.as_mut().filter(|c| c.cfg.is_local()) {
                c.current_raw = *raw;
            }
        }
    }

    /// Range checks for this window. Returns which interval-gated channels
    /// were due.
    fn run_safety(&mut self, now_ms: u64, stopped: bool) -> [bool; MAX_CHANNELS] {
        let mut due = [false; MAX_CHANNELS];
        let mut pending: heapless::Vec<Notification, { 2 * MAX_CHANNELS }> = heapless::Vec::new();

        for (i, slot) in self.channels.iter_mut().enumerate() {
            let Some(c) = slot.as_mut().filter(|c| c.cfg.is_local()) else {
                continue;
            };
            let Some(id) = c.id() else { continue };

            if let Some(abs) = c.cfg.absolute_max_c {
                let celsius = c.celsius();
                if celsius > abs && c.guard.trip(FaultKind::MaxTemp) {
                    c.clear_target();
                    c.duty = 0;
                    tracing::error!(channel = %id, celsius, limit = abs, "absolute maximum exceeded");
                    let _ = pending.push(Notification::BedMaxTemp {
                        channel: id,
                        celsius,
                    });
                }
            }

            if c.check_interval_ms > 0 {
                if now_ms.saturating_sub(c.last_check_ms) < c.check_interval_ms {
                    if c.guard.is_latched() {
                        c.clear_target();
                    }
                    continue;
                }
                c.last_check_ms = now_ms;
                due[i] = true;
            }

            match c.guard.observe(c.current_raw, c.min_raw, c.max_raw) {
                Verdict::Tripped(kind) => {
                    c.clear_target();
                    c.duty = 0;
                    tracing::error!(channel = %id, raw = c.current_raw, ?kind, "range fault latched");
                    let n = match (c.cfg.kind, kind) {
                        (ChannelKind::Bed, _) => Notification::BedFault { channel: id },
                        (k, FaultKind::MaxTemp) => Notification::MaxTemp { channel: id, kind: k },
                        (k, FaultKind::MinTemp) => Notification::MinTemp { channel: id, kind: k },
                    };
                    let _ = pending.push(n);
                }
                Verdict::Latched => c.clear_target(),
                Verdict::Counting => tracing::debug!(
                    channel = %id,
                    raw = c.current_raw,
                    over = c.guard.over().count(),
                    under = c.guard.under().count(),
                    "reading out of range"
                ),
                Verdict::InRange => {}
            }
        }

        for n in &pending {
            if stopped {
                tracing::debug!(notification = %n, "suppressed while stopped");
            } else {
                self.notifier.notify(n);
            }
        }
        due
    }

    fn notify(&mut self, n: &Notification) {
        self.notifier.notify(n);
    }

    /// Drive one channel at `duty` (range-gated) and every other channel at 0.
    fn drive(&mut self, ch: ChannelId, duty: u8) {
        for c in self.channels.iter_mut().flatten() {
            c.duty = if c.id() == Some(ch) && c.in_range() { duty } else { 0 };
        }
        self.commit();
    }

    pub(crate) fn commit(&self) {
        let mut duty = [0u8; MAX_CHANNELS];
        for (d, c) in duty.iter_mut().zip(self.channels.iter()) {
            if let Some(c) = c.as_ref().filter(|c| c.cfg.is_local()) {
                *d = c.duty;
            }
        }
        state::store_outputs(&self.shared, duty, self.heat_enabled());
    }
}
