//! Type-state builder for the thermal system.
//!
//! The builder enforces at compile time that an analog input, heater outputs
//! and at least one channel are provided before `build()` is available.
//! `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use thermal_traits::clock::{Clock, MonotonicClock};
use thermal_traits::{AnalogInput, HeaterOutputs, RemoteLink};

use crate::channel::{Channel, ChannelCfg, ChannelKind, MAX_CHANNELS};
use crate::config::{AutotuneCfg, PidCfg, SafetyCfg, SamplingCfg};
use crate::controller::ThermalController;
use crate::error::{BuildError, Result};
use crate::isr::TickHandler;
use crate::notify::{Notifier, TracingNotifier};
use crate::pid::PidRegulator;
use crate::pwm::SoftPwm;
use crate::sampling::{SLOTS, SamplingScheduler, SlotBinding};
use crate::state;

// ── Built system ─────────────────────────────────────────────────────────────

/// The two halves of a running system: the tick handler for the periodic
/// callback and the controller for the main loop. They share state only
/// through the critical-section protected [`state::Shared`].
#[derive(Debug)]
pub struct ThermalSystem {
    pub tick: TickHandler,
    pub controller: ThermalController,
}

impl ThermalSystem {
    /// Start building a thermal system.
    pub fn builder() -> ThermalSystemBuilder<Missing, Missing, Missing> {
        ThermalSystemBuilder::default()
    }

    pub fn into_parts(self) -> (TickHandler, ThermalController) {
        (self.tick, self.controller)
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

type StopCheck = Box<dyn Fn() -> bool + Send>;

/// Builder for `ThermalSystem`. All fields are validated on `build()`.
pub struct ThermalSystemBuilder<A, H, C> {
    adc: Option<Box<dyn AnalogInput + Send>>,
    outputs: Option<Box<dyn HeaterOutputs + Send>>,
    channels: heapless::Vec<ChannelCfg, MAX_CHANNELS>,
    overflow: bool,
    sampling: Option<SamplingCfg>,
    pid: Option<PidCfg>,
    safety: Option<SafetyCfg>,
    autotune: Option<AutotuneCfg>,
    remote: Option<Box<dyn RemoteLink + Send>>,
    notifier: Option<Box<dyn Notifier + Send>>,
    stop_check: Option<StopCheck>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _a: PhantomData<A>,
    _h: PhantomData<H>,
    _c: PhantomData<C>,
}

impl Default for ThermalSystemBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            adc: None,
            outputs: None,
            channels: heapless::Vec::new(),
            overflow: false,
            sampling: None,
            pid: None,
            safety: None,
            autotune: None,
            remote: None,
            notifier: None,
            stop_check: None,
            clock: None,
            _a: PhantomData,
            _h: PhantomData,
            _c: PhantomData,
        }
    }
}

/// Validate configuration and construct both halves of the system.
///
/// Bounds are checked here once; per-access lookups afterwards only index
/// the fixed channel arena.
#[allow(clippy::too_many_arguments)]
fn validate_and_build(
    adc: Box<dyn AnalogInput + Send>,
    outputs: Box<dyn HeaterOutputs + Send>,
    channels: &[ChannelCfg],
    sampling: SamplingCfg,
    pid: PidCfg,
    safety: SafetyCfg,
    autotune: AutotuneCfg,
    remote: Option<Box<dyn RemoteLink + Send>>,
    notifier: Box<dyn Notifier + Send>,
    stop_check: Option<StopCheck>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ThermalSystem> {
    // ── Validation ───────────────────────────────────────────────────────────
    let invalid = |msg: &'static str| eyre::Report::new(BuildError::InvalidConfig(msg));
    if channels.is_empty() {
        return Err(eyre::Report::new(BuildError::MissingChannels));
    }
    if sampling.tick_us == 0 {
        return Err(invalid("tick_us must be > 0"));
    }
    if !pid.gains.is_valid() {
        return Err(invalid("pid gains must be finite and >= 0"));
    }
    if !(pid.band_c.is_finite() && pid.band_c > 0.0) {
        return Err(invalid("pid band must be > 0"));
    }
    if !(0.0..1.0).contains(&pid.k1) {
        return Err(invalid("pid k1 must be in [0, 1)"));
    }
    if safety.debounce == 0 {
        return Err(invalid("debounce must be >= 1"));
    }
    if autotune.timeout_ms == 0 {
        return Err(invalid("autotune timeout must be > 0"));
    }
    if !(autotune.runaway_margin_c.is_finite() && autotune.runaway_margin_c > 0.0) {
        return Err(invalid("autotune runaway margin must be > 0"));
    }
    if autotune.bias_margin >= 127 {
        return Err(invalid("autotune bias margin must be < 127"));
    }

    let mut seen = [false; MAX_CHANNELS];
    let mut pins_used: heapless::Vec<u8, MAX_CHANNELS> = heapless::Vec::new();
    let mut inputs_used: heapless::Vec<u8, MAX_CHANNELS> = heapless::Vec::new();
    for cfg in channels {
        let id = cfg
            .kind
            .id()
            .ok_or_else(|| invalid("extruder index must be < 3"))?;
        if std::mem::replace(&mut seen[id.index()], true) {
            return Err(invalid("duplicate channel"));
        }
        if !cfg.sensor.is_valid() {
            return Err(invalid("sensor constants must be finite and > 0"));
        }
        if !(cfg.min_c.is_finite() && cfg.max_c.is_finite() && cfg.min_c < cfg.max_c) {
            return Err(invalid("min_c must be below max_c"));
        }
        if cfg.absolute_max_c.is_some_and(|c| !c.is_finite()) {
            return Err(invalid("absolute_max_c must be finite"));
        }
        if !cfg.is_local() {
            if remote.is_none() {
                return Err(invalid("remote channel requires a remote link"));
            }
            continue;
        }
        if pins_used.contains(&cfg.heater_pin) {
            return Err(invalid("heater pins must be unique"));
        }
        if inputs_used.contains(&cfg.input) {
            return Err(invalid("analog inputs must be unique"));
        }
        let _ = pins_used.push(cfg.heater_pin);
        let _ = inputs_used.push(cfg.input);
    }

    // ── Precompute ───────────────────────────────────────────────────────────
    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };
    let epoch = clock.now();
    let now = clock.ms_since(epoch);

    let mut slots: [Option<SlotBinding>; SLOTS] = [None; SLOTS];
    let mut pins: [Option<u8>; MAX_CHANNELS] = [None; MAX_CHANNELS];
    let mut arena: [Option<Channel>; MAX_CHANNELS] = core::array::from_fn(|_| None);
    for cfg in channels {
        let Some(id) = cfg.kind.id() else { continue };
        if cfg.is_local() {
            if let Some(slot) = cfg.kind.sampling_slot() {
                slots[slot] = Some(SlotBinding {
                    channel: id,
                    input: cfg.input,
                    inverted: cfg.sensor.inverted(),
                });
            }
            pins[id.index()] = Some(cfg.heater_pin);
        }
        let interval = match (cfg.check_interval_ms, cfg.kind) {
            (Some(ms), _) => ms,
            (None, ChannelKind::Bed) => safety.bed_check_interval_ms,
            (None, ChannelKind::Hotend(_)) => 0,
        };
        arena[id.index()] = Some(Channel::new(*cfg, interval, safety.debounce, now));
        tracing::debug!(channel = %id, kind = %cfg.kind, mode = ?cfg.mode, "channel configured");
    }

    let window_s = crate::util::window_secs(sampling.tick_us);
    let shared = state::new_shared();
    let tick = TickHandler::new(
        adc,
        outputs,
        SamplingScheduler::new(slots),
        SoftPwm::new(pins),
        shared.clone(),
    );
    let controller = ThermalController {
        shared,
        channels: arena,
        regulator: PidRegulator::new(&pid, window_s),
        autotune_cfg: autotune,
        remote,
        notifier,
        stop_check,
        clock,
        epoch,
        stopped: false,
        windows: 0,
    };
    controller.commit();
    tracing::info!(
        channels = channels.len(),
        tick_us = sampling.tick_us,
        window_s,
        "thermal system built"
    );
    Ok(ThermalSystem { tick, controller })
}

impl<A, H, C> ThermalSystemBuilder<A, H, C> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<ThermalSystem> {
        let adc = self
            .adc
            .ok_or_else(|| eyre::Report::new(BuildError::MissingAnalogInput))?;
        let outputs = self
            .outputs
            .ok_or_else(|| eyre::Report::new(BuildError::MissingHeaterOutputs))?;
        if self.overflow {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "at most 4 channels are supported",
            )));
        }

        validate_and_build(
            adc,
            outputs,
            &self.channels,
            self.sampling.unwrap_or_default(),
            self.pid.unwrap_or_default(),
            self.safety.unwrap_or_default(),
            self.autotune.unwrap_or_default(),
            self.remote,
            self.notifier.unwrap_or_else(|| Box::new(TracingNotifier)),
            self.stop_check,
            self.clock,
        )
    }

    fn retype<A2, H2, C2>(self) -> ThermalSystemBuilder<A2, H2, C2> {
        ThermalSystemBuilder {
            adc: self.adc,
            outputs: self.outputs,
            channels: self.channels,
            overflow: self.overflow,
            sampling: self.sampling,
            pid: self.pid,
            safety: self.safety,
            autotune: self.autotune,
            remote: self.remote,
            notifier: self.notifier,
            stop_check: self.stop_check,
            clock: self.clock,
            _a: PhantomData,
            _h: PhantomData,
            _c: PhantomData,
        }
    }
}

/// Chainable setters that do not affect type-state.
impl<A, H, C> ThermalSystemBuilder<A, H, C> {
    pub fn with_sampling(mut self, sampling: SamplingCfg) -> Self {
        self.sampling = Some(sampling);
        self
    }
    pub fn with_pid(mut self, pid: PidCfg) -> Self {
        self.pid = Some(pid);
        self
    }
    pub fn with_safety(mut self, safety: SafetyCfg) -> Self {
        self.safety = Some(safety);
        self
    }
    pub fn with_autotune(mut self, autotune: AutotuneCfg) -> Self {
        self.autotune = Some(autotune);
        self
    }
    pub fn with_remote(mut self, remote: impl RemoteLink + Send + 'static) -> Self {
        self.remote = Some(Box::new(remote));
        self
    }
    pub fn with_notifier(mut self, notifier: impl Notifier + Send + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }
    /// Predicate owned by the outer firmware; `true` means stopped. While it
    /// holds, heaters are disabled and fault notifications are suppressed.
    pub fn with_stop_check<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        self.stop_check = Some(Box::new(f));
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<H, C> ThermalSystemBuilder<Missing, H, C> {
    pub fn with_analog_input(
        mut self,
        adc: impl AnalogInput + Send + 'static,
    ) -> ThermalSystemBuilder<Set, H, C> {
        self.adc = Some(Box::new(adc));
        self.retype()
    }
}

impl<A, C> ThermalSystemBuilder<A, Missing, C> {
    pub fn with_heater_outputs(
        mut self,
        outputs: impl HeaterOutputs + Send + 'static,
    ) -> ThermalSystemBuilder<A, Set, C> {
        self.outputs = Some(Box::new(outputs));
        self.retype()
    }
}

impl<A, H, C> ThermalSystemBuilder<A, H, C> {
    /// Add a channel. More than [`MAX_CHANNELS`] fails at build time.
    pub fn with_channel(mut self, cfg: ChannelCfg) -> ThermalSystemBuilder<A, H, Set> {
        if self.channels.push(cfg).is_err() {
            self.overflow = true;
        }
        self.retype()
    }
}

impl ThermalSystemBuilder<Set, Set, Set> {
    /// Validate and build. Only available when input, outputs and channels are set.
    pub fn build(self) -> Result<ThermalSystem> {
        self.try_build()
    }
}
