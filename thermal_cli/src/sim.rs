//! Simulated board assembly and the commands that run on it.
//!
//! Everything runs on one thread against a [`ManualClock`]: each pump steps
//! the tick handler through one sampling window, moving the plant and the
//! clock by one tick period per tick, so a long run finishes in a fraction
//! of its simulated time.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::{Result, WrapErr};
use serde_json::json;
use thermal_core::conversions::channels_from_config;
use thermal_core::isr::TICKS_PER_WINDOW;
use thermal_core::{
    BuildError, ChannelCfg, ChannelId, ChannelKind, ChannelStatus, CollectingNotifier,
    ThermalController, ThermalSystem, TickHandler, TracingNotifier, runner,
};
use thermal_hardware::{Probe, SimulatedPlant, SimulatedRemote, Zone};
use thermal_traits::ManualClock;

use crate::cli::{ProbeFault, TargetArg, json_mode};

/// Settling time constant of channels hosted on the simulated remote board.
const REMOTE_TAU: Duration = Duration::from_secs(20);

/// A run ended with at least one heater shut off by the range monitor.
#[derive(Debug, Clone)]
pub struct FaultLatched {
    pub faults: Vec<String>,
}

impl fmt::Display for FaultLatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.faults.is_empty() {
            return f.write_str("heater fault latched");
        }
        write!(f, "heater fault latched: {}", self.faults.join("; "))
    }
}

impl std::error::Error for FaultLatched {}

// ── Bench ────────────────────────────────────────────────────────────────────

/// Tick side plus the simulated hardware it drives.
pub struct Bench {
    tick: TickHandler,
    plant: SimulatedPlant,
    remote: Option<SimulatedRemote>,
    clock: ManualClock,
    tick_period: Duration,
    ambient_c: f32,
}

impl Bench {
    /// Run one sampling window, integrating the plant after every tick.
    pub fn pump(&mut self) {
        for _ in 0..TICKS_PER_WINDOW {
            self.tick.tick();
            self.plant.advance(self.tick_period);
            self.clock.advance(self.tick_period);
        }
        if let Some(r) = &self.remote {
            r.advance(self.tick_period * TICKS_PER_WINDOW as u32, self.ambient_c);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    pub fn plant(&self) -> &SimulatedPlant {
        &self.plant
    }
}

pub struct Sim {
    pub bench: Bench,
    pub ctl: ThermalController,
    pub notes: CollectingNotifier,
    pub channels: Vec<ChannelCfg>,
}

pub fn probe_for(sensor: &thermal_config::SensorCfg) -> Probe {
    match *sensor {
        thermal_config::SensorCfg::Thermistor {
            beta,
            series_ohms,
            r25,
        } => Probe::thermistor(beta, series_ohms, r25),
        thermal_config::SensorCfg::Linear { gain, offset } => Probe::Linear { gain, offset },
    }
}

/// Build the configured system on a simulated plant (and remote board, when
/// any channel is remote). Heaters start at ambient.
pub fn assemble(cfg: &thermal_config::Config, stop: Arc<AtomicBool>) -> Result<Sim> {
    let channels = channels_from_config(cfg)?;
    let ambient_c = cfg.hardware.ambient_c;
    let plant = SimulatedPlant::new(ambient_c);
    let mut remote: Option<SimulatedRemote> = None;

    for (c, raw) in channels.iter().zip(&cfg.channels) {
        if c.is_local() {
            let probe = probe_for(&raw.sensor);
            let zone = match c.kind {
                ChannelKind::Bed => Zone::bed(c.input, c.heater_pin, probe),
                ChannelKind::Hotend(_) => Zone::hotend(c.input, c.heater_pin, probe),
            };
            plant
                .add_zone(zone)
                .wrap_err_with(|| format!("simulated {} zone", c.kind))?;
        } else {
            let id = c
                .kind
                .id()
                .ok_or_else(|| eyre::eyre!("{} has no channel number", c.kind))?;
            let board = remote.take().unwrap_or_else(|| {
                SimulatedRemote::new(
                    REMOTE_TAU,
                    Duration::from_millis(cfg.hardware.link_timeout_ms),
                )
            });
            remote = Some(board.with_channel(id.number(), ambient_c));
        }
    }

    let clock = ManualClock::new();
    let notes = CollectingNotifier::new();
    let mut builder = ThermalSystem::builder()
        .with_analog_input(plant.clone())
        .with_heater_outputs(plant.clone())
        .with_sampling((&cfg.sampling).into())
        .with_pid((&cfg.pid).into())
        .with_safety((&cfg.safety).into())
        .with_autotune((&cfg.autotune).into())
        .with_notifier((TracingNotifier, notes.clone()))
        .with_clock(Box::new(clock.clone()))
        .with_stop_check(move || stop.load(Ordering::SeqCst));
    if let Some(r) = &remote {
        builder = builder.with_remote(r.clone());
    }
    let Some((first, rest)) = channels.split_first() else {
        return Err(eyre::Report::new(BuildError::MissingChannels));
    };
    let mut builder = builder.with_channel(*first);
    for c in rest {
        builder = builder.with_channel(*c);
    }
    let (tick, ctl) = builder.build()?.into_parts();
    tracing::info!(
        channels = channels.len(),
        remote = remote.is_some(),
        tick_us = cfg.sampling.tick_us,
        ambient_c,
        "simulated board assembled"
    );

    Ok(Sim {
        bench: Bench {
            tick,
            plant,
            remote,
            clock,
            tick_period: Duration::from_micros(u64::from(cfg.sampling.tick_us)),
            ambient_c,
        },
        ctl,
        notes,
        channels,
    })
}

fn input_of(channels: &[ChannelCfg], ch: ChannelId) -> Option<u8> {
    channels
        .iter()
        .find(|c| c.kind.id() == Some(ch) && c.is_local())
        .map(|c| c.input)
}

// ── Output ───────────────────────────────────────────────────────────────────

fn print_status(t_s: f64, s: &ChannelStatus) {
    if json_mode() {
        println!(
            "{}",
            json!({
                "t_s": t_s,
                "channel": s.channel.number(),
                "kind": s.kind.to_string(),
                "celsius": s.celsius,
                "target_c": s.target_c,
                "power": s.power,
                "latched": s.latched,
            })
        );
    } else {
        let flag = if s.latched { " LATCHED" } else { "" };
        println!(
            "t={t_s:>7.1}s {:<10} {:>6.1}/{:>5.1} C @{:>3}{flag}",
            s.kind.to_string(),
            s.celsius,
            s.target_c,
            s.power
        );
    }
}

fn report(ctl: &mut ThermalController) {
    let t_s = ctl.now_ms() as f64 / 1000.0;
    match ctl.statuses() {
        Ok(all) => all.iter().for_each(|s| print_status(t_s, s)),
        Err(e) => tracing::warn!(error = %e, "status unavailable"),
    }
}

// ── Commands ─────────────────────────────────────────────────────────────────

/// Regulate toward `targets` for `seconds` of simulated time.
///
/// Ends early on stop or on the first latched fault; the latter is an error.
pub fn simulate(
    cfg: &thermal_config::Config,
    targets: &[TargetArg],
    seconds: u64,
    report_every: u64,
    open_probe: Option<ProbeFault>,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let mut sim = assemble(cfg, stop.clone())?;
    for t in targets {
        sim.ctl
            .set_target(t.channel, t.celsius)
            .wrap_err_with(|| format!("set target for channel {}", t.channel))?;
    }

    let fault = match open_probe {
        Some(f) => {
            let input = input_of(&sim.channels, f.channel).ok_or_else(|| {
                eyre::eyre!("--open-probe: channel {} is not a local heater", f.channel)
            })?;
            Some((input, Duration::from_secs(f.at_s)))
        }
        None => None,
    };

    let end_ms = seconds.saturating_mul(1000);
    let every_ms = report_every.saturating_mul(1000);
    let mut next_report_ms = every_ms;
    let mut injected = false;

    let Sim {
        bench, ctl, notes, ..
    } = &mut sim;
    let windows = runner::regulate(
        ctl,
        |_| {
            bench.pump();
            if let Some((input, at)) = fault
                && !injected
                && bench.elapsed() >= at
            {
                if let Err(e) = bench.plant().set_open(input, true) {
                    tracing::warn!(error = %e, "probe fault injection failed");
                }
                tracing::info!(input, "probe disconnected");
                injected = true;
            }
        },
        |ctl| {
            if stop.load(Ordering::SeqCst) || ctl.any_latched() {
                return false;
            }
            let now_ms = ctl.now_ms();
            if every_ms > 0 && now_ms >= next_report_ms {
                report(ctl);
                next_report_ms += every_ms;
            }
            now_ms < end_ms
        },
    );

    report(ctl);
    let faults: Vec<String> = notes.faults().iter().map(ToString::to_string).collect();
    tracing::info!(windows, faults = faults.len(), "simulation finished");
    if json_mode() {
        println!(
            "{}",
            json!({
                "windows": windows,
                "elapsed_s": ctl.now_ms() as f64 / 1000.0,
                "faults": faults,
            })
        );
    } else {
        println!("simulation finished after {windows} windows");
    }
    if ctl.any_latched() {
        return Err(eyre::Report::new(FaultLatched { faults }));
    }
    Ok(())
}

/// Relay autotune on `channel`; prints the gains and a `[pid]` snippet.
pub fn autotune(
    cfg: &thermal_config::Config,
    channel: ChannelId,
    target_c: f32,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let mut sim = assemble(cfg, stop)?;
    let Sim { bench, ctl, .. } = &mut sim;
    let result = runner::run_autotune(ctl, channel, target_c, |_| bench.pump())?;
    let gains = result.params(cfg.pid.ki_max);

    if json_mode() {
        println!(
            "{}",
            json!({
                "channel": channel.number(),
                "target_c": target_c,
                "ku": result.ku,
                "tu": result.tu,
                "kp": gains.kp,
                "ki": gains.ki,
                "kd": gains.kd,
                "elapsed_s": bench.elapsed().as_secs_f64(),
            })
        );
    } else {
        println!("Ku: {:.2} Tu: {:.2}", result.ku, result.tu);
        println!("Kp {:.2} Ki {:.2} Kd {:.2}", gains.kp, gains.ki, gains.kd);
        println!();
        println!("[pid]");
        println!("kp = {:.3}", gains.kp);
        println!("ki = {:.3}", gains.ki);
        println!("kd = {:.3}", gains.kd);
    }
    Ok(())
}

/// Sensors read near ambient and nothing latches over a few windows.
pub fn self_check(cfg: &thermal_config::Config, stop: Arc<AtomicBool>) -> Result<()> {
    const WINDOWS: u32 = 8;
    const TOLERANCE_C: f32 = 3.0;

    let mut sim = assemble(cfg, stop)?;
    for _ in 0..WINDOWS {
        sim.bench.pump();
        sim.ctl.manage();
    }
    if sim.ctl.any_latched() {
        let faults = sim.notes.faults().iter().map(ToString::to_string).collect();
        return Err(eyre::Report::new(FaultLatched { faults }));
    }
    let ambient = cfg.hardware.ambient_c;
    for s in sim.ctl.statuses()? {
        if (s.celsius - ambient).abs() > TOLERANCE_C {
            eyre::bail!(
                "self-check: {} reads {:.1} C at an ambient of {:.1} C",
                s.kind,
                s.celsius,
                ambient
            );
        }
    }

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        let pins: Vec<u8> = sim
            .channels
            .iter()
            .filter(|c| c.is_local())
            .map(|c| c.heater_pin)
            .collect();
        let _outputs = thermal_hardware::GpioHeaters::new(&pins)
            .map_err(eyre::Report::new)
            .wrap_err("open heater pins")?;
    }

    if json_mode() {
        println!("{}", json!({ "ok": true, "channels": sim.channels.len() }));
    } else {
        println!("self-check ok ({} channels)", sim.channels.len());
    }
    Ok(())
}
