//! Drivers that tie the two halves of a [`ThermalSystem`] together.
//!
//! On a host the tick handler runs on a [`TimerTask`] thread while the
//! controller is pumped from the caller's loop. Simulations instead step both
//! halves from one thread through the `pump` closure.
use std::time::Duration;

use thermal_traits::clock::Clock;

use crate::autotune::{AutotuneResult, AutotuneStatus};
use crate::builder::ThermalSystem;
use crate::channel::ChannelId;
use crate::controller::ThermalController;
use crate::error::Result;
use crate::isr::TickHandler;
use crate::timer::TimerTask;

/// Run the tick handler on its own thread at `tick_us`.
///
/// The returned task stops and joins the thread when dropped.
pub fn spawn_ticker<C>(mut tick: TickHandler, tick_us: u32, clock: C) -> TimerTask
where
    C: Clock + Send + Sync + 'static,
{
    let period = Duration::from_micros(u64::from(tick_us.max(1)));
    tracing::info!(tick_us, hz = crate::util::tick_hz(tick_us), "tick thread starting");
    TimerTask::spawn(period, clock, move || tick.tick())
}

/// Split a system and start its tick thread; the controller stays with the caller.
pub fn start<C>(system: ThermalSystem, tick_us: u32, clock: C) -> (TimerTask, ThermalController)
where
    C: Clock + Send + Sync + 'static,
{
    let (tick, controller) = system.into_parts();
    (spawn_ticker(tick, tick_us, clock), controller)
}

/// Regulate until `keep_going` returns false, calling `pump` between windows.
///
/// `pump` is where time passes: a sleep on real hardware, a plant step plus
/// `TickHandler::run_window` in a simulation. Returns the windows managed.
pub fn regulate<P, K>(controller: &mut ThermalController, mut pump: P, mut keep_going: K) -> u64
where
    P: FnMut(&mut ThermalController),
    K: FnMut(&mut ThermalController) -> bool,
{
    let start = controller.windows();
    while keep_going(controller) {
        pump(controller);
        controller.manage();
    }
    controller.windows() - start
}

/// Drive a relay autotune to completion.
///
/// Errors with [`crate::error::AutotuneError`] (inside the report) when the
/// session fails; heaters are off in every terminal case.
pub fn run_autotune<P>(
    controller: &mut ThermalController,
    ch: ChannelId,
    target_c: f32,
    mut pump: P,
) -> Result<AutotuneResult>
where
    P: FnMut(&mut ThermalController),
{
    let mut tuner = controller.start_autotune(ch, target_c)?;
    loop {
        pump(controller);
        match controller.autotune_step(&mut tuner)? {
            AutotuneStatus::Running { .. } => {}
            AutotuneStatus::Done(result) => {
                tracing::info!(
                    channel = %ch,
                    kp = result.kp,
                    ki = result.ki,
                    kd = result.kd,
                    "autotune finished"
                );
                return Ok(result);
            }
            AutotuneStatus::Failed(err) => {
                tracing::warn!(channel = %ch, error = %err, "autotune failed");
                return Err(eyre::Report::new(err));
            }
        }
    }
}
