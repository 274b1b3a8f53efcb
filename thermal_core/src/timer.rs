//! Host stand-in for the hardware timer interrupt.
//!
//! Spawns one thread that calls a tick closure at a fixed period. The
//! thread is shut down and joined when the `TimerTask` is dropped.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use thermal_traits::clock::Clock;

pub struct TimerTask {
    ticks: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl TimerTask {
    pub fn spawn<F, C>(period: Duration, clock: C, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let ticks = Arc::new(AtomicU64::new(0));
        let ticks_clone = ticks.clone();

        let join_handle = std::thread::spawn(move || {
            let mut next = clock.now();
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("timer thread received shutdown signal");
                    break;
                }
                tick();
                ticks_clone.fetch_add(1, Ordering::Relaxed);

                next += period;
                let now = clock.now();
                if next > now {
                    clock.sleep(next - now);
                } else {
                    // Overran: restart the schedule from now.
                    next = now;
                    std::thread::yield_now();
                }
            }
            tracing::trace!("timer thread exiting cleanly");
        });

        Self {
            ticks,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Ticks delivered so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TimerTask {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("timer thread joined successfully");
                }
                Err(e) => {
                    tracing::warn!(?e, "timer thread panicked during shutdown");
                }
            }
        }
    }
}
