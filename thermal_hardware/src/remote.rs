//! Secondary board reached over a link, simulated in memory.
//!
//! Every channel regulates itself: its temperature approaches the target with
//! time constant `tau`. A call whose simulated latency exceeds the link
//! timeout, or any call while the link is offline, fails with
//! [`HwError::LinkTimeout`].
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thermal_traits::RemoteLink;

use crate::error::HwError;

type LinkResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, Copy)]
struct RemoteChannel {
    target_c: f32,
    celsius: f32,
    thermistor: (f32, f32, f32),
}

#[derive(Debug)]
struct Board {
    channels: BTreeMap<u8, RemoteChannel>,
    /// `None` while offline.
    latency: Option<Duration>,
    timeout: Duration,
    tau: Duration,
    calls: u64,
}

/// In-memory remote board. Clones share the board.
#[derive(Debug, Clone)]
pub struct SimulatedRemote {
    inner: Arc<Mutex<Board>>,
}

impl SimulatedRemote {
    pub fn new(tau: Duration, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Board {
                channels: BTreeMap::new(),
                latency: Some(Duration::ZERO),
                timeout,
                tau,
                calls: 0,
            })),
        }
    }

    /// Host `channel` (command-surface number) starting at `celsius`.
    #[must_use]
    pub fn with_channel(self, channel: u8, celsius: f32) -> Self {
        if let Ok(mut b) = self.inner.lock() {
            b.channels.insert(
                channel,
                RemoteChannel {
                    target_c: 0.0,
                    celsius,
                    thermistor: (3960.0, 4700.0, 0.0),
                },
            );
        }
        self
    }

    pub fn set_online(&self, online: bool) {
        if let Ok(mut b) = self.inner.lock() {
            b.latency = online.then_some(Duration::ZERO);
        }
        tracing::info!(online, "remote link state changed");
    }

    /// Response time of every following call.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut b) = self.inner.lock() {
            b.latency = Some(latency);
        }
    }

    /// Move every channel toward its target (or ambient when off).
    pub fn advance(&self, dt: Duration, ambient_c: f32) {
        let Ok(mut b) = self.inner.lock() else {
            return;
        };
        let tau = b.tau.as_secs_f32().max(f32::EPSILON);
        let k = (dt.as_secs_f32() / tau).min(1.0);
        for ch in b.channels.values_mut() {
            let goal = if ch.target_c > 0.0 {
                ch.target_c
            } else {
                ambient_c
            };
            ch.celsius += (goal - ch.celsius) * k;
        }
    }

    /// Link calls served so far, failed ones included.
    pub fn calls(&self) -> u64 {
        self.inner.lock().map(|b| b.calls).unwrap_or(0)
    }

    fn call<T>(&self, channel: u8, f: impl FnOnce(&mut RemoteChannel) -> T) -> LinkResult<T> {
        let mut b = self
            .inner
            .lock()
            .map_err(|_| HwError::Link("remote board state poisoned".into()))?;
        b.calls += 1;
        if !b.latency.is_some_and(|l| l <= b.timeout) {
            tracing::warn!(channel, timeout_ms = b.timeout.as_millis(), "remote link timeout");
            return Err(HwError::LinkTimeout.into());
        }
        let ch = b
            .channels
            .get_mut(&channel)
            .ok_or_else(|| HwError::Link(format!("channel {channel} not hosted")))?;
        Ok(f(ch))
    }
}

impl RemoteLink for SimulatedRemote {
    fn set_target(&mut self, channel: u8, celsius: f32) -> LinkResult<()> {
        self.call(channel, |ch| ch.target_c = celsius)
    }

    fn target(&mut self, channel: u8) -> LinkResult<f32> {
        self.call(channel, |ch| ch.target_c)
    }

    fn celsius(&mut self, channel: u8) -> LinkResult<f32> {
        self.call(channel, |ch| ch.celsius)
    }

    fn set_thermistor(&mut self, channel: u8, beta: f32, series_ohms: f32, r_inf: f32) -> LinkResult<()> {
        self.call(channel, |ch| ch.thermistor = (beta, series_ohms, r_inf))
    }

    fn thermistor(&mut self, channel: u8) -> LinkResult<(f32, f32, f32)> {
        self.call(channel, |ch| ch.thermistor)
    }
}
