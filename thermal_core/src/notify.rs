//! Upward notifications: latched faults and autotune reports.
//!
//! Each notification renders as one human-readable line. Fault
//! notifications are suppressed by the controller while the outer firmware
//! reports itself stopped; autotune lines are always delivered.
use core::fmt;
use std::sync::{Arc, Mutex};

use crate::autotune::{AutotuneResult, CycleReport};
use crate::channel::{ChannelId, ChannelKind};
use crate::error::AutotuneError;

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    MaxTemp {
        channel: ChannelId,
        kind: ChannelKind,
    },
    MinTemp {
        channel: ChannelId,
        kind: ChannelKind,
    },
    /// Debounced range fault on an interval-checked channel (the bed).
    BedFault { channel: ChannelId },
    /// Immediate cut-off above the channel's absolute maximum.
    BedMaxTemp { channel: ChannelId, celsius: f32 },
    AutotuneStarted { channel: ChannelId, target_c: f32 },
    AutotuneProgress {
        channel: ChannelId,
        celsius: f32,
        power: u8,
    },
    AutotuneCycle(CycleReport),
    AutotuneFinished(AutotuneResult),
    AutotuneFailed(AutotuneError),
}

impl Notification {
    /// Latched safety faults, as opposed to autotune reports.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::MaxTemp { .. } | Self::MinTemp { .. } | Self::BedFault { .. } | Self::BedMaxTemp { .. }
        )
    }

    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            Self::MaxTemp { channel, .. }
            | Self::MinTemp { channel, .. }
            | Self::BedFault { channel }
            | Self::BedMaxTemp { channel, .. }
            | Self::AutotuneStarted { channel, .. }
            | Self::AutotuneProgress { channel, .. } => Some(*channel),
            Self::AutotuneFailed(AutotuneError::ChannelUnavailable(channel)) => Some(*channel),
            _ => None,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxTemp { channel, kind } => {
                write!(f, "{channel}: {kind} switched off, MAXTEMP triggered")
            }
            Self::MinTemp { channel, kind } => {
                write!(f, "{channel}: {kind} switched off, MINTEMP triggered")
            }
            Self::BedFault { channel } => {
                write!(f, "{channel}: bed switched off, temperature error triggered")
            }
            Self::BedMaxTemp { channel, celsius } => write!(
                f,
                "{channel}: heated bed switched off, MAXTEMP triggered at {celsius:.1} C"
            ),
            Self::AutotuneStarted { channel, target_c } => {
                write!(f, "PID autotune start: channel {channel} target {target_c:.1} C")
            }
            Self::AutotuneProgress {
                celsius, power, ..
            } => write!(f, "ok T:{celsius:.1} @:{power}"),
            Self::AutotuneCycle(c) => {
                write!(
                    f,
                    " bias: {} d: {} min: {:.2} max: {:.2}",
                    c.bias, c.swing, c.min_c, c.max_c
                )?;
                if let Some(e) = c.estimate {
                    write!(f, " Ku: {:.2} Tu: {:.2}", e.ku, e.tu)?;
                }
                Ok(())
            }
            Self::AutotuneFinished(r) => write!(
                f,
                "PID autotune finished: Kp {:.2} Ki {:.2} Kd {:.2}",
                r.kp, r.ki, r.kd
            ),
            Self::AutotuneFailed(e) => write!(f, "PID autotune failed: {e}"),
        }
    }
}

pub trait Notifier {
    fn notify(&mut self, n: &Notification);
}

/// Renders every notification through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&mut self, n: &Notification) {
        let channel = n.channel().map(ChannelId::number);
        match n {
            _ if n.is_fault() => tracing::error!(?channel, "{n}"),
            Notification::AutotuneFailed(_) => tracing::warn!(?channel, "{n}"),
            Notification::AutotuneProgress { .. } | Notification::AutotuneCycle(_) => {
                tracing::debug!(?channel, "{n}");
            }
            _ => tracing::info!(?channel, "{n}"),
        }
    }
}

/// Keeps every notification; clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct CollectingNotifier {
    log: Arc<Mutex<Vec<Notification>>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.log.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn faults(&self) -> Vec<Notification> {
        self.snapshot().into_iter().filter(Notification::is_fault).collect()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&mut self, n: &Notification) {
        if let Ok(mut g) = self.log.lock() {
            g.push(n.clone());
        }
    }
}

/// Fan out to two notifiers.
impl<A: Notifier, B: Notifier> Notifier for (A, B) {
    fn notify(&mut self, n: &Notification) {
        self.0.notify(n);
        self.1.notify(n);
    }
}
