//! Per-channel telemetry snapshot.

use crate::channel::{ChannelId, ChannelKind, RegulationMode};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStatus {
    pub channel: ChannelId,
    pub kind: ChannelKind,
    pub mode: RegulationMode,
    pub celsius: f32,
    pub target_c: f32,
    /// Duty in `0..=PID_MAX`.
    pub power: u8,
    pub latched: bool,
}
