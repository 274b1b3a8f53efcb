//! Tick and window period helpers.

use crate::isr::TICKS_PER_WINDOW;

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Duration of one sampling window in microseconds.
/// - Clamps `tick_us` to at least 1.
#[inline]
pub fn window_us(tick_us: u32) -> u64 {
    u64::from(tick_us.max(1)) * TICKS_PER_WINDOW as u64
}

/// Duration of one sampling window in seconds; the PID timestep.
#[inline]
pub fn window_secs(tick_us: u32) -> f32 {
    (window_us(tick_us) as f64 / MICROS_PER_SEC as f64) as f32
}

/// Tick frequency in Hz, rounded down, at least 1.
#[inline]
pub fn tick_hz(tick_us: u32) -> u32 {
    u32::try_from(MICROS_PER_SEC / u64::from(tick_us.max(1)))
        .unwrap_or(u32::MAX)
        .max(1)
}
