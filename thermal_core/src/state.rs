//! State shared between the tick handler and the main loop.
//!
//! Every access from either side is one short `critical_section::with`
//! span. The tick side is the only writer of raw readings and the ready
//! flag; the main loop is the only writer of duties and the heat-enable
//! predicate.
use std::cell::RefCell;
use std::sync::Arc;

use critical_section::Mutex;

use crate::channel::MAX_CHANNELS;
use crate::sampling::Window;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThermalSystemState {
    /// Last published raw average per channel.
    pub raw: [u16; MAX_CHANNELS],
    /// Set once per window, cleared once by the consumer.
    pub ready: bool,
    /// Number of windows published so far.
    pub window: u32,
    pub duty: [u8; MAX_CHANNELS],
    pub heat_enable: bool,
}

pub type Shared = Mutex<RefCell<ThermalSystemState>>;

pub fn new_shared() -> Arc<Shared> {
    Arc::new(Mutex::new(RefCell::new(ThermalSystemState::default())))
}

/// Raw readings of one drained window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub raw: [u16; MAX_CHANNELS],
    pub window: u32,
}

/// Commit a finished window. The ready flag is raised last, inside the same
/// critical section as the raw writes.
pub fn publish(shared: &Shared, window: &Window) {
    critical_section::with(|cs| {
        let mut s = shared.borrow_ref_mut(cs);
        for (dst, src) in s.raw.iter_mut().zip(window.raw.iter()) {
            if let Some(v) = src {
                *dst = *v;
            }
        }
        s.window = s.window.wrapping_add(1);
        s.ready = true;
    });
}

/// Drain the ready flag and copy the readings out, or `None` if no new
/// window has been published since the last call.
pub fn take_window(shared: &Shared) -> Option<WindowSnapshot> {
    critical_section::with(|cs| {
        let mut s = shared.borrow_ref_mut(cs);
        if !s.ready {
            return None;
        }
        s.ready = false;
        Some(WindowSnapshot {
            raw: s.raw,
            window: s.window,
        })
    })
}

pub fn store_outputs(shared: &Shared, duty: [u8; MAX_CHANNELS], heat_enable: bool) {
    critical_section::with(|cs| {
        let mut s = shared.borrow_ref_mut(cs);
        s.duty = duty;
        s.heat_enable = heat_enable;
    });
}

pub fn load_outputs(shared: &Shared) -> ([u8; MAX_CHANNELS], bool) {
    critical_section::with(|cs| {
        let s = shared.borrow_ref(cs);
        (s.duty, s.heat_enable)
    })
}

pub fn snapshot(shared: &Shared) -> ThermalSystemState {
    critical_section::with(|cs| shared.borrow_ref(cs).clone())
}
