mod common;

use std::thread;

use common::*;
use thermal_core::isr::TICKS_PER_WINDOW;
use thermal_core::sampling::Window;
use thermal_core::state::{self, new_shared};

#[test]
fn consumer_never_sees_a_torn_window() {
    let shared = new_shared();
    let writer_shared = shared.clone();
    const WINDOWS: u16 = 5_000;

    let writer = thread::spawn(move || {
        for k in 1..=WINDOWS {
            let v = Some(k);
            state::publish(&writer_shared, &Window { raw: [v, v, v, v] });
            if k % 64 == 0 {
                thread::yield_now();
            }
        }
    });

    let mut last_window = 0;
    let mut seen = 0u32;
    while !writer.is_finished() || state::snapshot(&shared).ready {
        if let Some(w) = state::take_window(&shared) {
            assert!(w.raw.iter().all(|r| *r == w.raw[0]), "torn window {:?}", w.raw);
            assert!(w.window > last_window, "window counter went backwards");
            last_window = w.window;
            seen += 1;
        }
    }
    writer.join().expect("writer thread");
    assert!(seen >= 1);
    assert_eq!(state::snapshot(&shared).window, u32::from(WINDOWS));
}

#[test]
fn one_window_per_window_of_ticks() {
    let mut rig = Rig::new(&[hotend()]);
    for _ in 0..TICKS_PER_WINDOW - 1 {
        rig.tick.tick();
    }
    assert!(!rig.ctl.manage(), "window is not complete yet");
    rig.tick.tick();
    assert!(rig.ctl.manage());
    assert!(!rig.ctl.manage(), "each window is consumed once");
    assert_eq!(rig.ctl.windows(), 1);

    rig.tick.run_window();
    assert_eq!(rig.tick.ticks(), 2 * TICKS_PER_WINDOW as u64);
    assert!(rig.ctl.manage());
}

#[test]
fn missed_windows_collapse_into_the_latest() {
    let mut rig = Rig::new(&[hotend()]);
    rig.read(HOT_INPUT, 100.0);
    rig.tick.run_window();
    rig.read(HOT_INPUT, 150.0);
    rig.tick.run_window();
    assert!(rig.ctl.manage());
    assert!(!rig.ctl.manage());
    assert!((rig.ctl.celsius(hot_id()).unwrap() - 150.0).abs() < 1.0);
}
