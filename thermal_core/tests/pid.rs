use proptest::prelude::*;
use thermal_core::{PID_MAX, PidCfg, PidParams, PidRegulator, PidState};

const WINDOW_S: f32 = 0.131;

fn regulator() -> PidRegulator {
    PidRegulator::new(&PidCfg::default(), WINDOW_S)
}

#[test]
fn integral_is_capped_under_sustained_error() {
    let r = regulator();
    let mut s = PidState::default();
    for _ in 0..10_000 {
        r.compute(&mut s, 200.0, 190.0);
    }
    assert!((s.integral() - r.integral_limit()).abs() < 1e-3);
    let ki_max = r.gains().ki_max;
    assert!(s.terms().i <= ki_max + 1e-3, "i {} > {ki_max}", s.terms().i);
}

#[test]
fn integral_never_goes_negative() {
    let r = regulator();
    let mut s = PidState::default();
    for _ in 0..100 {
        r.compute(&mut s, 200.0, 205.0);
    }
    assert_eq!(s.integral(), 0.0);
}

#[test]
fn leaving_the_band_resets_the_integral_on_reentry() {
    let r = regulator();
    let mut s = PidState::default();
    for _ in 0..50 {
        r.compute(&mut s, 200.0, 195.0);
    }
    assert!(s.integral() > 0.0);
    assert_eq!(r.compute(&mut s, 200.0, 100.0), PID_MAX);
    assert!(s.reset_pending());
    r.compute(&mut s, 200.0, 199.0);
    assert!(!s.reset_pending());
    assert!((s.integral() - 1.0).abs() < 1e-4);
}

#[test]
fn rising_temperature_pulls_output_down() {
    let r = regulator();
    let mut steady = PidState::default();
    let mut rising = PidState::default();
    r.compute(&mut steady, 200.0, 195.0);
    r.compute(&mut rising, 200.0, 193.0);
    let a = r.compute(&mut steady, 200.0, 195.0);
    let b = r.compute(&mut rising, 200.0, 195.0);
    assert!(b < a, "rising {b} should be below steady {a}");
}

#[test]
fn zero_gains_give_zero_output_in_band() {
    let mut r = regulator();
    r.set_gains(PidParams {
        kp: 0.0,
        ki: 0.0,
        kd: 0.0,
        ki_max: 0.0,
    });
    let mut s = PidState::default();
    assert_eq!(r.compute(&mut s, 200.0, 195.0), 0);
}

proptest! {
    #[test]
    fn band_bypass_is_bang_bang(set in 20.0f32..300.0, off in 15.5f32..200.0) {
        let r = regulator();
        let mut s = PidState::default();
        prop_assert_eq!(r.compute(&mut s, set, set - off), PID_MAX);
        prop_assert_eq!(r.compute(&mut s, set, set + off), 0);
    }

    #[test]
    fn duty_stays_bounded_for_huge_gains(
        readings in proptest::collection::vec(0.0f32..400.0, 1..200),
        kp in 0.0f32..1.0e6,
        ki in 0.0f32..1.0e4,
        kd in 0.0f32..1.0e6,
    ) {
        let mut r = regulator();
        r.set_gains(PidParams { kp, ki, kd, ki_max: 255.0 });
        let mut s = PidState::default();
        for t in readings {
            let duty = r.compute(&mut s, 200.0, t);
            prop_assert!(duty <= PID_MAX);
            prop_assert!(t >= 185.0 || duty == PID_MAX);
        }
    }

    #[test]
    fn integral_stays_within_limits(
        errors in proptest::collection::vec(-15.0f32..15.0, 1..400),
        kp in 0.0f32..50.0,
        ki in 0.01f32..10.0,
        kd in 0.0f32..200.0,
        ki_max in 0.0f32..255.0,
    ) {
        let mut r = regulator();
        r.set_gains(PidParams { kp, ki, kd, ki_max });
        let mut s = PidState::default();
        for e in errors {
            r.compute(&mut s, 200.0, 200.0 - e);
            prop_assert!(s.integral() >= 0.0);
            prop_assert!(s.integral() <= r.integral_limit() + 1e-3);
        }
    }
}
