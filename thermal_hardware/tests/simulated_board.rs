use std::time::Duration;

use rstest::rstest;
use thermal_hardware::{ADC_MAX, HwError, Probe, SimulatedPlant, SimulatedRemote, Zone};
use thermal_traits::{AnalogInput, HeaterOutputs, RemoteLink};

fn board() -> SimulatedPlant {
    let plant = SimulatedPlant::new(21.0);
    plant.add_zone(Zone::hotend(0, 4, Probe::default())).unwrap();
    plant.add_zone(Zone::bed(1, 3, Probe::default())).unwrap();
    plant
}

#[test]
fn zones_start_at_ambient() {
    let plant = board();
    assert_eq!(plant.celsius(0), Some(21.0));
    assert_eq!(plant.celsius(1), Some(21.0));
    assert_eq!(plant.celsius(7), None);
}

#[test]
fn heater_pin_only_heats_its_zone() {
    let plant = board();
    let mut pins = plant.clone();
    pins.set(3, true);
    plant.advance(Duration::from_secs(30));
    assert!(plant.celsius(1).unwrap() > 35.0);
    assert!((plant.celsius(0).unwrap() - 21.0).abs() < 1e-3);
    assert!(plant.heater_on(3));
    assert!(!plant.heater_on(4));
}

#[test]
fn full_power_settles_at_equilibrium() {
    let plant = board();
    let mut pins = plant.clone();
    pins.set(4, true);
    for _ in 0..2000 {
        plant.advance(Duration::from_millis(500));
    }
    let t = plant.celsius(0).unwrap();
    // ambient + heat_rate / loss
    assert!((t - (21.0 + 4.0 / 0.015)).abs() < 2.0, "t={t}");
}

#[test]
fn readings_track_temperature() {
    let plant = board();
    let mut adc = plant.clone();
    let cold = adc.read_conversion(0);
    plant.set_celsius(0, 200.0).unwrap();
    let hot = adc.read_conversion(0);
    assert!(hot < cold);
    assert_eq!(hot, Probe::default().counts(200.0));
}

#[rstest]
#[case::thermistor(Probe::default(), ADC_MAX)]
#[case::linear(Probe::Linear { gain: 0.0625, offset: 0.0 }, 0)]
fn open_probe_reads_rail(#[case] probe: Probe, #[case] expected: u16) {
    let plant = SimulatedPlant::new(21.0);
    plant.add_zone(Zone::hotend(2, 5, probe)).unwrap();
    plant.set_open(2, true).unwrap();
    let mut adc = plant.clone();
    assert_eq!(adc.read_conversion(2), expected);
    plant.set_open(2, false).unwrap();
    assert_ne!(adc.read_conversion(2), expected);
}

#[test]
fn unknown_zone_is_an_error() {
    let plant = board();
    assert!(matches!(plant.set_celsius(9, 50.0), Err(HwError::Gpio(_))));
}

fn remote() -> SimulatedRemote {
    SimulatedRemote::new(Duration::from_secs(10), Duration::from_millis(50))
}

#[test]
fn remote_channel_approaches_target() {
    let mut remote = remote().with_channel(2, 21.0);
    remote.set_target(2, 200.0).unwrap();
    for _ in 0..100 {
        remote.advance(Duration::from_secs(1), 21.0);
    }
    let t = remote.celsius(2).unwrap();
    assert!((t - 200.0).abs() < 1.0, "t={t}");
    assert_eq!(remote.target(2).unwrap(), 200.0);
}

#[test]
fn remote_keeps_thermistor_constants() {
    let mut remote = remote().with_channel(1, 21.0);
    remote.set_thermistor(1, 4092.0, 4700.0, 0.0166).unwrap();
    assert_eq!(remote.thermistor(1).unwrap(), (4092.0, 4700.0, 0.0166));
}

#[test]
fn offline_link_times_out() {
    let mut remote = remote().with_channel(1, 21.0);
    remote.set_online(false);
    let err = remote.celsius(1).unwrap_err();
    let hw = err.downcast_ref::<HwError>().expect("typed hardware error");
    assert!(matches!(hw, HwError::LinkTimeout));
    assert_eq!(remote.calls(), 1);
}

#[test]
fn unhosted_channel_is_a_link_error() {
    let mut remote = remote().with_channel(1, 21.0);
    let err = remote.set_target(3, 50.0).unwrap_err();
    assert!(err.to_string().contains("channel 3 not hosted"));
}

#[rstest]
#[case::fast(10, true)]
#[case::at_limit(50, true)]
#[case::slow(51, false)]
fn latency_against_link_timeout(#[case] latency_ms: u64, #[case] ok: bool) {
    let mut remote = remote().with_channel(0, 21.0);
    remote.set_latency(Duration::from_millis(latency_ms));
    assert_eq!(remote.target(0).is_ok(), ok);
}
