use rstest::rstest;
use thermal_core::error::BuildError;
use thermal_core::mocks::{PinLog, SharedAdc};
use thermal_core::{
    ChannelCfg, ChannelKind, PidCfg, PidParams, RegulationMode, SafetyCfg, SensorKind,
    ThermalSystem,
};

fn hotend(n: u8, input: u8, pin: u8) -> ChannelCfg {
    ChannelCfg::hotend(n, SensorKind::default(), input, pin)
}

fn invalid_message(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => *msg,
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[test]
fn missing_analog_input_yields_typed_error() {
    let err = ThermalSystem::builder()
        .with_heater_outputs(PinLog::new())
        .with_channel(hotend(0, 0, 4))
        .try_build()
        .expect_err("should fail with MissingAnalogInput");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingAnalogInput)
    ));
}

#[test]
fn missing_heater_outputs_yields_typed_error() {
    let err = ThermalSystem::builder()
        .with_analog_input(SharedAdc::new())
        .try_build()
        .expect_err("should fail with MissingHeaterOutputs");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingHeaterOutputs)
    ));
}

#[test]
fn no_channels_yields_typed_error() {
    let err = ThermalSystem::builder()
        .with_analog_input(SharedAdc::new())
        .with_heater_outputs(PinLog::new())
        .try_build()
        .expect_err("should fail with MissingChannels");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingChannels)
    ));
}

#[rstest]
#[case::duplicate(vec![hotend(0, 0, 4), hotend(0, 1, 5)], "duplicate channel")]
#[case::shared_pin(vec![hotend(0, 0, 4), hotend(1, 1, 4)], "heater pins must be unique")]
#[case::shared_input(vec![hotend(0, 0, 4), hotend(1, 0, 5)], "analog inputs must be unique")]
#[case::bad_index(vec![hotend(3, 0, 4)], "extruder index must be < 3")]
#[case::inverted_range(vec![hotend(0, 0, 4).with_range(200.0, 100.0)], "min_c must be below max_c")]
#[case::bad_sensor(
    vec![ChannelCfg::hotend(0, SensorKind::Linear { gain: 0.0, offset: 0.0 }, 0, 4)],
    "sensor constants must be finite and > 0"
)]
#[case::remote_without_link(
    vec![hotend(1, 0, 4).with_mode(RegulationMode::Remote)],
    "remote channel requires a remote link"
)]
fn invalid_channel_sets(#[case] channels: Vec<ChannelCfg>, #[case] expected: &str) {
    let mut b = ThermalSystem::builder()
        .with_analog_input(SharedAdc::new())
        .with_heater_outputs(PinLog::new())
        .with_channel(channels[0]);
    for c in &channels[1..] {
        b = b.with_channel(*c);
    }
    let err = b.build().expect_err("should reject");
    assert_eq!(invalid_message(&err), expected);
}

#[test]
fn fifth_channel_overflows() {
    let b = ThermalSystem::builder()
        .with_analog_input(SharedAdc::new())
        .with_heater_outputs(PinLog::new())
        .with_channel(ChannelCfg::bed(SensorKind::default(), 0, 3))
        .with_channel(hotend(0, 1, 4))
        .with_channel(hotend(1, 2, 5))
        .with_channel(hotend(2, 3, 6))
        .with_channel(hotend(2, 4, 7));
    let err = b.build().expect_err("five channels");
    assert_eq!(invalid_message(&err), "at most 4 channels are supported");
}

#[test]
fn invalid_pid_and_safety_are_rejected() {
    let err = ThermalSystem::builder()
        .with_analog_input(SharedAdc::new())
        .with_heater_outputs(PinLog::new())
        .with_channel(hotend(0, 0, 4))
        .with_pid(PidCfg {
            gains: PidParams {
                kp: -1.0,
                ..PidParams::default()
            },
            ..PidCfg::default()
        })
        .build()
        .expect_err("negative kp");
    assert_eq!(invalid_message(&err), "pid gains must be finite and >= 0");

    let err = ThermalSystem::builder()
        .with_analog_input(SharedAdc::new())
        .with_heater_outputs(PinLog::new())
        .with_channel(hotend(0, 0, 4))
        .with_safety(SafetyCfg {
            debounce: 0,
            ..SafetyCfg::default()
        })
        .build()
        .expect_err("zero debounce");
    assert_eq!(invalid_message(&err), "debounce must be >= 1");
}

#[test]
fn full_board_builds_with_bed_first() {
    let system = ThermalSystem::builder()
        .with_analog_input(SharedAdc::new())
        .with_heater_outputs(PinLog::new())
        .with_channel(hotend(0, 0, 4))
        .with_channel(hotend(1, 2, 5))
        .with_channel(ChannelCfg::bed(SensorKind::default(), 1, 3))
        .build()
        .expect("valid board");
    let kinds: Vec<ChannelKind> = system
        .controller
        .channel_ids()
        .map(|id| system.controller.channel_cfg(id).expect("cfg").kind)
        .collect();
    assert_eq!(
        kinds,
        vec![ChannelKind::Bed, ChannelKind::Hotend(0), ChannelKind::Hotend(1)]
    );
}
