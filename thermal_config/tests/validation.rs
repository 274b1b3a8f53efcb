use rstest::rstest;
use thermal_config::{ChannelKind, RegulationMode, SensorCfg, load_toml};

const CHANNELS: &str = r#"
[[channels]]
kind = "hotend"
index = 0
mode = "pid"
input = 0
heater_pin = 4
min_c = 5.0
max_c = 275.0

[channels.sensor]
type = "thermistor"
beta = 3960.0
series_ohms = 4700.0
r25 = 100000.0

[[channels]]
kind = "bed"
mode = "bang_bang"
input = 1
heater_pin = 3
min_c = 5.0
max_c = 150.0
check_interval_ms = 5000
absolute_max_c = 160.0
"#;

fn with_channels(extra: &str) -> String {
    format!("{extra}\n{CHANNELS}")
}

#[test]
fn full_config_parses_and_validates() {
    let toml = with_channels(
        r#"
[sampling]
tick_us = 1024

[pid]
kp = 22.2
ki = 1.08
kd = 114.0
ki_max = 125.0

[safety]
debounce = 3

[logging]
level = "debug"
rotation = "daily"
"#,
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");

    assert_eq!(cfg.channels.len(), 2);
    assert_eq!(cfg.channels[0].kind, ChannelKind::Hotend);
    assert_eq!(cfg.channels[1].mode, RegulationMode::BangBang);
    assert_eq!(cfg.channels[1].absolute_max_c, Some(160.0));
    assert!(matches!(
        cfg.channels[0].sensor,
        SensorCfg::Thermistor { beta, .. } if (beta - 3960.0).abs() < f32::EPSILON
    ));
    assert!((cfg.pid.kd - 114.0).abs() < f32::EPSILON);
    assert_eq!(cfg.autotune.cycles, 5);
}

#[test]
fn linear_sensor_is_accepted() {
    let toml = r#"
[[channels]]
kind = "hotend"
index = 1
input = 2
heater_pin = 5
min_c = 0.0
max_c = 400.0

[channels.sensor]
type = "linear"
gain = 0.0625
offset = 0.0
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("linear sensor is valid");
    assert_eq!(
        cfg.channels[0].sensor,
        SensorCfg::Linear {
            gain: 0.0625,
            offset: 0.0
        }
    );
}

#[test]
fn missing_channels_fails_to_parse() {
    assert!(load_toml("[sampling]\ntick_us = 1024\n").is_err());
}

#[test]
fn unknown_mode_fails_to_parse() {
    let toml = CHANNELS.replace("mode = \"pid\"", "mode = \"fuzzy\"");
    assert!(load_toml(&toml).is_err());
}

#[rstest]
#[case("[sampling]\ntick_us = 10", "sampling.tick_us must be >= 100")]
#[case("[pid]\nkp = -1.0", "pid.kp must be a finite value >= 0")]
#[case("[pid]\nki_max = 300.0", "pid.ki_max must be in [0, 255]")]
#[case("[pid]\nk1 = 1.0", "pid.k1 must be in [0.0, 1.0)")]
#[case("[pid]\nband_c = 0.0", "pid.band_c must be > 0")]
#[case("[safety]\ndebounce = 0", "safety.debounce must be >= 1")]
#[case("[autotune]\ntimeout_ms = 0", "autotune.timeout_ms must be >= 1")]
#[case("[autotune]\nbias_margin = 127", "autotune.bias_margin must be < 127")]
#[case("[autotune]\ncycles = 2", "autotune.cycles must be >= 3")]
#[case("[hardware]\nlink_timeout_ms = 0", "hardware.link_timeout_ms must be >= 1")]
#[case("[logging]\nrotation = \"weekly\"", "logging.rotation must be one of")]
fn rejects_out_of_range_fields(#[case] section: &str, #[case] message: &str) {
    let cfg = load_toml(&with_channels(section)).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(message),
        "expected `{message}` in `{err}`"
    );
}

#[rstest]
#[case("max_c = 275.0", "max_c = 1.0", "channels[0].min_c must be below max_c")]
#[case("index = 0", "index = 3", "channels[0].index must be < 3")]
#[case("heater_pin = 3", "heater_pin = 4", "heater_pin 4 is used twice")]
#[case("input = 1", "input = 0", "input 0 is used twice")]
#[case("beta = 3960.0", "beta = 0.0", "channels[0].sensor")]
fn rejects_bad_channels(#[case] from: &str, #[case] to: &str, #[case] message: &str) {
    let toml = CHANNELS.replacen(from, to, 1);
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(message),
        "expected `{message}` in `{err}`"
    );
}

#[test]
fn hotend_requires_index() {
    let toml = CHANNELS.replacen("index = 0\n", "", 1);
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(format!("{err}").contains("channels[0].index is required"));
}

#[test]
fn remote_channels_may_share_pins() {
    let toml = format!(
        "{CHANNELS}\n{}",
        r#"
[[channels]]
kind = "hotend"
index = 1
mode = "remote"
input = 0
heater_pin = 4
min_c = 5.0
max_c = 275.0
"#
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("remote channels do not claim local pins");
}

#[test]
fn more_than_four_channels_rejected() {
    let mut toml = String::from(CHANNELS);
    for n in 1..=3 {
        toml.push_str(&format!(
            "\n[[channels]]\nkind = \"hotend\"\nindex = {n}\ninput = {}\nheater_pin = {}\nmin_c = 5.0\nmax_c = 275.0\n",
            n + 4,
            n + 10
        ));
    }
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("five channels");
    assert!(format!("{err}").contains("at most 4"));
}
