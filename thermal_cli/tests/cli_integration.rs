use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

const BOARD: &str = r#"
[sampling]
tick_us = 1024

[safety]
debounce = 3
bed_check_interval_ms = 5000

[[channels]]
kind = "hotend"
index = 0
input = 0
heater_pin = 4
min_c = 5.0
max_c = 275.0

[[channels]]
kind = "bed"
mode = "bang_bang"
input = 1
heater_pin = 3
min_c = 5.0
max_c = 150.0
absolute_max_c = 160.0

[hardware]
ambient_c = 21.0
"#;

fn write_config(dir: &tempfile::TempDir, toml: &str) -> PathBuf {
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "self-check ok (2 channels)", "stdout")]
#[case(&["simulate", "--target", "e0=200", "--seconds", "20", "--report-every", "0"], 0, "simulation finished", "stdout")]
#[case(&["simulate", "--target", "e0=200", "--seconds", "30", "--open-probe", "e0@5"], 5, "MINTEMP", "stderr")]
#[case(&["simulate", "--target", "nozzle=200"], 2, "unknown channel", "stderr")]
#[case(&["convert", "--channel", "e0", "--celsius", "200"], 0, "raw", "stdout")]
#[case(&["convert"], 1, "convert needs --csv FILE", "stderr")]
#[case(&["autotune", "--channel", "e2", "--target", "100"], 1, "no such channel", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, BOARD);

    let mut cmd = Command::cargo_bin("thermal").unwrap();
    cmd.arg("--log-level").arg("warn").arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn autotune_prints_gains_and_pid_table() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, BOARD);

    let mut cmd = Command::cargo_bin("thermal").unwrap();
    cmd.arg("--log-level")
        .arg("warn")
        .arg("--config")
        .arg(&cfg)
        .arg("autotune")
        .arg("--channel")
        .arg("e0")
        .arg("--target")
        .arg("150");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Kp "))
        .stdout(predicate::str::contains("[pid]"));
}

#[rstest]
fn missing_config_is_explained() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("thermal").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("self-check");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Could not load the configuration"));
}

#[rstest]
fn invalid_channel_range_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, &BOARD.replacen("max_c = 275.0", "max_c = 2.0", 1));
    let mut cmd = Command::cargo_bin("thermal").unwrap();
    cmd.arg("--config").arg(&cfg).arg("self-check");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("channels[0].min_c must be below max_c"));
}

#[rstest]
fn cli_reports_bad_thermistor_header() {
    let dir = tempdir().unwrap();
    let bad_csv = dir.path().join("table.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "temp,resistance").unwrap();
    writeln!(f, "25,100000").unwrap();
    writeln!(f, "100,5827").unwrap();

    let mut cmd = Command::cargo_bin("thermal").unwrap();
    cmd.arg("convert").arg("--csv").arg(&bad_csv);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn fitted_table_prints_sensor_snippet() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("table.csv");
    fs::write(
        &csv,
        "celsius,ohms\n0,329500\n25,100000\n50,35900\n100,6710\n150,1770\n200,596\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("thermal").unwrap();
    cmd.arg("convert").arg("--csv").arg(&csv).arg("--series-ohms").arg("4700");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("[channels.sensor]"))
        .stdout(predicate::str::contains("series_ohms = 4700.0"));
}
