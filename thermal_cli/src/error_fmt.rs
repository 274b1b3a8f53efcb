//! Human-readable error descriptions and structured JSON error formatting.

use crate::sim::FaultLatched;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use thermal_core::error::{AutotuneError, BuildError, ThermalError};

    // Typed matches first
    if let Some(ae) = err.downcast_ref::<AutotuneError>() {
        return match ae {
            AutotuneError::Runaway { celsius, limit } => format!(
                "What happened: Autotune aborted, temperature reached {celsius:.1} C (limit {limit:.1} C).\nLikely causes: Heater far stronger than the relay swing can balance, or a sensor reading low.\nHow to fix: Tune at a lower target or raise autotune.runaway_margin_c, and check the thermistor constants."
            ),
            AutotuneError::Timeout { minutes } => format!(
                "What happened: Autotune timed out, no relay cycle completed within {minutes} minutes.\nLikely causes: Heater disconnected or too weak to reach the target, or a sensor not attached to the heated block.\nHow to fix: Check heater wiring and the target; raise autotune.timeout_ms for slow beds."
            ),
            AutotuneError::ChannelUnavailable(ch) => format!(
                "What happened: Channel {ch} cannot be tuned.\nLikely causes: The channel is remote, not configured, or has a latched fault.\nHow to fix: Pick a local channel from [[channels]] and clear faults first."
            ),
            AutotuneError::NoOscillation => {
                "What happened: Autotune saw no temperature swing.\nLikely causes: Sensor not responding or heater output not switching.\nHow to fix: Run `thermal self-check` and verify the sensor and heater pin.".to_string()
            }
        };
    }

    if let Some(fl) = err.downcast_ref::<FaultLatched>() {
        let list = if fl.faults.is_empty() {
            String::from("(no details)")
        } else {
            fl.faults.join("; ")
        };
        return format!(
            "What happened: A heater was shut off by the range monitor: {list}.\nLikely causes: MINTEMP means an open or shorted thermistor; MAXTEMP means runaway heating or a wrong sensor model.\nHow to fix: Check sensor wiring and the [channels.sensor] constants, then restart."
        );
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingAnalogInput => {
                "What happened: No analog input was provided to the thermal system.\nLikely causes: The ADC backend failed to initialize or was not wired into the builder.\nHow to fix: Ensure the analog input is created successfully and passed via with_analog_input(...).".to_string()
            }
            BuildError::MissingHeaterOutputs => {
                "What happened: No heater outputs were provided to the thermal system.\nLikely causes: GPIO backend failed to initialize or was not wired into the builder.\nHow to fix: Ensure heater outputs are created successfully and passed via with_heater_outputs(...).".to_string()
            }
            BuildError::MissingChannels => {
                "What happened: No heater channels are configured.\nLikely causes: The config has no [[channels]] entries.\nHow to fix: Add at least one [[channels]] table to the config.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/thermal_config.toml for a sample."
            ),
        };
    }

    if let Some(te) = err.downcast_ref::<ThermalError>() {
        if matches!(te, ThermalError::Timeout) {
            return "What happened: The remote heater board did not answer in time.\nLikely causes: Link cable unplugged, board unpowered, or timeout too low.\nHow to fix: Check the link, and consider increasing hardware.link_timeout_ms in the config.".to_string();
        }
        return format!(
            "What happened: {te}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("thermistor csv must have headers") {
        return "Invalid headers in thermistor CSV. Expected 'celsius,ohms'.".to_string();
    }

    if lower.contains("read config") || lower.contains("parse config") {
        let cause = err.root_cause();
        return format!(
            "What happened: Could not load the configuration ({msg}).\nLikely causes: Wrong --config path or a TOML syntax error. Cause: {cause}\nHow to fix: Pass --config <FILE> pointing at a valid TOML file."
        );
    }

    if lower.contains("channels") || lower.contains("pid.") || lower.contains("sampling.") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range values or conflicting channels.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("gpio") || lower.contains("heater pins") {
        return "What happened: Failed to initialize heater pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix heater_pin in [[channels]]; ensure the process has permission to access GPIO.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes for the failures scripts care about; everything else is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use thermal_core::error::AutotuneError;
    if let Some(ae) = err.downcast_ref::<AutotuneError>() {
        return match ae {
            AutotuneError::Runaway { .. } => 3,
            AutotuneError::Timeout { .. } => 4,
            AutotuneError::ChannelUnavailable(_) | AutotuneError::NoOscillation => 1,
        };
    }
    if err.downcast_ref::<FaultLatched>().is_some() {
        return 5;
    }
    1
}

pub fn reason_name(err: &eyre::Report) -> &'static str {
    use thermal_core::error::AutotuneError;
    match err.downcast_ref::<AutotuneError>() {
        Some(AutotuneError::Runaway { .. }) => "AutotuneRunaway",
        Some(AutotuneError::Timeout { .. }) => "AutotuneTimeout",
        Some(AutotuneError::ChannelUnavailable(_)) => "ChannelUnavailable",
        Some(AutotuneError::NoOscillation) => "NoOscillation",
        None if err.downcast_ref::<FaultLatched>().is_some() => "FaultLatched",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({ "reason": reason_name(err), "message": humanize(err) });
    if let Some(fl) = err.downcast_ref::<FaultLatched>() {
        obj["details"] = json!({ "faults": fl.faults });
    }
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermal_core::error::AutotuneError;

    #[test]
    fn autotune_errors_have_stable_codes() {
        let runaway = eyre::Report::new(AutotuneError::Runaway {
            celsius: 231.0,
            limit: 220.0,
        });
        assert_eq!(exit_code_for_error(&runaway), 3);
        assert!(humanize(&runaway).contains("231.0 C"));

        let timeout = eyre::Report::new(AutotuneError::Timeout { minutes: 10 });
        assert_eq!(exit_code_for_error(&timeout), 4);
        assert_eq!(reason_name(&timeout), "AutotuneTimeout");
    }

    #[test]
    fn latched_fault_lists_notifications() {
        let err = eyre::Report::new(FaultLatched {
            faults: vec!["1: extruder 0 switched off, MINTEMP triggered".into()],
        });
        assert_eq!(exit_code_for_error(&err), 5);
        assert!(humanize(&err).contains("MINTEMP"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "FaultLatched");
        assert_eq!(v["details"]["faults"][0], "1: extruder 0 switched off, MINTEMP triggered");
    }

    #[test]
    fn wrapped_errors_still_downcast() {
        use eyre::WrapErr;
        let r: eyre::Result<()> =
            Err(eyre::Report::new(AutotuneError::Timeout { minutes: 1 })).wrap_err("autotune");
        let err = r.unwrap_err();
        assert_eq!(exit_code_for_error(&err), 4);
    }

    #[test]
    fn unknown_errors_fall_back() {
        let err = eyre::eyre!("something odd");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).starts_with("Something went wrong."));
    }
}
