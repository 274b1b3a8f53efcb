//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

use thermal_core::ChannelId;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "thermal", version, about = "Heater thermal-control CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/thermal_config.toml")]
    pub config: PathBuf,

    /// Log as JSON lines and print results as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Regulate the configured heaters against a simulated plant
    Simulate {
        /// Setpoint for one channel, e.g. `bed=60` or `e0=210` (repeatable)
        #[arg(long = "target", value_name = "CH=C")]
        targets: Vec<TargetArg>,
        /// Simulated run length in seconds
        #[arg(long, value_name = "S", default_value_t = 300)]
        seconds: u64,
        /// Print channel status every this many simulated seconds (0 = only at the end)
        #[arg(long, value_name = "S", default_value_t = 10)]
        report_every: u64,
        /// Disconnect a channel's probe at a simulated time, e.g. `e0@30`
        #[arg(long, value_name = "CH@S")]
        open_probe: Option<ProbeFault>,
    },
    /// Relay-feedback PID autotune on the simulated plant
    Autotune {
        /// Channel to tune (`bed`, `e0`..`e2`)
        #[arg(long, default_value = "e0")]
        channel: ChannelArg,
        /// Temperature to oscillate around
        #[arg(long, value_name = "C")]
        target: f32,
    },
    /// Fit a thermistor table, or convert between raw and degrees for a channel
    Convert {
        /// `celsius,ohms` table to fit a beta model to
        #[arg(long, value_name = "FILE", conflicts_with_all = ["channel", "celsius", "raw"])]
        csv: Option<PathBuf>,
        /// Pull-up resistor used with the fitted thermistor
        #[arg(long, value_name = "OHMS", default_value_t = 4700.0)]
        series_ohms: f32,
        /// Channel whose configured sensor to use
        #[arg(long)]
        channel: Option<ChannelArg>,
        /// Temperature to convert to raw units
        #[arg(long, value_name = "C", conflicts_with = "raw")]
        celsius: Option<f32>,
        /// Raw window value to convert to degrees
        #[arg(long, value_name = "RAW")]
        raw: Option<u16>,
    },
    /// Quick health check (config, sensors at ambient, no latched faults)
    SelfCheck,
}

/// Channel named on the command line: `bed`, `e0`..`e2`, or a raw number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelArg(pub ChannelId);

impl FromStr for ChannelArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let id = if s == "bed" {
            Some(ChannelId::BED)
        } else if let Some(n) = s.strip_prefix('e') {
            n.parse::<u8>().ok().and_then(ChannelId::hotend)
        } else {
            s.parse::<u8>().ok().and_then(ChannelId::new)
        };
        id.map(Self)
            .ok_or_else(|| format!("unknown channel '{s}' (expected bed, e0, e1, e2 or 0..3)"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetArg {
    pub channel: ChannelId,
    pub celsius: f32,
}

impl FromStr for TargetArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ch, c) = s
            .split_once('=')
            .ok_or_else(|| format!("expected CH=C, got '{s}'"))?;
        let ChannelArg(channel) = ch.parse()?;
        let celsius: f32 = c
            .trim()
            .parse()
            .map_err(|_| format!("invalid temperature '{c}'"))?;
        Ok(Self { channel, celsius })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeFault {
    pub channel: ChannelId,
    pub at_s: u64,
}

impl FromStr for ProbeFault {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ch, t) = s
            .split_once('@')
            .ok_or_else(|| format!("expected CH@S, got '{s}'"))?;
        let ChannelArg(channel) = ch.parse()?;
        let at_s = t
            .trim()
            .parse()
            .map_err(|_| format!("invalid time '{t}'"))?;
        Ok(Self { channel, at_s })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names() {
        assert_eq!("bed".parse::<ChannelArg>().unwrap().0, ChannelId::BED);
        assert_eq!("E1".parse::<ChannelArg>().unwrap().0.number(), 2);
        assert_eq!("3".parse::<ChannelArg>().unwrap().0.number(), 3);
        assert!("e3".parse::<ChannelArg>().is_err());
        assert!("nozzle".parse::<ChannelArg>().is_err());
    }

    #[test]
    fn target_and_fault_args() {
        let t: TargetArg = "e0=215.5".parse().unwrap();
        assert_eq!(t.channel.number(), 1);
        assert!((t.celsius - 215.5).abs() < f32::EPSILON);
        assert!("bed:60".parse::<TargetArg>().is_err());

        let f: ProbeFault = "bed@30".parse().unwrap();
        assert_eq!(f, ProbeFault { channel: ChannelId::BED, at_s: 30 });
    }

    #[test]
    fn parses_simulate_invocation() {
        let cli = Cli::try_parse_from([
            "thermal", "--json", "simulate", "--target", "bed=60", "--target", "e0=200", "--seconds", "5",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.cmd {
            Commands::Simulate { targets, seconds, .. } => {
                assert_eq!(targets.len(), 2);
                assert_eq!(seconds, 5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
