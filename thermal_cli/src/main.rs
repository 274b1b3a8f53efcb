mod cli;
mod error_fmt;
mod sim;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("error reporter unavailable: {e}");
    }

    let code = match run(cli) {
        Ok(()) => 0,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            if cli::json_mode() {
                println!("{}", format_error_json(&err));
            } else {
                eprintln!("{}", humanize(&err));
            }
            exit_code_for_error(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    // `convert --csv` works without a config file.
    if let Commands::Convert {
        csv: Some(path),
        series_ohms,
        ..
    } = &cli.cmd
    {
        init_tracing(cli.json, &cli.log_level, None)?;
        return convert_csv(path, *series_ohms);
    }

    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, Some(&cfg.logging))?;
    tracing::info!(config = %cli.config.display(), channels = cfg.channels.len(), "config loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
        }) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    match cli.cmd {
        Commands::Simulate {
            targets,
            seconds,
            report_every,
            open_probe,
        } => sim::simulate(&cfg, &targets, seconds, report_every, open_probe, shutdown),
        Commands::Autotune { channel, target } => sim::autotune(&cfg, channel.0, target, shutdown),
        Commands::Convert {
            channel,
            celsius,
            raw,
            ..
        } => convert_channel(&cfg, channel, celsius, raw),
        Commands::SelfCheck => sim::self_check(&cfg, shutdown),
    }
}

fn load_config(path: &Path) -> Result<thermal_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg: thermal_config::Config =
        toml::from_str(&text).wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Console layer on stderr (pretty or JSON) plus an optional file layer.
///
/// `RUST_LOG` overrides `--log-level` for the console; the file layer uses
/// `[logging] level` and always writes JSON lines.
fn init_tracing(json: bool, level: &str, logging: Option<&thermal_config::Logging>) -> Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid --log-level '{level}'"))?;
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };

    let file = match logging.and_then(|l| l.file.as_deref().map(|f| (l, f))) {
        Some((l, path)) => {
            let path = Path::new(path);
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name"))?;
            let appender = match l.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let filter = EnvFilter::try_new(l.level.as_deref().unwrap_or("info"))
                .wrap_err("invalid logging.level")?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(filter)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}

fn convert_csv(path: &Path, series_ohms: f32) -> Result<()> {
    if !(series_ohms.is_finite() && series_ohms > 0.0) {
        eyre::bail!("--series-ohms must be > 0");
    }
    let fit = thermal_config::load_thermistor_csv(path)?;
    tracing::info!(beta = fit.beta, r25 = fit.r25, rms = fit.rms, "thermistor fitted");
    if cli::json_mode() {
        println!(
            "{}",
            serde_json::json!({
                "beta": fit.beta,
                "r25": fit.r25,
                "r_inf": fit.r_inf,
                "series_ohms": series_ohms,
                "rms": fit.rms,
            })
        );
    } else {
        println!("beta = {:.1}  r25 = {:.1}  r_inf = {:.6e}  rms = {:.4}", fit.beta, fit.r25, fit.r_inf, fit.rms);
        println!();
        println!("[channels.sensor]");
        println!("type = \"thermistor\"");
        println!("beta = {:.1}", fit.beta);
        println!("series_ohms = {series_ohms:.1}");
        println!("r25 = {:.1}", fit.r25);
    }
    Ok(())
}

fn convert_channel(
    cfg: &thermal_config::Config,
    channel: Option<cli::ChannelArg>,
    celsius: Option<f32>,
    raw: Option<u16>,
) -> Result<()> {
    let Some(cli::ChannelArg(id)) = channel else {
        eyre::bail!("convert needs --csv FILE, or --channel with --celsius or --raw");
    };
    let channels = thermal_core::conversions::channels_from_config(cfg)?;
    let ch = channels
        .iter()
        .find(|c| c.kind.id() == Some(id))
        .ok_or_else(|| eyre::eyre!("channel {id} is not configured"))?;
    let sensor = ch.sensor;

    let (c, r) = match (celsius, raw) {
        (Some(c), None) => (c, sensor.celsius_to_raw(c)),
        (None, Some(r)) => (sensor.raw_to_celsius(r), r),
        _ => eyre::bail!("convert needs exactly one of --celsius or --raw"),
    };
    if cli::json_mode() {
        println!(
            "{}",
            serde_json::json!({ "channel": id.number(), "celsius": c, "raw": r })
        );
    } else {
        println!("channel {id}: {c:.2} C <-> raw {r}");
    }
    Ok(())
}
