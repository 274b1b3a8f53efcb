#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and thermistor calibration parsing for the heater controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The thermistor CSV loader enforces headers and fits a beta model with a
//!   single robust refit pass to reduce outlier influence.
use serde::Deserialize;

/// Zero Celsius in Kelvin.
const KELVIN_OFFSET: f64 = 273.15;
/// 25 °C in Kelvin, the reference point for `r25`.
const T25_KELVIN: f64 = 298.15;

/// Highest heater channel count a board can drive (bed plus three hotends).
pub const MAX_CHANNELS: usize = 4;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SamplingCfg {
    /// Timer tick period in microseconds; one window is 128 ticks.
    pub tick_us: u32,
}

impl Default for SamplingCfg {
    fn default() -> Self {
        Self { tick_us: 1024 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PidCfg {
    pub kp: f32,
    /// Integral gain per second.
    pub ki: f32,
    /// Derivative gain in seconds.
    pub kd: f32,
    /// Ceiling on the integral contribution, in duty units (0..=255).
    pub ki_max: f32,
    /// Half-width of the band around the setpoint where PID is active.
    pub band_c: f32,
    /// Derivative smoothing factor in [0, 1).
    pub k1: f32,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            kp: 12.0,
            ki: 2.2,
            kd: 80.0,
            ki_max: 125.0,
            band_c: 15.0,
            k1: 0.95,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Safety {
    /// Consecutive out-of-range windows before a heater latches off.
    pub debounce: u8,
    /// Bed range check cadence when the channel does not set its own.
    pub bed_check_interval_ms: u64,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            debounce: 3,
            bed_check_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AutotuneCfg {
    pub min_half_period_ms: u64,
    pub progress_interval_ms: u64,
    /// Abort when the reading exceeds target plus this margin.
    pub runaway_margin_c: f32,
    pub timeout_ms: u64,
    pub bias_margin: u8,
    pub cycles: u32,
}

impl Default for AutotuneCfg {
    fn default() -> Self {
        Self {
            min_half_period_ms: 5000,
            progress_interval_ms: 2000,
            runaway_margin_c: 20.0,
            timeout_ms: 10 * 60 * 1000,
            bias_margin: 20,
            cycles: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Bed,
    Hotend,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegulationMode {
    #[default]
    Pid,
    BangBang,
    Remote,
}

/// Temperature sensor description.
///
/// ```toml
/// [channels.sensor]
/// type = "thermistor"
/// beta = 3960.0
/// series_ohms = 4700.0
/// r25 = 100000.0
/// ```
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorCfg {
    Thermistor {
        beta: f32,
        series_ohms: f32,
        /// Resistance at 25 °C.
        r25: f32,
    },
    /// Linear sensor (thermocouple amplifier); `celsius = raw * gain + offset`.
    Linear { gain: f32, offset: f32 },
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self::Thermistor {
            beta: 3960.0,
            series_ohms: 4700.0,
            r25: 100_000.0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChannelCfg {
    pub kind: ChannelKind,
    /// Hotend number; ignored for the bed.
    #[serde(default)]
    pub index: Option<u8>,
    #[serde(default)]
    pub mode: RegulationMode,
    #[serde(default)]
    pub sensor: SensorCfg,
    /// Analog input the sensor is wired to.
    pub input: u8,
    pub heater_pin: u8,
    pub min_c: f32,
    pub max_c: f32,
    #[serde(default)]
    pub check_interval_ms: Option<u64>,
    /// Hard ceiling checked every window regardless of debounce.
    #[serde(default)]
    pub absolute_max_c: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// Max time to wait for the remote heater board before failing a call.
    pub link_timeout_ms: u64,
    /// Ambient temperature of the simulated plant.
    pub ambient_c: f32,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            link_timeout_ms: 50,
            ambient_c: 21.0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampling: SamplingCfg,
    #[serde(default)]
    pub pid: PidCfg,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub autotune: AutotuneCfg,
    pub channels: Vec<ChannelCfg>,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub hardware: Hardware,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sampling
        if self.sampling.tick_us < 100 {
            eyre::bail!("sampling.tick_us must be >= 100");
        }
        if self.sampling.tick_us > 100_000 {
            eyre::bail!("sampling.tick_us is unreasonably large (>100ms)");
        }

        // PID
        for (name, v) in [
            ("kp", self.pid.kp),
            ("ki", self.pid.ki),
            ("kd", self.pid.kd),
        ] {
            if !v.is_finite() || v < 0.0 {
                eyre::bail!("pid.{name} must be a finite value >= 0");
            }
        }
        if !(0.0..=255.0).contains(&self.pid.ki_max) {
            eyre::bail!("pid.ki_max must be in [0, 255]");
        }
        if !(self.pid.band_c > 0.0 && self.pid.band_c.is_finite()) {
            eyre::bail!("pid.band_c must be > 0");
        }
        if !(0.0..1.0).contains(&self.pid.k1) {
            eyre::bail!("pid.k1 must be in [0.0, 1.0)");
        }

        // Safety
        if self.safety.debounce == 0 {
            eyre::bail!("safety.debounce must be >= 1");
        }
        if self.safety.bed_check_interval_ms > 60 * 1000 {
            eyre::bail!("safety.bed_check_interval_ms is unreasonably large (>60s)");
        }

        // Autotune
        if self.autotune.timeout_ms == 0 {
            eyre::bail!("autotune.timeout_ms must be >= 1");
        }
        if self.autotune.progress_interval_ms == 0 {
            eyre::bail!("autotune.progress_interval_ms must be >= 1");
        }
        if !(self.autotune.runaway_margin_c > 0.0 && self.autotune.runaway_margin_c.is_finite()) {
            eyre::bail!("autotune.runaway_margin_c must be > 0");
        }
        if self.autotune.bias_margin >= 127 {
            eyre::bail!("autotune.bias_margin must be < 127");
        }
        if self.autotune.cycles < 3 {
            eyre::bail!("autotune.cycles must be >= 3");
        }

        // Channels
        if self.channels.is_empty() {
            eyre::bail!("channels must list at least one heater");
        }
        if self.channels.len() > MAX_CHANNELS {
            eyre::bail!("channels supports at most {MAX_CHANNELS} heaters");
        }
        let mut beds = 0usize;
        let mut hotends = [false; MAX_CHANNELS - 1];
        for (i, ch) in self.channels.iter().enumerate() {
            match ch.kind {
                ChannelKind::Bed => {
                    beds += 1;
                    if beds > 1 {
                        eyre::bail!("channels[{i}]: only one bed may be configured");
                    }
                }
                ChannelKind::Hotend => {
                    let Some(n) = ch.index else {
                        eyre::bail!("channels[{i}].index is required for a hotend");
                    };
                    let Some(seen) = hotends.get_mut(usize::from(n)) else {
                        eyre::bail!("channels[{i}].index must be < {}", MAX_CHANNELS - 1);
                    };
                    if *seen {
                        eyre::bail!("channels[{i}]: hotend {n} is configured twice");
                    }
                    *seen = true;
                }
            }
            if !(ch.min_c < ch.max_c && ch.max_c.is_finite()) {
                eyre::bail!("channels[{i}].min_c must be below max_c");
            }
            if let Some(abs) = ch.absolute_max_c
                && !abs.is_finite()
            {
                eyre::bail!("channels[{i}].absolute_max_c must be finite");
            }
            match ch.sensor {
                SensorCfg::Thermistor {
                    beta,
                    series_ohms,
                    r25,
                } => {
                    if !(beta > 0.0 && series_ohms > 0.0 && r25 > 0.0) {
                        eyre::bail!(
                            "channels[{i}].sensor: beta, series_ohms and r25 must be > 0"
                        );
                    }
                }
                SensorCfg::Linear { gain, offset } => {
                    if !(gain > 0.0 && offset.is_finite()) {
                        eyre::bail!("channels[{i}].sensor.gain must be > 0");
                    }
                }
            }
        }
        for (i, a) in self.channels.iter().enumerate() {
            if a.mode == RegulationMode::Remote {
                continue;
            }
            for b in self.channels.iter().skip(i + 1) {
                if b.mode == RegulationMode::Remote {
                    continue;
                }
                if a.heater_pin == b.heater_pin {
                    eyre::bail!("channels: heater_pin {} is used twice", a.heater_pin);
                }
                if a.input == b.input {
                    eyre::bail!("channels: input {} is used twice", a.input);
                }
            }
        }

        // Hardware
        if self.hardware.link_timeout_ms == 0 {
            eyre::bail!("hardware.link_timeout_ms must be >= 1");
        }
        if !self.hardware.ambient_c.is_finite() {
            eyre::bail!("hardware.ambient_c must be finite");
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}

/// Thermistor calibration CSV schema.
///
/// Expected headers:
/// celsius,ohms
///
/// Example:
/// celsius,ohms
/// 25.0,100000
/// 100.0,5827
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ThermistorRow {
    pub celsius: f32,
    pub ohms: f32,
}

/// Beta model fitted from measured `(celsius, ohms)` points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermistorFit {
    pub beta: f32,
    /// `R25 * exp(-beta / T25)`.
    pub r_inf: f32,
    /// Resistance at 25 °C implied by the fit.
    pub r25: f32,
    /// RMS residual of `ln(ohms)` over all rows.
    pub rms: f32,
}

impl ThermistorFit {
    /// Fit `ln R = ln r_inf + beta / T` by least squares, then refit once
    /// without rows whose residual exceeds two RMS.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn from_rows(rows: &[ThermistorRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("thermistor fit requires at least two rows, got {}", rows.len());
        }

        let mut pts: Vec<(f64, f64)> = Vec::with_capacity(rows.len());
        for (i, r) in rows.iter().enumerate() {
            let t = f64::from(r.celsius) + KELVIN_OFFSET;
            if !(t > 0.0 && t.is_finite()) {
                eyre::bail!("thermistor row {i}: celsius must be above absolute zero");
            }
            if !(r.ohms > 0.0 && r.ohms.is_finite()) {
                eyre::bail!("thermistor row {i}: ohms must be > 0");
            }
            pts.push((1.0 / t, f64::from(r.ohms).ln()));
        }
        for i in 1..rows.len() {
            if rows[..i]
                .iter()
                .any(|r| (r.celsius - rows[i].celsius).abs() < f32::EPSILON)
            {
                eyre::bail!("thermistor rows have duplicate celsius value at index {i}");
            }
        }

        let (a0, b0) = ols(&pts)?;
        let mut sumsq = 0.0f64;
        for (x, y) in &pts {
            let r = y - (a0 * x + b0);
            sumsq += r * r;
        }
        let rms = (sumsq / pts.len() as f64).sqrt();

        let (beta, ln_r_inf) = robust_refit(&pts, a0, b0, rms, 2.0).unwrap_or((a0, b0));
        if !(beta > 0.0 && beta < f64::from(f32::MAX)) {
            eyre::bail!("thermistor fit produced non-positive beta (resistance must fall with temperature)");
        }
        let r_inf = ln_r_inf.exp();
        let r25 = r_inf * (beta / T25_KELVIN).exp();
        if !(r_inf.is_finite() && r25.is_finite() && r_inf > 0.0) {
            eyre::bail!("thermistor fit produced non-finite resistance");
        }

        Ok(Self {
            beta: beta as f32,
            r_inf: r_inf as f32,
            r25: r25 as f32,
            rms: rms as f32,
        })
    }
}

impl TryFrom<&[ThermistorRow]> for ThermistorFit {
    type Error = eyre::Report;
    fn try_from(rows: &[ThermistorRow]) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

/// Ordinary least squares `y = a*x + b`.
#[allow(clippy::cast_precision_loss)]
fn ols(pts: &[(f64, f64)]) -> eyre::Result<(f64, f64)> {
    let n = pts.len() as f64;
    let mean_x = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for (px, py) in pts {
        let x = px - mean_x;
        sxx += x * x;
        sxy += x * (py - mean_y);
    }
    if !(sxx.is_finite() && sxx > 0.0) {
        eyre::bail!("thermistor fit cannot determine beta (degenerate temperature spread)");
    }
    let a = sxy / sxx;
    if !a.is_finite() {
        eyre::bail!("thermistor fit produced non-finite beta");
    }
    Ok((a, mean_y - a * mean_x))
}

/// Single-step robust refit: drop points with `|residual| > k * rms` around
/// `y = a0*x + b0` and refit the rest with an online (Welford/Chan) update.
/// `None` means the refit does not apply and the caller keeps `(a0, b0)`.
#[allow(clippy::cast_precision_loss)]
fn robust_refit(pts: &[(f64, f64)], a0: f64, b0: f64, rms: f64, k: f64) -> Option<(f64, f64)> {
    if !(rms.is_finite() && rms > 0.0 && k.is_finite() && k > 0.0) {
        return None;
    }
    let thr = k * rms;
    let mut n_in = 0usize;
    let mut mean_x = 0.0f64;
    let mut mean_y = 0.0f64;
    let mut cxx = 0.0f64;
    let mut cxy = 0.0f64;

    for &(x, y) in pts {
        if (y - (a0 * x + b0)).abs() > thr {
            continue;
        }
        n_in += 1;
        let n = n_in as f64;
        let dx = x - mean_x;
        let mean_x_new = mean_x + dx / n;
        let mean_y_new = mean_y + (y - mean_y) / n;
        cxx += dx * (x - mean_x_new);
        cxy += dx * (y - mean_y_new);
        mean_x = mean_x_new;
        mean_y = mean_y_new;
    }

    if n_in < 2 || n_in == pts.len() || !(cxx.is_finite() && cxx > 0.0) {
        return None;
    }
    let a = cxy / cxx;
    if !a.is_finite() {
        return None;
    }
    Some((a, mean_y - a * mean_x))
}

pub fn load_thermistor_csv(path: &std::path::Path) -> eyre::Result<ThermistorFit> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open thermistor CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["celsius", "ohms"];
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != expected {
        eyre::bail!(
            "thermistor CSV must have headers 'celsius,ohms', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<ThermistorRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }

    ThermistorFit::from_rows(&rows)
}
