//! Raw reading <-> temperature conversion.
//!
//! Thermistors are evaluated with the two-constant exponential model
//! `R = r_inf * exp(beta / T)` behind a series resistor, so any resistance and
//! exponent pair can be installed at runtime without a lookup table. Linear
//! amplifier outputs use `celsius = raw * gain + offset`.
//!
//! In raw space a hotter channel always reads higher, for both sensor kinds:
//! thermistor readings are inverted by the sampler (`FULL_SCALE - sum`), linear
//! readings are used as summed.

/// Full scale of one window: 16 summed 10-bit conversions.
pub const FULL_SCALE: u16 = 16383;
/// Absolute zero in degrees Celsius.
pub const ABS_ZERO: f32 = -273.15;
/// Reference temperature for the R25 representation, in kelvin.
pub const T25_KELVIN: f32 = 298.15;

/// Thermistor calibration in its raw `(beta, rs, r_inf)` form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermistorModel {
    pub beta: f32,
    /// Series (pull-up) resistor in ohms.
    pub series_ohms: f32,
    /// Extrapolated resistance at infinite temperature, in ohms.
    pub r_inf: f32,
}

impl ThermistorModel {
    pub const fn new(beta: f32, series_ohms: f32, r_inf: f32) -> Self {
        Self {
            beta,
            series_ohms,
            r_inf,
        }
    }

    /// Build from the datasheet triple `(beta, rs, R25)`.
    pub fn from_reference(beta: f32, series_ohms: f32, r25: f32) -> Self {
        let r_inf = f64::from(r25) * (-f64::from(beta) / f64::from(T25_KELVIN)).exp();
        Self::new(beta, series_ohms, r_inf as f32)
    }

    /// Resistance at 25 C; inverse of [`ThermistorModel::from_reference`].
    pub fn reference_resistance(&self) -> f32 {
        (f64::from(self.r_inf) / (-f64::from(self.beta) / f64::from(T25_KELVIN)).exp()) as f32
    }

    /// Whether all three constants are finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        [self.beta, self.series_ohms, self.r_inf]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }

    pub fn celsius_to_raw(&self, celsius: f32) -> u16 {
        let kelvin = f64::from(celsius) - f64::from(ABS_ZERO);
        if !kelvin.is_finite() || kelvin <= 0.0 {
            return 0;
        }
        let r = f64::from(self.r_inf) * (f64::from(self.beta) / kelvin).exp();
        let fs = f64::from(FULL_SCALE);
        let divided = (0.5 + fs * r / (r + f64::from(self.series_ohms))).floor();
        if !divided.is_finite() {
            return 0;
        }
        (fs - divided.clamp(0.0, fs)) as u16
    }

    pub fn raw_to_celsius(&self, raw: u16) -> f32 {
        let fs = f64::from(FULL_SCALE);
        let divided = fs - f64::from(raw.clamp(1, FULL_SCALE - 1));
        let r = divided * f64::from(self.series_ohms) / (fs - divided);
        let ln_ratio = (r / f64::from(self.r_inf)).ln();
        if !ln_ratio.is_finite() || ln_ratio <= 0.0 {
            return f32::INFINITY;
        }
        (f64::from(ABS_ZERO) + f64::from(self.beta) / ln_ratio) as f32
    }
}

impl Default for ThermistorModel {
    /// 100k NTC, beta 3960, 4.7k pull-up.
    fn default() -> Self {
        Self::from_reference(3960.0, 4700.0, 100_000.0)
    }
}

/// How a channel's summed reading maps to temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorKind {
    /// Divider with an NTC thermistor; polarity inverted by the sampler.
    Thermistor(ThermistorModel),
    /// Amplifier or thermocouple front end; polarity direct.
    Linear { gain: f32, offset: f32 },
}

impl SensorKind {
    /// Whether the sampler reports `FULL_SCALE - sum` instead of the sum.
    #[inline]
    pub fn inverted(&self) -> bool {
        matches!(self, Self::Thermistor(_))
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Self::Thermistor(m) => m.is_valid(),
            Self::Linear { gain, offset } => gain.is_finite() && *gain > 0.0 && offset.is_finite(),
        }
    }

    pub fn thermistor(&self) -> Option<&ThermistorModel> {
        match self {
            Self::Thermistor(m) => Some(m),
            Self::Linear { .. } => None,
        }
    }

    /// Temperature to raw units. Saturates instead of failing outside the
    /// model's domain.
    pub fn celsius_to_raw(&self, celsius: f32) -> u16 {
        match self {
            Self::Thermistor(m) => m.celsius_to_raw(celsius),
            Self::Linear { gain, offset } => {
                let raw = ((celsius - offset) / gain).round();
                if raw.is_nan() {
                    return 0;
                }
                raw.clamp(0.0, f32::from(FULL_SCALE)) as u16
            }
        }
    }

    pub fn raw_to_celsius(&self, raw: u16) -> f32 {
        match self {
            Self::Thermistor(m) => m.raw_to_celsius(raw),
            Self::Linear { gain, offset } => f32::from(raw) * gain + offset,
        }
    }
}

impl Default for SensorKind {
    fn default() -> Self {
        Self::Thermistor(ThermistorModel::default())
    }
}
