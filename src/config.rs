use crate::error::SweepError;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

pub const SETTINGS_PREFIX: &str = "TUNER_";
pub const DEFAULT_SYMBOL: &str = "EURUSD";
pub const ALL_PAIRS: [&str; 7] = [
    "EURUSD", "USDJPY", "GBPUSD", "USDCHF", "AUDUSD", "NZDUSD", "USDCAD",
];

/// Position sizing and balance settings shared by every simulated run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    pub lot_size: f64,
    pub pip_value: f64,
    pub initial_balance: f64,
}

impl SimulationSettings {
    /// Fixed multiplier converting a price move into account currency.
    pub fn position_scale(&self) -> f64 {
        self.lot_size * self.pip_value
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            lot_size: 0.01,
            pip_value: 100_000.0,
            initial_balance: 400.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    pub simulation: SimulationSettings,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub primary_resolution: String,
    pub confirmation_resolution: Option<String>,
    pub max_candles: Option<usize>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            simulation: SimulationSettings::default(),
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            primary_resolution: "5_M".to_string(),
            confirmation_resolution: Some("30_M".to_string()),
            max_candles: None,
        }
    }
}

impl SweepSettings {
    /// Read `TUNER_*` variables from the process environment.
    pub fn from_env() -> Result<Self, SweepError> {
        let settings: HashMap<String, String> = env::vars()
            .filter(|(key, _)| key.starts_with(SETTINGS_PREFIX))
            .collect();
        Self::from_settings_map(&settings)
    }

    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self, SweepError> {
        let defaults = Self::default();
        let lot_size = setting_f64(
            settings,
            "TUNER_LOT_SIZE",
            defaults.simulation.lot_size,
            Some(f64::MIN_POSITIVE),
            None,
        )?;
        let pip_value = setting_f64(
            settings,
            "TUNER_PIP_VALUE",
            defaults.simulation.pip_value,
            Some(f64::MIN_POSITIVE),
            None,
        )?;
        let initial_balance = setting_f64(
            settings,
            "TUNER_INITIAL_BALANCE",
            defaults.simulation.initial_balance,
            Some(0.0),
            None,
        )?;
        let data_dir = setting_str(settings, "TUNER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let output_dir = setting_str(settings, "TUNER_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);
        let primary_resolution = setting_str(settings, "TUNER_PRIMARY_RESOLUTION")
            .map(str::to_string)
            .unwrap_or(defaults.primary_resolution);

        // Present but empty disables the confirmation timeframe.
        let confirmation_resolution = match settings.get("TUNER_CONFIRMATION_RESOLUTION") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().to_string()),
            None => defaults.confirmation_resolution,
        };
        let max_candles = setting_usize(settings, "TUNER_MAX_CANDLES", 1)?;

        Ok(Self {
            simulation: SimulationSettings {
                lot_size,
                pip_value,
                initial_balance,
            },
            data_dir,
            output_dir,
            primary_resolution,
            confirmation_resolution,
            max_candles,
        })
    }
}

fn setting_str<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    default: f64,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<f64, SweepError> {
    let Some(raw) = setting_str(settings, key) else {
        return Ok(default);
    };
    let value = raw.parse::<f64>().map_err(|_| {
        SweepError::configuration(format!("Setting {} must be a number (value: {})", key, raw))
    })?;
    if !value.is_finite() {
        return Err(SweepError::configuration(format!(
            "Setting {} must be finite (value: {})",
            key, raw
        )));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(SweepError::configuration(format!(
                "Setting {} must be >= {} (value: {})",
                key, min_value, raw
            )));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(SweepError::configuration(format!(
                "Setting {} must be <= {} (value: {})",
                key, max_value, raw
            )));
        }
    }
    Ok(value)
}

fn setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    min: usize,
) -> Result<Option<usize>, SweepError> {
    let Some(raw) = setting_str(settings, key) else {
        return Ok(None);
    };
    let value = raw.parse::<usize>().map_err(|_| {
        SweepError::configuration(format!(
            "Setting {} must be a non-negative integer (value: {})",
            key, raw
        ))
    })?;
    if value < min {
        return Err(SweepError::configuration(format!(
            "Setting {} must be >= {} (value: {})",
            key, min, raw
        )));
    }
    Ok(Some(value))
}
