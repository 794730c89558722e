use crate::config::SweepSettings;
use crate::error::SweepError;
use crate::models::{Candle, TimeSeries};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const MARKET_DATA_SNAPSHOT_VERSION: u32 = 1;
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of raw candles for one symbol at one resolution.
pub trait SeriesProvider {
    fn load(&self, symbol: &str, resolution: &str) -> Result<Vec<Candle>, SweepError>;
}

fn series_key(symbol: &str, resolution: &str) -> String {
    format!("{}_{}", symbol.trim().to_ascii_uppercase(), resolution.trim())
}

/// Reads `{data_dir}/{SYMBOL}_{resolution}.csv` files.
#[derive(Debug, Clone)]
pub struct CsvDirectoryProvider {
    data_dir: PathBuf,
}

impl CsvDirectoryProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn path_for(&self, symbol: &str, resolution: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.csv", series_key(symbol, resolution)))
    }
}

impl SeriesProvider for CsvDirectoryProvider {
    fn load(&self, symbol: &str, resolution: &str) -> Result<Vec<Candle>, SweepError> {
        let path = self.path_for(symbol, resolution);
        let candles = read_candles_csv(&path, symbol)?;
        validate_series(symbol, &candles)?;
        Ok(candles)
    }
}

#[derive(Debug, Deserialize)]
struct CsvCandle {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

pub fn read_candles_csv(path: &Path, symbol: &str) -> Result<Vec<Candle>, SweepError> {
    let file = File::open(path).map_err(|error| {
        SweepError::data_unavailable(symbol, format!("cannot open {}: {}", path.display(), error))
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let mut candles = Vec::new();
    for (row, record) in reader.deserialize::<CsvCandle>().enumerate() {
        let record = record.map_err(|error| {
            SweepError::data_unavailable(
                symbol,
                format!("{} row {}: {}", path.display(), row + 1, error),
            )
        })?;
        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| {
            SweepError::data_unavailable(
                symbol,
                format!(
                    "{} row {}: unrecognized timestamp `{}`",
                    path.display(),
                    row + 1,
                    record.timestamp
                ),
            )
        })?;
        candles.push(Candle {
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }
    Ok(candles)
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, NAIVE_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Non-empty and strictly increasing in time.
pub fn validate_series(symbol: &str, candles: &[Candle]) -> Result<(), SweepError> {
    if candles.is_empty() {
        return Err(SweepError::data_unavailable(symbol, "series is empty"));
    }
    if let Some(pair) = candles
        .windows(2)
        .find(|pair| pair[1].timestamp <= pair[0].timestamp)
    {
        return Err(SweepError::data_unavailable(
            symbol,
            format!(
                "timestamps not strictly increasing at {} -> {}",
                pair[0].timestamp, pair[1].timestamp
            ),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    version: u32,
    generated_at: DateTime<Utc>,
    series: BTreeMap<String, Vec<Candle>>,
}

impl MarketSnapshot {
    pub fn new() -> Self {
        Self {
            version: MARKET_DATA_SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            series: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, symbol: &str, resolution: &str, candles: Vec<Candle>) {
        self.series.insert(series_key(symbol, resolution), candles);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SweepError> {
        let path = path.as_ref();
        info!("Loading market data snapshot from {}", path.display());
        let unavailable = |reason: String| {
            SweepError::data_unavailable("snapshot", format!("{}: {}", path.display(), reason))
        };

        let file = File::open(path).map_err(|error| unavailable(error.to_string()))?;
        let snapshot: MarketSnapshot = bincode::deserialize_from(BufReader::new(file))
            .map_err(|error| unavailable(format!("decode failed: {}", error)))?;

        if snapshot.version != MARKET_DATA_SNAPSHOT_VERSION {
            return Err(unavailable(format!(
                "version mismatch (found {}, expected {})",
                snapshot.version, MARKET_DATA_SNAPSHOT_VERSION
            )));
        }
        info!(
            "Snapshot generated at {} holds {} series",
            snapshot.generated_at(),
            snapshot.keys().count()
        );
        Ok(snapshot)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SweepError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|error| SweepError::persistence(parent, error))?;
            }
        }

        let file = File::create(path).map_err(|error| SweepError::persistence(path, error))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)
            .map_err(|error| SweepError::persistence(path, error))?;
        writer
            .flush()
            .map_err(|error| SweepError::persistence(path, error))?;
        Ok(())
    }
}

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves series packed by `export-market-data`.
pub struct SnapshotProvider {
    snapshot: MarketSnapshot,
}

impl SnapshotProvider {
    pub fn new(snapshot: MarketSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SweepError> {
        Ok(Self::new(MarketSnapshot::load_from_file(path)?))
    }
}

impl SeriesProvider for SnapshotProvider {
    fn load(&self, symbol: &str, resolution: &str) -> Result<Vec<Candle>, SweepError> {
        let key = series_key(symbol, resolution);
        let candles = self.snapshot.series.get(&key).ok_or_else(|| {
            SweepError::data_unavailable(symbol, format!("snapshot has no series {}", key))
        })?;
        validate_series(symbol, candles)?;
        Ok(candles.clone())
    }
}

/// Load every symbol up front. A missing primary series aborts; a missing
/// confirmation series only disables the second timeframe for that symbol.
pub fn load_series(
    provider: &dyn SeriesProvider,
    symbols: &[String],
    settings: &SweepSettings,
) -> Result<Vec<TimeSeries>, SweepError> {
    let mut datasets = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let mut primary = provider.load(symbol, &settings.primary_resolution)?;
        if let Some(limit) = settings.max_candles {
            primary.truncate(limit);
        }

        let mut series = TimeSeries::new(symbol.clone(), primary);
        if let Some(resolution) = &settings.confirmation_resolution {
            match provider.load(symbol, resolution) {
                Ok(confirmation) => series = series.with_confirmation(confirmation),
                Err(error) => warn!("No confirmation series for {}: {}", symbol, error),
            }
        }

        info!(
            "Loaded {} {} candles for {}{}",
            series.len(),
            settings.primary_resolution,
            symbol,
            series
                .confirmation
                .as_ref()
                .map(|c| format!(" (+{} confirmation candles)", c.len()))
                .unwrap_or_default()
        );
        datasets.push(series);
    }
    Ok(datasets)
}
