use crate::config::SweepSettings;
use crate::data::{CsvDirectoryProvider, MarketSnapshot, SeriesProvider};
use anyhow::{Context, Result};
use log::{info, warn};
use std::path::Path;

/// Pack CSV series for `symbols` into a snapshot usable with `sweep --data-file`.
pub fn run(settings: &SweepSettings, symbols: &[String], output_path: &Path) -> Result<()> {
    info!(
        "Generating market data snapshot at {}",
        output_path.display()
    );
    let provider = CsvDirectoryProvider::new(&settings.data_dir);
    let mut snapshot = MarketSnapshot::new();

    for symbol in symbols {
        let primary = provider
            .load(symbol, &settings.primary_resolution)
            .with_context(|| format!("Cannot export {}", symbol))?;
        info!(
            "{}: {} {} candles",
            symbol,
            primary.len(),
            settings.primary_resolution
        );
        snapshot.insert(symbol, &settings.primary_resolution, primary);

        if let Some(resolution) = &settings.confirmation_resolution {
            match provider.load(symbol, resolution) {
                Ok(candles) => {
                    info!("{}: {} {} candles", symbol, candles.len(), resolution);
                    snapshot.insert(symbol, resolution, candles);
                }
                Err(error) => warn!("Skipping {} confirmation series: {}", symbol, error),
            }
        }
    }

    let keys: Vec<&str> = snapshot.keys().collect();
    info!("Snapshot series: {}", keys.join(", "));
    snapshot.save_to_file(output_path)?;
    info!(
        "Market data snapshot successfully written to {}",
        output_path.display()
    );
    Ok(())
}
