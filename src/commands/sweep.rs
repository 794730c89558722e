use crate::config::{SweepSettings, ALL_PAIRS, DEFAULT_SYMBOL};
use crate::data::{self, CsvDirectoryProvider, SeriesProvider, SnapshotProvider};
use crate::error::SweepError;
use crate::executor::{SweepExecutor, SweepSummary};
use crate::params::ParameterGrid;
use crate::report;
use crate::strategy::StrategyRegistry;
use crate::sweep_status::SweepStatus;
use anyhow::Result;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

const TOP_RESULTS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct SweepRequest {
    pub strategy: String,
    pub symbols: Vec<String>,
    pub all_pairs: bool,
    pub grid_file: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl SweepRequest {
    pub fn resolved_symbols(&self) -> Vec<String> {
        if self.all_pairs {
            return ALL_PAIRS.iter().map(|s| s.to_string()).collect();
        }
        if self.symbols.is_empty() {
            return vec![DEFAULT_SYMBOL.to_string()];
        }
        self.symbols
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .collect()
    }
}

pub struct SweepOutcome {
    pub summary: SweepSummary,
    pub report_path: PathBuf,
}

fn load_grid(
    registry: &StrategyRegistry,
    strategy: &str,
    grid_file: Option<&Path>,
) -> Result<ParameterGrid, SweepError> {
    let strategy = registry.get(strategy)?;
    let specs = strategy.parameter_specs();
    match grid_file {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|error| {
                SweepError::configuration(format!(
                    "Cannot read grid file {}: {}",
                    path.display(),
                    error
                ))
            })?;
            ParameterGrid::with_overrides(&specs, &raw)
        }
        None => ParameterGrid::declared(&specs),
    }
}

/// Resolve, load, sweep and persist. Configuration and data problems abort
/// before the first combination runs; per-combination failures do not.
pub fn execute(
    registry: &StrategyRegistry,
    request: &SweepRequest,
    settings: &SweepSettings,
    provider: &dyn SeriesProvider,
    status: SweepStatus,
    show_progress: bool,
) -> Result<SweepOutcome, SweepError> {
    let strategy = registry.get(&request.strategy)?;
    let grid = load_grid(registry, &request.strategy, request.grid_file.as_deref())?;
    info!(
        "Strategy {}: {} combination(s) per symbol",
        strategy.name(),
        grid.combination_count()
    );
    if grid.combination_count() == 0 {
        warn!("Grid for {} is empty; nothing will be simulated", strategy.name());
    }

    status.set_phase("Loading market data");
    let datasets = data::load_series(provider, &request.resolved_symbols(), settings)?;

    let summary = SweepExecutor::new(strategy, settings.simulation)
        .with_status(status)
        .with_progress_bar(show_progress)
        .run(&datasets, &grid);

    let report_path = request
        .output
        .clone()
        .unwrap_or_else(|| report::default_report_path(&settings.output_dir, strategy.name()));
    summary.results.write_csv(&report_path)?;

    Ok(SweepOutcome {
        summary,
        report_path,
    })
}

pub fn run(
    registry: &StrategyRegistry,
    request: &SweepRequest,
    settings: &SweepSettings,
    data_file: Option<&Path>,
) -> Result<()> {
    let provider: Box<dyn SeriesProvider> = match data_file {
        Some(path) => Box::new(SnapshotProvider::open(path)?),
        None => Box::new(CsvDirectoryProvider::new(&settings.data_dir)),
    };
    let outcome = execute(
        registry,
        request,
        settings,
        provider.as_ref(),
        SweepStatus::new(),
        true,
    )?;
    let summary = &outcome.summary;

    println!("Top results by net profit:");
    for (rank, row) in summary
        .results
        .top_by_net_profit(TOP_RESULTS)
        .into_iter()
        .enumerate()
    {
        println!(
            "{:>3}. {}{} | trades {} | net {} | win rate {} | max drawdown {}",
            rank + 1,
            row.symbol
                .as_ref()
                .map(|s| format!("[{}] ", s))
                .unwrap_or_default(),
            row.parameters.signature(),
            row.stats.total_trades,
            report::format_money(row.stats.net_profit),
            report::format_ratio(row.stats.win_rate),
            report::format_money(row.stats.max_drawdown),
        );
    }
    for failure in &summary.failures {
        println!(
            "Failed #{} [{}] {}: {}",
            failure.index,
            failure.symbol,
            failure.parameters.signature(),
            failure.error
        );
    }
    println!(
        "Sweep {}: attempted {}, succeeded {}, failed {}{} in {:.1}s. Report: {}",
        summary.run_id,
        summary.attempted,
        summary.succeeded,
        summary.failed(),
        if summary.cancelled { " (cancelled)" } else { "" },
        summary.elapsed.as_secs_f64(),
        outcome.report_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_default_and_normalize() {
        let mut request = SweepRequest::default();
        assert_eq!(request.resolved_symbols(), vec!["EURUSD"]);

        request.symbols = vec![" gbpusd".to_string(), "USDJPY".to_string()];
        assert_eq!(request.resolved_symbols(), vec!["GBPUSD", "USDJPY"]);

        request.all_pairs = true;
        assert_eq!(request.resolved_symbols().len(), 7);
    }

    #[test]
    fn unknown_strategy_fails_before_loading_data() {
        struct Unreachable;
        impl SeriesProvider for Unreachable {
            fn load(&self, _: &str, _: &str) -> Result<Vec<crate::models::Candle>, SweepError> {
                panic!("data must not be loaded");
            }
        }

        let request = SweepRequest {
            strategy: "breaker_pivot_ma".to_string(),
            ..SweepRequest::default()
        };
        let result = execute(
            &StrategyRegistry::with_builtin(),
            &request,
            &SweepSettings::default(),
            &Unreachable,
            SweepStatus::new(),
            false,
        );
        assert!(matches!(result, Err(SweepError::Configuration(_))));
    }
}
