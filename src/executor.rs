use crate::config::SimulationSettings;
use crate::error::SimulationError;
use crate::models::{BacktestRun, TimeSeries};
use crate::params::{ParameterGrid, ParameterSet};
use crate::report::{ResultRow, ResultsTable};
use crate::strategy::Strategy;
use crate::sweep_status::SweepStatus;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use statrs::statistics::Statistics;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

/// Cooperative stop flag, checked only between combinations.
#[derive(Clone, Default, Debug)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinationFailure {
    /// 1-based position in sweep order.
    pub index: usize,
    pub symbol: String,
    pub parameters: ParameterSet,
    pub error: SimulationError,
}

#[derive(Debug)]
pub struct SweepSummary {
    pub run_id: Uuid,
    pub attempted: usize,
    pub succeeded: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
    pub results: ResultsTable,
    pub failures: Vec<CombinationFailure>,
}

impl SweepSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Estimated time left: mean observed duration times the remaining count.
pub fn estimate_remaining(durations: &[f64], remaining: usize) -> Option<f64> {
    if durations.is_empty() {
        return None;
    }
    let mean = durations.mean();
    mean.is_finite().then(|| mean * remaining as f64)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub struct SweepExecutor<'a> {
    strategy: &'a dyn Strategy,
    settings: SimulationSettings,
    status: SweepStatus,
    cancellation: CancellationToken,
    show_progress: bool,
}

impl<'a> SweepExecutor<'a> {
    pub fn new(strategy: &'a dyn Strategy, settings: SimulationSettings) -> Self {
        Self {
            strategy,
            settings,
            status: SweepStatus::new(),
            cancellation: CancellationToken::new(),
            show_progress: false,
        }
    }

    pub fn with_status(mut self, status: SweepStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_progress_bar(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run one combination, turning errors and panics into a `SimulationError`.
    pub fn run_combination(
        &self,
        series: &TimeSeries,
        params: &ParameterSet,
    ) -> Result<BacktestRun, SimulationError> {
        let strategy = self.strategy;
        let settings = self.settings;
        panic::catch_unwind(AssertUnwindSafe(|| strategy.run(series, params, &settings)))
            .unwrap_or_else(|payload| Err(SimulationError::Panicked(panic_message(payload))))
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(PROGRESS_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }

    /// Evaluate every grid point against every dataset, strictly in order:
    /// datasets outermost, grid order within each. Symbols are recorded on
    /// the rows only when more than one dataset is swept.
    pub fn run(&self, datasets: &[TimeSeries], grid: &ParameterGrid) -> SweepSummary {
        let run_id = Uuid::new_v4();
        let combinations = grid.expand();
        let total = combinations.len() * datasets.len();
        let tag_symbols = datasets.len() > 1;

        info!(
            "Sweep {} started: strategy {} over {} combination(s) x {} dataset(s)",
            run_id,
            self.strategy.name(),
            combinations.len(),
            datasets.len()
        );
        self.status
            .set_phase(format!("Sweeping {}", self.strategy.name()));
        self.status.set_total(total);

        let started = Instant::now();
        let pb = self.progress_bar(total);
        let mut durations: Vec<f64> = Vec::with_capacity(total);
        let mut results = ResultsTable::new();
        let mut failures = Vec::new();
        let mut attempted = 0;
        let mut cancelled = false;

        'sweep: for series in datasets {
            for params in &combinations {
                if self.cancellation.is_cancelled() {
                    cancelled = true;
                    break 'sweep;
                }
                attempted += 1;
                info!(
                    "Running combination {}/{}: {} [{}]",
                    attempted,
                    total,
                    params.signature(),
                    series.symbol
                );

                let combination_started = Instant::now();
                let outcome = self.run_combination(series, params);
                let duration = combination_started.elapsed().as_secs_f64();
                durations.push(duration);
                let eta = estimate_remaining(&durations, total - attempted);
                info!(
                    "Combination {}/{} took {:.3}s, ETA {}",
                    attempted,
                    total,
                    duration,
                    eta.map(|seconds| format!("{:.0}s", seconds))
                        .unwrap_or_else(|| "unknown".to_string())
                );

                match outcome {
                    Ok(run) => {
                        self.status.record(Some(run.stats.net_profit), eta);
                        results.push(ResultRow {
                            symbol: tag_symbols.then(|| series.symbol.clone()),
                            parameters: params.clone(),
                            stats: run.stats,
                        });
                    }
                    Err(error) => {
                        warn!(
                            "Combination {}/{} failed for {} with {}: {}",
                            attempted,
                            total,
                            series.symbol,
                            params.signature(),
                            error
                        );
                        self.status.record(None, eta);
                        failures.push(CombinationFailure {
                            index: attempted,
                            symbol: series.symbol.clone(),
                            parameters: params.clone(),
                            error,
                        });
                    }
                }
                pb.set_position(attempted as u64);
            }
        }

        let elapsed = started.elapsed();
        if cancelled {
            warn!(
                "Sweep {} cancelled after {}/{} combination(s)",
                run_id, attempted, total
            );
            pb.abandon_with_message("Sweep cancelled");
            self.status.set_phase("Cancelled");
        } else if failures.is_empty() {
            pb.finish_with_message("Sweep completed");
            self.status.set_phase("Completed");
        } else {
            pb.finish_with_message("Sweep completed with errors");
            self.status.set_phase("Completed with errors");
        }
        info!(
            "Sweep {} finished in {:.2}s: attempted {}, succeeded {}, failed {}",
            run_id,
            elapsed.as_secs_f64(),
            attempted,
            results.len(),
            failures.len()
        );

        SweepSummary {
            run_id,
            attempted,
            succeeded: results.len(),
            cancelled,
            elapsed,
            results,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationResult;
    use crate::models::{Candle, Direction};
    use crate::params::{ParameterSpec, ParameterValue};
    use crate::simulator::{EntrySignal, ExitOffsets, SignalModel};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    struct Idle;

    impl SignalModel for Idle {
        fn warmup(&self) -> usize {
            0
        }

        fn entry(&mut self, _history: &[Candle], _index: usize) -> SimulationResult<EntrySignal> {
            Ok(EntrySignal::none())
        }

        fn exit_offsets(&mut self, _direction: Direction, _index: usize) -> ExitOffsets {
            ExitOffsets::default()
        }
    }

    /// Fails for `mode = 1`, panics for `mode = 2`.
    struct Fragile;

    impl Strategy for Fragile {
        fn name(&self) -> &'static str {
            "fragile"
        }

        fn parameter_specs(&self) -> Vec<ParameterSpec> {
            vec![ParameterSpec::integer("mode", 0, 2, &[0, 1, 2, 0])]
        }

        fn build_model<'a>(
            &self,
            _series: &'a TimeSeries,
            params: &ParameterSet,
        ) -> SimulationResult<Box<dyn SignalModel + 'a>> {
            match params.get_usize("mode")? {
                1 => Err(SimulationError::DegenerateWindow("mode 1".to_string())),
                2 => panic!("mode 2 blew up"),
                _ => Ok(Box::new(Idle)),
            }
        }
    }

    fn dataset(symbol: &str, len: usize) -> TimeSeries {
        let base = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let candles = (0..len)
            .map(|i| Candle {
                timestamp: base + ChronoDuration::minutes(5 * i as i64),
                open: 1.1,
                high: 1.1,
                low: 1.1,
                close: 1.1,
                volume: 1.0,
            })
            .collect();
        TimeSeries::new(symbol, candles)
    }

    #[test]
    fn failures_and_panics_are_contained() {
        let _ = env_logger::builder().is_test(true).try_init();
        let grid = Fragile.declared_grid().unwrap();
        let status = SweepStatus::new();
        let summary = SweepExecutor::new(&Fragile, SimulationSettings::default())
            .with_status(status.clone())
            .run(&[dataset("EURUSD", 10)], &grid);

        assert_eq!(summary.attempted, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed(), 2);
        assert!(!summary.cancelled);
        assert_eq!(summary.failures[0].index, 2);
        assert!(matches!(
            summary.failures[1].error,
            SimulationError::Panicked(ref message) if message.contains("mode 2")
        ));
        assert_eq!(
            summary.failures[1].parameters.get("mode"),
            Some(&ParameterValue::Int(2))
        );

        let snapshot = status.snapshot();
        assert_eq!(snapshot.completed_combinations, 4);
        assert_eq!(snapshot.failed_combinations, 2);
        assert_eq!(snapshot.phase, "Completed with errors");
    }

    #[test]
    fn cancelled_sweep_stops_at_combination_boundary() {
        let token = CancellationToken::new();
        token.cancel();
        let grid = Fragile.declared_grid().unwrap();
        let summary = SweepExecutor::new(&Fragile, SimulationSettings::default())
            .with_cancellation(token)
            .run(&[dataset("EURUSD", 10)], &grid);

        assert!(summary.cancelled);
        assert_eq!(summary.attempted, 0);
        assert!(summary.results.is_empty());
    }

    #[test]
    fn symbols_are_tagged_for_multi_dataset_sweeps() {
        let grid = ParameterGrid::with_overrides(&Fragile.parameter_specs(), r#"{"mode": [0]}"#)
            .unwrap();
        let executor = SweepExecutor::new(&Fragile, SimulationSettings::default());

        let single = executor.run(&[dataset("EURUSD", 3)], &grid);
        assert_eq!(single.results.rows()[0].symbol, None);

        let multi = executor.run(&[dataset("EURUSD", 3), dataset("USDJPY", 0)], &grid);
        let symbols: Vec<_> = multi
            .results
            .rows()
            .iter()
            .map(|row| row.symbol.clone())
            .collect();
        assert_eq!(
            symbols,
            vec![Some("EURUSD".to_string()), Some("USDJPY".to_string())]
        );
        assert_eq!(multi.results.rows()[1].stats.total_trades, 0);
    }

    #[test]
    fn each_run_gets_its_own_id() {
        let grid = ParameterGrid::with_overrides(&Fragile.parameter_specs(), r#"{"mode": [0]}"#)
            .unwrap();
        let executor = SweepExecutor::new(&Fragile, SimulationSettings::default());
        let datasets = [dataset("EURUSD", 3)];

        let first = executor.run(&datasets, &grid);
        let second = executor.run(&datasets, &grid);
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.results, second.results);
    }

    #[test]
    fn eta_is_mean_duration_times_remaining() {
        assert_eq!(estimate_remaining(&[], 5), None);
        let eta = estimate_remaining(&[1.0, 3.0], 4).unwrap();
        assert!((eta - 8.0).abs() < 1e-12);
        assert_eq!(estimate_remaining(&[2.0], 0), Some(0.0));
    }
}
