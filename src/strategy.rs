use crate::config::SimulationSettings;
use crate::error::{SimulationResult, SweepError};
use crate::models::{BacktestRun, TimeSeries};
use crate::params::{ParameterGrid, ParameterSet, ParameterSpec};
use crate::simulator::{SignalModel, Simulator};
use std::collections::BTreeMap;

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// Declared parameters, their value domains and default candidates.
    fn parameter_specs(&self) -> Vec<ParameterSpec>;

    /// Build the per-run trading rules for one parameter set.
    fn build_model<'a>(
        &self,
        series: &'a TimeSeries,
        params: &ParameterSet,
    ) -> SimulationResult<Box<dyn SignalModel + 'a>>;

    /// Deterministic: identical inputs give identical trades, equity and stats.
    fn run(
        &self,
        series: &TimeSeries,
        params: &ParameterSet,
        settings: &SimulationSettings,
    ) -> SimulationResult<BacktestRun> {
        let mut model = self.build_model(series, params)?;
        Simulator::new(*settings).run(&series.primary, model.as_mut())
    }

    fn declared_grid(&self) -> Result<ParameterGrid, SweepError> {
        ParameterGrid::declared(&self.parameter_specs())
    }
}

#[path = "strategies/rci.rs"]
pub mod rci;

pub use rci::RciStrategy;

#[path = "strategies/liquidation_heatmap.rs"]
pub mod liquidation_heatmap;

pub use liquidation_heatmap::LiquidationHeatmapStrategy;

/// Explicit name to implementation mapping, filled at startup.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<&'static str, Box<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.insert(Box::new(RciStrategy));
        registry.insert(Box::new(LiquidationHeatmapStrategy));
        registry
    }

    fn insert(&mut self, strategy: Box<dyn Strategy>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    pub fn register(&mut self, strategy: Box<dyn Strategy>) -> Result<(), SweepError> {
        if self.strategies.contains_key(strategy.name()) {
            return Err(SweepError::configuration(format!(
                "Strategy {} is already registered",
                strategy.name()
            )));
        }
        self.insert(strategy);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&dyn Strategy, SweepError> {
        self.strategies
            .get(name.trim())
            .map(|strategy| strategy.as_ref())
            .ok_or_else(|| {
                SweepError::configuration(format!(
                    "Unknown strategy: {} (available: {})",
                    name,
                    self.names().collect::<Vec<_>>().join(", ")
                ))
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.strategies.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Strategy> {
        self.strategies.values().map(|strategy| strategy.as_ref())
    }
}
