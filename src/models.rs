use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open position. At most one exists per simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Signal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub direction: Direction,
    pub profit: f64,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_trades: usize,
    pub net_profit: f64,
    pub win_rate: f64,
    pub max_drawdown: f64,
}

/// Output of one strategy run over one parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRun {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<f64>,
    pub stats: SummaryStats,
    pub final_balance: f64,
}

/// Input handed to a strategy: a primary series plus an optional
/// higher-timeframe series used for confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub symbol: String,
    pub primary: Vec<Candle>,
    pub confirmation: Option<Vec<Candle>>,
}

impl TimeSeries {
    pub fn new(symbol: impl Into<String>, primary: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            primary,
            confirmation: None,
        }
    }

    pub fn with_confirmation(mut self, confirmation: Vec<Candle>) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// Index of the last confirmation candle that is already closed at `at`,
    /// i.e. whose successor opened at or before `at`.
    pub fn completed_confirmation_index(&self, at: DateTime<Utc>) -> Option<usize> {
        let confirmation = self.confirmation.as_ref()?;
        let started = confirmation.partition_point(|c| c.timestamp <= at);
        started.checked_sub(2)
    }
}
