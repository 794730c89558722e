use std::path::PathBuf;
use thiserror::Error;

/// Errors that end a whole sweep run.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("Failed to persist report to {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },
}

impl SweepError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        SweepError::Configuration(message.into())
    }

    pub fn data_unavailable<S: Into<String>, R: Into<String>>(symbol: S, reason: R) -> Self {
        SweepError::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence<P: Into<PathBuf>, R: ToString>(path: P, reason: R) -> Self {
        SweepError::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure of a single parameter combination. Recovered by the executor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulationError {
    #[error("degenerate window: {0}")]
    DegenerateWindow(String),

    #[error("non-finite {what} at candle {index}")]
    NonFiniteValue { what: String, index: usize },

    #[error("index {index} out of range for series of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("strategy panicked: {0}")]
    Panicked(String),
}

pub type SimulationResult<T> = Result<T, SimulationError>;
