use std::sync::{Arc, Mutex};

/// Shared, cheaply clonable progress of a running sweep.
#[derive(Clone, Default)]
pub struct SweepStatus {
    inner: Arc<Mutex<SweepStatusData>>,
}

#[derive(Default)]
struct SweepStatusData {
    phase: String,
    total_combinations: usize,
    completed_combinations: usize,
    failed_combinations: usize,
    best_net_profit: Option<f64>,
    eta_seconds: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SweepStatusSnapshot {
    pub phase: String,
    pub total_combinations: usize,
    pub completed_combinations: usize,
    pub failed_combinations: usize,
    pub best_net_profit: Option<f64>,
    pub eta_seconds: Option<f64>,
}

impl SweepStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SweepStatusData {
                phase: "Initializing".to_string(),
                ..Default::default()
            })),
        }
    }

    pub fn set_phase<S: Into<String>>(&self, phase: S) {
        if let Ok(mut data) = self.inner.lock() {
            data.phase = phase.into();
        }
    }

    pub fn set_total(&self, total_combinations: usize) {
        if let Ok(mut data) = self.inner.lock() {
            data.total_combinations = total_combinations;
            data.completed_combinations = 0;
            data.failed_combinations = 0;
            data.best_net_profit = None;
            data.eta_seconds = None;
        }
    }

    /// Record one finished combination; `net_profit` is `None` for failures.
    pub fn record(&self, net_profit: Option<f64>, eta_seconds: Option<f64>) {
        if let Ok(mut data) = self.inner.lock() {
            data.completed_combinations += 1;
            match net_profit {
                Some(profit) => {
                    if data.best_net_profit.map_or(true, |best| profit > best) {
                        data.best_net_profit = Some(profit);
                    }
                }
                None => data.failed_combinations += 1,
            }
            data.eta_seconds = eta_seconds;
        }
    }

    pub fn snapshot(&self) -> SweepStatusSnapshot {
        if let Ok(data) = self.inner.lock() {
            SweepStatusSnapshot {
                phase: data.phase.clone(),
                total_combinations: data.total_combinations,
                completed_combinations: data.completed_combinations,
                failed_combinations: data.failed_combinations,
                best_net_profit: data.best_net_profit,
                eta_seconds: data.eta_seconds,
            }
        } else {
            SweepStatusSnapshot {
                phase: "Status unavailable".to_string(),
                total_combinations: 0,
                completed_combinations: 0,
                failed_combinations: 0,
                best_net_profit: None,
                eta_seconds: None,
            }
        }
    }
}
