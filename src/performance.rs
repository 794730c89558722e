use crate::models::{SummaryStats, Trade};

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Summary statistics derived purely from realized trades.
    ///
    /// `max_drawdown` is the worst single losing trade (a per-trade proxy,
    /// not peak-to-trough), or 0 when no trade lost money.
    pub fn summarize(trades: &[Trade]) -> SummaryStats {
        let total_trades = trades.len();
        let net_profit: f64 = trades.iter().map(|t| t.profit).sum();
        let winning_trades = trades.iter().filter(|t| t.profit > 0.0).count();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };
        let max_drawdown = trades
            .iter()
            .map(|t| t.profit)
            .filter(|profit| *profit < 0.0)
            .fold(0.0, f64::min);

        SummaryStats {
            total_trades,
            net_profit,
            win_rate,
            max_drawdown,
        }
    }
}
