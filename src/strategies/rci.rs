use crate::error::{SimulationError, SimulationResult};
use crate::indicators::{self, MovingAverage};
use crate::models::{Candle, Direction, TimeSeries};
use crate::params::{ParameterSet, ParameterSpec};
use crate::simulator::{EntrySignal, ExitOffsets, SignalModel};

/// RCI crossing its own moving average, with fixed take-profit/stop-loss
/// distances and an optional higher-timeframe trend filter.
pub struct RciStrategy;

impl super::Strategy for RciStrategy {
    fn name(&self) -> &'static str {
        "rci"
    }

    fn description(&self) -> &'static str {
        "Rank Correlation Index crossing its moving average"
    }

    fn parameter_specs(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::integer("rci_length", 2, 500, &[9, 10, 14]),
            ParameterSpec::integer("ma_length", 1, 500, &[10, 14]),
            ParameterSpec::choice("ma_type", &["SMA", "EMA"], &["SMA", "EMA"]),
            ParameterSpec::float("take_profit", 0.000_01, 1.0, &[0.004]),
            ParameterSpec::float("stop_loss", 0.000_01, 1.0, &[0.002]),
            ParameterSpec::boolean("trend_filter", &[false]),
            ParameterSpec::integer("trend_length", 1, 500, &[20]),
        ]
    }

    fn build_model<'a>(
        &self,
        series: &'a TimeSeries,
        params: &ParameterSet,
    ) -> SimulationResult<Box<dyn SignalModel + 'a>> {
        Ok(Box::new(RciModel::new(series, params)?))
    }
}

struct TrendFilter<'a> {
    series: &'a TimeSeries,
    closes: Vec<f64>,
    sma: Vec<f64>,
}

impl TrendFilter<'_> {
    /// Direction of the last completed confirmation candle against its SMA.
    fn bias(&self, at: &Candle) -> Option<Direction> {
        let idx = self.series.completed_confirmation_index(at.timestamp)?;
        let (close, average) = (self.closes[idx], self.sma[idx]);
        if !average.is_finite() {
            return None;
        }
        if close > average {
            Some(Direction::Long)
        } else if close < average {
            Some(Direction::Short)
        } else {
            None
        }
    }
}

struct RciModel<'a> {
    rci_length: usize,
    rci: Vec<f64>,
    rci_ma: Vec<f64>,
    warmup: usize,
    offsets: ExitOffsets,
    trend: Option<TrendFilter<'a>>,
}

impl<'a> RciModel<'a> {
    fn new(series: &'a TimeSeries, params: &ParameterSet) -> SimulationResult<Self> {
        let rci_length = params.get_usize("rci_length")?;
        let ma_length = params.get_usize("ma_length")?;
        let ma_type = MovingAverage::parse(params.get_text("ma_type")?)?;
        let offsets =
            ExitOffsets::fixed(params.get_f64("take_profit")?, params.get_f64("stop_loss")?);

        let closes: Vec<f64> = series.primary.iter().map(|c| c.close).collect();
        let rci = indicators::calculate_rci(&closes, rci_length)?;
        let rci_ma = ma_type.apply(&rci, ma_length)?;

        let trend = if params.get_bool("trend_filter")? {
            let confirmation = series.confirmation.as_ref().ok_or_else(|| {
                SimulationError::MissingInput(format!(
                    "trend filter needs a confirmation series for {}",
                    series.symbol
                ))
            })?;
            let closes: Vec<f64> = confirmation.iter().map(|c| c.close).collect();
            let sma = indicators::calculate_sma(&closes, params.get_usize("trend_length")?)?;
            Some(TrendFilter {
                series,
                closes,
                sma,
            })
        } else {
            None
        };

        Ok(Self {
            rci_length,
            rci,
            rci_ma,
            warmup: rci_length - 1 + ma_length,
            offsets,
            trend,
        })
    }

    fn point(&self, offset: usize, index: usize) -> SimulationResult<(f64, f64)> {
        let rci = self.rci[offset];
        let average = self.rci_ma[offset];
        if !rci.is_finite() || !average.is_finite() {
            return Err(SimulationError::NonFiniteValue {
                what: "RCI".to_string(),
                index,
            });
        }
        Ok((rci, average))
    }
}

impl SignalModel for RciModel<'_> {
    fn warmup(&self) -> usize {
        self.warmup
    }

    fn entry(&mut self, history: &[Candle], index: usize) -> SimulationResult<EntrySignal> {
        // rci[k] covers candles k..k + rci_length
        let offset = index + 1 - self.rci_length;
        let (rci_now, ma_now) = self.point(offset, index)?;
        let (rci_prev, ma_prev) = self.point(offset - 1, index)?;

        let mut signal = EntrySignal {
            long: rci_prev < ma_prev && rci_now > ma_now,
            short: rci_prev > ma_prev && rci_now < ma_now,
        };

        if signal != EntrySignal::none() {
            if let Some(trend) = &self.trend {
                let bias = trend.bias(&history[index]);
                signal.long &= bias == Some(Direction::Long);
                signal.short &= bias == Some(Direction::Short);
            }
        }

        Ok(signal)
    }

    fn exit_offsets(&mut self, _direction: Direction, _index: usize) -> ExitOffsets {
        self.offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationSettings;
    use crate::models::ExitReason;
    use crate::params::ParameterValue;
    use crate::strategy::Strategy;
    use chrono::{Duration, TimeZone, Utc};

    fn series(closes: &[f64]) -> TimeSeries {
        let base = Utc.with_ymd_and_hms(2023, 4, 26, 0, 0, 0).unwrap();
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: base + Duration::minutes(5 * i as i64),
                open: close,
                high: close + 0.0002,
                low: close - 0.0002,
                close,
                volume: 10.0,
            })
            .collect();
        TimeSeries::new("EURUSD", candles)
    }

    fn params(overrides: &[(&str, ParameterValue)]) -> ParameterSet {
        let specs = RciStrategy.parameter_specs();
        let mut values: Vec<(String, ParameterValue)> = vec![
            ("rci_length".to_string(), ParameterValue::Int(4)),
            ("ma_length".to_string(), ParameterValue::Int(3)),
            ("ma_type".to_string(), "SMA".into()),
            ("take_profit".to_string(), ParameterValue::Float(0.004)),
            ("stop_loss".to_string(), ParameterValue::Float(0.002)),
            ("trend_filter".to_string(), ParameterValue::Bool(false)),
            ("trend_length".to_string(), ParameterValue::Int(3)),
        ];
        for (name, value) in overrides {
            if let Some(entry) = values.iter_mut().find(|(key, _)| key == name) {
                entry.1 = value.clone();
            }
        }
        ParameterSet::new(&specs, values).unwrap()
    }

    /// Choppy decline followed by a steady rally, in pips.
    fn swing() -> Vec<f64> {
        let steps = [-5, 2, -5, 2, -5, 2, -5, 2, -5, 2, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6];
        let mut closes = vec![1.1100];
        for step in steps {
            let last = closes[closes.len() - 1];
            closes.push(last + step as f64 * 0.0001);
        }
        closes
    }

    #[test]
    fn flat_prices_never_trade() {
        let flat = series(&vec![1.1000; 300]);
        let run = RciStrategy
            .run(&flat, &params(&[]), &SimulationSettings::default())
            .unwrap();
        assert_eq!(run.stats.total_trades, 0);
        assert_eq!(run.equity_curve.len(), 300);
    }

    #[test]
    fn rally_after_decline_produces_winning_long() {
        let data = series(&swing());
        let run = RciStrategy
            .run(&data, &params(&[]), &SimulationSettings::default())
            .unwrap();

        assert_eq!(run.stats.total_trades, 1);
        let trade = &run.trades[0];
        assert_eq!(trade.direction, Direction::Long);
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert!((trade.entry_price - 1.1091).abs() < 1e-9);
        assert!((trade.exit_price - 1.1133).abs() < 1e-9);
        assert!((trade.profit - 4.2).abs() < 1e-6);
        assert_eq!(run.stats.win_rate, 1.0);
        assert!((run.final_balance - 404.2).abs() < 1e-6);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let data = series(&swing());
        let p = params(&[("ma_type", "EMA".into())]);
        let settings = SimulationSettings::default();
        let first = RciStrategy.run(&data, &p, &settings).unwrap();
        let second = RciStrategy.run(&data, &p, &settings).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn trend_filter_requires_confirmation_series() {
        let data = series(&swing());
        let result = RciStrategy.run(
            &data,
            &params(&[("trend_filter", ParameterValue::Bool(true))]),
            &SimulationSettings::default(),
        );
        assert!(matches!(result, Err(SimulationError::MissingInput(_))));
    }

    #[test]
    fn falling_higher_timeframe_blocks_long_entries() {
        let base = Utc.with_ymd_and_hms(2023, 4, 25, 0, 0, 0).unwrap();
        let confirmation: Vec<Candle> = (0..60)
            .map(|i| {
                let close = 1.2 - 0.001 * i as f64;
                Candle {
                    timestamp: base + Duration::minutes(30 * i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                }
            })
            .collect();
        let data = series(&swing()).with_confirmation(confirmation);
        let unfiltered = RciStrategy
            .run(&data, &params(&[]), &SimulationSettings::default())
            .unwrap();
        assert_eq!(unfiltered.trades[0].direction, Direction::Long);

        let run = RciStrategy
            .run(
                &data,
                &params(&[("trend_filter", ParameterValue::Bool(true))]),
                &SimulationSettings::default(),
            )
            .unwrap();
        assert!(run.trades.iter().all(|t| t.direction == Direction::Short));
    }
}
