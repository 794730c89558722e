use crate::config::SimulationSettings;
use crate::error::{SimulationError, SimulationResult};
use crate::models::{BacktestRun, Candle, Direction, ExitReason, Position, Trade};
use crate::performance::PerformanceCalculator;
use log::debug;

pub const PRICE_EPSILON: f64 = 1e-9;

/// Entry conditions evaluated on one candle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntrySignal {
    pub long: bool,
    pub short: bool,
}

impl EntrySignal {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn long() -> Self {
        Self {
            long: true,
            short: false,
        }
    }

    pub fn short() -> Self {
        Self {
            long: false,
            short: true,
        }
    }

    /// Long is evaluated first when both conditions hold.
    pub fn direction(self) -> Option<Direction> {
        if self.long {
            Some(Direction::Long)
        } else if self.short {
            Some(Direction::Short)
        } else {
            None
        }
    }
}

/// Distances from the entry price, in price units, at which a position is
/// closed in profit or at a loss.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExitOffsets {
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
}

impl ExitOffsets {
    pub fn fixed(take_profit: f64, stop_loss: f64) -> Self {
        Self {
            take_profit: Some(take_profit),
            stop_loss: Some(stop_loss),
        }
    }
}

/// Trading rules a strategy plugs into the simulation loop. One instance is
/// built per parameter set and dropped when the run ends.
pub trait SignalModel {
    /// Number of leading candles the model cannot evaluate.
    fn warmup(&self) -> usize;

    /// Called once per evaluated candle before entry/exit checks.
    fn observe(&mut self, _history: &[Candle], _index: usize) -> SimulationResult<()> {
        Ok(())
    }

    /// `history` ends at the current candle (`history.len() == index + 1`).
    fn entry(&mut self, history: &[Candle], index: usize) -> SimulationResult<EntrySignal>;

    /// Called once when a position opens at `index`.
    fn exit_offsets(&mut self, direction: Direction, index: usize) -> ExitOffsets;

    /// Indicator-based exit, checked after take profit and stop loss.
    fn indicator_exit(
        &mut self,
        _position: &Position,
        _history: &[Candle],
        _index: usize,
    ) -> SimulationResult<bool> {
        Ok(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionState {
    Flat,
    Open(Position),
}

/// Per-run mutable state. Lives only for the duration of one `Simulator::run`.
struct SimulationState {
    position: PositionState,
    balance: f64,
    trades: Vec<Trade>,
    equity_curve: Vec<f64>,
}

pub struct Simulator {
    settings: SimulationSettings,
}

impl Simulator {
    pub fn new(settings: SimulationSettings) -> Self {
        Self { settings }
    }

    pub fn run(
        &self,
        candles: &[Candle],
        model: &mut dyn SignalModel,
    ) -> SimulationResult<BacktestRun> {
        let position_scale = self.settings.position_scale();
        let warmup = model.warmup();
        let mut state = SimulationState {
            position: PositionState::Flat,
            balance: self.settings.initial_balance,
            trades: Vec::new(),
            equity_curve: Vec::with_capacity(candles.len()),
        };

        for (index, candle) in candles.iter().enumerate() {
            if index >= warmup {
                let history = &candles[..=index];
                model.observe(history, index)?;
                state.position = match std::mem::replace(&mut state.position, PositionState::Flat)
                {
                    PositionState::Flat => Self::try_open(model, history, index)?,
                    PositionState::Open(position) => {
                        match Self::exit_reason(model, &position, history, index)? {
                            Some(reason) => {
                                let trade =
                                    Self::close(position, candle, reason, position_scale, index)?;
                                state.balance += trade.profit;
                                state.trades.push(trade);
                                PositionState::Flat
                            }
                            None => PositionState::Open(position),
                        }
                    }
                };
            }
            state.equity_curve.push(state.balance);
        }

        if let PositionState::Open(position) = &state.position {
            debug!(
                "Discarding {} position opened at {} ({}) still open at end of data",
                position.direction, position.entry_price, position.entry_time
            );
        }

        let stats = PerformanceCalculator::summarize(&state.trades);
        Ok(BacktestRun {
            trades: state.trades,
            equity_curve: state.equity_curve,
            stats,
            final_balance: state.balance,
        })
    }

    fn try_open(
        model: &mut dyn SignalModel,
        history: &[Candle],
        index: usize,
    ) -> SimulationResult<PositionState> {
        let Some(direction) = model.entry(history, index)?.direction() else {
            return Ok(PositionState::Flat);
        };
        let candle = &history[index];
        let entry_price = candle.close;
        if !entry_price.is_finite() {
            return Err(SimulationError::NonFiniteValue {
                what: "entry price".to_string(),
                index,
            });
        }

        let offsets = model.exit_offsets(direction, index);
        let sign = direction.sign();
        let take_profit = offsets.take_profit.map(|offset| entry_price + sign * offset);
        let stop_loss = offsets.stop_loss.map(|offset| entry_price - sign * offset);
        for level in [take_profit, stop_loss].into_iter().flatten() {
            if !level.is_finite() {
                return Err(SimulationError::NonFiniteValue {
                    what: "exit level".to_string(),
                    index,
                });
            }
        }

        Ok(PositionState::Open(Position {
            direction,
            entry_price,
            entry_time: candle.timestamp,
            take_profit,
            stop_loss,
        }))
    }

    fn exit_reason(
        model: &mut dyn SignalModel,
        position: &Position,
        history: &[Candle],
        index: usize,
    ) -> SimulationResult<Option<ExitReason>> {
        let price = history[index].close;
        let (hit_take_profit, hit_stop_loss) = match position.direction {
            Direction::Long => (
                position
                    .take_profit
                    .is_some_and(|level| price >= level - PRICE_EPSILON),
                position
                    .stop_loss
                    .is_some_and(|level| price <= level + PRICE_EPSILON),
            ),
            Direction::Short => (
                position
                    .take_profit
                    .is_some_and(|level| price <= level + PRICE_EPSILON),
                position
                    .stop_loss
                    .is_some_and(|level| price >= level - PRICE_EPSILON),
            ),
        };

        if hit_take_profit {
            return Ok(Some(ExitReason::TakeProfit));
        }
        if hit_stop_loss {
            return Ok(Some(ExitReason::StopLoss));
        }
        if model.indicator_exit(position, history, index)? {
            return Ok(Some(ExitReason::Signal));
        }
        Ok(None)
    }

    fn close(
        position: Position,
        candle: &Candle,
        reason: ExitReason,
        position_scale: f64,
        index: usize,
    ) -> SimulationResult<Trade> {
        let exit_price = candle.close;
        let profit =
            (exit_price - position.entry_price) * position.direction.sign() * position_scale;
        if !profit.is_finite() {
            return Err(SimulationError::NonFiniteValue {
                what: "realized profit".to_string(),
                index,
            });
        }

        Ok(Trade {
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            exit_time: candle.timestamp,
            exit_price,
            direction: position.direction,
            profit,
            exit_reason: reason,
        })
    }
}
