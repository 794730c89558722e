use crate::error::{SimulationError, SimulationResult};
use crate::indicators::{self, is_pivot_high, is_pivot_low};
use crate::models::{Candle, Direction, TimeSeries};
use crate::params::{ParameterSet, ParameterSpec};
use crate::simulator::{EntrySignal, ExitOffsets, SignalModel};

/// Zones anchored on confirmed pivots: a pivot high opens a short zone above
/// it, a pivot low a long zone below it. Each zone is traded at most once,
/// with take profit and stop loss both set to the zone height. A close beyond
/// the far edge of a zone breaks it and it is dropped untraded.
pub struct LiquidationHeatmapStrategy;

impl super::Strategy for LiquidationHeatmapStrategy {
    fn name(&self) -> &'static str {
        "liquidation_heatmap"
    }

    fn description(&self) -> &'static str {
        "Pivot-anchored liquidation zones sized by the recent price range"
    }

    fn parameter_specs(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::integer("pivot_left", 1, 100, &[3]),
            ParameterSpec::integer("pivot_right", 1, 100, &[3]),
            ParameterSpec::integer("atr_length", 1, 5_000, &[200]),
            ParameterSpec::float("atr_multiplier", 0.0, 10.0, &[0.25, 0.3]),
            ParameterSpec::integer("volume_window", 1, 5_000, &[200]),
            ParameterSpec::float("min_strength", 0.0, 1.0, &[0.0]),
        ]
    }

    fn build_model<'a>(
        &self,
        series: &'a TimeSeries,
        params: &ParameterSet,
    ) -> SimulationResult<Box<dyn SignalModel + 'a>> {
        Ok(Box::new(ZoneModel::new(&series.primary, params)?))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Zone {
    direction: Direction,
    top: f64,
    bottom: f64,
}

impl Zone {
    fn contains(&self, price: f64) -> bool {
        self.bottom < price && price < self.top
    }

    fn height(&self) -> f64 {
        self.top - self.bottom
    }

    fn is_broken_by(&self, price: f64) -> bool {
        match self.direction {
            Direction::Short => price >= self.top,
            Direction::Long => price <= self.bottom,
        }
    }
}

struct ZoneModel {
    left: usize,
    right: usize,
    atr_multiplier: f64,
    min_strength: f64,
    highs: Vec<f64>,
    lows: Vec<f64>,
    closes: Vec<f64>,
    volumes: Vec<f64>,
    range_high: Vec<f64>,
    range_low: Vec<f64>,
    volume_max: Vec<f64>,
    warmup: usize,
    zones: Vec<Zone>,
}

impl ZoneModel {
    fn new(candles: &[Candle], params: &ParameterSet) -> SimulationResult<Self> {
        let left = params.get_usize("pivot_left")?;
        let right = params.get_usize("pivot_right")?;
        let atr_length = params.get_usize("atr_length")?;
        let volume_window = params.get_usize("volume_window")?;

        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        Ok(Self {
            left,
            right,
            atr_multiplier: params.get_f64("atr_multiplier")?,
            min_strength: params.get_f64("min_strength")?,
            range_high: indicators::rolling_max(&highs, atr_length)?,
            range_low: indicators::rolling_min(&lows, atr_length)?,
            volume_max: indicators::rolling_max(&volumes, volume_window)?,
            closes: candles.iter().map(|c| c.close).collect(),
            highs,
            lows,
            volumes,
            warmup: atr_length.max(volume_window) + right + 1,
            zones: Vec::new(),
        })
    }

    fn zone_height(&self, index: usize) -> SimulationResult<f64> {
        let height = (self.range_high[index] - self.range_low[index]) * self.atr_multiplier;
        if !height.is_finite() {
            return Err(SimulationError::NonFiniteValue {
                what: "zone height".to_string(),
                index,
            });
        }
        Ok(height)
    }

    /// Volume of the confirming candle relative to the recent peak, capped at 1.
    fn strength(&self, index: usize) -> f64 {
        let max = self.volume_max[index];
        if max > 0.0 && max.is_finite() {
            (self.volumes[index] / max).min(1.0)
        } else {
            0.0
        }
    }

    fn first_zone(&self, direction: Direction, price: f64) -> Option<usize> {
        self.zones
            .iter()
            .position(|zone| zone.direction == direction && zone.contains(price))
    }
}

impl SignalModel for ZoneModel {
    fn warmup(&self) -> usize {
        self.warmup
    }

    fn observe(&mut self, _history: &[Candle], index: usize) -> SimulationResult<()> {
        let close = self.closes[index];
        self.zones.retain(|zone| !zone.is_broken_by(close));

        // The pivot candidate is confirmed once `right` candles follow it.
        let Some(pivot) = index.checked_sub(self.right) else {
            return Ok(());
        };
        let height = self.zone_height(index)?;
        if height <= 0.0 || self.strength(index) < self.min_strength {
            return Ok(());
        }

        if is_pivot_high(&self.highs[..=index], pivot, self.left, self.right) {
            let bottom = self.highs[pivot];
            self.zones.push(Zone {
                direction: Direction::Short,
                top: bottom + height,
                bottom,
            });
        }
        if is_pivot_low(&self.lows[..=index], pivot, self.left, self.right) {
            let top = self.lows[pivot];
            self.zones.push(Zone {
                direction: Direction::Long,
                top,
                bottom: top - height,
            });
        }
        Ok(())
    }

    fn entry(&mut self, history: &[Candle], index: usize) -> SimulationResult<EntrySignal> {
        let price = history[index].close;
        Ok(EntrySignal {
            long: self.first_zone(Direction::Long, price).is_some(),
            short: self.first_zone(Direction::Short, price).is_some(),
        })
    }

    fn exit_offsets(&mut self, direction: Direction, index: usize) -> ExitOffsets {
        match self.first_zone(direction, self.closes[index]) {
            Some(position) => {
                let height = self.zones.remove(position).height();
                ExitOffsets::fixed(height, height)
            }
            None => ExitOffsets::default(),
        }
    }
}
