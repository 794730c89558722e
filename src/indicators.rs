use crate::error::{SimulationError, SimulationResult};

/// Simple moving average aligned with the input; the first `period - 1`
/// entries are NaN.
pub fn calculate_sma(values: &[f64], period: usize) -> SimulationResult<Vec<f64>> {
    if period == 0 {
        return Err(SimulationError::DegenerateWindow(
            "moving average period must be at least 1".to_string(),
        ));
    }

    let mut sma_values = vec![f64::NAN; values.len()];
    if values.len() < period {
        return Ok(sma_values);
    }

    let mut window_sum: f64 = values[..period].iter().sum();
    sma_values[period - 1] = window_sum / period as f64;
    for i in period..values.len() {
        window_sum += values[i] - values[i - period];
        sma_values[i] = window_sum / period as f64;
    }

    Ok(sma_values)
}

/// Exponential moving average seeded with the first value (no warm-up gap).
pub fn calculate_ema(values: &[f64], period: usize) -> SimulationResult<Vec<f64>> {
    if period == 0 {
        return Err(SimulationError::DegenerateWindow(
            "moving average period must be at least 1".to_string(),
        ));
    }
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_values = Vec::with_capacity(values.len());
    ema_values.push(values[0]);

    for i in 1..values.len() {
        let ema = (values[i] * multiplier) + (ema_values[i - 1] * (1.0 - multiplier));
        ema_values.push(ema);
    }

    Ok(ema_values)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovingAverage {
    Simple,
    Exponential,
}

impl MovingAverage {
    pub fn parse(raw: &str) -> SimulationResult<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SMA" => Ok(MovingAverage::Simple),
            "EMA" => Ok(MovingAverage::Exponential),
            other => Err(SimulationError::MissingInput(format!(
                "unknown moving average type `{}`",
                other
            ))),
        }
    }

    pub fn apply(self, values: &[f64], period: usize) -> SimulationResult<Vec<f64>> {
        match self {
            MovingAverage::Simple => calculate_sma(values, period),
            MovingAverage::Exponential => calculate_ema(values, period),
        }
    }
}

/// Rank Correlation Index over a trailing window that includes the current
/// value. Returns one value per full window, so the output is
/// `values.len() - length + 1` long (empty when the input is shorter).
pub fn calculate_rci(values: &[f64], length: usize) -> SimulationResult<Vec<f64>> {
    if length < 2 {
        return Err(SimulationError::DegenerateWindow(format!(
            "RCI length {} divides by zero",
            length
        )));
    }
    if values.len() < length {
        return Ok(Vec::new());
    }

    let n = length as f64;
    let denominator = n * (n * n - 1.0);
    let mut order: Vec<usize> = Vec::with_capacity(length);
    let mut output = Vec::with_capacity(values.len() - length + 1);

    for window in values.windows(length) {
        order.clear();
        order.extend(0..length);
        // Stable sort: ties keep their time order.
        order.sort_by(|&a, &b| {
            window[a]
                .partial_cmp(&window[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut d = 0.0;
        for (rank, &time_index) in order.iter().enumerate() {
            let diff = rank as f64 - time_index as f64;
            d += diff * diff;
        }
        output.push(100.0 * (1.0 - (6.0 * d) / denominator));
    }

    Ok(output)
}

/// Rolling maximum aligned with the input; NaN until the window is full.
pub fn rolling_max(values: &[f64], window: usize) -> SimulationResult<Vec<f64>> {
    rolling_extreme(values, window, f64::max)
}

/// Rolling minimum aligned with the input; NaN until the window is full.
pub fn rolling_min(values: &[f64], window: usize) -> SimulationResult<Vec<f64>> {
    rolling_extreme(values, window, f64::min)
}

fn rolling_extreme(
    values: &[f64],
    window: usize,
    pick: fn(f64, f64) -> f64,
) -> SimulationResult<Vec<f64>> {
    if window == 0 {
        return Err(SimulationError::DegenerateWindow(
            "rolling window must be at least 1".to_string(),
        ));
    }

    let mut output = vec![f64::NAN; values.len()];
    for end in window.saturating_sub(1)..values.len() {
        let start = end + 1 - window;
        output[end] = values[start..=end]
            .iter()
            .copied()
            .fold(values[start], pick);
    }
    Ok(output)
}

/// True when `values[index]` is strictly greater than every value `left`
/// bars before and `right` bars after it.
pub fn is_pivot_high(values: &[f64], index: usize, left: usize, right: usize) -> bool {
    is_pivot(values, index, left, right, |candidate, other| candidate > other)
}

/// True when `values[index]` is strictly lower than every value `left`
/// bars before and `right` bars after it.
pub fn is_pivot_low(values: &[f64], index: usize, left: usize, right: usize) -> bool {
    is_pivot(values, index, left, right, |candidate, other| candidate < other)
}

fn is_pivot(
    values: &[f64],
    index: usize,
    left: usize,
    right: usize,
    beats: fn(f64, f64) -> bool,
) -> bool {
    if index < left || index + right >= values.len() {
        return false;
    }
    let candidate = values[index];
    (index - left..=index + right)
        .filter(|&i| i != index)
        .all(|i| beats(candidate, values[i]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_is_aligned_with_nan_warmup() {
        let sma = calculate_sma(&[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert!(sma[0].is_nan());
        assert_eq!(&sma[1..], &[1.5, 2.5, 3.5]);
        assert!(calculate_sma(&[1.0], 0).is_err());
    }

    #[test]
    fn ema_seeds_with_first_value() {
        let ema = calculate_ema(&[10.0, 20.0], 3).unwrap();
        assert_eq!(ema[0], 10.0);
        assert!((ema[1] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn rci_extremes() {
        let rising = calculate_rci(&[1.0, 2.0, 3.0, 4.0, 5.0], 5).unwrap();
        assert_eq!(rising.len(), 1);
        assert!((rising[0] - 100.0).abs() < 1e-9);

        let falling = calculate_rci(&[5.0, 4.0, 3.0, 2.0, 1.0], 5).unwrap();
        assert!((falling[0] + 100.0).abs() < 1e-9);
    }

    #[test]
    fn rci_on_flat_prices_is_constant() {
        let flat = vec![1.1; 12];
        let rci = calculate_rci(&flat, 4).unwrap();
        assert_eq!(rci.len(), 9);
        assert!(rci.iter().all(|v| (*v - 100.0).abs() < 1e-9));
    }

    #[test]
    fn rci_rejects_degenerate_length() {
        assert!(matches!(
            calculate_rci(&[1.0, 2.0], 1),
            Err(SimulationError::DegenerateWindow(_))
        ));
    }

    #[test]
    fn rolling_extremes() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0];
        let max = rolling_max(&values, 3).unwrap();
        let min = rolling_min(&values, 3).unwrap();
        assert!(max[1].is_nan());
        assert_eq!(&max[2..], &[4.0, 4.0, 5.0]);
        assert_eq!(&min[2..], &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn pivots_need_full_neighbourhood() {
        let highs = [1.0, 2.0, 5.0, 2.0, 1.0];
        assert!(is_pivot_high(&highs, 2, 2, 2));
        assert!(!is_pivot_high(&highs, 1, 2, 2));
        assert!(!is_pivot_high(&highs, 3, 1, 2));
        let lows = [3.0, 2.0, 1.0, 2.0, 1.0];
        assert!(!is_pivot_low(&lows, 2, 2, 2));
        assert!(is_pivot_low(&lows, 2, 1, 1));
    }
}
