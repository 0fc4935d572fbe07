//! Pure moving-average / oscillator primitives (spec section 4.3), each returning a
//! series the same length as its input with `None` at indices where there isn't yet
//! enough history — the kernel never truncates, since `IndicatorSnapshot`s must line
//! up one-to-one with bars.

use signal_core::Bar;

fn finite_or_none(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Simple moving average. `None` until index `period - 1`.
pub fn sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for i in period - 1..values.len() {
        let window = &values[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        out[i] = finite_or_none(mean);
    }
    out
}

/// Exponential moving average: `EMA_t = alpha*P_t + (1-alpha)*EMA_{t-1}`,
/// `alpha = 2/(N+1)`, seeded with the SMA of the first `period` values.
pub fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = finite_or_none(seed);
    let mut prev = seed;
    for i in period..values.len() {
        let next = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = finite_or_none(next);
        prev = next;
    }
    out
}

/// Wilder-smoothed RSI over `period` periods (default 14).
pub fn rsi_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period + 1 {
        return out;
    }
    let mut gains = Vec::with_capacity(values.len() - 1);
    let mut losses = Vec::with_capacity(values.len() - 1);
    for i in 1..values.len() {
        let change = values[i] - values[i - 1];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    out[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        out[i + 1] = Some(rsi_from_averages(avg_gain, avg_loss));
    }
    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Wilder-smoothed Average True Range.
pub fn atr_series(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() < period + 1 {
        return out;
    }
    let true_ranges: Vec<f64> = (1..bars.len())
        .map(|i| {
            let high_low = bars[i].high - bars[i].low;
            let high_close = (bars[i].high - bars[i - 1].close).abs();
            let low_close = (bars[i].low - bars[i - 1].close).abs();
            high_low.max(high_close).max(low_close)
        })
        .collect();

    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    out[period] = finite_or_none(atr);
    for (offset, tr) in true_ranges[period..].iter().enumerate() {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
        out[period + 1 + offset] = finite_or_none(atr);
    }
    out
}

pub struct Macd {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// MACD = EMA(fast) - EMA(slow); signal = EMA(signal_period) of MACD.
pub fn macd_series(values: &[f64], fast: usize, slow: usize, signal_period: usize) -> Macd {
    let len = values.len();
    let mut out = Macd { macd: vec![None; len], signal: vec![None; len], histogram: vec![None; len] };
    if slow < fast || fast == 0 || signal_period == 0 {
        return out;
    }
    let ema_fast = ema_series(values, fast);
    let ema_slow = ema_series(values, slow);
    let macd_line: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();
    out.macd = macd_line.clone();

    let dense: Vec<f64> = macd_line.iter().filter_map(|v| *v).collect();
    let first_valid = macd_line.iter().position(|v| v.is_some());
    if let Some(first_valid) = first_valid {
        let signal_dense = ema_series(&dense, signal_period);
        for (i, sig) in signal_dense.into_iter().enumerate() {
            if let Some(sig) = sig {
                let idx = first_valid + i;
                out.signal[idx] = Some(sig);
                out.histogram[idx] = macd_line[idx].map(|m| m - sig);
            }
        }
    }
    out
}

pub struct BollingerBands {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Bollinger Bands at `period` (default 20) and `k` standard deviations (default 2).
pub fn bollinger_bands_series(values: &[f64], period: usize, k: f64) -> BollingerBands {
    let len = values.len();
    let mut out = BollingerBands { upper: vec![None; len], middle: vec![None; len], lower: vec![None; len] };
    if period == 0 || values.len() < period {
        return out;
    }
    for i in period - 1..values.len() {
        let window = &values[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();
        out.middle[i] = finite_or_none(mean);
        out.upper[i] = finite_or_none(mean + k * std);
        out.lower[i] = finite_or_none(mean - k * std);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_is_none_before_window_fills() {
        let values = vec![1.0, 2.0, 3.0];
        let out = sma_series(&values, 5);
        assert!(out.iter().all(|v| v.is_none()));
    }

    #[test]
    fn ema_seeds_with_sma_then_recurs() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let out = ema_series(&values, 3);
        assert_eq!(out[1], None);
        assert!((out[2].unwrap() - 2.0).abs() < 1e-9);
        assert!(out[5].is_some());
    }

    #[test]
    fn rsi_is_100_when_no_losses() {
        let values: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let out = rsi_series(&values, 14);
        assert_eq!(out[14], Some(100.0));
    }

    #[test]
    fn bollinger_upper_above_middle_above_lower() {
        let values = vec![10.0, 11.0, 9.0, 12.0, 8.0, 13.0, 7.0, 14.0, 6.0, 15.0, 5.0, 16.0, 4.0, 17.0, 3.0, 18.0, 2.0, 19.0, 1.0, 20.0];
        let bb = bollinger_bands_series(&values, 20, 2.0);
        let (u, m, l) = (bb.upper[19].unwrap(), bb.middle[19].unwrap(), bb.lower[19].unwrap());
        assert!(u > m);
        assert!(m > l);
    }
}
