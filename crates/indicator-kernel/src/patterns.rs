//! Higher-level pattern detectors built on raw bars, consumed by C6's detectors.

use signal_core::Bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsolidationResult {
    pub in_consolidation: bool,
    pub days: usize,
    pub range_pct: f64,
}

/// Over the last `max_days` bars: `range_pct = (maxHigh - minLow) / ((maxHigh +
/// minLow)/2) * 100`; in consolidation iff `range_pct <= max_range_pct` and the
/// window holds at least `min_days` bars.
pub fn detect_consolidation(bars: &[Bar], min_days: usize, max_days: usize, max_range_pct: f64) -> ConsolidationResult {
    if bars.len() < min_days || max_days == 0 {
        return ConsolidationResult { in_consolidation: false, days: 0, range_pct: 0.0 };
    }
    let window_len = max_days.min(bars.len());
    let window = &bars[bars.len() - window_len..];

    let max_high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let min_low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let mid = (max_high + min_low) / 2.0;
    let range_pct = if mid > 0.0 { (max_high - min_low) / mid * 100.0 } else { 0.0 };

    ConsolidationResult {
        in_consolidation: window_len >= min_days && range_pct <= max_range_pct,
        days: window_len,
        range_pct,
    }
}

/// Locates local minima by the three-point rule (`low[i-1] > low[i] < low[i+1]`)
/// over the trailing `lookback` bars; true iff at least two are found and they are
/// strictly increasing.
pub fn detect_higher_lows(bars: &[Bar], lookback: usize) -> bool {
    if bars.len() < 3 {
        return false;
    }
    let window_len = lookback.min(bars.len());
    let window = &bars[bars.len() - window_len..];

    let mut minima = Vec::new();
    for i in 1..window.len().saturating_sub(1) {
        if window[i - 1].low > window[i].low && window[i].low < window[i + 1].low {
            minima.push(window[i].low);
        }
    }
    minima.len() >= 2 && minima.windows(2).all(|w| w[1] > w[0])
}

/// `(meanVol(last period) - meanVol(prior period)) / meanVol(prior period) * 100`
/// over two adjacent, equal-length, symmetric sliding windows.
pub fn volume_acceleration(bars: &[Bar], period: usize) -> f64 {
    if period == 0 || bars.len() < period * 2 {
        return 0.0;
    }
    let recent = &bars[bars.len() - period..];
    let prior = &bars[bars.len() - 2 * period..bars.len() - period];

    let mean_recent = recent.iter().map(|b| b.volume).sum::<f64>() / period as f64;
    let mean_prior = prior.iter().map(|b| b.volume).sum::<f64>() / period as f64;

    if mean_prior == 0.0 {
        return 0.0;
    }
    (mean_recent - mean_prior) / mean_prior * 100.0
}

/// Fraction of the last `lookback` bars whose volume is at least `mult` times the
/// trailing 20-day baseline average volume.
pub fn volume_consistency_score(bars: &[Bar], lookback: usize, mult: f64) -> f64 {
    if bars.is_empty() || bars.len() < 20 {
        return 0.0;
    }
    let baseline_window = &bars[bars.len() - 20..];
    let baseline = baseline_window.iter().map(|b| b.volume).sum::<f64>() / 20.0;
    if baseline == 0.0 {
        return 0.0;
    }

    let window_len = lookback.min(bars.len());
    let window = &bars[bars.len() - window_len..];
    let hits = window.iter().filter(|b| b.volume >= mult * baseline).count();
    hits as f64 / window_len as f64
}

/// Longest trailing run of bars with `close > open`, capped at `max_lookback`.
pub fn consecutive_green_days(bars: &[Bar], max_lookback: usize) -> usize {
    let window_len = max_lookback.min(bars.len());
    let window = &bars[bars.len() - window_len..];
    let mut run = 0;
    for bar in window.iter().rev() {
        if bar.close > bar.open {
            run += 1;
        } else {
            break;
        }
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(high: f64, low: f64, open: f64, close: f64, volume: f64) -> Bar {
        Bar { timestamp: Utc::now(), open, high, low, close, volume, vwap: None }
    }

    #[test]
    fn tight_range_is_in_consolidation() {
        let bars: Vec<Bar> = (0..20).map(|_| bar(10.1, 9.9, 10.0, 10.0, 1000.0)).collect();
        let result = detect_consolidation(&bars, 5, 20, 5.0);
        assert!(result.in_consolidation);
    }

    #[test]
    fn wide_range_is_not_in_consolidation() {
        let mut bars: Vec<Bar> = (0..20).map(|_| bar(10.1, 9.9, 10.0, 10.0, 1000.0)).collect();
        bars.push(bar(50.0, 1.0, 10.0, 10.0, 1000.0));
        let result = detect_consolidation(&bars, 5, 21, 5.0);
        assert!(!result.in_consolidation);
    }

    #[test]
    fn strictly_increasing_minima_is_higher_lows() {
        let bars = vec![
            bar(12.0, 11.0, 11.5, 11.8, 100.0),
            bar(11.5, 9.0, 10.0, 10.5, 100.0),
            bar(12.0, 10.5, 10.6, 11.0, 100.0),
            bar(13.0, 11.0, 11.2, 12.5, 100.0),
            bar(12.5, 9.5, 11.0, 10.0, 100.0),
            bar(13.0, 9.8, 10.1, 12.0, 100.0),
        ];
        assert!(detect_higher_lows(&bars, 6));
    }

    #[test]
    fn volume_acceleration_positive_on_volume_ramp() {
        let mut bars = Vec::new();
        for _ in 0..10 {
            bars.push(bar(10.0, 9.0, 9.5, 9.8, 1000.0));
        }
        for _ in 0..10 {
            bars.push(bar(10.0, 9.0, 9.5, 9.8, 5000.0));
        }
        assert!(volume_acceleration(&bars, 10) > 0.0);
    }

    #[test]
    fn consecutive_green_days_counts_trailing_run() {
        let bars = vec![
            bar(10.0, 9.0, 9.5, 9.0, 100.0),
            bar(10.0, 9.0, 9.0, 9.5, 100.0),
            bar(10.5, 9.5, 9.5, 10.0, 100.0),
            bar(11.0, 10.0, 10.0, 10.8, 100.0),
        ];
        assert_eq!(consecutive_green_days(&bars, 10), 3);
    }
}
