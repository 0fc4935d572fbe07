//! Builds one `IndicatorSnapshot` per input bar (spec section 3: "one-to-one with
//! bars"). Every field is `None` until its own window has filled, never a guessed
//! default.

use signal_core::{adaptive::percentile_rank, Bar, IndicatorSnapshot};

use crate::averages::{atr_series, bollinger_bands_series, ema_series, macd_series, rsi_series, sma_series};

const TRAILING_52W_BARS: usize = 252;
const BB_PERCENTILE_WINDOW: usize = 180;

pub fn build_snapshots(bars: &[Bar]) -> Vec<IndicatorSnapshot> {
    if bars.is_empty() {
        return Vec::new();
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let ema_20 = ema_series(&closes, 20);
    let ema_50 = ema_series(&closes, 50);
    let atr_20 = atr_series(bars, 20);
    let rsi_14 = rsi_series(&closes, 14);
    let macd = macd_series(&closes, 12, 26, 9);
    let bb = bollinger_bands_series(&closes, 20, 2.0);
    let volume_sma_20 = sma_series(&volumes, 20);

    let bb_width: Vec<Option<f64>> = bb
        .upper
        .iter()
        .zip(bb.middle.iter())
        .zip(bb.lower.iter())
        .map(|((u, m), l)| match (u, m, l) {
            (Some(u), Some(m), Some(l)) if *m != 0.0 => Some((u - l) / m),
            _ => None,
        })
        .collect();

    let bb_width_percentile = trailing_percentiles(&bb_width, BB_PERCENTILE_WINDOW);

    let mut snapshots = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let window_start = i.saturating_sub(TRAILING_52W_BARS.saturating_sub(1));
        let window = &bars[window_start..=i];
        let high_52w = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let low_52w = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);

        let distance_from_52w_high = if high_52w > 0.0 { Some((bar.close - high_52w) / high_52w * 100.0) } else { None };
        let distance_from_52w_low = if low_52w > 0.0 { Some((bar.close - low_52w) / low_52w * 100.0) } else { None };

        snapshots.push(IndicatorSnapshot {
            timestamp: bar.timestamp,
            ema_20: ema_20[i],
            ema_50: ema_50[i],
            atr_20: atr_20[i],
            rsi_14: rsi_14[i],
            macd: macd.macd[i],
            macd_signal: macd.signal[i],
            macd_histogram: macd.histogram[i],
            bb_upper: bb.upper[i],
            bb_middle: bb.middle[i],
            bb_lower: bb.lower[i],
            bb_width: bb_width[i],
            bb_width_percentile: bb_width_percentile[i],
            volume_sma_20: volume_sma_20[i],
            distance_from_52w_high,
            distance_from_52w_low,
        });
    }
    snapshots
}

/// At each index with a present value, the percentile rank of that value within the
/// trailing `window` of present values (itself excluded from its own comparison set).
fn trailing_percentiles(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; series.len()];
    let mut history: Vec<f64> = Vec::with_capacity(window);
    for (i, value) in series.iter().enumerate() {
        if let Some(v) = value {
            out[i] = Some(percentile_rank(*v, &history) * 100.0);
            history.push(*v);
            if history.len() > window {
                history.remove(0);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn synthetic_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.1).sin() * 5.0;
                Bar {
                    timestamp: Utc::now() + chrono::Duration::days(i as i64),
                    open: base,
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base + 0.2,
                    volume: 10_000.0 + i as f64 * 10.0,
                    vwap: None,
                }
            })
            .collect()
    }

    #[test]
    fn snapshot_count_matches_bar_count() {
        let bars = synthetic_bars(60);
        let snaps = build_snapshots(&bars);
        assert_eq!(snaps.len(), bars.len());
    }

    #[test]
    fn insufficient_history_leaves_ema50_null() {
        let bars = synthetic_bars(30);
        let snaps = build_snapshots(&bars);
        assert!(snaps.last().unwrap().ema_50.is_none());
    }

    #[test]
    fn sufficient_history_populates_bb_fields_in_order() {
        let bars = synthetic_bars(60);
        let snaps = build_snapshots(&bars);
        let last = snaps.last().unwrap();
        assert!(last.bb_upper.unwrap() > last.bb_middle.unwrap());
        assert!(last.bb_middle.unwrap() > last.bb_lower.unwrap());
    }
}
