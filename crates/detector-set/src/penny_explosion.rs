//! Penny-stock explosion detector (spec 4.6): requires a qualifying price band and
//! dollar volume, plus at least one of volume surge / consolidation breakout /
//! higher-lows.

use indicator_kernel::{detect_consolidation, detect_higher_lows};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use signal_core::{Bar, CandidateSignal, ComponentScores, IndicatorSnapshot, Strategy, StrategyPayload};

use crate::finite_or;

#[derive(Debug, Clone, Copy)]
pub struct PennyExplosionConfig {
    pub min_price: f64,
    pub max_price: f64,
    pub min_dollar_volume: f64,
    pub volume_ratio_threshold: f64,
    pub consolidation_min_days: usize,
    pub consolidation_max_days: usize,
    pub consolidation_max_range_pct: f64,
    pub higher_lows_lookback: usize,
    pub stop_loss_pct: f64,
    pub default_position_size_pct: f64,
}

impl Default for PennyExplosionConfig {
    fn default() -> Self {
        Self {
            min_price: 0.1,
            max_price: 5.0,
            min_dollar_volume: 500_000.0,
            volume_ratio_threshold: 2.0,
            consolidation_min_days: 10,
            consolidation_max_days: 20,
            consolidation_max_range_pct: 15.0,
            higher_lows_lookback: 10,
            stop_loss_pct: 0.15,
            default_position_size_pct: 3.0,
        }
    }
}

fn price_change_pct(bars: &[Bar], lookback: usize) -> f64 {
    if bars.len() <= lookback {
        return 0.0;
    }
    let now = bars.last().unwrap().close;
    let then = bars[bars.len() - 1 - lookback].close;
    if then == 0.0 {
        return 0.0;
    }
    (now - then) / then * 100.0
}

pub fn detect_penny_explosion(
    symbol: &str,
    bars: &[Bar],
    snapshots: &[IndicatorSnapshot],
    benchmark_bars: Option<&[Bar]>,
    config: &PennyExplosionConfig,
) -> Vec<CandidateSignal> {
    if bars.is_empty() || bars.len() != snapshots.len() {
        tracing::debug!(symbol, "penny explosion detector: bars/snapshots misaligned or empty, skipping");
        return Vec::new();
    }

    let last = bars.last().unwrap();
    let last_snapshot = snapshots.last().unwrap();

    if !(config.min_price..=config.max_price).contains(&last.close) {
        return Vec::new();
    }
    let dollar_volume = last.close * last.volume;
    if dollar_volume < config.min_dollar_volume {
        return Vec::new();
    }

    let volume_ratio = match last_snapshot.volume_sma_20 {
        Some(avg) if avg > 0.0 => last.volume / avg,
        _ => 0.0,
    };

    let prior_window_end = bars.len().saturating_sub(1);
    let prior_bars = &bars[..prior_window_end];
    let consolidation = detect_consolidation(prior_bars, config.consolidation_min_days, config.consolidation_max_days, config.consolidation_max_range_pct);
    let breakout_from_consolidation = consolidation.in_consolidation
        && prior_bars
            .iter()
            .rev()
            .take(consolidation.days)
            .map(|b| b.high)
            .fold(f64::NEG_INFINITY, f64::max)
            < last.close;

    let higher_lows = detect_higher_lows(bars, config.higher_lows_lookback);
    let volume_surge = volume_ratio >= config.volume_ratio_threshold;

    if !(volume_surge || breakout_from_consolidation || higher_lows) {
        return Vec::new();
    }

    let price_change_5d = price_change_pct(bars, 5);
    let price_change_10d = price_change_pct(bars, 10);
    let price_change_20d = price_change_pct(bars, 20);

    let above_ema20 = last_snapshot.ema_20.map(|e| last.close > e).unwrap_or(false);
    let momentum_raw = (price_change_5d / 20.0 + price_change_10d / 30.0 + price_change_20d / 40.0) / 3.0;
    let momentum_score = (momentum_raw.clamp(-1.0, 1.0) * 0.5 + 0.5) * if above_ema20 { 1.0 } else { 0.8 };

    let relative_strength = benchmark_bars.and_then(|bench| {
        if bench.len() < 21 || bars.len() < 21 {
            return None;
        }
        let symbol_return = price_change_pct(bars, 20);
        let benchmark_return = price_change_pct(bench, 20);
        let spread = symbol_return - benchmark_return;
        Some((spread / 50.0).clamp(-1.0, 1.0) * 0.5 + 0.5)
    });

    let volume_score = (volume_ratio / 5.0).clamp(0.0, 1.0);

    let component_scores = ComponentScores {
        volume: Some(volume_score),
        momentum: Some(momentum_score.clamp(0.0, 1.0)),
        relative_strength,
        risk_liquidity: Some((dollar_volume / (config.min_dollar_volume * 10.0)).clamp(0.0, 1.0)),
        fundamental: None,
    };

    let stop_loss_level = Decimal::from_f64(last.close * (1.0 - config.stop_loss_pct));

    vec![CandidateSignal {
        symbol: symbol.to_string(),
        strategy: Strategy::PennyExplosion,
        close_price: Decimal::from_f64(last.close).unwrap_or_default(),
        component_scores,
        payload: StrategyPayload::PennyExplosion {
            volume_ratio: finite_or(volume_ratio, 0.0),
            price_change_5d: finite_or(price_change_5d, 0.0),
            price_change_10d: finite_or(price_change_10d, 0.0),
            price_change_20d: finite_or(price_change_20d, 0.0),
        },
        stop_loss_level,
        position_size_pct: Some(config.default_position_size_pct),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ramping_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 1.0 + (i as f64) * 0.05;
                let volume = if i + 1 == n { 500_000.0 } else { 20_000.0 };
                Bar {
                    timestamp: Utc::now() + chrono::Duration::days(i as i64),
                    open: base,
                    high: base + 0.05,
                    low: base - 0.05,
                    close: base,
                    volume,
                    vwap: None,
                }
            })
            .collect()
    }

    #[test]
    fn volume_surge_on_a_qualifying_penny_stock_emits_a_candidate() {
        let bars = ramping_bars(60);
        let snapshots = indicator_kernel::build_snapshots(&bars);
        let candidates = detect_penny_explosion("PENY", &bars, &snapshots, None, &PennyExplosionConfig::default());
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn price_above_band_is_rejected() {
        let mut bars = ramping_bars(60);
        for bar in &mut bars {
            bar.close = 50.0;
            bar.open = 50.0;
            bar.high = 50.1;
            bar.low = 49.9;
        }
        let snapshots = indicator_kernel::build_snapshots(&bars);
        let candidates = detect_penny_explosion("XYZ", &bars, &snapshots, None, &PennyExplosionConfig::default());
        assert!(candidates.is_empty());
    }
}
