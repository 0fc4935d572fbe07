//! Volatility-squeeze detector: flags a symbol when BB-width percentile has stayed
//! at or below a threshold for a run of consecutive bars (spec 4.6).

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use signal_core::{Bar, CandidateSignal, ComponentScores, IndicatorSnapshot, Strategy, StrategyPayload};

use crate::finite_or;

#[derive(Debug, Clone, Copy)]
pub struct SqueezeConfig {
    pub percentile_threshold: f64,
    pub min_consecutive_bars: usize,
    pub atr_stop_multiplier: f64,
    pub default_position_size_pct: f64,
}

impl Default for SqueezeConfig {
    fn default() -> Self {
        Self {
            percentile_threshold: 20.0,
            min_consecutive_bars: 5,
            atr_stop_multiplier: 1.5,
            default_position_size_pct: 5.0,
        }
    }
}

/// Emits at most one candidate: the symbol is either in a qualifying squeeze or it
/// isn't. `bars`/`snapshots` must be index-aligned (one snapshot per bar).
pub fn detect_squeeze(symbol: &str, bars: &[Bar], snapshots: &[IndicatorSnapshot], config: &SqueezeConfig) -> Vec<CandidateSignal> {
    if bars.is_empty() || bars.len() != snapshots.len() {
        tracing::debug!(symbol, "squeeze detector: bars/snapshots misaligned or empty, skipping");
        return Vec::new();
    }

    let last = bars.last().unwrap();
    let last_snapshot = snapshots.last().unwrap();

    let Some(percentile) = last_snapshot.bb_width_percentile else {
        return Vec::new();
    };
    if percentile > config.percentile_threshold {
        return Vec::new();
    }

    let days_in_squeeze = snapshots
        .iter()
        .rev()
        .take_while(|s| s.bb_width_percentile.map(|p| p <= config.percentile_threshold).unwrap_or(false))
        .count();
    if days_in_squeeze < config.min_consecutive_bars {
        return Vec::new();
    }

    let (Some(bb_upper), Some(bb_lower)) = (last_snapshot.bb_upper, last_snapshot.bb_lower) else {
        return Vec::new();
    };
    let distance_to_upper = (bb_upper - last.close).abs();
    let distance_to_lower = (last.close - bb_lower).abs();
    let breakout_proximity_pct = if last.close != 0.0 {
        distance_to_upper.min(distance_to_lower) / last.close * 100.0
    } else {
        0.0
    };

    let squeeze_depth = 100.0 - percentile;

    let trend_alignment = match (last_snapshot.ema_20, last_snapshot.ema_50) {
        (Some(ema20), Some(ema50)) if ema50 != 0.0 => {
            let aligned_up = last.close > ema20 && ema20 > ema50;
            let aligned_down = last.close < ema20 && ema20 < ema50;
            if aligned_up || aligned_down {
                1.0
            } else {
                0.4
            }
        }
        _ => 0.5,
    };

    let volume_confirmation = match last_snapshot.volume_sma_20 {
        Some(avg) if avg > 0.0 => (last.volume / avg / 2.0).clamp(0.0, 1.0),
        _ => 0.3,
    };

    let tightness_score = (squeeze_depth / 100.0).clamp(0.0, 1.0);

    let component_scores = ComponentScores {
        volume: Some(volume_confirmation),
        momentum: Some(trend_alignment),
        relative_strength: None,
        risk_liquidity: Some(tightness_score),
        fundamental: None,
    };

    let stop_loss_level = last_snapshot
        .atr_20
        .map(|atr| last.close - config.atr_stop_multiplier * atr)
        .and_then(Decimal::from_f64);

    vec![CandidateSignal {
        symbol: symbol.to_string(),
        strategy: Strategy::Squeeze,
        close_price: Decimal::from_f64(last.close).unwrap_or_default(),
        component_scores,
        payload: StrategyPayload::Squeeze {
            squeeze_depth: finite_or(squeeze_depth, 0.0),
            days_in_squeeze: days_in_squeeze as i32,
            breakout_proximity_pct: finite_or(breakout_proximity_pct, 0.0),
        },
        stop_loss_level,
        position_size_pct: Some(config.default_position_size_pct),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tight_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                timestamp: Utc::now() + chrono::Duration::days(i as i64),
                open: 100.0,
                high: 100.2,
                low: 99.8,
                close: 100.0,
                volume: 20_000.0,
                vwap: None,
            })
            .collect()
    }

    #[test]
    fn tight_range_series_produces_a_squeeze_candidate() {
        let bars = tight_bars(60);
        let snapshots = indicator_kernel::build_snapshots(&bars);
        let candidates = detect_squeeze("AAPL", &bars, &snapshots, &SqueezeConfig::default());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].strategy, Strategy::Squeeze);
    }

    #[test]
    fn mismatched_lengths_yield_no_candidates() {
        let bars = tight_bars(10);
        let candidates = detect_squeeze("AAPL", &bars, &[], &SqueezeConfig::default());
        assert!(candidates.is_empty());
    }
}
