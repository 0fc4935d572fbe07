//! Per-symbol data-quality checks (C4): gating checks that reject a symbol outright,
//! plus a weighted `data_quality_score` for symbols that pass. Spec section 4.4.

use chrono::Utc;
use signal_core::Bar;

#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    pub min_history_bars: usize,
    pub max_recency_days: i64,
    pub min_avg_daily_volume: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub max_gap_ratio: f64,
    pub max_suspicious_ratio: f64,
    pub min_completeness_pct: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_history_bars: 90,
            max_recency_days: 5,
            min_avg_daily_volume: 10_000.0,
            min_price: 0.5,
            max_price: 10_000.0,
            max_gap_ratio: 0.10,
            max_suspicious_ratio: 0.01,
            min_completeness_pct: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InsufficientHistory { bars: usize, required: usize },
    StaleData { days_since_last_bar: i64 },
    LowVolume { avg_daily_volume: f64 },
    PriceOutOfBand { price: f64 },
    TooManyGaps { gap_ratio: f64 },
    TooManySuspiciousMovements { ratio: f64 },
    IncompleteData { completeness: f64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::InsufficientHistory { bars, required } => {
                write!(f, "insufficient history: {bars} bars, need {required}")
            }
            RejectReason::StaleData { days_since_last_bar } => {
                write!(f, "stale data: last bar {days_since_last_bar} days old")
            }
            RejectReason::LowVolume { avg_daily_volume } => {
                write!(f, "average daily volume {avg_daily_volume:.0} below minimum")
            }
            RejectReason::PriceOutOfBand { price } => write!(f, "price {price:.2} outside acceptable band"),
            RejectReason::TooManyGaps { gap_ratio } => write!(f, "trading-day gap ratio {gap_ratio:.2} exceeds maximum"),
            RejectReason::TooManySuspiciousMovements { ratio } => {
                write!(f, "suspicious-movement ratio {ratio:.3} exceeds maximum")
            }
            RejectReason::IncompleteData { completeness } => write!(f, "completeness {completeness:.2} below minimum"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub passed: bool,
    pub data_quality_score: f64,
    pub reasons: Vec<RejectReason>,
    /// Bars with OHLC auto-corrected where safe to do so.
    pub corrected_bars: Vec<Bar>,
}

/// Clamps `low`/`high` inward so `low <= min(open, close) <= max(open, close) <=
/// high` holds, the "auto-corrected where safe" step the completeness check credits.
fn auto_correct(bar: &Bar) -> Bar {
    let lower_body = bar.open.min(bar.close);
    let upper_body = bar.open.max(bar.close);
    Bar {
        low: bar.low.min(lower_body),
        high: bar.high.max(upper_body),
        ..bar.clone()
    }
}

pub fn validate(bars: &[Bar], config: &ValidatorConfig) -> ValidationReport {
    let corrected: Vec<Bar> = bars.iter().map(auto_correct).collect();
    let mut reasons = Vec::new();

    if corrected.len() < config.min_history_bars {
        reasons.push(RejectReason::InsufficientHistory { bars: corrected.len(), required: config.min_history_bars });
    }

    if let Some(last) = corrected.last() {
        let days_since = (Utc::now() - last.timestamp).num_days();
        if days_since > config.max_recency_days {
            reasons.push(RejectReason::StaleData { days_since_last_bar: days_since });
        }
        if !(config.min_price..=config.max_price).contains(&last.close) {
            reasons.push(RejectReason::PriceOutOfBand { price: last.close });
        }
    }

    let avg_daily_volume = mean(&corrected.iter().map(|b| b.volume).collect::<Vec<_>>());
    if avg_daily_volume < config.min_avg_daily_volume {
        reasons.push(RejectReason::LowVolume { avg_daily_volume });
    }

    let gap_ratio = gap_ratio(&corrected);
    if gap_ratio > config.max_gap_ratio {
        reasons.push(RejectReason::TooManyGaps { gap_ratio });
    }

    let returns = daily_returns(&corrected);
    let suspicious_ratio = suspicious_movement_ratio(&corrected, &returns);
    if suspicious_ratio > config.max_suspicious_ratio {
        reasons.push(RejectReason::TooManySuspiciousMovements { ratio: suspicious_ratio });
    }

    let completeness = completeness_fraction(&corrected);
    if completeness < config.min_completeness_pct {
        reasons.push(RejectReason::IncompleteData { completeness });
    }

    let ohlc_validity_pct = corrected.iter().filter(|b| b.is_valid()).count() as f64 / corrected.len().max(1) as f64;
    let price_stability = (1.0 - std_dev(&returns) / 0.1).clamp(0.0, 1.0);
    let volume_consistency = (1.0 - coefficient_of_variation(&corrected) / 3.0).clamp(0.0, 1.0);

    let score_0_100 = completeness.min(1.0) * 20.0
        + ohlc_validity_pct * 15.0
        + price_stability * 25.0
        + volume_consistency * 25.0;

    let passed = reasons.is_empty();
    if !passed {
        tracing::debug!(reasons = ?reasons, "symbol failed quality validation");
    }

    ValidationReport {
        passed,
        data_quality_score: (score_0_100 / 100.0).clamp(0.0, 1.0),
        reasons,
        corrected_bars: corrected,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn daily_returns(bars: &[Bar]) -> Vec<f64> {
    bars.windows(2)
        .filter(|w| w[0].close != 0.0)
        .map(|w| (w[1].close - w[0].close) / w[0].close)
        .collect()
}

/// Fraction of calendar-day gaps between consecutive bars that exceed a normal
/// weekend gap (3 days), as a proxy for missing trading days in the series.
fn gap_ratio(bars: &[Bar]) -> f64 {
    if bars.len() < 2 {
        return 0.0;
    }
    let gaps = bars.len() - 1;
    let wide_gaps = bars.windows(2).filter(|w| (w[1].timestamp - w[0].timestamp).num_days() > 3).count();
    wide_gaps as f64 / gaps as f64
}

/// A single-day move with `|return| > 0.5`, or a paired move with `return > 0.2`
/// and a same-day volume change greater than 5x the prior bar's volume.
fn suspicious_movement_ratio(bars: &[Bar], returns: &[f64]) -> f64 {
    if bars.len() < 2 {
        return 0.0;
    }
    let mut suspicious = 0;
    for (i, r) in returns.iter().enumerate() {
        let prev_volume = bars[i].volume;
        let curr_volume = bars[i + 1].volume;
        let vol_change = if prev_volume > 0.0 { curr_volume / prev_volume } else { 0.0 };
        if r.abs() > 0.5 || (*r > 0.2 && vol_change > 5.0) {
            suspicious += 1;
        }
    }
    suspicious as f64 / bars.len() as f64
}

fn completeness_fraction(bars: &[Bar]) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    let complete = bars
        .iter()
        .filter(|b| [b.open, b.high, b.low, b.close, b.volume].iter().all(|v| v.is_finite()))
        .count();
    complete as f64 / bars.len() as f64
}

fn coefficient_of_variation(bars: &[Bar]) -> f64 {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let m = mean(&volumes);
    if m == 0.0 {
        return 3.0;
    }
    std_dev(&volumes) / m
}
