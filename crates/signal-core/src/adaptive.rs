//! Data-driven threshold helpers, used by the scorer and detectors in place of
//! hardcoded cutoffs where a distribution-relative judgment reads better.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Fraction of `history` strictly below `value`, in [0, 1].
pub fn percentile_rank(value: f64, history: &[f64]) -> f64 {
    if history.is_empty() {
        return 0.5;
    }
    let below = history.iter().filter(|&&h| h < value).count();
    below as f64 / history.len() as f64
}

/// Value at a given percentile (0..=1) of a sorted copy of `history`.
pub fn percentile_value(history: &[f64], percentile: f64) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let mut sorted = history.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((percentile.clamp(0.0, 1.0)) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx]
}

pub fn z_score_of(value: f64, history: &[f64]) -> f64 {
    let sd = std_dev(history);
    if sd == 0.0 {
        return 0.0;
    }
    (value - mean(history)) / sd
}

/// Maps a percentile rank to a -1.0..1.0 signal with a neutral dead-zone around 0.5.
pub fn percentile_to_signal(percentile: f64, dead_zone: f64) -> f64 {
    let centered = percentile - 0.5;
    if centered.abs() <= dead_zone {
        return 0.0;
    }
    let scaled = (centered.abs() - dead_zone) / (0.5 - dead_zone);
    scaled.clamp(0.0, 1.0) * centered.signum()
}

/// Maps an absolute z-score to a 0..1 weight, saturating at `cap` standard deviations.
pub fn z_score_to_weight(z: f64, cap: f64) -> f64 {
    if cap <= 0.0 {
        return 0.0;
    }
    (z.abs() / cap).clamp(0.0, 1.0)
}

pub fn is_outlier(value: f64, history: &[f64], z_threshold: f64) -> bool {
    z_score_of(value, history).abs() >= z_threshold
}

/// Combines a percentile-derived signal and a z-score-derived confidence weight into
/// a single adaptive score in -1.0..1.0.
pub fn adaptive_signal(value: f64, history: &[f64], dead_zone: f64, z_cap: f64) -> f64 {
    let percentile = percentile_rank(value, history);
    let signal = percentile_to_signal(percentile, dead_zone);
    let weight = z_score_to_weight(z_score_of(value, history), z_cap);
    signal * weight.max(0.3)
}
