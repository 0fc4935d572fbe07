//! Composite scoring (C5): turns a strategy's component scores into a single
//! `overall_score`, grade, and recommendation, with pump-and-dump and
//! high-risk-country risk adjustments. Spec section 4.5.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use signal_core::{ComponentScores, Grade, Recommendation};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("strategy weights for {strategy} sum to {sum:.4}, expected 1.0 +/- 0.001")]
    InvalidWeights { strategy: String, sum: f64 },
}

/// Per-strategy weighting of the five component scores. Must sum to 1.0 +/- 0.001;
/// validated at construction time (spec's open question on scan-time weight tables
/// that don't sum to 1.0 is resolved here as fail-closed, not warn-and-normalize —
/// see DESIGN.md).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategyWeights {
    pub volume: f64,
    pub momentum: f64,
    pub relative_strength: f64,
    pub risk_liquidity: f64,
    pub fundamental: f64,
}

impl StrategyWeights {
    pub fn validated(self, strategy: &str) -> Result<Self, ScorerError> {
        let sum = self.volume + self.momentum + self.relative_strength + self.risk_liquidity + self.fundamental;
        if (sum - 1.0).abs() > 0.001 {
            return Err(ScorerError::InvalidWeights { strategy: strategy.to_string(), sum });
        }
        Ok(self)
    }

    /// The example weight table from spec section 4.5 (the penny-stock strategy).
    pub fn penny_explosion_default() -> Self {
        Self { volume: 0.50, momentum: 0.30, relative_strength: 0.15, risk_liquidity: 0.05, fundamental: 0.0 }
    }

    /// A balanced default for strategies the spec does not give an explicit table
    /// for (squeeze, unusual options, Reddit opportunity).
    pub fn balanced_default() -> Self {
        Self { volume: 0.25, momentum: 0.30, relative_strength: 0.20, risk_liquidity: 0.15, fundamental: 0.10 }
    }
}

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub weights: StrategyWeights,
    pub high_risk_countries: HashSet<String>,
    pub country_risk_penalty: f64,
    pub pump_dump_volume_ceiling: f64,
    pub pump_dump_price_ceiling: f64,
    pub pump_dump_penalty: f64,
    pub spread_confidence_threshold: f64,
    pub spread_score_reduction_factor: f64,
}

impl ScorerConfig {
    pub fn new(weights: StrategyWeights) -> Self {
        Self {
            weights,
            high_risk_countries: ["Israel", "China", "Russia"].iter().map(|s| s.to_string()).collect(),
            country_risk_penalty: 0.9,
            pump_dump_volume_ceiling: 10.0,
            pump_dump_price_ceiling: 0.5,
            pump_dump_penalty: 0.8,
            spread_confidence_threshold: 0.80,
            spread_score_reduction_factor: 0.85,
        }
    }
}

/// Everything about today's detection that the composite doesn't already carry in
/// `ComponentScores`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringContext<'a> {
    pub close_price: f64,
    pub volume_ratio: f64,
    pub country: Option<&'a str>,
    pub spread_confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreResult {
    pub overall_score: f64,
    pub grade: Grade,
    pub recommendation: Recommendation,
    pub pump_dump_warning: bool,
    pub high_risk_country: bool,
}

/// Weighted sum over whichever components are present; a missing component's
/// weight is redistributed pro-rata to the others (spec 4.5).
pub fn composite_score(components: &ComponentScores, weights: &StrategyWeights) -> f64 {
    let pairs: [(Option<f64>, f64); 5] = [
        (components.volume, weights.volume),
        (components.momentum, weights.momentum),
        (components.relative_strength, weights.relative_strength),
        (components.risk_liquidity, weights.risk_liquidity),
        (components.fundamental, weights.fundamental),
    ];

    let present_weight: f64 = pairs.iter().filter(|(v, _)| v.is_some()).map(|(_, w)| w).sum();
    if present_weight <= 0.0 {
        return 0.0;
    }

    pairs
        .iter()
        .filter_map(|(v, w)| v.map(|value| value * (w / present_weight)))
        .sum()
}

pub fn score(components: &ComponentScores, ctx: &ScoringContext, config: &ScorerConfig) -> ScoreResult {
    let mut overall = composite_score(components, &config.weights);

    let high_risk_country = ctx.country.map(|c| config.high_risk_countries.contains(c)).unwrap_or(false);
    if high_risk_country {
        overall *= config.country_risk_penalty;
    }

    let pump_dump_warning = ctx.volume_ratio >= config.pump_dump_volume_ceiling
        && ctx.close_price < config.pump_dump_price_ceiling
        && high_risk_country;
    if pump_dump_warning {
        overall *= config.pump_dump_penalty;
    }

    if let Some(confidence) = ctx.spread_confidence {
        if confidence >= config.spread_confidence_threshold {
            overall *= config.spread_score_reduction_factor;
        }
    }

    overall = overall.clamp(0.0, 1.0);
    let grade = Grade::from_score(overall);
    let recommendation = recommendation_for(overall, pump_dump_warning);

    if pump_dump_warning {
        tracing::debug!(price = ctx.close_price, volume_ratio = ctx.volume_ratio, "pump-and-dump warning applied");
    }

    ScoreResult { overall_score: overall, grade, recommendation, pump_dump_warning, high_risk_country }
}

/// Default recommendation table (spec 4.5). A pump-and-dump flag overrides score
/// entirely: always SKIP regardless of the underlying score.
fn recommendation_for(score: f64, pump_dump_warning: bool) -> Recommendation {
    if pump_dump_warning {
        return Recommendation::Skip;
    }
    match score {
        s if s >= 0.85 => Recommendation::StrongBuy,
        s if s >= 0.70 => Recommendation::Buy,
        s if s >= 0.55 => Recommendation::Watch,
        _ => Recommendation::Hold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penny_explosion_default_weights_sum_to_one() {
        StrategyWeights::penny_explosion_default().validated("penny_explosion").unwrap();
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let bad = StrategyWeights { volume: 0.5, momentum: 0.5, relative_strength: 0.5, risk_liquidity: 0.0, fundamental: 0.0 };
        assert!(bad.validated("test").is_err());
    }

    #[test]
    fn missing_component_redistributes_weight_pro_rata() {
        let weights = StrategyWeights::penny_explosion_default();
        let components = ComponentScores { volume: Some(0.8), momentum: Some(0.6), relative_strength: None, risk_liquidity: Some(0.4), fundamental: None };
        let composite = composite_score(&components, &weights);
        // present weight = 0.50 + 0.30 + 0.05 = 0.85; redistributed.
        assert!(composite > 0.0 && composite <= 1.0);
    }

    #[test]
    fn high_conviction_score_maps_to_strong_buy() {
        let config = ScorerConfig::new(StrategyWeights::balanced_default());
        let components = ComponentScores { volume: Some(0.95), momentum: Some(0.9), relative_strength: Some(0.9), risk_liquidity: Some(0.9), fundamental: Some(0.9) };
        let ctx = ScoringContext { close_price: 50.0, volume_ratio: 1.0, country: None, spread_confidence: None };
        let result = score(&components, &ctx, &config);
        assert_eq!(result.grade, Grade::S);
        assert!(matches!(result.recommendation, Recommendation::StrongBuy));
    }

    #[test]
    fn pump_dump_conditions_force_skip_regardless_of_score() {
        let config = ScorerConfig::new(StrategyWeights::balanced_default());
        let components = ComponentScores { volume: Some(0.95), momentum: Some(0.95), relative_strength: Some(0.95), risk_liquidity: Some(0.95), fundamental: Some(0.95) };
        let ctx = ScoringContext { close_price: 0.2, volume_ratio: 12.0, country: Some("Israel"), spread_confidence: None };
        let result = score(&components, &ctx, &config);
        assert!(result.pump_dump_warning);
        assert!(matches!(result.recommendation, Recommendation::Skip));
    }

    #[test]
    fn spread_confidence_above_threshold_reduces_score() {
        let config = ScorerConfig::new(StrategyWeights::balanced_default());
        let components = ComponentScores { volume: Some(0.8), momentum: Some(0.8), relative_strength: Some(0.8), risk_liquidity: Some(0.8), fundamental: Some(0.8) };
        let ctx_plain = ScoringContext { close_price: 50.0, volume_ratio: 1.0, country: None, spread_confidence: None };
        let ctx_spread = ScoringContext { spread_confidence: Some(0.9), ..ctx_plain };
        let plain = score(&components, &ctx_plain, &config);
        let spread = score(&components, &ctx_spread, &config);
        assert!(spread.overall_score < plain.overall_score);
    }
}
