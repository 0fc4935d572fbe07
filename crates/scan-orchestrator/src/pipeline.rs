//! Per-symbol fan-out unit: quality validation, indicator computation, and
//! strategy detection fused into one task (C3/C4/C6, spec sections 4.3-4.4 and
//! 4.6), the same "one async task per symbol behind a semaphore permit" shape
//! `data-loader::main::process_symbol` uses for its own per-symbol feature loop.
//! Scoring happens one level up in `ScanOrchestrator::run_scan`, once spread
//! annotation (C11) has run over the whole batch, since the options scorer needs
//! the spread confidence spread-annotation produces.

use async_trait::async_trait;
use detector_set::{
    detect_penny_explosion, detect_reddit_opportunity, detect_squeeze, detect_unusual_options, PennyExplosionConfig, PremiumTier,
    RedditMentionWindow, RedditOpportunityConfig, SqueezeConfig, UnusualOptionsConfig,
};
use quality_validator::ValidatorConfig;
use signal_core::{Bar, CandidateSignal, OptionsContract, Strategy, Ticker};
use std::collections::HashMap;

/// Optional collaborator supplying pre-aggregated Reddit mention windows for
/// C6's reddit_opportunity detector. Mirrors the `MLPredictor`/`Notifier`
/// shape in `signal-core::traits`: a scan run without one simply emits zero
/// reddit_opportunity candidates rather than failing the strategy.
#[async_trait]
pub trait RedditMentionProvider: Send + Sync {
    async fn mention_windows(&self, symbols: &[String]) -> HashMap<String, RedditMentionWindow>;
}

/// `Ticker.market_cap` bucketed into the tier `detect_unusual_options` scales its
/// premium thresholds by. Thresholds follow the SEC's own small/mid/large-cap
/// reporting bands; a ticker with no market cap on file is treated as `Small`,
/// the most conservative (lowest premium bar) tier.
pub fn tier_for_market_cap(market_cap: Option<f64>) -> PremiumTier {
    match market_cap {
        Some(cap) if cap >= 10_000_000_000.0 => PremiumTier::Large,
        Some(cap) if cap >= 2_000_000_000.0 => PremiumTier::Mid,
        _ => PremiumTier::Small,
    }
}

/// Per-symbol scoring inputs that don't live on `CandidateSignal` itself, carried
/// alongside each candidate so the orchestrator's scoring pass (one level up)
/// can build a `scorer::ScoringContext` without re-touching the raw bars.
#[derive(Debug, Clone)]
pub struct ScoringMeta {
    pub volume_ratio: f64,
    pub country: Option<String>,
}

pub enum SymbolOutcome {
    ValidationFailed { symbol: String, reasons: String },
    Candidates { candidates: Vec<CandidateSignal>, meta: ScoringMeta },
}

pub struct PerSymbolInput {
    pub strategy: Strategy,
    pub symbol: String,
    pub bars: Vec<Bar>,
    pub benchmark_bars: Option<Vec<Bar>>,
    pub options: Option<Vec<OptionsContract>>,
    pub reddit_window: Option<RedditMentionWindow>,
    pub ticker: Option<Ticker>,
    pub validator_config: ValidatorConfig,
    pub squeeze_config: SqueezeConfig,
    pub penny_config: PennyExplosionConfig,
    pub unusual_config: UnusualOptionsConfig,
    pub reddit_config: RedditOpportunityConfig,
}

fn last_volume_ratio(bars: &[Bar], volume_sma_20: Option<f64>) -> f64 {
    let last = match bars.last() {
        Some(bar) => bar,
        None => return 1.0,
    };
    match volume_sma_20 {
        Some(avg) if avg > 0.0 => last.volume / avg,
        _ => 1.0,
    }
}

/// Runs C3 (validate) -> C4 (indicators) -> C6 (detect) for one symbol.
/// Corresponds to one `process_symbol` call in the teacher's fan-out, except
/// detection replaces feature extraction and nothing is written to a database
/// here — candidates flow back to the caller for batch-level spread
/// annotation and scoring.
pub fn run_symbol_pipeline(input: PerSymbolInput) -> SymbolOutcome {
    let report = quality_validator::validate(&input.bars, &input.validator_config);
    if !report.passed {
        let reasons = report
            .reasons
            .iter()
            .map(|r| format!("{r:?}"))
            .collect::<Vec<_>>()
            .join("; ");
        tracing::debug!(symbol = %input.symbol, reasons = %reasons, "symbol rejected by quality validator");
        return SymbolOutcome::ValidationFailed { symbol: input.symbol, reasons };
    }

    let bars = report.corrected_bars;
    let snapshots = indicator_kernel::build_snapshots(&bars);
    let volume_ratio = last_volume_ratio(&bars, snapshots.last().and_then(|s| s.volume_sma_20));
    let country = input.ticker.as_ref().and_then(|t| t.country.clone());
    let close_price = bars.last().map(|b| b.close).unwrap_or(0.0);

    let candidates = match input.strategy {
        Strategy::Squeeze => detect_squeeze(&input.symbol, &bars, &snapshots, &input.squeeze_config),
        Strategy::PennyExplosion => {
            detect_penny_explosion(&input.symbol, &bars, &snapshots, input.benchmark_bars.as_deref(), &input.penny_config)
        }
        Strategy::UnusualOptions => match &input.options {
            Some(contracts) if !contracts.is_empty() => {
                let tier = tier_for_market_cap(input.ticker.as_ref().and_then(|t| t.market_cap));
                detect_unusual_options(contracts, tier, &input.unusual_config)
            }
            _ => Vec::new(),
        },
        Strategy::RedditOpportunity => match &input.reddit_window {
            Some(window) => detect_reddit_opportunity(&input.symbol, close_price, window, &input.reddit_config),
            None => Vec::new(),
        },
    };

    SymbolOutcome::Candidates { candidates, meta: ScoringMeta { volume_ratio, country } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_cap_maps_to_large_tier() {
        assert_eq!(tier_for_market_cap(Some(50_000_000_000.0)), PremiumTier::Large);
    }

    #[test]
    fn missing_market_cap_defaults_to_small() {
        assert_eq!(tier_for_market_cap(None), PremiumTier::Small);
    }

    #[test]
    fn mid_cap_boundary_is_inclusive() {
        assert_eq!(tier_for_market_cap(Some(2_000_000_000.0)), PremiumTier::Mid);
    }
}
