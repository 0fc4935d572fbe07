//! Reddit-opportunity detector (spec 4.6): composites mention volume, sentiment
//! polarity, and quality-filtered mention count into one ticker-level signal. No
//! per-mention rows are emitted.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use signal_core::{CandidateSignal, ComponentScores, Strategy, StrategyPayload};

/// Pre-aggregated mention data for one (ticker, window); raw-mention collection and
/// NLP sentiment scoring are an upstream collaborator's job, not this detector's.
#[derive(Debug, Clone, Copy)]
pub struct RedditMentionWindow {
    pub mention_count: i64,
    pub sentiment_polarity: f64,
    pub quality_filtered_mentions: i64,
    pub window_days: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct RedditOpportunityConfig {
    pub min_quality_mentions: i64,
    pub min_sentiment_polarity: f64,
    pub mention_saturation: f64,
    pub default_position_size_pct: f64,
}

impl Default for RedditOpportunityConfig {
    fn default() -> Self {
        Self {
            min_quality_mentions: 5,
            min_sentiment_polarity: 0.15,
            mention_saturation: 50.0,
            default_position_size_pct: 2.0,
        }
    }
}

pub fn detect_reddit_opportunity(
    symbol: &str,
    close_price: f64,
    window: &RedditMentionWindow,
    config: &RedditOpportunityConfig,
) -> Vec<CandidateSignal> {
    if window.quality_filtered_mentions < config.min_quality_mentions {
        return Vec::new();
    }
    if window.sentiment_polarity < config.min_sentiment_polarity {
        return Vec::new();
    }

    let quality_ratio = if window.mention_count > 0 {
        window.quality_filtered_mentions as f64 / window.mention_count as f64
    } else {
        0.0
    };
    let volume_score = (window.mention_count as f64 / config.mention_saturation).clamp(0.0, 1.0);
    let sentiment_score = ((window.sentiment_polarity + 1.0) / 2.0).clamp(0.0, 1.0);

    let component_scores = ComponentScores {
        volume: Some(volume_score),
        momentum: Some(sentiment_score),
        relative_strength: None,
        risk_liquidity: Some(quality_ratio.clamp(0.0, 1.0)),
        fundamental: None,
    };

    vec![CandidateSignal {
        symbol: symbol.to_string(),
        strategy: Strategy::RedditOpportunity,
        close_price: Decimal::from_f64(close_price).unwrap_or_default(),
        component_scores,
        payload: StrategyPayload::RedditOpportunity {
            mention_count: window.mention_count,
            sentiment_polarity: window.sentiment_polarity,
            quality_filtered_mentions: window.quality_filtered_mentions,
        },
        stop_loss_level: None,
        position_size_pct: Some(config.default_position_size_pct),
    }]
}
