//! Unusual-options-flow detector (spec 4.6): flags contracts whose volume/open
//! interest, premium flow, days-to-expiry, and order aggressiveness together read
//! as an insider-style play.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use signal_core::{CandidateSignal, ComponentScores, OptionsContract, Strategy, StrategyPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PremiumTier {
    Small,
    Mid,
    Large,
}

#[derive(Debug, Clone, Copy)]
pub struct UnusualOptionsConfig {
    pub volume_to_oi_ratio: f64,
    pub premium_threshold_small: f64,
    pub premium_threshold_mid: f64,
    pub premium_threshold_large: f64,
    pub dte_min: i32,
    pub dte_max: i32,
    pub min_aggressive_order_pct: f64,
    pub default_position_size_pct: f64,
}

impl Default for UnusualOptionsConfig {
    fn default() -> Self {
        Self {
            volume_to_oi_ratio: 3.0,
            premium_threshold_small: 50_000.0,
            premium_threshold_mid: 250_000.0,
            premium_threshold_large: 1_000_000.0,
            dte_min: 7,
            dte_max: 45,
            min_aggressive_order_pct: 0.65,
            default_position_size_pct: 2.0,
        }
    }
}

impl UnusualOptionsConfig {
    fn premium_threshold(&self, tier: PremiumTier) -> f64 {
        match tier {
            PremiumTier::Small => self.premium_threshold_small,
            PremiumTier::Mid => self.premium_threshold_mid,
            PremiumTier::Large => self.premium_threshold_large,
        }
    }
}

/// DTE urgency peaks near `dte_min` and tapers off toward `dte_max`.
fn dte_urgency_score(dte: i32, dte_min: i32, dte_max: i32) -> f64 {
    if dte_max <= dte_min {
        return 0.5;
    }
    let span = (dte_max - dte_min) as f64;
    (1.0 - (dte - dte_min) as f64 / span).clamp(0.0, 1.0)
}

pub fn detect_unusual_options(contracts: &[OptionsContract], underlying_tier: PremiumTier, config: &UnusualOptionsConfig) -> Vec<CandidateSignal> {
    let threshold = config.premium_threshold(underlying_tier);
    let mut candidates = Vec::new();

    for contract in contracts {
        if contract.open_interest <= 0 {
            continue;
        }
        let volume_oi_ratio = contract.volume as f64 / contract.open_interest as f64;
        let premium_flow = contract.premium_flow.unwrap_or(0.0);
        let aggressive_pct = contract.aggressive_order_pct.unwrap_or(0.0);

        let qualifies = volume_oi_ratio > config.volume_to_oi_ratio
            && premium_flow >= threshold
            && (config.dte_min..=config.dte_max).contains(&contract.days_to_expiry)
            && aggressive_pct >= config.min_aggressive_order_pct;

        if !qualifies {
            continue;
        }

        let premium_size_score = (premium_flow / (threshold * 4.0)).clamp(0.0, 1.0);
        let dte_score = dte_urgency_score(contract.days_to_expiry, config.dte_min, config.dte_max);
        let aggressiveness_score = aggressive_pct.clamp(0.0, 1.0);
        let volume_oi_score = (volume_oi_ratio / (config.volume_to_oi_ratio * 3.0)).clamp(0.0, 1.0);

        let suspicion_score = (premium_size_score * 0.35 + dte_score * 0.25 + aggressiveness_score * 0.25 + volume_oi_score * 0.15) * 100.0;

        let component_scores = ComponentScores {
            volume: Some(volume_oi_score),
            momentum: Some(dte_score),
            relative_strength: None,
            risk_liquidity: Some(aggressiveness_score),
            fundamental: None,
        };

        candidates.push(CandidateSignal {
            symbol: contract.ticker.clone(),
            strategy: Strategy::UnusualOptions,
            close_price: Decimal::from_f64(contract.last_price).unwrap_or_default(),
            component_scores,
            payload: StrategyPayload::UnusualOptions {
                option_symbol: contract.option_symbol.clone(),
                option_type: contract.option_type,
                strike: contract.strike,
                expiry: contract.expiry,
                days_to_expiry: contract.days_to_expiry,
                volume: contract.volume,
                premium_flow,
                suspicion_score,
                is_likely_spread: false,
                spread_type: None,
                matched_leg_symbols: Vec::new(),
                spread_strike_width: None,
                spread_net_premium: None,
            },
            stop_loss_level: None,
            position_size_pct: Some(config.default_position_size_pct),
        });
    }

    candidates
}
