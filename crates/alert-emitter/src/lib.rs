//! Threshold-based alert fan-out (C12, spec section 4.12). Inspects persisted
//! signals and decides which ones read as high-conviction enough to page someone,
//! and at what tier. Never delivers anything itself — it only produces
//! `AlertRecord`s; delivery and same-day dedup happen downstream (`SignalSink` and
//! `SignalStore::insert_alert_if_new` respectively).
//!
//! Grounded on `risk-manager::radar::RiskProfile::generate_alerts`: walk a fixed
//! list of checks, compare each against a threshold table, and emit a typed alert
//! with a severity/tier enum, generalized here from risk dimensions to signals.

use chrono::Utc;
use serde_json::json;
use signal_core::{AlertRecord, AlertTier, Grade, Signal, Strategy, StrategyPayload};

#[derive(Debug, Clone, Copy)]
pub struct AlertEmitterConfig {
    /// Minimum suspicion score (0-100) for unusual-options candidates at each tier.
    pub suspicion_tier_a: f64,
    pub suspicion_tier_b: f64,
    pub suspicion_tier_c: f64,
}

impl Default for AlertEmitterConfig {
    fn default() -> Self {
        Self { suspicion_tier_a: 90.0, suspicion_tier_b: 75.0, suspicion_tier_c: 60.0 }
    }
}

fn tier_from_grade(grade: Grade) -> Option<AlertTier> {
    match grade {
        Grade::S | Grade::A => Some(AlertTier::TierA),
        Grade::B => Some(AlertTier::TierB),
        _ => None,
    }
}

fn tier_from_suspicion(score: f64, config: &AlertEmitterConfig) -> Option<AlertTier> {
    if score >= config.suspicion_tier_a {
        Some(AlertTier::TierA)
    } else if score >= config.suspicion_tier_b {
        Some(AlertTier::TierB)
    } else if score >= config.suspicion_tier_c {
        Some(AlertTier::TierC)
    } else {
        None
    }
}

/// The tier this signal qualifies for, or `None` if it clears no threshold at all.
/// A signal qualifies on grade alone, on suspicion score alone (options strategies),
/// or via a pump-and-dump warning (always surfaced, at worst at tier C, since a
/// forced SKIP is exactly the kind of thing an operator wants to see).
pub fn classify(signal: &Signal, config: &AlertEmitterConfig) -> Option<AlertTier> {
    let grade_tier = tier_from_grade(signal.grade);

    let suspicion_tier = if signal.strategy == Strategy::UnusualOptions {
        match &signal.payload {
            StrategyPayload::UnusualOptions { suspicion_score, .. } => tier_from_suspicion(*suspicion_score, config),
            _ => None,
        }
    } else {
        None
    };

    let best = [grade_tier, suspicion_tier].into_iter().flatten().min();

    if signal.pump_dump_warning {
        return Some(best.unwrap_or(AlertTier::TierC).min(AlertTier::TierC));
    }

    best
}

fn alert_payload(signal: &Signal, tier: AlertTier) -> serde_json::Value {
    let suspicion_score = match &signal.payload {
        StrategyPayload::UnusualOptions { suspicion_score, .. } => Some(*suspicion_score),
        _ => None,
    };

    json!({
        "symbol": signal.symbol,
        "strategy": signal.strategy.as_str(),
        "tier": tier.as_str(),
        "grade": format!("{:?}", signal.grade),
        "overall_score": signal.overall_score,
        "recommendation": format!("{:?}", signal.recommendation),
        "pump_dump_warning": signal.pump_dump_warning,
        "high_risk_country": signal.high_risk_country,
        "suspicion_score": suspicion_score,
    })
}

/// Builds one `AlertRecord` per signal that qualifies under `classify`. Does not
/// persist or dedup; the caller (`ScanOrchestrator`) hands these to
/// `SignalStore::insert_alert_if_new`, which is the actual dedup boundary.
pub fn emit_alerts(signals: &[Signal], config: &AlertEmitterConfig) -> Vec<AlertRecord> {
    signals
        .iter()
        .filter_map(|signal| {
            let tier = classify(signal, config)?;
            tracing::debug!(symbol = %signal.symbol, strategy = signal.strategy.as_str(), tier = tier.as_str(), "alert emitted");
            Some(AlertRecord {
                id: None,
                signal_id: signal.signal_id.clone(),
                alert_tier: tier,
                payload: alert_payload(signal, tier),
                created_at: Utc::now(),
                delivered: false,
            })
        })
        .collect()
}
