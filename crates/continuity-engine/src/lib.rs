//! Joins today's scored candidates with yesterday's live signals across the
//! trading-day calendar, producing the full set of rows to upsert today (C7,
//! spec section 4.7). Preserves invariants I1 (one active row per key), I2 (the
//! CONTINUING chain), I4 (terminal states carry `is_active = false`).

use chrono::{DateTime, NaiveDate, Utc};
use signal_core::{CandidateSignal, ComponentScores, Grade, Recommendation, Signal, SignalStatus, Strategy, StrategyPayload};

/// A detector candidate after C5 scoring and (for options) C11 spread annotation —
/// the shape this engine actually consumes, one level richer than the bare
/// `CandidateSignal` a detector emits.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: CandidateSignal,
    pub overall_score: f64,
    pub grade: Grade,
    pub recommendation: Recommendation,
    pub pump_dump_warning: bool,
    pub high_risk_country: bool,
}

impl ScoredCandidate {
    fn domain_expiry(&self) -> Option<NaiveDate> {
        match &self.candidate.payload {
            StrategyPayload::UnusualOptions { expiry, .. } => Some(*expiry),
            _ => None,
        }
    }
}

fn prev_domain_expiry(signal: &Signal) -> Option<NaiveDate> {
    match &signal.payload {
        StrategyPayload::UnusualOptions { expiry, .. } => Some(*expiry),
        _ => None,
    }
}

fn signal_id_for(symbol: &str, strategy: Strategy, first_detected_date: NaiveDate) -> String {
    format!("{}:{}:{}", symbol, strategy.as_str(), first_detected_date)
}

fn new_signal(today: NaiveDate, scan_timestamp: DateTime<Utc>, scored: &ScoredCandidate) -> Signal {
    let c = &scored.candidate;
    Signal {
        signal_id: signal_id_for(&c.symbol, c.strategy, today),
        symbol: c.symbol.clone(),
        strategy: c.strategy,
        scan_date: today,
        scan_timestamp,
        signal_status: SignalStatus::New,
        days_active: 1,
        first_detected_date: today,
        last_active_date: today,
        is_active: true,
        close_price: c.close_price,
        component_scores: c.component_scores,
        overall_score: scored.overall_score,
        grade: scored.grade,
        recommendation: scored.recommendation,
        payload: c.payload.clone(),
        stop_loss_level: c.stop_loss_level,
        position_size_pct: c.position_size_pct,
        pump_dump_warning: scored.pump_dump_warning,
        high_risk_country: scored.high_risk_country,
        created_at: scan_timestamp,
        updated_at: scan_timestamp,
    }
}

fn continuing_signal(today: NaiveDate, scan_timestamp: DateTime<Utc>, prev: &Signal, scored: &ScoredCandidate) -> Signal {
    let c = &scored.candidate;
    Signal {
        signal_id: prev.signal_id.clone(),
        symbol: c.symbol.clone(),
        strategy: c.strategy,
        scan_date: today,
        scan_timestamp,
        signal_status: SignalStatus::Continuing,
        days_active: prev.days_active + 1,
        first_detected_date: prev.first_detected_date,
        last_active_date: today,
        is_active: true,
        close_price: c.close_price,
        component_scores: c.component_scores,
        overall_score: scored.overall_score,
        grade: scored.grade,
        recommendation: scored.recommendation,
        payload: c.payload.clone(),
        stop_loss_level: c.stop_loss_level,
        position_size_pct: c.position_size_pct,
        pump_dump_warning: scored.pump_dump_warning,
        high_risk_country: scored.high_risk_country,
        created_at: prev.created_at,
        updated_at: scan_timestamp,
    }
}

fn ended_signal(today: NaiveDate, scan_timestamp: DateTime<Utc>, prev: &Signal) -> Signal {
    Signal {
        scan_date: today,
        scan_timestamp,
        signal_status: SignalStatus::Ended,
        is_active: false,
        last_active_date: prev.last_active_date,
        updated_at: scan_timestamp,
        ..prev.clone()
    }
}

fn expired_signal(today: NaiveDate, scan_timestamp: DateTime<Utc>, prev: &Signal) -> Signal {
    Signal {
        scan_date: today,
        scan_timestamp,
        signal_status: SignalStatus::Expired,
        is_active: false,
        last_active_date: prev.last_active_date,
        updated_at: scan_timestamp,
        ..prev.clone()
    }
}

/// `prev_live` must already be filtered to the single strategy being reconciled and
/// restricted to yesterday's active rows (the caller resolves "yesterday" via
/// `CalendarOracle::previous_trading_day` and loads it from `SignalStore`).
pub fn reconcile(today: NaiveDate, scan_timestamp: DateTime<Utc>, scored: &[ScoredCandidate], prev_live: &[Signal]) -> Vec<Signal> {
    let mut prev_by_symbol: std::collections::HashMap<&str, &Signal> =
        prev_live.iter().map(|s| (s.symbol.as_str(), s)).collect();

    let mut out = Vec::with_capacity(scored.len().max(prev_live.len()));

    for candidate in scored {
        let symbol = candidate.candidate.symbol.as_str();
        let prev = prev_by_symbol.remove(symbol);

        if let Some(expiry) = candidate.domain_expiry() {
            if expiry <= today {
                if let Some(prev) = prev {
                    out.push(expired_signal(today, scan_timestamp, prev));
                }
                tracing::debug!(symbol, %expiry, "suppressing candidate: domain expiry has passed");
                continue;
            }
        }

        match prev {
            Some(prev) => out.push(continuing_signal(today, scan_timestamp, prev, candidate)),
            None => out.push(new_signal(today, scan_timestamp, candidate)),
        }
    }

    // Anything left in prev_by_symbol had no matching candidate today: either its
    // own domain expiry has passed, or detection simply failed.
    for prev in prev_by_symbol.into_values() {
        if let Some(expiry) = prev_domain_expiry(prev) {
            if expiry <= today {
                out.push(expired_signal(today, scan_timestamp, prev));
                continue;
            }
        }
        out.push(ended_signal(today, scan_timestamp, prev));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candidate(symbol: &str) -> CandidateSignal {
        CandidateSignal {
            symbol: symbol.to_string(),
            strategy: Strategy::Squeeze,
            close_price: dec!(10.0),
            component_scores: ComponentScores::default(),
            payload: StrategyPayload::Squeeze { squeeze_depth: 80.0, days_in_squeeze: 6, breakout_proximity_pct: 2.0 },
            stop_loss_level: None,
            position_size_pct: Some(5.0),
        }
    }

    fn scored(symbol: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: candidate(symbol),
            overall_score: score,
            grade: Grade::from_score(score),
            recommendation: Recommendation::Buy,
            pump_dump_warning: false,
            high_risk_country: false,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn no_prior_state_everything_is_new() {
        let today = day(2026, 7, 28);
        let result = reconcile(today, Utc::now(), &[scored("AAPL", 0.8)], &[]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].signal_status, SignalStatus::New);
        assert_eq!(result[0].days_active, 1);
    }

    #[test]
    fn still_detected_symbol_continues_the_chain() {
        let yesterday = day(2026, 7, 27);
        let today = day(2026, 7, 28);
        let first = reconcile(yesterday, Utc::now(), &[scored("AAPL", 0.82)], &[]);
        let second = reconcile(today, Utc::now(), &[scored("AAPL", 0.78)], &first);

        assert_eq!(second[0].signal_status, SignalStatus::Continuing);
        assert_eq!(second[0].days_active, 2);
        assert_eq!(second[0].signal_id, first[0].signal_id);
        assert_eq!(second[0].first_detected_date, yesterday);
    }

    #[test]
    fn no_longer_detected_symbol_transitions_to_ended() {
        let yesterday = day(2026, 7, 27);
        let today = day(2026, 7, 28);
        let prev = reconcile(yesterday, Utc::now(), &[scored("AAPL", 0.82)], &[]);
        let result = reconcile(today, Utc::now(), &[], &prev);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].signal_status, SignalStatus::Ended);
        assert!(!result[0].is_active);
        assert_eq!(result[0].last_active_date, yesterday);
    }

    #[test]
    fn expired_contract_suppresses_continuing_even_if_redetected() {
        let yesterday = day(2026, 7, 27);
        let today = day(2026, 7, 28);

        let mut option_candidate = candidate("XYZ");
        option_candidate.strategy = Strategy::UnusualOptions;
        option_candidate.payload = StrategyPayload::UnusualOptions {
            option_symbol: "XYZ240101C00100000".to_string(),
            option_type: signal_core::OptionType::Call,
            strike: 100.0,
            expiry: yesterday,
            days_to_expiry: 0,
            volume: 5000,
            premium_flow: 300_000.0,
            suspicion_score: 90.0,
            is_likely_spread: false,
            spread_type: None,
            matched_leg_symbols: vec![],
            spread_strike_width: None,
            spread_net_premium: None,
        };
        let scored_option = ScoredCandidate {
            candidate: option_candidate.clone(),
            overall_score: 0.8,
            grade: Grade::A,
            recommendation: Recommendation::Buy,
            pump_dump_warning: false,
            high_risk_country: false,
        };

        let prev = reconcile(yesterday, Utc::now(), &[scored_option.clone()], &[]);
        assert_eq!(prev[0].signal_status, SignalStatus::New);

        // Same contract detected again today, but its expiry (yesterday) has passed.
        let result = reconcile(today, Utc::now(), &[scored_option], &prev);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].signal_status, SignalStatus::Expired);
        assert!(!result[0].is_active);
    }

    #[test]
    fn contract_expiring_today_is_expired_not_continuing() {
        let today = day(2026, 7, 28);

        let mut option_candidate = candidate("XYZ");
        option_candidate.strategy = Strategy::UnusualOptions;
        option_candidate.payload = StrategyPayload::UnusualOptions {
            option_symbol: "XYZ240101C00100000".to_string(),
            option_type: signal_core::OptionType::Call,
            strike: 100.0,
            expiry: today,
            days_to_expiry: 0,
            volume: 5000,
            premium_flow: 300_000.0,
            suspicion_score: 90.0,
            is_likely_spread: false,
            spread_type: None,
            matched_leg_symbols: vec![],
            spread_strike_width: None,
            spread_net_premium: None,
        };
        let scored_option = ScoredCandidate {
            candidate: option_candidate,
            overall_score: 0.8,
            grade: Grade::A,
            recommendation: Recommendation::Buy,
            pump_dump_warning: false,
            high_risk_country: false,
        };

        let result = reconcile(today, Utc::now(), &[scored_option], &[]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].signal_status, SignalStatus::Expired);
        assert!(!result[0].is_active);
    }

    #[test]
    fn replaying_day_d_against_its_own_prior_output_is_idempotent() {
        let yesterday = day(2026, 7, 27);
        let today = day(2026, 7, 28);
        let prev = reconcile(yesterday, Utc::now(), &[scored("AAPL", 0.82)], &[]);
        let first = reconcile(today, Utc::now(), &[scored("AAPL", 0.78)], &prev);
        let replay = reconcile(today, Utc::now(), &[scored("AAPL", 0.78)], &prev);
        assert_eq!(first[0].signal_id, replay[0].signal_id);
        assert_eq!(first[0].days_active, replay[0].days_active);
        assert_eq!(first[0].signal_status, replay[0].signal_status);
    }
}
