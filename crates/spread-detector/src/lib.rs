//! Multi-leg options spread detection (C11, spec section 4.11). Looks across the
//! unusual-options candidates produced for a single scan batch and flags pairs of
//! contracts on the same underlying that read as one coordinated options strategy
//! (a vertical spread or a calendar spread) rather than two independent insider bets.
//!
//! This never creates new `CandidateSignal`s; it only annotates the
//! `StrategyPayload::UnusualOptions` fields already reserved for it and returns a
//! per-candidate confidence the caller feeds back into the scorer (spec 4.5's
//! `spread_confidence` score reduction).

use signal_core::{CandidateSignal, OptionType, Strategy, StrategyPayload};

#[derive(Debug, Clone, Copy)]
pub struct SpreadDetectorConfig {
    /// Spread is only flagged once the weighted confidence reaches this level.
    pub min_spread_confidence: f64,
    /// Number of independent structural/flow indicators that must agree.
    pub min_indicators: u32,
    /// Two legs' volumes (or premium flows) count as "matched" once their ratio
    /// clears this floor: `min(a, b) / max(a, b) >= match_ratio_floor`.
    pub match_ratio_floor: f64,
    /// Strike separation, as a fraction of the lower strike, beyond which two legs
    /// are no longer considered part of the same vertical spread.
    pub max_vertical_strike_width_pct: f64,
}

impl Default for SpreadDetectorConfig {
    fn default() -> Self {
        Self {
            min_spread_confidence: 0.80,
            min_indicators: 3,
            match_ratio_floor: 0.70,
            max_vertical_strike_width_pct: 0.50,
        }
    }
}

/// The fields `detect_unusual_options` (C6) puts on every options candidate, pulled
/// out so spread matching doesn't have to keep pattern-matching the payload.
#[derive(Debug, Clone, Copy)]
struct Leg<'a> {
    index: usize,
    option_symbol: &'a str,
    option_type: OptionType,
    strike: f64,
    expiry: chrono::NaiveDate,
    volume: i64,
    premium_flow: f64,
}

fn leg(index: usize, candidate: &CandidateSignal) -> Option<Leg<'_>> {
    match &candidate.payload {
        StrategyPayload::UnusualOptions { option_symbol, option_type, strike, expiry, volume, premium_flow, .. } => Some(Leg {
            index,
            option_symbol,
            option_type: *option_type,
            strike: *strike,
            expiry: *expiry,
            volume: *volume,
            premium_flow: *premium_flow,
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairShape {
    /// Same expiry, different strikes, same option type.
    Vertical,
    /// Same strike, different expiries.
    Calendar,
}

fn ratio_match(a: f64, b: f64) -> f64 {
    if a <= 0.0 || b <= 0.0 {
        return 0.0;
    }
    a.min(b) / a.max(b)
}

struct PairMatch {
    shape: PairShape,
    confidence: f64,
    indicators: u32,
    strike_width: f64,
    net_premium: f64,
}

fn evaluate_pair(a: &Leg, b: &Leg, config: &SpreadDetectorConfig) -> Option<PairMatch> {
    let same_expiry = a.expiry == b.expiry;
    let same_strike = (a.strike - b.strike).abs() < f64::EPSILON;

    let shape = if same_expiry && !same_strike && a.option_type == b.option_type {
        PairShape::Vertical
    } else if same_strike && !same_expiry {
        PairShape::Calendar
    } else {
        return None;
    };

    if shape == PairShape::Vertical {
        let lower_strike = a.strike.min(b.strike);
        let width_pct = (a.strike - b.strike).abs() / lower_strike.max(1.0);
        if width_pct > config.max_vertical_strike_width_pct {
            return None;
        }
    }

    let volume_match = ratio_match(a.volume as f64, b.volume as f64);
    let premium_match = ratio_match(a.premium_flow, b.premium_flow);

    let mut indicators = 0u32;
    if same_expiry || same_strike {
        indicators += 1;
    }
    if a.option_type == b.option_type {
        indicators += 1;
    }
    if volume_match >= config.match_ratio_floor {
        indicators += 1;
    }
    if premium_match >= config.match_ratio_floor {
        indicators += 1;
    }

    let structural_score = 1.0;
    let confidence = structural_score * 0.2 + volume_match * 0.4 + premium_match * 0.4;

    Some(PairMatch {
        shape,
        confidence,
        indicators,
        strike_width: (a.strike - b.strike).abs(),
        net_premium: a.premium_flow - b.premium_flow,
    })
}

fn spread_type_label(shape: PairShape, option_type: OptionType) -> &'static str {
    match (shape, option_type) {
        (PairShape::Vertical, OptionType::Call) => "vertical_call",
        (PairShape::Vertical, OptionType::Put) => "vertical_put",
        (PairShape::Calendar, _) => "calendar",
    }
}

/// Walks every pair of unusual-options candidates sharing an underlying symbol,
/// scores how well they read as one coordinated spread, and for every pair that
/// clears `min_spread_confidence` with enough agreeing indicators, annotates both
/// legs' payloads in place. Returns, aligned to `candidates`, the best spread
/// confidence found for each candidate (`None` for legs that weren't flagged, or
/// for candidates of a different strategy).
pub fn annotate_spreads(candidates: &mut [CandidateSignal], config: &SpreadDetectorConfig) -> Vec<Option<f64>> {
    let mut best_confidence = vec![None; candidates.len()];

    let legs: Vec<Leg> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.strategy == Strategy::UnusualOptions)
        .filter_map(|(i, c)| leg(i, c))
        .collect();

    let mut groups: std::collections::HashMap<String, Vec<Leg>> = std::collections::HashMap::new();
    for leg in &legs {
        let symbol = candidates[leg.index].symbol.clone();
        groups.entry(symbol).or_default().push(*leg);
    }

    // `(leg_index, leg_index) -> best match found so far`, so that if a leg
    // qualifies against more than one counterpart we keep the strongest pairing.
    let mut annotations: std::collections::HashMap<usize, (f64, &'static str, String, f64, f64)> = std::collections::HashMap::new();

    for (_symbol, group) in groups {
        for i in 0..group.len() {
            for j in (i + 1)..group.len() {
                let a = &group[i];
                let b = &group[j];
                let Some(pair) = evaluate_pair(a, b, config) else { continue };
                if pair.confidence < config.min_spread_confidence || pair.indicators < config.min_indicators {
                    continue;
                }

                let label = spread_type_label(pair.shape, a.option_type);
                for (this, other) in [(a, b), (b, a)] {
                    let entry = annotations.entry(this.index).or_insert((0.0, label, other.option_symbol.to_string(), pair.strike_width, pair.net_premium));
                    if pair.confidence > entry.0 {
                        *entry = (pair.confidence, label, other.option_symbol.to_string(), pair.strike_width, pair.net_premium);
                    }
                }
            }
        }
    }

    for (index, (confidence, label, other_symbol, strike_width, net_premium)) in annotations {
        best_confidence[index] = Some(confidence);
        if let StrategyPayload::UnusualOptions { is_likely_spread, spread_type, matched_leg_symbols, spread_strike_width, spread_net_premium, .. } = &mut candidates[index].payload {
            *is_likely_spread = true;
            *spread_type = Some(label.to_string());
            if !matched_leg_symbols.contains(&other_symbol) {
                matched_leg_symbols.push(other_symbol);
            }
            *spread_strike_width = Some(strike_width);
            *spread_net_premium = Some(net_premium);
        }
        tracing::debug!(index, confidence, spread_type = label, "flagged likely options spread leg");
    }

    best_confidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use signal_core::ComponentScores;

    fn option_candidate(symbol: &str, option_symbol: &str, option_type: OptionType, strike: f64, expiry: NaiveDate, volume: i64, premium_flow: f64) -> CandidateSignal {
        CandidateSignal {
            symbol: symbol.to_string(),
            strategy: Strategy::UnusualOptions,
            close_price: Decimal::new(250, 2),
            component_scores: ComponentScores::default(),
            payload: StrategyPayload::UnusualOptions {
                option_symbol: option_symbol.to_string(),
                option_type,
                strike,
                expiry,
                days_to_expiry: 14,
                volume,
                premium_flow,
                suspicion_score: 85.0,
                is_likely_spread: false,
                spread_type: None,
                matched_leg_symbols: Vec::new(),
                spread_strike_width: None,
                spread_net_premium: None,
            },
            stop_loss_level: None,
            position_size_pct: Some(2.0),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn matched_volume_and_premium_vertical_legs_are_flagged() {
        let expiry = day(2026, 8, 11);
        let mut candidates = vec![
            option_candidate("XYZ", "XYZ240101C00100000", OptionType::Call, 100.0, expiry, 5_000, 300_000.0),
            option_candidate("XYZ", "XYZ240101C00105000", OptionType::Call, 105.0, expiry, 4_900, 290_000.0),
        ];

        let confidences = annotate_spreads(&mut candidates, &SpreadDetectorConfig::default());

        assert!(confidences[0].unwrap() >= 0.80);
        assert!(confidences[1].unwrap() >= 0.80);

        match &candidates[0].payload {
            StrategyPayload::UnusualOptions { is_likely_spread, spread_type, matched_leg_symbols, .. } => {
                assert!(*is_likely_spread);
                assert_eq!(spread_type.as_deref(), Some("vertical_call"));
                assert_eq!(matched_leg_symbols, &["XYZ240101C00105000".to_string()]);
            }
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn calendar_spread_same_strike_different_expiry_is_flagged() {
        let mut candidates = vec![
            option_candidate("ABC", "ABC1", OptionType::Put, 50.0, day(2026, 8, 11), 2_000, 80_000.0),
            option_candidate("ABC", "ABC2", OptionType::Put, 50.0, day(2026, 9, 15), 1_950, 79_000.0),
        ];

        let confidences = annotate_spreads(&mut candidates, &SpreadDetectorConfig::default());
        assert!(confidences[0].is_some());

        match &candidates[1].payload {
            StrategyPayload::UnusualOptions { spread_type, .. } => assert_eq!(spread_type.as_deref(), Some("calendar")),
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn mismatched_volumes_do_not_qualify() {
        let expiry = day(2026, 8, 11);
        let mut candidates = vec![
            option_candidate("XYZ", "XYZ1", OptionType::Call, 100.0, expiry, 10_000, 300_000.0),
            option_candidate("XYZ", "XYZ2", OptionType::Call, 105.0, expiry, 500, 10_000.0),
        ];

        let confidences = annotate_spreads(&mut candidates, &SpreadDetectorConfig::default());
        assert!(confidences.iter().all(|c| c.is_none()));
        match &candidates[0].payload {
            StrategyPayload::UnusualOptions { is_likely_spread, .. } => assert!(!is_likely_spread),
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn unrelated_underlyings_are_never_paired() {
        let expiry = day(2026, 8, 11);
        let mut candidates = vec![
            option_candidate("XYZ", "XYZ1", OptionType::Call, 100.0, expiry, 5_000, 300_000.0),
            option_candidate("ABC", "ABC1", OptionType::Call, 100.0, expiry, 5_000, 300_000.0),
        ];

        let confidences = annotate_spreads(&mut candidates, &SpreadDetectorConfig::default());
        assert!(confidences.iter().all(|c| c.is_none()));
    }

    #[test]
    fn non_options_candidates_are_ignored() {
        let mut candidates = vec![CandidateSignal {
            symbol: "AAPL".to_string(),
            strategy: Strategy::Squeeze,
            close_price: Decimal::new(1000, 2),
            component_scores: ComponentScores::default(),
            payload: StrategyPayload::Squeeze { squeeze_depth: 80.0, days_in_squeeze: 6, breakout_proximity_pct: 2.0 },
            stop_loss_level: None,
            position_size_pct: Some(5.0),
        }];

        let confidences = annotate_spreads(&mut candidates, &SpreadDetectorConfig::default());
        assert_eq!(confidences, vec![None]);
    }
}
