//! Paper-trading performance tracking (C9, spec section 4.9). Opens a
//! `PerformanceRecord` the moment a signal goes NEW, and closes it once the signal
//! reaches a terminal status (ENDED/EXPIRED), replaying the intraday bar history to
//! find whichever of stop-loss or profit-target actually struck first.
//!
//! Grounded on `risk-manager::manager`'s stop-loss-check-first pattern for the
//! intraday scan and on `validation::backtesting`'s return/drawdown arithmetic for
//! the final `return_pct`/`days_held`/`is_winner` computation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use signal_core::money::{decimal_from_f64, f64_from_decimal};
use signal_core::{Bar, ExitReason, PerformanceRecord, PerformanceStatus, Signal, SignalStatus, Strategy, StrategyPayload, TargetLevels, TargetsHit};

#[derive(Debug, Clone, Copy)]
pub struct PerformanceTrackerConfig {
    pub t1_pct: f64,
    pub t2_pct: f64,
    pub t3_pct: f64,
    pub breakout_multiplier: f64,
    pub volume_spike_multiplier: f64,
    pub volume_spike_ratio_floor: f64,
}

impl Default for PerformanceTrackerConfig {
    fn default() -> Self {
        Self {
            t1_pct: 0.10,
            t2_pct: 0.20,
            t3_pct: 0.30,
            breakout_multiplier: 1.1,
            volume_spike_multiplier: 1.2,
            volume_spike_ratio_floor: 5.0,
        }
    }
}

/// How far targets get stretched for this signal: squeeze setups (breakout plays)
/// and penny-stock volume spikes both earn wider targets than the base table.
fn target_multiplier(signal: &Signal, config: &PerformanceTrackerConfig) -> f64 {
    let mut multiplier = 1.0;
    if signal.strategy == Strategy::Squeeze {
        multiplier *= config.breakout_multiplier;
    }
    if let StrategyPayload::PennyExplosion { volume_ratio, .. } = &signal.payload {
        if *volume_ratio >= config.volume_spike_ratio_floor {
            multiplier *= config.volume_spike_multiplier;
        }
    }
    multiplier
}

fn target_levels(entry_price: Decimal, signal: &Signal, config: &PerformanceTrackerConfig) -> TargetLevels {
    let multiplier = target_multiplier(signal, config);
    let entry = f64_from_decimal(entry_price);
    TargetLevels {
        t1: decimal_from_f64(entry * (1.0 + config.t1_pct * multiplier)),
        t2: decimal_from_f64(entry * (1.0 + config.t2_pct * multiplier)),
        t3: decimal_from_f64(entry * (1.0 + config.t3_pct * multiplier)),
    }
}

/// Opens a new paper position for a signal that just transitioned to NEW.
/// Idempotent by convention: the caller only invokes this once per `signal_id`,
/// on the scan where the signal is first seen (spec's exactly-once guarantee).
pub fn open_position(signal: &Signal, config: &PerformanceTrackerConfig) -> PerformanceRecord {
    PerformanceRecord {
        id: None,
        signal_id: signal.signal_id.clone(),
        symbol: signal.symbol.clone(),
        entry_date: signal.scan_date,
        entry_price: signal.close_price,
        exit_date: None,
        exit_price: None,
        exit_reason: None,
        status: PerformanceStatus::Active,
        return_pct: None,
        days_held: None,
        is_winner: None,
        stop_loss_price: signal.stop_loss_level,
        target_prices: target_levels(signal.close_price, signal, config),
        targets_hit: TargetsHit::default(),
        max_price_reached: None,
    }
}

fn bar_date(bar: &Bar) -> NaiveDate {
    bar.timestamp.date_naive()
}

enum ExitEvent {
    Stop,
    Target(Decimal),
}

/// Replays the daily bars between `entry_date` and `exit_date` (inclusive), checking
/// the stop first on each day before any target (spec's documented "stop wins" tie
/// rule for a day that touches both). Returns the first exit event encountered, the
/// day it happened on, the highest price observed over the whole window, and the
/// updated targets-hit flags (which keep accumulating even on the exit day).
fn scan_intraday(bars: &[Bar], entry_date: NaiveDate, exit_date: NaiveDate, stop_loss_price: Option<Decimal>, target_prices: &TargetLevels) -> (Option<(NaiveDate, ExitEvent)>, Option<Decimal>, TargetsHit) {
    let mut window: Vec<&Bar> = bars.iter().filter(|b| { let d = bar_date(b); d >= entry_date && d <= exit_date }).collect();
    window.sort_by_key(|b| bar_date(b));

    let stop = stop_loss_price.map(f64_from_decimal);
    let t1 = f64_from_decimal(target_prices.t1);
    let t2 = f64_from_decimal(target_prices.t2);
    let t3 = f64_from_decimal(target_prices.t3);

    let mut targets_hit = TargetsHit::default();
    let mut max_price: Option<f64> = None;
    let mut event: Option<(NaiveDate, ExitEvent)> = None;

    for bar in window {
        max_price = Some(max_price.map_or(bar.high, |m: f64| m.max(bar.high)));

        if event.is_some() {
            continue;
        }

        if let Some(stop_price) = stop {
            if bar.low <= stop_price {
                event = Some((bar_date(bar), ExitEvent::Stop));
                continue;
            }
        }

        let mut hit_today: Option<f64> = None;
        if bar.high >= t1 {
            targets_hit.t1 = true;
            hit_today = Some(hit_today.map_or(t1, |h: f64| h.max(t1)));
        }
        if bar.high >= t2 {
            targets_hit.t2 = true;
            hit_today = Some(hit_today.map_or(t2, |h: f64| h.max(t2)));
        }
        if bar.high >= t3 {
            targets_hit.t3 = true;
            hit_today = Some(hit_today.map_or(t3, |h: f64| h.max(t3)));
        }
        if let Some(best) = hit_today {
            event = Some((bar_date(bar), ExitEvent::Target(decimal_from_f64(best))));
        }
    }

    (event, max_price.map(decimal_from_f64), targets_hit)
}

/// Closes a position for a signal that just transitioned to a terminal status
/// (ENDED or EXPIRED). `bars` should cover at least `[entry_date, exit_date]` for
/// the underlying symbol. No-op (returns `record` unchanged) if it is already
/// closed, preserving the exactly-once guarantee on re-invocation.
pub fn close_position(record: &PerformanceRecord, terminal_signal: &Signal, bars: &[Bar]) -> PerformanceRecord {
    if record.status == PerformanceStatus::Closed {
        return record.clone();
    }

    let exit_date = terminal_signal.scan_date;
    let (event, max_price, targets_hit) = scan_intraday(bars, record.entry_date, exit_date, record.stop_loss_price, &record.target_prices);

    let (actual_exit_date, exit_price, exit_reason) = match event {
        Some((day, ExitEvent::Stop)) => (day, record.stop_loss_price.unwrap_or(terminal_signal.close_price), ExitReason::StopLoss),
        Some((day, ExitEvent::Target(price))) => (day, price, ExitReason::ProfitTarget),
        None => {
            let reason = match terminal_signal.signal_status {
                SignalStatus::Expired => ExitReason::Expired,
                _ => ExitReason::SignalEnded,
            };
            (exit_date, terminal_signal.close_price, reason)
        }
    };

    let entry = f64_from_decimal(record.entry_price);
    let exit = f64_from_decimal(exit_price);
    let return_pct = if entry != 0.0 { (exit - entry) / entry * 100.0 } else { 0.0 };
    let days_held = (actual_exit_date - record.entry_date).num_days();

    tracing::debug!(signal_id = %record.signal_id, ?exit_reason, return_pct, "closed paper position");

    PerformanceRecord {
        id: record.id,
        signal_id: record.signal_id.clone(),
        symbol: record.symbol.clone(),
        entry_date: record.entry_date,
        entry_price: record.entry_price,
        exit_date: Some(actual_exit_date),
        exit_price: Some(exit_price),
        exit_reason: Some(exit_reason),
        status: PerformanceStatus::Closed,
        return_pct: Some(return_pct),
        days_held: Some(days_held),
        is_winner: Some(return_pct > 0.0),
        stop_loss_price: record.stop_loss_price,
        target_prices: record.target_prices,
        targets_hit,
        max_price_reached: max_price.or(record.max_price_reached),
    }
}

/// Re-derives `targets_hit`/`max_price_reached` on an already-closed record from
/// full intraday history, without touching `exit_reason`/`exit_price`/`status`.
/// Used to backfill historical records captured before target tracking existed.
pub fn backfill_targets(record: &PerformanceRecord, bars: &[Bar]) -> PerformanceRecord {
    let exit_date = record.exit_date.unwrap_or(record.entry_date);
    let (_, max_price, targets_hit) = scan_intraday(bars, record.entry_date, exit_date, record.stop_loss_price, &record.target_prices);

    PerformanceRecord {
        targets_hit,
        max_price_reached: max_price.or(record.max_price_reached),
        ..record.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use signal_core::{ComponentScores, Grade, Recommendation};

    fn signal(status: SignalStatus, scan_date: NaiveDate, close_price: Decimal, strategy: Strategy, payload: StrategyPayload) -> Signal {
        Signal {
            signal_id: "AAA:squeeze:2026-07-01".to_string(),
            symbol: "AAA".to_string(),
            strategy,
            scan_date,
            scan_timestamp: Utc::now(),
            signal_status: status,
            days_active: 1,
            first_detected_date: scan_date,
            last_active_date: scan_date,
            is_active: status != SignalStatus::Ended && status != SignalStatus::Expired,
            close_price,
            component_scores: ComponentScores::default(),
            overall_score: 0.8,
            grade: Grade::A,
            recommendation: Recommendation::Buy,
            payload,
            stop_loss_level: Some(dec!(9.0)),
            position_size_pct: Some(5.0),
            pump_dump_warning: false,
            high_risk_country: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn squeeze_payload() -> StrategyPayload {
        StrategyPayload::Squeeze { squeeze_depth: 80.0, days_in_squeeze: 6, breakout_proximity_pct: 2.0 }
    }

    fn bar(date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.from_utc_datetime(&date.and_hms_opt(16, 0, 0).unwrap()),
            open,
            high,
            low,
            close,
            volume: 1_000_000.0,
            vwap: None,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn open_position_sets_targets_from_entry_price() {
        let entry_date = day(2026, 7, 1);
        let sig = signal(SignalStatus::New, entry_date, dec!(10.0), Strategy::Squeeze, squeeze_payload());
        let record = open_position(&sig, &PerformanceTrackerConfig::default());

        assert_eq!(record.status, PerformanceStatus::Active);
        assert_eq!(record.entry_price, dec!(10.0));
        // squeeze => breakout multiplier 1.1 applied to the base 10% target.
        assert!((f64_from_decimal(record.target_prices.t1) - 11.1).abs() < 0.01);
    }

    #[test]
    fn penny_explosion_volume_spike_widens_targets() {
        let entry_date = day(2026, 7, 1);
        let payload = StrategyPayload::PennyExplosion { volume_ratio: 6.0, price_change_5d: 20.0, price_change_10d: 30.0, price_change_20d: 40.0 };
        let sig = signal(SignalStatus::New, entry_date, dec!(10.0), Strategy::PennyExplosion, payload);
        let record = open_position(&sig, &PerformanceTrackerConfig::default());

        // 10% base * 1.2 volume-spike multiplier = 12%.
        assert!((f64_from_decimal(record.target_prices.t1) - 11.2).abs() < 0.01);
    }

    #[test]
    fn stop_hit_wins_over_target_hit_same_day() {
        let entry_date = day(2026, 7, 1);
        let sig_new = signal(SignalStatus::New, entry_date, dec!(10.0), Strategy::Squeeze, squeeze_payload());
        let record = open_position(&sig_new, &PerformanceTrackerConfig::default());

        let exit_date = day(2026, 7, 2);
        // Bar on the exit day touches both the stop (9.0) and the t1 target (11.1): stop wins.
        let bars = vec![bar(entry_date, 10.0, 10.2, 9.8, 10.1), bar(exit_date, 10.0, 12.0, 8.5, 9.0)];

        let sig_ended = signal(SignalStatus::Ended, exit_date, dec!(9.0), Strategy::Squeeze, squeeze_payload());
        let closed = close_position(&record, &sig_ended, &bars);

        assert_eq!(closed.exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(closed.exit_date, Some(exit_date));
        assert!(closed.return_pct.unwrap() < 0.0);
        assert_eq!(closed.is_winner, Some(false));
    }

    #[test]
    fn target_hit_before_any_stop_closes_as_profit_target() {
        let entry_date = day(2026, 7, 1);
        let sig_new = signal(SignalStatus::New, entry_date, dec!(10.0), Strategy::Squeeze, squeeze_payload());
        let record = open_position(&sig_new, &PerformanceTrackerConfig::default());

        let exit_date = day(2026, 7, 3);
        let bars = vec![
            bar(entry_date, 10.0, 10.2, 9.9, 10.1),
            bar(day(2026, 7, 2), 10.1, 10.5, 10.0, 10.4),
            bar(exit_date, 10.4, 11.5, 10.3, 11.2),
        ];

        let sig_ended = signal(SignalStatus::Ended, exit_date, dec!(11.2), Strategy::Squeeze, squeeze_payload());
        let closed = close_position(&record, &sig_ended, &bars);

        assert_eq!(closed.exit_reason, Some(ExitReason::ProfitTarget));
        assert!(closed.targets_hit.t1);
        assert!(closed.is_winner.unwrap());
    }

    #[test]
    fn no_stop_or_target_hit_closes_as_signal_ended() {
        let entry_date = day(2026, 7, 1);
        let sig_new = signal(SignalStatus::New, entry_date, dec!(10.0), Strategy::Squeeze, squeeze_payload());
        let record = open_position(&sig_new, &PerformanceTrackerConfig::default());

        let exit_date = day(2026, 7, 2);
        let bars = vec![bar(entry_date, 10.0, 10.2, 9.9, 10.1), bar(exit_date, 10.1, 10.3, 9.95, 10.05)];

        let sig_ended = signal(SignalStatus::Ended, exit_date, dec!(10.05), Strategy::Squeeze, squeeze_payload());
        let closed = close_position(&record, &sig_ended, &bars);

        assert_eq!(closed.exit_reason, Some(ExitReason::SignalEnded));
        assert_eq!(closed.exit_price, Some(dec!(10.05)));
    }

    #[test]
    fn expired_terminal_status_maps_to_expired_exit_reason() {
        let entry_date = day(2026, 7, 1);
        let sig_new = signal(SignalStatus::New, entry_date, dec!(10.0), Strategy::UnusualOptions, squeeze_payload());
        let record = open_position(&sig_new, &PerformanceTrackerConfig::default());

        let exit_date = day(2026, 7, 2);
        let sig_expired = signal(SignalStatus::Expired, exit_date, dec!(10.0), Strategy::UnusualOptions, squeeze_payload());
        let closed = close_position(&record, &sig_expired, &[]);

        assert_eq!(closed.exit_reason, Some(ExitReason::Expired));
    }

    #[test]
    fn reinvoking_close_on_an_already_closed_record_is_a_no_op() {
        let entry_date = day(2026, 7, 1);
        let sig_new = signal(SignalStatus::New, entry_date, dec!(10.0), Strategy::Squeeze, squeeze_payload());
        let record = open_position(&sig_new, &PerformanceTrackerConfig::default());
        let exit_date = day(2026, 7, 2);
        let sig_ended = signal(SignalStatus::Ended, exit_date, dec!(10.05), Strategy::Squeeze, squeeze_payload());
        let closed_once = close_position(&record, &sig_ended, &[]);
        let closed_twice = close_position(&closed_once, &sig_ended, &[]);

        assert_eq!(closed_once.exit_date, closed_twice.exit_date);
        assert_eq!(closed_once.return_pct, closed_twice.return_pct);
    }
}
