//! Persistence layer for signals, paper-trade performance records, and alerts
//! (C8, spec section 4.8). Grounded on the teacher's `risk-manager::manager`:
//! one struct wrapping an `sqlx::AnyPool`, `?`-placeholder raw SQL, and
//! f64-backed row structs converted to `Decimal`-based public types at the
//! boundary (`models::SignalRow`, mirroring `risk-manager::models::ActiveRiskPositionRow`).

mod models;

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use signal_core::{AlertRecord, EngineError, EngineResult, PerformanceRecord, Signal, Strategy};
use sqlx::AnyPool;

use models::{AlertRow, PerformanceBindings, PerformanceRow, SignalBindings, SignalRow};

fn store_err(e: sqlx::Error) -> EngineError {
    EngineError::Store(e.to_string())
}

/// Outcome of a best-effort batched upsert: individual row failures do not abort
/// the batch, matching the "keep going" posture the data-loader's fan-out uses
/// for per-symbol fetch failures.
#[derive(Debug, Clone, Default)]
pub struct UpsertReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Rules applied by [`SignalStore::cleanup_noise`]: a terminal (ended/expired),
/// inactive signal older than `older_than_days` scoring below `min_overall_score`
/// is deleted outright rather than retained as dead weight.
#[derive(Debug, Clone, Copy)]
pub struct NoiseRules {
    pub min_overall_score: f64,
    pub older_than_days: i64,
}

impl Default for NoiseRules {
    fn default() -> Self {
        Self { min_overall_score: 0.40, older_than_days: 30 }
    }
}

const SIGNAL_COLUMNS: &str = "signal_id, symbol, strategy, scan_date, scan_timestamp, signal_status, days_active, \
     first_detected_date, last_active_date, is_active, close_price, component_scores, overall_score, grade, \
     recommendation, stop_loss_level, position_size_pct, pump_dump_warning, high_risk_country, strategy_payload, \
     created_at, updated_at";

pub struct SignalStore {
    pool: AnyPool,
    batch_size: usize,
}

impl SignalStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool, batch_size: 100 }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub async fn migrate(&self) -> EngineResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| EngineError::Store(e.to_string()))
    }

    /// Upserts signals in batches of `self.batch_size`, sleeping briefly between
    /// batches so a large reconciliation doesn't monopolize the pool's connections
    /// (the same "don't starve other callers" concern behind the rate limiter's
    /// sliding windows).
    pub async fn upsert_signals(&self, signals: &[Signal]) -> UpsertReport {
        let mut report = UpsertReport::default();

        for (i, chunk) in signals.chunks(self.batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            for signal in chunk {
                report.attempted += 1;
                match self.upsert_one(signal).await {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => {
                        report.failed += 1;
                        report.errors.push(format!("{}: {e}", signal.signal_id));
                        tracing::warn!(signal_id = %signal.signal_id, error = %e, "upsert_signals: row failed");
                    }
                }
            }
        }

        report
    }

    async fn upsert_one(&self, signal: &Signal) -> EngineResult<()> {
        let b = SignalBindings::try_from(signal)?;

        sqlx::query(
            r#"
            INSERT INTO signals (
                signal_id, symbol, strategy, scan_date, scan_timestamp, signal_status, days_active,
                first_detected_date, last_active_date, is_active, close_price, component_scores,
                overall_score, grade, recommendation, stop_loss_level, position_size_pct,
                pump_dump_warning, high_risk_country, strategy_payload, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (symbol, strategy, scan_date) DO UPDATE SET
                signal_id = excluded.signal_id,
                scan_timestamp = excluded.scan_timestamp,
                signal_status = excluded.signal_status,
                days_active = excluded.days_active,
                first_detected_date = excluded.first_detected_date,
                last_active_date = excluded.last_active_date,
                is_active = excluded.is_active,
                close_price = excluded.close_price,
                component_scores = excluded.component_scores,
                overall_score = excluded.overall_score,
                grade = excluded.grade,
                recommendation = excluded.recommendation,
                stop_loss_level = excluded.stop_loss_level,
                position_size_pct = excluded.position_size_pct,
                pump_dump_warning = excluded.pump_dump_warning,
                high_risk_country = excluded.high_risk_country,
                strategy_payload = excluded.strategy_payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(b.signal_id)
        .bind(b.symbol)
        .bind(b.strategy)
        .bind(b.scan_date)
        .bind(b.scan_timestamp)
        .bind(b.signal_status)
        .bind(b.days_active)
        .bind(b.first_detected_date)
        .bind(b.last_active_date)
        .bind(b.is_active)
        .bind(b.close_price)
        .bind(b.component_scores)
        .bind(b.overall_score)
        .bind(b.grade)
        .bind(b.recommendation)
        .bind(b.stop_loss_level)
        .bind(b.position_size_pct)
        .bind(b.pump_dump_warning)
        .bind(b.high_risk_country)
        .bind(b.strategy_payload)
        .bind(b.created_at)
        .bind(b.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    /// Page through every signal scanned on `date`, optionally restricted to one
    /// `strategy`. Pages of 1000 rows at a time; callers needing the full set
    /// should just drain the returned `Vec`, this only bounds the size of any
    /// single round-trip to the pool.
    pub async fn signals_on(&self, date: NaiveDate, strategy: Option<Strategy>) -> EngineResult<Vec<Signal>> {
        const PAGE_SIZE: i64 = 1000;
        let mut out = Vec::new();
        let mut offset: i64 = 0;

        loop {
            let rows: Vec<SignalRow> = match strategy {
                Some(s) => {
                    sqlx::query_as(&format!(
                        "SELECT {SIGNAL_COLUMNS} FROM signals WHERE scan_date = ? AND strategy = ? ORDER BY signal_id LIMIT ? OFFSET ?"
                    ))
                    .bind(date.to_string())
                    .bind(s.as_str())
                    .bind(PAGE_SIZE)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await
                }
                None => {
                    sqlx::query_as(&format!("SELECT {SIGNAL_COLUMNS} FROM signals WHERE scan_date = ? ORDER BY signal_id LIMIT ? OFFSET ?"))
                        .bind(date.to_string())
                        .bind(PAGE_SIZE)
                        .bind(offset)
                        .fetch_all(&self.pool)
                        .await
                }
            }
            .map_err(store_err)?;

            let page_len = rows.len();
            for row in rows {
                out.push(row.into_signal()?);
            }
            if (page_len as i64) < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(out)
    }

    /// The active (`is_active = true`) rows for `strategy`, one per symbol — the
    /// "yesterday's live signals" input the continuity engine joins against.
    pub async fn active_signals(&self, strategy: Strategy) -> EngineResult<Vec<Signal>> {
        let rows: Vec<SignalRow> = sqlx::query_as(&format!("SELECT {SIGNAL_COLUMNS} FROM signals WHERE strategy = ? AND is_active = true"))
            .bind(strategy.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.into_iter().map(SignalRow::into_signal).collect()
    }

    /// Flags as expired any still-active options signal whose domain expiry (embedded
    /// in `strategy_payload`) has passed `today`. The expiry date isn't a plain column,
    /// so this scans active `unusual_options` rows and re-parses the payload in Rust
    /// rather than pushing a backend-specific JSON-path predicate into the query.
    pub async fn expire_past(&self, today: NaiveDate) -> EngineResult<u64> {
        let rows: Vec<SignalRow> = sqlx::query_as(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals WHERE strategy = ? AND is_active = true"
        ))
        .bind(Strategy::UnusualOptions.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut expired = 0u64;
        for row in rows {
            let signal = row.into_signal()?;
            let expiry = match &signal.payload {
                signal_core::StrategyPayload::UnusualOptions { expiry, .. } => *expiry,
                _ => continue,
            };
            if expiry > today {
                continue;
            }

            sqlx::query("UPDATE signals SET signal_status = 'expired', is_active = false, updated_at = ? WHERE signal_id = ?")
                .bind(Utc::now().to_rfc3339())
                .bind(&signal.signal_id)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
            expired += 1;
        }

        Ok(expired)
    }

    /// Deletes terminal, low-score signals older than `rules.older_than_days` — the
    /// dead weight a long-running deployment would otherwise accumulate forever.
    pub async fn cleanup_noise(&self, rules: NoiseRules) -> EngineResult<u64> {
        let cutoff = Utc::now().date_naive() - chrono::Duration::days(rules.older_than_days);

        let result = sqlx::query(
            "DELETE FROM signals WHERE is_active = false AND overall_score < ? AND last_active_date < ? \
             AND signal_status IN ('ended', 'expired')",
        )
        .bind(rules.min_overall_score)
        .bind(cutoff.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected())
    }

    /// Collapses duplicate `(symbol, strategy, scan_date)` rows down to the one with
    /// the latest `updated_at`, deactivating the rest. `upsert_signals`'s `ON CONFLICT`
    /// clause should make this a no-op in the steady state; it exists for recovery
    /// after an out-of-band write (a manual backfill, a restored backup) introduces
    /// a duplicate.
    pub async fn reconcile_duplicates(&self, date: NaiveDate, strategy: Strategy) -> EngineResult<u64> {
        let rows: Vec<SignalRow> = sqlx::query_as(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals WHERE scan_date = ? AND strategy = ? ORDER BY symbol, updated_at DESC"
        ))
        .bind(date.to_string())
        .bind(strategy.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut seen = std::collections::HashSet::new();
        let mut deactivated = 0u64;

        for row in rows {
            if seen.insert(row.symbol.clone()) {
                continue;
            }
            sqlx::query("UPDATE signals SET is_active = false WHERE signal_id = ?")
                .bind(&row.signal_id)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
            deactivated += 1;
        }

        Ok(deactivated)
    }

    // -- performance records (C9 storage, persisted here alongside signals) --

    pub async fn upsert_performance_record(&self, record: &PerformanceRecord) -> EngineResult<()> {
        let b = PerformanceBindings::try_from(record)?;

        sqlx::query(
            r#"
            INSERT INTO signal_performance (
                signal_id, symbol, entry_date, entry_price, exit_date, exit_price, exit_reason,
                status, return_pct, days_held, is_winner, stop_loss_price, target_prices,
                targets_hit, max_price_reached
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (signal_id) DO UPDATE SET
                exit_date = excluded.exit_date,
                exit_price = excluded.exit_price,
                exit_reason = excluded.exit_reason,
                status = excluded.status,
                return_pct = excluded.return_pct,
                days_held = excluded.days_held,
                is_winner = excluded.is_winner,
                stop_loss_price = excluded.stop_loss_price,
                target_prices = excluded.target_prices,
                targets_hit = excluded.targets_hit,
                max_price_reached = excluded.max_price_reached
            "#,
        )
        .bind(b.signal_id)
        .bind(b.symbol)
        .bind(b.entry_date)
        .bind(b.entry_price)
        .bind(b.exit_date)
        .bind(b.exit_price)
        .bind(b.exit_reason)
        .bind(b.status)
        .bind(b.return_pct)
        .bind(b.days_held)
        .bind(b.is_winner)
        .bind(b.stop_loss_price)
        .bind(b.target_prices)
        .bind(b.targets_hit)
        .bind(b.max_price_reached)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    pub async fn performance_record(&self, signal_id: &str) -> EngineResult<Option<PerformanceRecord>> {
        let row: Option<PerformanceRow> = sqlx::query_as(
            "SELECT id, signal_id, symbol, entry_date, entry_price, exit_date, exit_price, exit_reason, status, \
             return_pct, days_held, is_winner, stop_loss_price, target_prices, targets_hit, max_price_reached \
             FROM signal_performance WHERE signal_id = ?",
        )
        .bind(signal_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(PerformanceRow::into_record).transpose()
    }

    pub async fn active_performance_records(&self) -> EngineResult<Vec<PerformanceRecord>> {
        let rows: Vec<PerformanceRow> = sqlx::query_as(
            "SELECT id, signal_id, symbol, entry_date, entry_price, exit_date, exit_price, exit_reason, status, \
             return_pct, days_held, is_winner, stop_loss_price, target_prices, targets_hit, max_price_reached \
             FROM signal_performance WHERE status = 'active'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(PerformanceRow::into_record).collect()
    }

    // -- alerts --

    /// Inserts an alert, deduped per `(signal_id, tier, alert_date)`. Returns `true`
    /// if a new row was actually written, `false` if today's alert for this
    /// signal/tier already existed.
    pub async fn insert_alert_if_new(&self, alert: &AlertRecord, alert_date: NaiveDate) -> EngineResult<bool> {
        let payload = serde_json::to_string(&alert.payload).map_err(|e| EngineError::Store(format!("serializing alert payload: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO alerts (signal_id, tier, payload, created_at, alert_date, delivered) VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (signal_id, tier, alert_date) DO NOTHING",
        )
        .bind(&alert.signal_id)
        .bind(alert.alert_tier.as_str())
        .bind(payload)
        .bind(alert.created_at.to_rfc3339())
        .bind(alert_date.to_string())
        .bind(alert.delivered)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn alerts_on(&self, date: NaiveDate) -> EngineResult<Vec<AlertRecord>> {
        let rows: Vec<AlertRow> = sqlx::query_as("SELECT id, signal_id, tier, payload, created_at, delivered FROM alerts WHERE alert_date = ?")
            .bind(date.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.into_iter().map(AlertRow::into_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use signal_core::{ComponentScores, Grade, Recommendation, SignalStatus, StrategyPayload};

    async fn test_store() -> SignalStore {
        sqlx::any::install_default_drivers();
        let pool = AnyPool::connect("sqlite::memory:").await.expect("in-memory sqlite pool");
        let store = SignalStore::new(pool);
        store.migrate().await.expect("migrations");
        store
    }

    fn sample_signal(symbol: &str, scan_date: NaiveDate) -> Signal {
        let now = Utc::now();
        Signal {
            signal_id: format!("{symbol}:squeeze:{scan_date}"),
            symbol: symbol.to_string(),
            strategy: Strategy::Squeeze,
            scan_date,
            scan_timestamp: now,
            signal_status: SignalStatus::New,
            days_active: 1,
            first_detected_date: scan_date,
            last_active_date: scan_date,
            is_active: true,
            close_price: dec!(12.50),
            component_scores: ComponentScores::default(),
            overall_score: 0.82,
            grade: Grade::A,
            recommendation: Recommendation::Buy,
            payload: StrategyPayload::Squeeze { squeeze_depth: 80.0, days_in_squeeze: 6, breakout_proximity_pct: 2.0 },
            stop_loss_level: Some(dec!(11.00)),
            position_size_pct: Some(5.0),
            pump_dump_warning: false,
            high_risk_country: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn upsert_then_read_back_round_trips() {
        let store = test_store().await;
        let scan_date = day(2026, 7, 28);
        let report = store.upsert_signals(&[sample_signal("AAPL", scan_date)]).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);

        let rows = store.signals_on(scan_date, Some(Strategy::Squeeze)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol, "AAPL");
        assert_eq!(rows[0].grade, Grade::A);
        assert_eq!(rows[0].close_price, dec!(12.50));
    }

    #[tokio::test]
    async fn upsert_on_same_key_updates_in_place() {
        let store = test_store().await;
        let scan_date = day(2026, 7, 28);
        let mut signal = sample_signal("AAPL", scan_date);
        store.upsert_signals(&[signal.clone()]).await;

        signal.overall_score = 0.91;
        signal.grade = Grade::S;
        store.upsert_signals(&[signal]).await;

        let rows = store.signals_on(scan_date, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].grade, Grade::S);
    }

    #[tokio::test]
    async fn active_signals_filters_by_strategy_and_activity() {
        let store = test_store().await;
        let scan_date = day(2026, 7, 28);
        let mut ended = sample_signal("MSFT", scan_date);
        ended.is_active = false;
        ended.signal_status = SignalStatus::Ended;
        store.upsert_signals(&[sample_signal("AAPL", scan_date), ended]).await;

        let active = store.active_signals(Strategy::Squeeze).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].symbol, "AAPL");
    }

    #[tokio::test]
    async fn expire_past_flags_stale_options_contracts() {
        let store = test_store().await;
        let scan_date = day(2026, 7, 28);
        let mut signal = sample_signal("XYZ", scan_date);
        signal.strategy = Strategy::UnusualOptions;
        signal.payload = StrategyPayload::UnusualOptions {
            option_symbol: "XYZ240101C00100000".to_string(),
            option_type: signal_core::OptionType::Call,
            strike: 100.0,
            expiry: day(2026, 7, 20),
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
        store.upsert_signals(&[signal]).await;

        let expired = store.expire_past(day(2026, 7, 28)).await.unwrap();
        assert_eq!(expired, 1);

        let active = store.active_signals(Strategy::UnusualOptions).await.unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn expire_past_flags_contracts_expiring_today() {
        let store = test_store().await;
        let scan_date = day(2026, 7, 28);
        let mut signal = sample_signal("XYZ", scan_date);
        signal.strategy = Strategy::UnusualOptions;
        signal.payload = StrategyPayload::UnusualOptions {
            option_symbol: "XYZ240101C00100000".to_string(),
            option_type: signal_core::OptionType::Call,
            strike: 100.0,
            expiry: scan_date,
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
        store.upsert_signals(&[signal]).await;

        let expired = store.expire_past(scan_date).await.unwrap();
        assert_eq!(expired, 1);

        let active = store.active_signals(Strategy::UnusualOptions).await.unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn cleanup_noise_deletes_old_low_score_terminal_rows() {
        let store = test_store().await;
        let old_date = day(2026, 1, 1);
        let mut stale = sample_signal("PENNY", old_date);
        stale.is_active = false;
        stale.signal_status = SignalStatus::Ended;
        stale.last_active_date = old_date;
        stale.overall_score = 0.20;
        store.upsert_signals(&[stale]).await;

        let deleted = store.cleanup_noise(NoiseRules::default()).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.signals_on(old_date, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn alert_dedupes_per_signal_tier_and_day() {
        let store = test_store().await;
        let alert = AlertRecord {
            id: None,
            signal_id: "AAPL:squeeze:2026-07-28".to_string(),
            alert_tier: signal_core::AlertTier::TierA,
            payload: serde_json::json!({"symbol": "AAPL"}),
            created_at: Utc::now(),
            delivered: false,
        };
        let date = day(2026, 7, 28);

        assert!(store.insert_alert_if_new(&alert, date).await.unwrap());
        assert!(!store.insert_alert_if_new(&alert, date).await.unwrap());

        let alerts = store.alerts_on(date).await.unwrap();
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn performance_record_upsert_round_trips() {
        let store = test_store().await;
        let record = PerformanceRecord {
            id: None,
            signal_id: "AAPL:squeeze:2026-07-28".to_string(),
            symbol: "AAPL".to_string(),
            entry_date: day(2026, 7, 28),
            entry_price: dec!(12.50),
            exit_date: None,
            exit_price: None,
            exit_reason: None,
            status: signal_core::PerformanceStatus::Active,
            return_pct: None,
            days_held: None,
            is_winner: None,
            stop_loss_price: Some(dec!(11.00)),
            target_prices: signal_core::TargetLevels { t1: dec!(13.75), t2: dec!(15.00), t3: dec!(16.25) },
            targets_hit: signal_core::TargetsHit::default(),
            max_price_reached: None,
        };
        store.upsert_performance_record(&record).await.unwrap();

        let fetched = store.performance_record(&record.signal_id).await.unwrap().expect("record present");
        assert_eq!(fetched.entry_price, dec!(12.50));
        assert_eq!(fetched.status, signal_core::PerformanceStatus::Active);

        let active = store.active_performance_records().await.unwrap();
        assert_eq!(active.len(), 1);
    }
}
