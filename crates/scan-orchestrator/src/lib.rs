//! The top-level scan (C10, spec section 4.10): symbol-universe resolution ->
//! fetch -> validate -> indicators -> detect -> score -> spread analysis ->
//! continuity -> persist -> tracker -> alerts, producing a `ScanReport`.
//!
//! Generalizes `analysis-orchestrator::AnalysisOrchestrator::analyze()` (single
//! -symbol pipeline) and `analysis-orchestrator::screener::StockScreener::screen()`
//! (`JoinSet` fan-out over a universe) into the eleven-phase batch scan below.

pub mod cancellation;
pub mod config;
pub mod pipeline;
pub mod report;

pub use cancellation::ScanCancellation;
pub use config::ScanOrchestratorConfig;
pub use pipeline::RedditMentionProvider;
pub use report::ScanReport;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use signal_core::{
    MarketDataProvider, Signal, SignalSink, SignalStatus, Strategy, Ticker, TradingCalendar,
};
use signal_store::SignalStore;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use continuity_engine::ScoredCandidate;
use pipeline::{PerSymbolInput, ScoringMeta, SymbolOutcome};

/// Owns every collaborator a scan needs; constructed once at startup, passed by
/// reference into `run_scan` (Design Note 9's "explicit lifecycle" replacement for
/// the teacher's process-wide singletons).
pub struct ScanOrchestrator {
    pub market_data: Arc<dyn MarketDataProvider>,
    pub store: Arc<SignalStore>,
    pub calendar: Arc<dyn TradingCalendar>,
    pub reddit: Option<Arc<dyn RedditMentionProvider>>,
    pub sink: Option<Arc<dyn SignalSink>>,
    pub config: ScanOrchestratorConfig,
}

impl ScanOrchestrator {
    pub fn new(
        market_data: Arc<dyn MarketDataProvider>,
        store: Arc<SignalStore>,
        calendar: Arc<dyn TradingCalendar>,
        config: ScanOrchestratorConfig,
    ) -> Self {
        Self { market_data, store, calendar, reddit: None, sink: None, config }
    }

    pub fn with_reddit_provider(mut self, provider: Arc<dyn RedditMentionProvider>) -> Self {
        self.reddit = Some(provider);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn SignalSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn budget_exceeded(&self, started_at: Instant) -> bool {
        started_at.elapsed() >= self.config.scan_budget
    }

    /// Runs one end-to-end scan for `strategy` over `universe` as of `as_of_date`.
    /// `universe` is assumed already filtered to the strategy's predicate (active,
    /// right exchange/country/sector) by the caller — ticker resolution lives
    /// outside this engine (spec section 3: `Ticker` is read-only here).
    pub async fn run_scan(
        &self,
        strategy: Strategy,
        mut universe: Vec<Ticker>,
        as_of_date: NaiveDate,
        cancellation: ScanCancellation,
    ) -> anyhow::Result<ScanReport> {
        let started_at = Instant::now();
        let scan_timestamp = Utc::now();
        let mut report = ScanReport::new(strategy, as_of_date);

        universe.truncate(self.config.max_universe_size);
        report.counts.universe_size = universe.len();
        let symbols: Vec<String> = universe.iter().map(|t| t.symbol.clone()).collect();
        let ticker_by_symbol: HashMap<&str, &Ticker> = universe.iter().map(|t| (t.symbol.as_str(), t)).collect();

        if cancellation.is_cancelled() || self.budget_exceeded(started_at) {
            report.cancelled = true;
            return Ok(report);
        }

        // -- phase: fetch (C2) --
        let fetch_start = Instant::now();
        let bars_map = self.market_data.get_batch_ohlcv(&symbols, self.config.lookback_days).await;
        report.counts.fetched = bars_map.len();
        report.counts.fetch_failed = symbols.len().saturating_sub(bars_map.len());
        for symbol in &symbols {
            if !bars_map.contains_key(symbol) {
                report::FailureTaxonomy::push_sample(&mut report.failures.no_data, self.config.failure_sample_size, symbol.clone());
            }
        }

        let options_map = self.fetch_options(strategy, &symbols, &cancellation).await;

        let benchmark_bars = if strategy == Strategy::PennyExplosion {
            self.market_data.get_ohlcv("SPY", self.config.lookback_days).await.ok()
        } else {
            None
        };

        let reddit_windows = match (strategy, &self.reddit) {
            (Strategy::RedditOpportunity, Some(provider)) => provider.mention_windows(&symbols).await,
            _ => HashMap::new(),
        };
        report.durations.fetch = fetch_start.elapsed();

        if cancellation.is_cancelled() || self.budget_exceeded(started_at) {
            report.cancelled = true;
            return Ok(report);
        }

        // -- phases: validate (C4) + indicators (C3) + detect (C6), fused per symbol --
        let analysis_start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.analysis_parallelism));
        let mut tasks: JoinSet<(String, SymbolOutcome)> = JoinSet::new();

        for (symbol, bars) in bars_map {
            let ticker = ticker_by_symbol.get(symbol.as_str()).map(|t| (*t).clone());
            let input = PerSymbolInput {
                strategy,
                symbol: symbol.clone(),
                bars,
                benchmark_bars: benchmark_bars.clone(),
                options: options_map.get(&symbol).cloned(),
                reddit_window: reddit_windows.get(&symbol).cloned(),
                ticker,
                validator_config: self.config.validator,
                squeeze_config: self.config.squeeze,
                penny_config: self.config.penny_explosion,
                unusual_config: self.config.unusual_options,
                reddit_config: self.config.reddit_opportunity,
            };
            let permit = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                let outcome = pipeline::run_symbol_pipeline(input);
                (symbol, outcome)
            });
        }

        let mut candidates: Vec<signal_core::CandidateSignal> = Vec::new();
        let mut metas: Vec<ScoringMeta> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, SymbolOutcome::Candidates { candidates: c, meta })) => {
                    report.counts.validated += 1;
                    report.counts.candidates_detected += c.len();
                    for _ in &c {
                        metas.push(meta.clone());
                    }
                    candidates.extend(c);
                    let _ = symbol;
                }
                Ok((symbol, SymbolOutcome::ValidationFailed { reasons, .. })) => {
                    report.counts.validation_failed += 1;
                    report::FailureTaxonomy::push_sample(
                        &mut report.failures.validation_failed,
                        self.config.failure_sample_size,
                        format!("{symbol}: {reasons}"),
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "analysis task panicked");
                }
            }
        }
        report.durations.indicators = analysis_start.elapsed();

        if cancellation.is_cancelled() || self.budget_exceeded(started_at) {
            report.cancelled = true;
            return Ok(report);
        }

        // -- phase: spread analysis (C11), options only, before scoring --
        let spread_start = Instant::now();
        let spread_confidences = if strategy == Strategy::UnusualOptions {
            spread_detector::annotate_spreads(&mut candidates, &self.config.spread_detector)
        } else {
            vec![None; candidates.len()]
        };
        report.counts.spread_annotated = spread_confidences.iter().filter(|c| c.is_some()).count();
        report.durations.spread = spread_start.elapsed();

        // -- phase: score (C5) --
        let score_start = Instant::now();
        let scorer_config = self.config.scorers.get(&strategy).expect("every strategy has a scorer config");
        let mut scored: Vec<ScoredCandidate> = Vec::with_capacity(candidates.len());
        for ((candidate, meta), spread_confidence) in candidates.into_iter().zip(metas.into_iter()).zip(spread_confidences.into_iter()) {
            let close_price = signal_core::money::f64_from_decimal(candidate.close_price);
            let ctx = scorer::ScoringContext {
                close_price,
                volume_ratio: meta.volume_ratio,
                country: meta.country.as_deref(),
                spread_confidence,
            };
            let result = scorer::score(&candidate.component_scores, &ctx, scorer_config);
            report.counts.scored += 1;
            scored.push(ScoredCandidate {
                candidate,
                overall_score: result.overall_score,
                grade: result.grade,
                recommendation: result.recommendation,
                pump_dump_warning: result.pump_dump_warning,
                high_risk_country: result.high_risk_country,
            });
        }
        report.durations.score = score_start.elapsed();

        if cancellation.is_cancelled() || self.budget_exceeded(started_at) {
            report.cancelled = true;
            return Ok(report);
        }

        // -- phase: continuity (C7) --
        let continuity_start = Instant::now();
        let prev_live = match self.calendar.previous_trading_day(as_of_date, self.config.continuity_lookback_days) {
            Some(yesterday) => self
                .store
                .signals_on(yesterday, Some(strategy))
                .await?
                .into_iter()
                .filter(|s| s.is_active)
                .collect::<Vec<_>>(),
            None => Vec::new(),
        };
        let reconciled = continuity_engine::reconcile(as_of_date, scan_timestamp, &scored, &prev_live);
        for signal in &reconciled {
            match signal.signal_status {
                SignalStatus::New => report.counts.continuity_new += 1,
                SignalStatus::Continuing => report.counts.continuity_continuing += 1,
                SignalStatus::Ended => report.counts.continuity_ended += 1,
                SignalStatus::Expired => report.counts.continuity_expired += 1,
            }
        }
        report.durations.continuity = continuity_start.elapsed();

        if cancellation.is_cancelled() || self.budget_exceeded(started_at) {
            report.cancelled = true;
            return Ok(report);
        }

        // -- phase: persist (C8) --
        let persist_start = Instant::now();
        let upsert_report = self.store.upsert_signals(&reconciled).await;
        report.counts.persisted = upsert_report.succeeded;
        report.counts.persist_failed_rows = upsert_report.failed;
        for e in upsert_report.errors.iter().take(self.config.failure_sample_size) {
            report.failures.store_errors.push(e.clone());
        }
        report.persist_failed = upsert_report.attempted > 0 && upsert_report.succeeded == 0;
        report.durations.persist = persist_start.elapsed();

        if report.persist_failed {
            return Ok(report);
        }

        // -- phase: tracker (C9) --
        let tracker_start = Instant::now();
        self.run_tracker(&reconciled, &mut report).await;
        report.durations.tracker = tracker_start.elapsed();

        // -- phase: alerts (C12) --
        let alerts_start = Instant::now();
        let alerts = alert_emitter::emit_alerts(&reconciled, &self.config.alert_emitter);
        for alert in &alerts {
            match self.store.insert_alert_if_new(alert, as_of_date).await {
                Ok(true) => {
                    report.counts.alerts_emitted += 1;
                    if let Some(sink) = &self.sink {
                        if let Err(e) = sink.emit(alert).await {
                            tracing::warn!(signal_id = %alert.signal_id, error = %e, "alert sink delivery failed");
                        }
                    }
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(signal_id = %alert.signal_id, error = %e, "failed to record alert"),
            }
        }
        report.durations.alerts = alerts_start.elapsed();

        report.finalize_top_signals(reconciled, self.config.top_n_signals);
        report.durations.total = started_at.elapsed();
        Ok(report)
    }

    async fn fetch_options(
        &self,
        strategy: Strategy,
        symbols: &[String],
        cancellation: &ScanCancellation,
    ) -> HashMap<String, Vec<signal_core::OptionsContract>> {
        let mut out = HashMap::new();
        if strategy != Strategy::UnusualOptions {
            return out;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.fetch_concurrency));
        let mut tasks = JoinSet::new();
        for symbol in symbols {
            if cancellation.is_cancelled() {
                break;
            }
            let symbol = symbol.clone();
            let permit = Arc::clone(&semaphore);
            let market_data = Arc::clone(&self.market_data);
            tasks.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                (symbol.clone(), market_data.get_options_chain(&symbol).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Ok((symbol, Ok(contracts))) = joined {
                if !contracts.is_empty() {
                    out.insert(symbol, contracts);
                }
            }
        }
        out
    }

    /// Opens positions for every signal that just went NEW and closes positions
    /// for every signal that just reached a terminal state, following the
    /// intraday stop/target replay in `performance-tracker`.
    async fn run_tracker(&self, reconciled: &[Signal], report: &mut ScanReport) {
        for signal in reconciled {
            match signal.signal_status {
                SignalStatus::New => {
                    let record = performance_tracker::open_position(signal, &self.config.tracker);
                    if let Err(e) = self.store.upsert_performance_record(&record).await {
                        tracing::warn!(signal_id = %signal.signal_id, error = %e, "failed to open performance record");
                    } else {
                        report.counts.tracker_opened += 1;
                    }
                }
                SignalStatus::Ended | SignalStatus::Expired => {
                    let Ok(Some(record)) = self.store.performance_record(&signal.signal_id).await else { continue };
                    if record.status == signal_core::PerformanceStatus::Closed {
                        continue;
                    }
                    let lookback = (signal.scan_date - record.entry_date).num_days().max(1) as u32 + 5;
                    let bars = self.market_data.get_ohlcv(&signal.symbol, lookback).await.unwrap_or_default();
                    let closed = performance_tracker::close_position(&record, signal, &bars);
                    if let Err(e) = self.store.upsert_performance_record(&closed).await {
                        tracing::warn!(signal_id = %signal.signal_id, error = %e, "failed to close performance record");
                    } else {
                        report.counts.tracker_closed += 1;
                    }
                }
                SignalStatus::Continuing => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use signal_core::{Bar, EngineResult, OptionsContract};

    struct FakeProvider {
        bars: std::collections::HashMap<String, Vec<Bar>>,
    }

    fn flat_bars(days: i64, price: f64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 16, 0, 0).unwrap();
        (0..days)
            .map(|i| Bar {
                timestamp: start + Duration::days(i),
                open: price,
                high: price * 1.01,
                low: price * 0.99,
                close: price,
                volume: 50_000.0,
                vwap: None,
            })
            .collect()
    }

    #[async_trait]
    impl MarketDataProvider for FakeProvider {
        async fn get_ohlcv(&self, symbol: &str, _lookback_days: u32) -> EngineResult<Vec<Bar>> {
            self.bars.get(symbol).cloned().ok_or_else(|| signal_core::EngineError::NoData(symbol.to_string()))
        }

        async fn get_batch_ohlcv(&self, symbols: &[String], _lookback_days: u32) -> std::collections::HashMap<String, Vec<Bar>> {
            symbols.iter().filter_map(|s| self.bars.get(s).map(|b| (s.clone(), b.clone()))).collect()
        }

        async fn get_options_chain(&self, _symbol: &str) -> EngineResult<Vec<OptionsContract>> {
            Ok(Vec::new())
        }

        async fn get_ticker_info(&self, _symbol: &str) -> EngineResult<Option<Ticker>> {
            Ok(None)
        }

        async fn validate_symbol(&self, _symbol: &str) -> bool {
            true
        }
    }

    fn ticker(symbol: &str) -> Ticker {
        Ticker {
            symbol: symbol.to_string(),
            name: None,
            exchange: None,
            country: None,
            currency: None,
            sector: None,
            industry: None,
            market_cap: None,
            ticker_type: signal_core::TickerType::Stock,
            is_active: true,
            last_fetched: None,
        }
    }

    async fn test_orchestrator(bars: std::collections::HashMap<String, Vec<Bar>>) -> ScanOrchestrator {
        sqlx::any::install_default_drivers();
        let pool = sqlx::AnyPool::connect("sqlite::memory:").await.unwrap();
        let store = SignalStore::new(pool);
        store.migrate().await.unwrap();
        ScanOrchestrator::new(
            Arc::new(FakeProvider { bars }),
            Arc::new(store),
            Arc::new(calendar_oracle::CalendarOracle::new()),
            ScanOrchestratorConfig::default(),
        )
    }

    // Low price + large volume acceleration should clear the penny-explosion
    // gates; the exact detector behavior is covered in detector-set's own tests,
    // this only exercises that the orchestrator wires fetch -> persist -> report.
    #[tokio::test]
    async fn scan_with_no_prior_state_persists_new_signals_when_any_are_detected() {
        let mut bars = flat_bars(120, 2.0);
        if let Some(last) = bars.last_mut() {
            last.volume = 5_000_000.0;
            last.close = 2.4;
            last.high = 2.5;
        }
        let mut data = std::collections::HashMap::new();
        data.insert("PNY".to_string(), bars);
        let orchestrator = test_orchestrator(data).await;

        let as_of = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let report = orchestrator
            .run_scan(Strategy::PennyExplosion, vec![ticker("PNY")], as_of, ScanCancellation::new())
            .await
            .unwrap();

        assert_eq!(report.counts.universe_size, 1);
        assert!(!report.cancelled);
        assert!(!report.persist_failed);
    }

    #[tokio::test]
    async fn missing_symbol_is_counted_as_fetch_failure_not_an_error() {
        let orchestrator = test_orchestrator(std::collections::HashMap::new()).await;
        let as_of = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let report = orchestrator
            .run_scan(Strategy::Squeeze, vec![ticker("GONE")], as_of, ScanCancellation::new())
            .await
            .unwrap();

        assert_eq!(report.counts.fetch_failed, 1);
        assert_eq!(report.counts.validated, 0);
    }

    #[tokio::test]
    async fn cancellation_before_fetch_marks_report_cancelled() {
        let orchestrator = test_orchestrator(std::collections::HashMap::new()).await;
        let cancellation = ScanCancellation::new();
        cancellation.cancel();
        let as_of = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let report = orchestrator.run_scan(Strategy::Squeeze, vec![ticker("AAPL")], as_of, cancellation).await.unwrap();
        assert!(report.cancelled);
    }
}
