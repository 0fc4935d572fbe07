use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use signal_core::{Signal, Strategy};

/// Counts at each of the eleven phases (spec 4.10). Every field is a plain count,
/// not a percentage, so a `ScanReport` can be diffed across runs without surprises.
#[derive(Debug, Clone, Default)]
pub struct PhaseCounts {
    pub universe_size: usize,
    pub fetched: usize,
    pub fetch_failed: usize,
    pub validated: usize,
    pub validation_failed: usize,
    pub candidates_detected: usize,
    pub scored: usize,
    pub spread_annotated: usize,
    pub continuity_new: usize,
    pub continuity_continuing: usize,
    pub continuity_ended: usize,
    pub continuity_expired: usize,
    pub persisted: usize,
    pub persist_failed_rows: usize,
    pub tracker_opened: usize,
    pub tracker_closed: usize,
    pub alerts_emitted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PhaseDurations {
    pub fetch: Duration,
    pub validate: Duration,
    pub indicators: Duration,
    pub detect: Duration,
    pub score: Duration,
    pub spread: Duration,
    pub continuity: Duration,
    pub persist: Duration,
    pub tracker: Duration,
    pub alerts: Duration,
    pub total: Duration,
}

/// Up to `K` sample error strings per failure class (spec section 7's
/// "operators see counts by failure class and up to K sample error strings").
#[derive(Debug, Clone, Default)]
pub struct FailureTaxonomy {
    pub no_data: Vec<String>,
    pub upstream_errors: Vec<String>,
    pub validation_failed: Vec<String>,
    pub store_errors: Vec<String>,
}

impl FailureTaxonomy {
    pub(crate) fn push_sample(samples: &mut Vec<String>, limit: usize, entry: String) {
        if samples.len() < limit {
            samples.push(entry);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub strategy: Strategy,
    pub scan_date: NaiveDate,
    pub scan_timestamp: DateTime<Utc>,
    pub counts: PhaseCounts,
    pub durations: PhaseDurations,
    pub failures: FailureTaxonomy,
    /// Top signals by grade/overall_score, capped at `ScanOrchestratorConfig::top_n_signals`.
    pub top_signals: Vec<Signal>,
    /// Set once a cancellation token fires or the per-scan budget is exceeded;
    /// remaining phases are skipped and whatever completed is retained (spec
    /// section 5's cancellation contract).
    pub cancelled: bool,
    /// Set when every row in this scan's `upsert_signals` batch failed (spec
    /// section 7's `StoreError` escalation rule).
    pub persist_failed: bool,
}

impl ScanReport {
    pub(crate) fn new(strategy: Strategy, scan_date: NaiveDate) -> Self {
        Self {
            strategy,
            scan_date,
            scan_timestamp: Utc::now(),
            counts: PhaseCounts::default(),
            durations: PhaseDurations::default(),
            failures: FailureTaxonomy::default(),
            top_signals: Vec::new(),
            cancelled: false,
            persist_failed: false,
        }
    }

    pub(crate) fn finalize_top_signals(&mut self, mut signals: Vec<Signal>, top_n: usize) {
        signals.sort_by(|a, b| b.overall_score.partial_cmp(&a.overall_score).unwrap_or(std::cmp::Ordering::Equal));
        signals.truncate(top_n);
        self.top_signals = signals;
    }
}
