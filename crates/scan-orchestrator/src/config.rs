use std::collections::HashMap;
use std::time::Duration;

use detector_set::{PennyExplosionConfig, RedditOpportunityConfig, SqueezeConfig, UnusualOptionsConfig};
use performance_tracker::PerformanceTrackerConfig;
use quality_validator::ValidatorConfig;
use scorer::{ScorerConfig, ScorerError, StrategyWeights};
use signal_core::Strategy;
use spread_detector::SpreadDetectorConfig;

/// All per-strategy knobs a scan needs, gathered in one place the way
/// `data-loader`'s top-level constants collect the whole job's tunables.
#[derive(Debug, Clone)]
pub struct ScanOrchestratorConfig {
    pub lookback_days: u32,
    pub max_universe_size: usize,
    pub fetch_concurrency: usize,
    pub analysis_parallelism: usize,
    pub scan_budget: Duration,
    pub failure_sample_size: usize,
    pub top_n_signals: usize,
    /// Max calendar days `CalendarOracle::previous_trading_day` walks back (spec 4.13).
    pub continuity_lookback_days: u32,

    pub validator: ValidatorConfig,
    pub scorers: HashMap<Strategy, ScorerConfig>,
    pub squeeze: SqueezeConfig,
    pub penny_explosion: PennyExplosionConfig,
    pub unusual_options: UnusualOptionsConfig,
    pub reddit_opportunity: RedditOpportunityConfig,
    pub spread_detector: SpreadDetectorConfig,
    pub tracker: PerformanceTrackerConfig,
    pub alert_emitter: alert_emitter::AlertEmitterConfig,
}

impl ScanOrchestratorConfig {
    /// Builds the default scorer table per strategy (spec 4.5's penny-stock weights
    /// plus the balanced default for the other three), failing closed per Design
    /// Note 9 if any table doesn't sum to 1.0 +/- 0.001.
    pub fn default_scorers() -> Result<HashMap<Strategy, ScorerConfig>, ScorerError> {
        let mut scorers = HashMap::new();
        scorers.insert(
            Strategy::PennyExplosion,
            ScorerConfig::new(StrategyWeights::penny_explosion_default().validated("penny_explosion")?),
        );
        for strategy in [Strategy::Squeeze, Strategy::UnusualOptions, Strategy::RedditOpportunity] {
            scorers.insert(strategy, ScorerConfig::new(StrategyWeights::balanced_default().validated(strategy.as_str())?));
        }
        Ok(scorers)
    }
}

impl Default for ScanOrchestratorConfig {
    fn default() -> Self {
        Self {
            lookback_days: 400,
            max_universe_size: 5000,
            fetch_concurrency: 20,
            analysis_parallelism: 2 * num_cpus_fallback(),
            scan_budget: Duration::from_secs(30 * 60),
            failure_sample_size: 10,
            top_n_signals: 25,
            continuity_lookback_days: 10,
            validator: ValidatorConfig::default(),
            scorers: Self::default_scorers().expect("built-in scorer weight tables must be valid"),
            squeeze: SqueezeConfig::default(),
            penny_explosion: PennyExplosionConfig::default(),
            unusual_options: UnusualOptionsConfig::default(),
            reddit_opportunity: RedditOpportunityConfig::default(),
            spread_detector: SpreadDetectorConfig::default(),
            tracker: PerformanceTrackerConfig::default(),
            alert_emitter: alert_emitter::AlertEmitterConfig::default(),
        }
    }
}

/// `std::thread::available_parallelism` with the same conservative fallback
/// `data-loader`'s default concurrency constant implies for an unknown host.
fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
