use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

use crate::error::EngineResult;
use crate::types::{AlertRecord, Bar, OptionsContract, Ticker};

/// Narrow interface over the market-data provider. Real implementations wrap an
/// HTTP client behind C1's rate limiter; fakes back unit tests with canned bars.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_ohlcv(&self, symbol: &str, lookback_days: u32) -> EngineResult<Vec<Bar>>;

    async fn get_batch_ohlcv(
        &self,
        symbols: &[String],
        lookback_days: u32,
    ) -> HashMap<String, Vec<Bar>>;

    async fn get_options_chain(&self, symbol: &str) -> EngineResult<Vec<OptionsContract>>;

    async fn get_ticker_info(&self, symbol: &str) -> EngineResult<Option<Ticker>>;

    async fn validate_symbol(&self, symbol: &str) -> bool;
}

/// Destination for persisted alert records. The engine emits; a sink (webhook,
/// Discord, email) delivers — out of scope here.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn emit(&self, alert: &AlertRecord) -> EngineResult<()>;
}

/// Trading-day calendar abstraction, implemented by C13 in this workspace.
pub trait TradingCalendar: Send + Sync {
    fn is_trading_day(&self, date: NaiveDate) -> bool;
    fn previous_trading_day(&self, date: NaiveDate, max_lookback: u32) -> Option<NaiveDate>;
}

/// Optional ML/LLM enhancement, invoked only if wired in. A `None` predictor must
/// never change the scorer's result beyond the documented hardcoded fallback.
#[async_trait]
pub trait MLPredictor: Send + Sync {
    async fn predict_weights(&self, strategy: &str) -> Option<HashMap<String, f64>>;
}

/// Optional narrative/notification enhancement, also an out-of-core collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> EngineResult<()>;
}
