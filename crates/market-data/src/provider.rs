use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rate_limiter::RateLimiter;
use serde::Deserialize;
use signal_core::{Bar, EngineError, OptionType, OptionsContract, Ticker};

/// The raw shape the fetcher depends on (spec section 6): history, info, and options
/// retrieval against whichever market-data provider is wired in. An `HttpProviderClient`
/// is the production implementation; tests wire in a canned in-memory one instead.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn fetch_history(&self, symbol: &str, lookback_days: u32) -> Result<Vec<Bar>, EngineError>;
    async fn fetch_options(&self, symbol: &str) -> Result<Vec<OptionsContract>, EngineError>;
    async fn fetch_info(&self, symbol: &str) -> Result<Option<Ticker>, EngineError>;
    async fn check_symbol(&self, symbol: &str) -> bool;
}

#[derive(Deserialize)]
struct AggBar {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    #[serde(default)]
    vw: Option<f64>,
}

#[derive(Deserialize)]
struct AggregatesResponse {
    #[serde(default)]
    results: Vec<AggBar>,
}

#[derive(Deserialize)]
struct OptionsSnapshotResponse {
    #[serde(default)]
    results: Vec<OptionsResult>,
}

#[derive(Deserialize)]
struct OptionsResult {
    #[serde(default)]
    details: Option<OptionsDetails>,
    #[serde(default)]
    day: Option<OptionsDay>,
    #[serde(default)]
    open_interest: Option<i64>,
    #[serde(default)]
    implied_volatility: Option<f64>,
}

#[derive(Deserialize)]
struct OptionsDetails {
    contract_type: Option<String>,
    strike_price: Option<f64>,
    expiration_date: Option<String>,
    ticker: Option<String>,
}

#[derive(Deserialize)]
struct OptionsDay {
    volume: Option<i64>,
    close: Option<f64>,
}

/// HTTP client over the provider's REST API. Every outbound call passes through the
/// shared `RateLimiter` and retries a flat number of times on HTTP 429 with the
/// backoff C1 prescribes before surfacing `EngineError::Upstream`.
pub struct HttpProviderClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
    limiter: RateLimiter,
    max_attempts: u32,
}

impl HttpProviderClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, limiter: RateLimiter) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds"),
            limiter,
            max_attempts: 3,
        }
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, EngineError> {
        let mut last_err: Option<String> = None;
        for attempt in 1..=self.max_attempts {
            self.limiter.acquire().await;

            let resp = self
                .http
                .get(url)
                .query(&[("apiKey", &self.api_key)])
                .send()
                .await;

            match resp {
                Ok(r) if r.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    let backoff = self.limiter.record_rate_limit_error().await;
                    tracing::warn!(attempt, backoff_ms = backoff.as_millis() as u64, url, "provider rate limited");
                    if !self.limiter.should_retry().await {
                        return Err(EngineError::RateLimited { retry_after_secs: backoff.as_secs() });
                    }
                    last_err = Some("rate limited".to_string());
                    continue;
                }
                Ok(r) if r.status().is_success() => {
                    self.limiter.record_success().await;
                    return Ok(r);
                }
                Ok(r) => {
                    last_err = Some(format!("status {}", r.status()));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                }
            }
        }
        Err(EngineError::Upstream {
            symbol: url.to_string(),
            source: last_err.unwrap_or_else(|| "exhausted retries".to_string()),
        })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn fetch_history(&self, symbol: &str, lookback_days: u32) -> Result<Vec<Bar>, EngineError> {
        let to = Utc::now().date_naive();
        let from = to - chrono::Duration::days(lookback_days as i64);
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url, symbol, from, to
        );
        let resp = self.send(&url).await?;
        let parsed: AggregatesResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Upstream { symbol: symbol.to_string(), source: e.to_string() })?;

        if parsed.results.is_empty() {
            return Err(EngineError::NoData(symbol.to_string()));
        }

        let mut bars: Vec<Bar> = parsed
            .results
            .into_iter()
            .filter_map(|b| {
                let timestamp = chrono::DateTime::from_timestamp_millis(b.t)?;
                Some(Bar {
                    timestamp,
                    open: b.o,
                    high: b.h,
                    low: b.l,
                    close: b.c,
                    volume: b.v,
                    vwap: b.vw,
                })
            })
            .collect();
        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }

    async fn fetch_options(&self, symbol: &str) -> Result<Vec<OptionsContract>, EngineError> {
        let url = format!("{}/v3/snapshot/options/{}", self.base_url, symbol);
        let resp = self.send(&url).await?;
        let parsed: OptionsSnapshotResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Upstream { symbol: symbol.to_string(), source: e.to_string() })?;

        let detected_at = Utc::now();
        let today = detected_at.date_naive();

        let contracts = parsed
            .results
            .into_iter()
            .filter_map(|r| {
                let details = r.details?;
                let option_symbol = details.ticker?;
                let strike = details.strike_price?;
                let expiry = chrono::NaiveDate::parse_from_str(details.expiration_date.as_deref()?, "%Y-%m-%d").ok()?;
                let option_type = match details.contract_type.as_deref()? {
                    "call" => OptionType::Call,
                    "put" => OptionType::Put,
                    _ => return None,
                };
                let volume = r.day.as_ref().and_then(|d| d.volume).unwrap_or(0);
                let last_price = r.day.as_ref().and_then(|d| d.close).unwrap_or(0.0);

                Some(OptionsContract {
                    ticker: symbol.to_string(),
                    option_symbol,
                    strike,
                    expiry,
                    option_type,
                    volume,
                    open_interest: r.open_interest.unwrap_or(0),
                    last_price,
                    implied_volatility: r.implied_volatility,
                    days_to_expiry: (expiry - today).num_days() as i32,
                    aggressive_order_pct: None,
                    premium_flow: Some(last_price * volume as f64 * 100.0),
                    detected_at,
                })
            })
            .collect();

        Ok(contracts)
    }

    async fn fetch_info(&self, symbol: &str) -> Result<Option<Ticker>, EngineError> {
        let url = format!("{}/v3/reference/tickers/{}", self.base_url, symbol);
        match self.send(&url).await {
            Ok(_resp) => Ok(None),
            Err(EngineError::Upstream { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn check_symbol(&self, symbol: &str) -> bool {
        self.fetch_info(symbol).await.is_ok()
    }
}

pub type BatchResult = HashMap<String, Vec<Bar>>;
