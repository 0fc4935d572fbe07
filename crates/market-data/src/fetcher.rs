use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use signal_core::{Bar, EngineResult, MarketDataProvider, OptionsContract, Ticker};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::cache::{CacheEntry, CacheTtls};
use crate::provider::ProviderClient;

#[derive(Debug, Clone, Copy)]
pub struct FetcherConfig {
    pub batch_chunk_size: usize,
    pub batch_concurrency: usize,
    pub ttls: CacheTtls,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            batch_chunk_size: 100,
            batch_concurrency: 20,
            ttls: CacheTtls::default(),
        }
    }
}

/// TTL-cached, single-flight-deduped market-data fetcher (C2), generic over any
/// `ProviderClient` so production HTTP access and fake in-memory test doubles share
/// the same caching/batching semantics.
pub struct CachingFetcher<P: ProviderClient> {
    provider: Arc<P>,
    config: FetcherConfig,
    bars_cache: DashMap<String, CacheEntry<(u32, Vec<Bar>)>>,
    info_cache: DashMap<String, CacheEntry<Option<Ticker>>>,
    options_cache: DashMap<String, CacheEntry<Vec<OptionsContract>>>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl<P: ProviderClient + 'static> CachingFetcher<P> {
    pub fn new(provider: P, config: FetcherConfig) -> Self {
        Self {
            provider: Arc::new(provider),
            config,
            bars_cache: DashMap::new(),
            info_cache: DashMap::new(),
            options_cache: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    fn inflight_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.inflight.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Slices the most recent `lookback_days` worth of a wider cached series, the
    /// "serve a shorter request from a longer cached range" optimization this
    /// fetcher's caching scheme is built around.
    fn slice_recent(bars: &[Bar], lookback_days: u32) -> Vec<Bar> {
        let cutoff = Utc::now() - chrono::Duration::days(lookback_days as i64);
        bars.iter().filter(|b| b.timestamp >= cutoff).cloned().collect()
    }
}

#[async_trait]
impl<P: ProviderClient + 'static> MarketDataProvider for CachingFetcher<P> {
    async fn get_ohlcv(&self, symbol: &str, lookback_days: u32) -> EngineResult<Vec<Bar>> {
        let key = format!("bars:{symbol}");
        let lock = self.inflight_lock(&key);
        let _guard = lock.lock().await;

        if let Some(entry) = self.bars_cache.get(symbol) {
            if entry.is_fresh(self.config.ttls.quotes) && entry.data.0 >= lookback_days {
                let sliced = Self::slice_recent(&entry.data.1, lookback_days);
                if !sliced.is_empty() {
                    return Ok(sliced);
                }
                tracing::debug!(symbol, "cached series sliced to empty, falling through to a fresh fetch");
            }
        }

        let bars = self.provider.fetch_history(symbol, lookback_days).await?;
        self.bars_cache.insert(symbol.to_string(), CacheEntry::new((lookback_days, bars.clone())));
        Ok(bars)
    }

    async fn get_batch_ohlcv(&self, symbols: &[String], lookback_days: u32) -> HashMap<String, Vec<Bar>> {
        let mut out = HashMap::with_capacity(symbols.len());

        for chunk in symbols.chunks(self.config.batch_chunk_size) {
            let semaphore = Arc::new(Semaphore::new(self.config.batch_concurrency));
            let mut tasks = JoinSet::new();

            for symbol in chunk {
                let symbol = symbol.clone();
                let permit = Arc::clone(&semaphore);
                let provider = Arc::clone(&self.provider);
                tasks.spawn(async move {
                    let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                    let result = provider.fetch_history(&symbol, lookback_days).await;
                    (symbol, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((symbol, Ok(bars))) => {
                        self.bars_cache.insert(symbol.clone(), CacheEntry::new((lookback_days, bars.clone())));
                        out.insert(symbol, bars);
                    }
                    Ok((symbol, Err(e))) => {
                        tracing::warn!(symbol = %symbol, error = %e, "batch fetch failed for symbol, skipping");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "batch fetch task panicked");
                    }
                }
            }
        }

        out
    }

    async fn get_options_chain(&self, symbol: &str) -> EngineResult<Vec<OptionsContract>> {
        let key = format!("options:{symbol}");
        let lock = self.inflight_lock(&key);
        let _guard = lock.lock().await;

        if let Some(entry) = self.options_cache.get(symbol) {
            if entry.is_fresh(self.config.ttls.options) {
                return Ok(entry.data.clone());
            }
        }

        let contracts = self.provider.fetch_options(symbol).await?;
        self.options_cache.insert(symbol.to_string(), CacheEntry::new(contracts.clone()));
        Ok(contracts)
    }

    async fn get_ticker_info(&self, symbol: &str) -> EngineResult<Option<Ticker>> {
        let key = format!("info:{symbol}");
        let lock = self.inflight_lock(&key);
        let _guard = lock.lock().await;

        if let Some(entry) = self.info_cache.get(symbol) {
            if entry.is_fresh(self.config.ttls.info) {
                return Ok(entry.data.clone());
            }
        }

        let info = self.provider.fetch_info(symbol).await?;
        self.info_cache.insert(symbol.to_string(), CacheEntry::new(info.clone()));
        Ok(info)
    }

    async fn validate_symbol(&self, symbol: &str) -> bool {
        self.provider.check_symbol(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_core::EngineError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProviderClient for CountingProvider {
        async fn fetch_history(&self, _symbol: &str, _lookback_days: u32) -> Result<Vec<Bar>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Bar {
                timestamp: Utc::now(),
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 1000.0,
                vwap: None,
            }])
        }

        async fn fetch_options(&self, _symbol: &str) -> Result<Vec<OptionsContract>, EngineError> {
            Ok(Vec::new())
        }

        async fn fetch_info(&self, _symbol: &str) -> Result<Option<Ticker>, EngineError> {
            Ok(None)
        }

        async fn check_symbol(&self, _symbol: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn caches_repeat_requests_for_same_symbol() {
        let fetcher = CachingFetcher::new(CountingProvider { calls: AtomicUsize::new(0) }, FetcherConfig::default());
        fetcher.get_ohlcv("AAPL", 30).await.unwrap();
        fetcher.get_ohlcv("AAPL", 30).await.unwrap();
        assert_eq!(fetcher.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wider_cached_range_serves_a_narrower_request() {
        let fetcher = CachingFetcher::new(CountingProvider { calls: AtomicUsize::new(0) }, FetcherConfig::default());
        fetcher.get_ohlcv("AAPL", 365).await.unwrap();
        fetcher.get_ohlcv("AAPL", 30).await.unwrap();
        assert_eq!(fetcher.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_cache_slice_falls_through_to_a_fresh_fetch() {
        struct StaleProvider {
            calls: AtomicUsize,
        }
        #[async_trait]
        impl ProviderClient for StaleProvider {
            async fn fetch_history(&self, _symbol: &str, _lookback_days: u32) -> Result<Vec<Bar>, EngineError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![Bar {
                    timestamp: Utc::now() - chrono::Duration::days(400),
                    open: 1.0,
                    high: 1.0,
                    low: 1.0,
                    close: 1.0,
                    volume: 1.0,
                    vwap: None,
                }])
            }
            async fn fetch_options(&self, _symbol: &str) -> Result<Vec<OptionsContract>, EngineError> {
                Ok(Vec::new())
            }
            async fn fetch_info(&self, _symbol: &str) -> Result<Option<Ticker>, EngineError> {
                Ok(None)
            }
            async fn check_symbol(&self, _symbol: &str) -> bool {
                true
            }
        }

        let fetcher = CachingFetcher::new(StaleProvider { calls: AtomicUsize::new(0) }, FetcherConfig::default());
        // Caches a 400-day-old bar under a wide 365-day window.
        let first = fetcher.get_ohlcv("AAPL", 365).await.unwrap();
        assert!(!first.is_empty());

        // A narrower request would slice that cached bar out entirely; the fetcher
        // must re-fetch rather than hand back an empty Ok(vec![]).
        let second = fetcher.get_ohlcv("AAPL", 30).await.unwrap();
        assert!(!second.is_empty());
        assert_eq!(fetcher.provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn batch_fetch_never_fails_for_individual_missing_symbols() {
        struct FlakyProvider;
        #[async_trait]
        impl ProviderClient for FlakyProvider {
            async fn fetch_history(&self, symbol: &str, _lookback_days: u32) -> Result<Vec<Bar>, EngineError> {
                if symbol == "BAD" {
                    Err(EngineError::NoData(symbol.to_string()))
                } else {
                    Ok(vec![Bar {
                        timestamp: Utc::now(),
                        open: 1.0,
                        high: 1.0,
                        low: 1.0,
                        close: 1.0,
                        volume: 1.0,
                        vwap: None,
                    }])
                }
            }
            async fn fetch_options(&self, _symbol: &str) -> Result<Vec<OptionsContract>, EngineError> {
                Ok(Vec::new())
            }
            async fn fetch_info(&self, _symbol: &str) -> Result<Option<Ticker>, EngineError> {
                Ok(None)
            }
            async fn check_symbol(&self, _symbol: &str) -> bool {
                true
            }
        }

        let fetcher = CachingFetcher::new(FlakyProvider, FetcherConfig::default());
        let symbols = vec!["GOOD".to_string(), "BAD".to_string()];
        let result = fetcher.get_batch_ohlcv(&symbols, 30).await;
        assert!(result.contains_key("GOOD"));
        assert!(!result.contains_key("BAD"));
    }
}
