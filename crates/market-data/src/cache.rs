use std::time::{Duration, Instant};

/// A cached value plus the instant it was stored, the shape used throughout the
/// orchestrator this fetcher descends from for every TTL-backed cache.
#[derive(Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub cached_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T) -> Self {
        Self { data, cached_at: Instant::now() }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() < ttl
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub quotes: Duration,
    pub info: Duration,
    pub options: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            quotes: Duration::from_secs(30 * 60),
            info: Duration::from_secs(60 * 60),
            options: Duration::from_secs(15 * 60),
        }
    }
}
