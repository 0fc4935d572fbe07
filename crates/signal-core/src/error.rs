use thiserror::Error;

/// Closed error taxonomy shared across the engine (spec section 7).
///
/// `RateLimited` is expected to be fully absorbed by the rate limiter's backoff and
/// should never reach a caller in practice; it exists so a provider implementation
/// has a typed value to return before C1 catches it.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("upstream provider error for {symbol}: {source}")]
    Upstream { symbol: String, source: String },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("no data returned for {0}")]
    NoData(String),

    #[error("validation failed for {symbol}: {reason}")]
    ValidationFailed { symbol: String, reason: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("scan cancelled")]
    Cancelled,

    #[error("unknown error: {0}")]
    Unknown(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
