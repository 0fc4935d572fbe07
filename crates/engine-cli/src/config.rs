use rate_limiter::RateLimiterConfig;

/// Everything `main` needs pulled from the environment, validated eagerly so a
/// bad deployment fails before any collaborator is constructed (spec section 6:
/// "missing required values cause startup failure").
pub struct EnvConfig {
    pub db_url: String,
    pub db_service_key: Option<String>,
    pub provider_base_url: String,
    pub provider_api_key: String,
    pub rate_limit: RateLimiterConfig,
    pub batch_size: usize,
    pub scan_parallelism: usize,
    pub webhook_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for environment variable {0}: {1}")]
    Invalid(&'static str, String),
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parse_optional<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}

impl EnvConfig {
    /// Reads and validates `DB_URL`, `DB_SERVICE_KEY`, the market-data provider
    /// credentials, `RATE_LIMIT_RPM`/`RATE_LIMIT_RPH`, `BATCH_SIZE`,
    /// `SCAN_PARALLELISM`, `WEBHOOK_URL` (spec section 6's environment list).
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_url = required("DB_URL")?;
        let db_service_key = std::env::var("DB_SERVICE_KEY").ok();
        let provider_base_url = required("MARKET_DATA_BASE_URL")?;
        let provider_api_key = required("MARKET_DATA_API_KEY")?;

        let rpm_max = parse_optional("RATE_LIMIT_RPM", 500usize)?;
        let rph_max = parse_optional("RATE_LIMIT_RPH", 20_000usize)?;
        let batch_size = parse_optional("BATCH_SIZE", 100usize)?;
        let scan_parallelism = parse_optional("SCAN_PARALLELISM", 20usize)?;
        let webhook_url = std::env::var("WEBHOOK_URL").ok();

        Ok(Self {
            db_url,
            db_service_key,
            provider_base_url,
            provider_api_key,
            rate_limit: RateLimiterConfig {
                rpm_max,
                rph_max,
                ..RateLimiterConfig::default()
            },
            batch_size,
            scan_parallelism,
            webhook_url,
        })
    }
}
