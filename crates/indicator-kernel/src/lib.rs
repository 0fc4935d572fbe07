//! Pure-function computation of indicators and pattern detectors over OHLCV bars
//! (C3). Deterministic for fixed inputs; every function returns `None`/a supplied
//! default rather than raising when history is insufficient.

pub mod averages;
pub mod patterns;
pub mod snapshot;

pub use averages::{atr_series, bollinger_bands_series, ema_series, macd_series, rsi_series, sma_series, BollingerBands, Macd};
pub use patterns::{consecutive_green_days, detect_consolidation, detect_higher_lows, volume_acceleration, volume_consistency_score, ConsolidationResult};
pub use snapshot::build_snapshots;
