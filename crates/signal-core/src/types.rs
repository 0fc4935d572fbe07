use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV record at one timestamp.
///
/// Invariant: `low <= min(open, close) <= max(open, close) <= high`, `volume >= 0`.
/// Bars for a given symbol are expected to be strictly monotonic by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub vwap: Option<f64>,
}

impl Bar {
    pub fn is_valid(&self) -> bool {
        self.volume >= 0.0
            && self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
            && [self.open, self.high, self.low, self.close].iter().all(|v| v.is_finite())
    }
}

/// Immutable reference row for a tradable instrument. Upserted by universe-refresh
/// jobs outside this engine; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub ticker_type: TickerType,
    pub is_active: bool,
    pub last_fetched: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickerType {
    Stock,
    Etf,
    OptionUnderlying,
}

/// Per-bar derived indicator values. Any field may be null when there isn't enough
/// history to compute it; callers must not treat a null as zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub timestamp: DateTime<Utc>,
    pub ema_20: Option<f64>,
    pub ema_50: Option<f64>,
    pub atr_20: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub bb_width: Option<f64>,
    pub bb_width_percentile: Option<f64>,
    pub volume_sma_20: Option<f64>,
    pub distance_from_52w_high: Option<f64>,
    pub distance_from_52w_low: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Call,
    Put,
}

/// One options contract snapshot observed during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsContract {
    pub ticker: String,
    pub option_symbol: String,
    pub strike: f64,
    pub expiry: NaiveDate,
    pub option_type: OptionType,
    pub volume: i64,
    pub open_interest: i64,
    pub last_price: f64,
    pub implied_volatility: Option<f64>,
    pub days_to_expiry: i32,
    pub aggressive_order_pct: Option<f64>,
    pub premium_flow: Option<f64>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Squeeze,
    PennyExplosion,
    UnusualOptions,
    RedditOpportunity,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Squeeze => "squeeze",
            Strategy::PennyExplosion => "penny_explosion",
            Strategy::UnusualOptions => "unusual_options",
            Strategy::RedditOpportunity => "reddit_opportunity",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "squeeze" => Some(Strategy::Squeeze),
            "penny_explosion" => Some(Strategy::PennyExplosion),
            "unusual_options" => Some(Strategy::UnusualOptions),
            "reddit_opportunity" => Some(Strategy::RedditOpportunity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    New,
    Continuing,
    Ended,
    Expired,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::New => "new",
            SignalStatus::Continuing => "continuing",
            SignalStatus::Ended => "ended",
            SignalStatus::Expired => "expired",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "new" => Some(SignalStatus::New),
            "continuing" => Some(SignalStatus::Continuing),
            "ended" => Some(SignalStatus::Ended),
            "expired" => Some(SignalStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    S,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Grade boundaries per overall_score: S>=0.90, A>=0.80, B>=0.70, C>=0.60, D>=0.50, else F.
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 0.90 => Grade::S,
            s if s >= 0.80 => Grade::A,
            s if s >= 0.70 => Grade::B,
            s if s >= 0.60 => Grade::C,
            s if s >= 0.50 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::S => "S",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "S" => Some(Grade::S),
            "A" => Some(Grade::A),
            "B" => Some(Grade::B),
            "C" => Some(Grade::C),
            "D" => Some(Grade::D),
            "F" => Some(Grade::F),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Watch,
    Hold,
    Skip,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "strong_buy",
            Recommendation::Buy => "buy",
            Recommendation::Watch => "watch",
            Recommendation::Hold => "hold",
            Recommendation::Skip => "skip",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "strong_buy" => Some(Recommendation::StrongBuy),
            "buy" => Some(Recommendation::Buy),
            "watch" => Some(Recommendation::Watch),
            "hold" => Some(Recommendation::Hold),
            "skip" => Some(Recommendation::Skip),
            _ => None,
        }
    }
}

/// Strategy-specific payload, tagged by `Strategy` and persisted as the
/// `strategy_payload` JSON column alongside the discriminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyPayload {
    Squeeze {
        squeeze_depth: f64,
        days_in_squeeze: i32,
        breakout_proximity_pct: f64,
    },
    PennyExplosion {
        volume_ratio: f64,
        price_change_5d: f64,
        price_change_10d: f64,
        price_change_20d: f64,
    },
    UnusualOptions {
        option_symbol: String,
        option_type: OptionType,
        strike: f64,
        expiry: NaiveDate,
        days_to_expiry: i32,
        volume: i64,
        premium_flow: f64,
        suspicion_score: f64,
        is_likely_spread: bool,
        spread_type: Option<String>,
        matched_leg_symbols: Vec<String>,
        spread_strike_width: Option<f64>,
        spread_net_premium: Option<f64>,
    },
    RedditOpportunity {
        mention_count: i64,
        sentiment_polarity: f64,
        quality_filtered_mentions: i64,
    },
}

/// Component scores feeding the composite `overall_score`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ComponentScores {
    pub volume: Option<f64>,
    pub momentum: Option<f64>,
    pub relative_strength: Option<f64>,
    pub risk_liquidity: Option<f64>,
    pub fundamental: Option<f64>,
}

/// The central entity: one row per logical setup per scan day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    pub symbol: String,
    pub strategy: Strategy,
    pub scan_date: NaiveDate,
    pub scan_timestamp: DateTime<Utc>,

    pub signal_status: SignalStatus,
    pub days_active: i32,
    pub first_detected_date: NaiveDate,
    pub last_active_date: NaiveDate,
    pub is_active: bool,

    pub close_price: Decimal,
    pub component_scores: ComponentScores,
    pub overall_score: f64,
    pub grade: Grade,
    pub recommendation: Recommendation,
    pub payload: StrategyPayload,

    pub stop_loss_level: Option<Decimal>,
    pub position_size_pct: Option<f64>,
    pub pump_dump_warning: bool,
    pub high_risk_country: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    ProfitTarget,
    SignalEnded,
    Expired,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::ProfitTarget => "profit_target",
            ExitReason::SignalEnded => "signal_ended",
            ExitReason::Expired => "expired",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "stop_loss" => Some(ExitReason::StopLoss),
            "profit_target" => Some(ExitReason::ProfitTarget),
            "signal_ended" => Some(ExitReason::SignalEnded),
            "expired" => Some(ExitReason::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceStatus {
    Active,
    Closed,
}

impl PerformanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceStatus::Active => "active",
            PerformanceStatus::Closed => "closed",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PerformanceStatus::Active),
            "closed" => Some(PerformanceStatus::Closed),
            _ => None,
        }
    }
}

/// Paper-trading target levels, scaled per signal grade/volume characteristics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TargetLevels {
    pub t1: Decimal,
    pub t2: Decimal,
    pub t3: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetsHit {
    pub t1: bool,
    pub t2: bool,
    pub t3: bool,
}

/// One row per closed/active paper trade, keyed by `signal_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub id: Option<i64>,
    pub signal_id: String,
    pub symbol: String,
    pub entry_date: NaiveDate,
    pub entry_price: Decimal,
    pub exit_date: Option<NaiveDate>,
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    pub status: PerformanceStatus,
    pub return_pct: Option<f64>,
    pub days_held: Option<i64>,
    pub is_winner: Option<bool>,
    pub stop_loss_price: Option<Decimal>,
    pub target_prices: TargetLevels,
    pub targets_hit: TargetsHit,
    pub max_price_reached: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTier {
    TierA,
    TierB,
    TierC,
}

impl AlertTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertTier::TierA => "tier_a",
            AlertTier::TierB => "tier_b",
            AlertTier::TierC => "tier_c",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "tier_a" => Some(AlertTier::TierA),
            "tier_b" => Some(AlertTier::TierB),
            "tier_c" => Some(AlertTier::TierC),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Option<i64>,
    pub signal_id: String,
    pub alert_tier: AlertTier,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
}

/// A detector's raw output before continuity join and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSignal {
    pub symbol: String,
    pub strategy: Strategy,
    pub close_price: Decimal,
    pub component_scores: ComponentScores,
    pub payload: StrategyPayload,
    pub stop_loss_level: Option<Decimal>,
    pub position_size_pct: Option<f64>,
}
