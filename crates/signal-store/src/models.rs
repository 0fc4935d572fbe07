//! DB row shapes and their conversions to/from the public `signal-core` types.
//!
//! `sqlx::Any` has no native `Decimal` or enum encoding, so every monetary or
//! enum-typed column round-trips through `f64`/`String` here, the same split the
//! teacher's `risk-manager::models` uses for `ActiveRiskPositionRow`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use signal_core::money::decimal_from_f64;
use signal_core::{
    AlertRecord, AlertTier, ComponentScores, EngineError, EngineResult, ExitReason, Grade, PerformanceRecord, PerformanceStatus,
    Recommendation, Signal, SignalStatus, Strategy, StrategyPayload, TargetLevels, TargetsHit,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SignalRow {
    pub signal_id: String,
    pub symbol: String,
    pub strategy: String,
    pub scan_date: String,
    pub scan_timestamp: String,
    pub signal_status: String,
    pub days_active: i32,
    pub first_detected_date: String,
    pub last_active_date: String,
    pub is_active: bool,
    pub close_price: f64,
    pub component_scores: String,
    pub overall_score: f64,
    pub grade: String,
    pub recommendation: String,
    pub stop_loss_level: Option<f64>,
    pub position_size_pct: Option<f64>,
    pub pump_dump_warning: bool,
    pub high_risk_country: bool,
    pub strategy_payload: String,
    pub created_at: String,
    pub updated_at: String,
}

fn parse_date(s: &str, field: &str) -> EngineResult<NaiveDate> {
    s.parse::<NaiveDate>().map_err(|e| EngineError::Store(format!("bad {field} {s:?}: {e}")))
}

fn parse_timestamp(s: &str, field: &str) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Store(format!("bad {field} {s:?}: {e}")))
}

impl SignalRow {
    pub(crate) fn into_signal(self) -> EngineResult<Signal> {
        let strategy = Strategy::from_str_opt(&self.strategy).ok_or_else(|| EngineError::Store(format!("unknown strategy {:?}", self.strategy)))?;
        let signal_status =
            SignalStatus::from_str_opt(&self.signal_status).ok_or_else(|| EngineError::Store(format!("unknown signal_status {:?}", self.signal_status)))?;
        let grade = Grade::from_str_opt(&self.grade).ok_or_else(|| EngineError::Store(format!("unknown grade {:?}", self.grade)))?;
        let recommendation =
            Recommendation::from_str_opt(&self.recommendation).ok_or_else(|| EngineError::Store(format!("unknown recommendation {:?}", self.recommendation)))?;
        let component_scores: ComponentScores =
            serde_json::from_str(&self.component_scores).map_err(|e| EngineError::Store(format!("bad component_scores json: {e}")))?;
        let payload: StrategyPayload = serde_json::from_str(&self.strategy_payload).map_err(|e| EngineError::Store(format!("bad strategy_payload json: {e}")))?;

        Ok(Signal {
            signal_id: self.signal_id,
            symbol: self.symbol,
            strategy,
            scan_date: parse_date(&self.scan_date, "scan_date")?,
            scan_timestamp: parse_timestamp(&self.scan_timestamp, "scan_timestamp")?,
            signal_status,
            days_active: self.days_active,
            first_detected_date: parse_date(&self.first_detected_date, "first_detected_date")?,
            last_active_date: parse_date(&self.last_active_date, "last_active_date")?,
            is_active: self.is_active,
            close_price: decimal_from_f64(self.close_price),
            component_scores,
            overall_score: self.overall_score,
            grade,
            recommendation,
            payload,
            stop_loss_level: self.stop_loss_level.map(decimal_from_f64),
            position_size_pct: self.position_size_pct,
            pump_dump_warning: self.pump_dump_warning,
            high_risk_country: self.high_risk_country,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            updated_at: parse_timestamp(&self.updated_at, "updated_at")?,
        })
    }
}

fn decimal_to_f64(d: Decimal) -> f64 {
    signal_core::money::f64_from_decimal(d)
}

/// Bindable scalar form of a `Signal`, used both for insert and the `ON CONFLICT`
/// update clause. Keeping this as a plain tuple-returning helper (rather than a
/// `FromRow`-derived struct, which only makes sense for reads) avoids duplicating
/// every field name a second time in a struct nobody queries into.
pub(crate) struct SignalBindings {
    pub signal_id: String,
    pub symbol: String,
    pub strategy: &'static str,
    pub scan_date: String,
    pub scan_timestamp: String,
    pub signal_status: &'static str,
    pub days_active: i32,
    pub first_detected_date: String,
    pub last_active_date: String,
    pub is_active: bool,
    pub close_price: f64,
    pub component_scores: String,
    pub overall_score: f64,
    pub grade: &'static str,
    pub recommendation: &'static str,
    pub stop_loss_level: Option<f64>,
    pub position_size_pct: Option<f64>,
    pub pump_dump_warning: bool,
    pub high_risk_country: bool,
    pub strategy_payload: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<&Signal> for SignalBindings {
    type Error = EngineError;

    fn try_from(s: &Signal) -> EngineResult<Self> {
        Ok(Self {
            signal_id: s.signal_id.clone(),
            symbol: s.symbol.clone(),
            strategy: s.strategy.as_str(),
            scan_date: s.scan_date.to_string(),
            scan_timestamp: s.scan_timestamp.to_rfc3339(),
            signal_status: s.signal_status.as_str(),
            days_active: s.days_active,
            first_detected_date: s.first_detected_date.to_string(),
            last_active_date: s.last_active_date.to_string(),
            is_active: s.is_active,
            close_price: decimal_to_f64(s.close_price),
            component_scores: serde_json::to_string(&s.component_scores).map_err(|e| EngineError::Store(format!("serializing component_scores: {e}")))?,
            overall_score: s.overall_score,
            grade: s.grade.as_str(),
            recommendation: s.recommendation.as_str(),
            stop_loss_level: s.stop_loss_level.map(decimal_to_f64),
            position_size_pct: s.position_size_pct,
            pump_dump_warning: s.pump_dump_warning,
            high_risk_country: s.high_risk_country,
            strategy_payload: serde_json::to_string(&s.payload).map_err(|e| EngineError::Store(format!("serializing strategy_payload: {e}")))?,
            created_at: s.created_at.to_rfc3339(),
            updated_at: s.updated_at.to_rfc3339(),
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct PerformanceRow {
    pub id: i64,
    pub signal_id: String,
    pub symbol: String,
    pub entry_date: String,
    pub entry_price: f64,
    pub exit_date: Option<String>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<String>,
    pub status: String,
    pub return_pct: Option<f64>,
    pub days_held: Option<i64>,
    pub is_winner: Option<bool>,
    pub stop_loss_price: Option<f64>,
    pub target_prices: String,
    pub targets_hit: String,
    pub max_price_reached: Option<f64>,
}

impl PerformanceRow {
    pub(crate) fn into_record(self) -> EngineResult<PerformanceRecord> {
        let status = PerformanceStatus::from_str_opt(&self.status).ok_or_else(|| EngineError::Store(format!("unknown performance status {:?}", self.status)))?;
        let exit_reason = self
            .exit_reason
            .as_deref()
            .map(|s| ExitReason::from_str_opt(s).ok_or_else(|| EngineError::Store(format!("unknown exit_reason {s:?}"))))
            .transpose()?;
        let target_prices: TargetLevels = serde_json::from_str(&self.target_prices).map_err(|e| EngineError::Store(format!("bad target_prices json: {e}")))?;
        let targets_hit: TargetsHit = serde_json::from_str(&self.targets_hit).map_err(|e| EngineError::Store(format!("bad targets_hit json: {e}")))?;

        Ok(PerformanceRecord {
            id: Some(self.id),
            signal_id: self.signal_id,
            symbol: self.symbol,
            entry_date: parse_date(&self.entry_date, "entry_date")?,
            entry_price: decimal_from_f64(self.entry_price),
            exit_date: self.exit_date.as_deref().map(|s| parse_date(s, "exit_date")).transpose()?,
            exit_price: self.exit_price.map(decimal_from_f64),
            exit_reason,
            status,
            return_pct: self.return_pct,
            days_held: self.days_held,
            is_winner: self.is_winner,
            stop_loss_price: self.stop_loss_price.map(decimal_from_f64),
            target_prices,
            targets_hit,
            max_price_reached: self.max_price_reached.map(decimal_from_f64),
        })
    }
}

pub(crate) struct PerformanceBindings {
    pub signal_id: String,
    pub symbol: String,
    pub entry_date: String,
    pub entry_price: f64,
    pub exit_date: Option<String>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<&'static str>,
    pub status: &'static str,
    pub return_pct: Option<f64>,
    pub days_held: Option<i64>,
    pub is_winner: Option<bool>,
    pub stop_loss_price: Option<f64>,
    pub target_prices: String,
    pub targets_hit: String,
    pub max_price_reached: Option<f64>,
}

impl TryFrom<&PerformanceRecord> for PerformanceBindings {
    type Error = EngineError;

    fn try_from(r: &PerformanceRecord) -> EngineResult<Self> {
        Ok(Self {
            signal_id: r.signal_id.clone(),
            symbol: r.symbol.clone(),
            entry_date: r.entry_date.to_string(),
            entry_price: decimal_to_f64(r.entry_price),
            exit_date: r.exit_date.map(|d| d.to_string()),
            exit_price: r.exit_price.map(decimal_to_f64),
            exit_reason: r.exit_reason.map(|e| e.as_str()),
            status: r.status.as_str(),
            return_pct: r.return_pct,
            days_held: r.days_held,
            is_winner: r.is_winner,
            stop_loss_price: r.stop_loss_price.map(decimal_to_f64),
            target_prices: serde_json::to_string(&r.target_prices).map_err(|e| EngineError::Store(format!("serializing target_prices: {e}")))?,
            targets_hit: serde_json::to_string(&r.targets_hit).map_err(|e| EngineError::Store(format!("serializing targets_hit: {e}")))?,
            max_price_reached: r.max_price_reached.map(decimal_to_f64),
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct AlertRow {
    pub id: i64,
    pub signal_id: String,
    pub tier: String,
    pub payload: String,
    pub created_at: String,
    pub delivered: bool,
}

impl AlertRow {
    pub(crate) fn into_record(self) -> EngineResult<AlertRecord> {
        let alert_tier = AlertTier::from_str_opt(&self.tier).ok_or_else(|| EngineError::Store(format!("unknown alert tier {:?}", self.tier)))?;
        let payload: serde_json::Value = serde_json::from_str(&self.payload).map_err(|e| EngineError::Store(format!("bad alert payload json: {e}")))?;
        Ok(AlertRecord {
            id: Some(self.id),
            signal_id: self.signal_id,
            alert_tier,
            payload,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            delivered: self.delivered,
        })
    }
}
