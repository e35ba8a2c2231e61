/// types.rs — Core domain types (C13)
///
/// `Time` is nanoseconds since the Unix epoch (UTC). Using an integer
/// rather than `chrono::DateTime` keeps bar comparisons and per-bar cache
/// keys (`(symbol, end_nanos, n)`) cheap and `Copy`.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Time = i64;

pub fn time_to_datetime(t: Time) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(t)
}

pub fn datetime_to_time(dt: DateTime<Utc>) -> Time {
    dt.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// One OHLCV observation for a symbol at a discrete time.
///
/// Bars for a symbol are totally ordered by `time`; duplicates at the same
/// `time` overwrite. `high >= max(open, close, low)` and
/// `low <= min(open, close, high)` should hold but are not enforced here —
/// that is data-validation's responsibility, not the core's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub time: Time,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        symbol: impl Into<String>,
        time: Time,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self { symbol: symbol.into(), time, open, high, low, close, volume }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionType {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reason {
    pub code: String,
    pub message: String,
}

impl Reason {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// An opaque, unique order identifier assigned by the accounting engine
/// upon intake (C7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An order submitted by a strategy. Orders are append-only once intake
/// has assigned an `order_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Option<OrderId>,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub timestamp: Time,
    pub position_type: PositionType,
    pub reason: Reason,
    pub strategy_name: String,
    pub status: OrderStatus,
    pub is_completed: bool,
    pub fee: Decimal,
}

impl Order {
    /// Basic shape validation, independent of any existing position state.
    /// `quantity` and `price` must be strictly positive and `fee` may not
    /// be negative.
    pub fn validate(&self) -> Result<(), crate::error::EngineError> {
        use crate::error::{EngineError, ErrorCode};
        if self.quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder {
                code: ErrorCode::InvalidOrder,
                message: format!("quantity must be > 0, got {}", self.quantity),
            });
        }
        if self.price <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder {
                code: ErrorCode::InvalidOrder,
                message: format!("price must be > 0, got {}", self.price),
            });
        }
        if self.fee < Decimal::ZERO {
            return Err(EngineError::InvalidOrder {
                code: ErrorCode::InvalidOrder,
                message: format!("fee must be >= 0, got {}", self.fee),
            });
        }
        Ok(())
    }
}

/// One fill; one trade per order in the current (bar-close) model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub order: Order,
    pub executed_at: Time,
    pub executed_qty: Decimal,
    pub executed_price: Decimal,
    pub fee: Decimal,
    pub pnl: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    BuyLong,
    SellLong,
    BuyShort,
    SellShort,
    Close,
    NoAction,
    Wait,
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub time: Time,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub indicator: String,
    pub symbol: String,
    pub reason: String,
    pub raw_value: HashMap<String, f64>,
}

impl Signal {
    pub fn no_action(time: Time, indicator: &str, symbol: &str) -> Self {
        Self {
            time,
            signal_type: SignalType::NoAction,
            indicator: indicator.to_owned(),
            symbol: symbol.to_owned(),
            reason: String::new(),
            raw_value: HashMap::new(),
        }
    }
}

/// A display annotation referencing a bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mark {
    pub market_data_id: String,
    pub shape: String,
    pub color: String,
    pub level: f64,
    pub title: String,
    pub message: String,
    pub category: String,
    pub signal: Option<Signal>,
}

/// An opaque, unique run identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub run_name: String,
    pub session_start: DateTime<Utc>,
    pub current_date: String,
    pub current_run_path: std::path::PathBuf,
}
