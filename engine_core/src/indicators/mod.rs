/// indicators/mod.rs — Indicator registry (C4) and indicator contract (C5)
///
/// Every indicator is a name-addressed, thread-safely registered
/// implementor of [`Indicator`]. A strategy (or another indicator, via the
/// registry handed through [`IndicatorContext`]) looks indicators up by
/// name, configures them with a heterogeneous positional parameter tuple,
/// and calls either `get_signal` (a decision) or `raw_value` (a scalar).
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod ma;
pub mod macd;
pub mod range_filter;
pub mod rsi;
pub mod waddah_attar;

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use crate::datasource::DataSource;
use crate::error::{EngineError, ErrorCode, Result};
use crate::result_cache::ResultCache;
use crate::types::{Bar, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ma,
    Ema,
    Rsi,
    Macd,
    Atr,
    Bollinger,
    RangeFilter,
    WaddahAttar,
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A positional, heterogeneous configuration parameter. Indicators accept
/// a slice of these and validate arity/type themselves.
#[derive(Debug, Clone)]
pub enum Param {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Param {
    pub fn as_usize(&self) -> Result<usize> {
        match self {
            Param::Int(v) if *v >= 0 => Ok(*v as usize),
            Param::Int(v) => Err(EngineError::InvalidPeriod {
                code: ErrorCode::InvalidPeriod,
                message: format!("period must be non-negative, got {v}"),
            }),
            other => Err(EngineError::InvalidType {
                code: ErrorCode::InvalidType,
                message: format!("expected integer period, got {other:?}"),
            }),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Param::Float(v) => Ok(*v),
            Param::Int(v) => Ok(*v as f64),
            other => Err(EngineError::InvalidType {
                code: ErrorCode::InvalidType,
                message: format!("expected numeric value, got {other:?}"),
            }),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Param::Str(s) => Ok(s.as_str()),
            other => Err(EngineError::InvalidType {
                code: ErrorCode::InvalidType,
                message: format!("expected string, got {other:?}"),
            }),
        }
    }
}

fn require_param<'a>(params: &'a [Param], idx: usize, name: &str) -> Result<&'a Param> {
    params.get(idx).ok_or_else(|| EngineError::MissingParameter {
        code: ErrorCode::MissingParameter,
        message: format!("missing parameter `{name}` at position {idx}"),
    })
}

/// The seam every indicator sees into the rest of the engine: historical
/// data, sibling indicators, and the per-bar memoization layer.
pub struct IndicatorContext<'a> {
    pub data_source: &'a DataSource,
    pub registry: &'a IndicatorRegistry,
    pub cache: &'a ResultCache,
}

pub trait Indicator: Send + Sync {
    fn name(&self) -> IndicatorType;
    fn config(&self, params: &[Param]) -> Result<Box<dyn ConfiguredIndicator>>;
}

/// An indicator instance bound to a concrete parameter set.
pub trait ConfiguredIndicator: Send + Sync {
    fn get_signal(&self, bar: &Bar, ctx: &IndicatorContext) -> Result<Signal>;
    fn raw_value(&self, symbol: &str, time: crate::types::Time, ctx: &IndicatorContext, overrides: &[Param]) -> Result<f64>;
}

/// Thread-safe name -> indicator dispatch map.
pub struct IndicatorRegistry {
    entries: RwLock<HashMap<IndicatorType, std::sync::Arc<dyn Indicator>>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Populate with the eight built-in indicators.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(std::sync::Arc::new(ma::Ma)).unwrap();
        registry.register(std::sync::Arc::new(ema::Ema)).unwrap();
        registry.register(std::sync::Arc::new(rsi::Rsi)).unwrap();
        registry.register(std::sync::Arc::new(macd::Macd)).unwrap();
        registry.register(std::sync::Arc::new(atr::Atr)).unwrap();
        registry.register(std::sync::Arc::new(bollinger::Bollinger)).unwrap();
        registry.register(std::sync::Arc::new(range_filter::RangeFilter)).unwrap();
        registry.register(std::sync::Arc::new(waddah_attar::WaddahAttar)).unwrap();
        registry
    }

    pub fn register(&self, ind: std::sync::Arc<dyn Indicator>) -> Result<()> {
        let mut guard = self.entries.write().expect("registry lock poisoned");
        if guard.contains_key(&ind.name()) {
            return Err(EngineError::IndicatorAlreadyRegistered {
                code: ErrorCode::IndicatorAlreadyRegistered,
                message: format!("{} is already registered", ind.name()),
            });
        }
        guard.insert(ind.name(), ind);
        Ok(())
    }

    pub fn get(&self, name: IndicatorType) -> Result<std::sync::Arc<dyn Indicator>> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(&name)
            .cloned()
            .ok_or_else(|| EngineError::IndicatorNotFound {
                code: ErrorCode::IndicatorNotFound,
                message: format!("{name} is not registered"),
            })
    }

    pub fn list(&self) -> Vec<IndicatorType> {
        self.entries.read().expect("registry lock poisoned").keys().copied().collect()
    }

    pub fn remove(&self, name: IndicatorType) -> Result<()> {
        self.entries
            .write()
            .expect("registry lock poisoned")
            .remove(&name)
            .map(|_| ())
            .ok_or_else(|| EngineError::IndicatorNotFound {
                code: ErrorCode::IndicatorNotFound,
                message: format!("{name} is not registered"),
            })
    }
}

impl Default for IndicatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) use require_param as require;

/// Fetch every bar available for `symbol` at or before `time`. The data
/// source only exposes a fixed-`n` `previous_n`, so this probes with an
/// effectively unbounded request and, on `InsufficientData`, retries with
/// the reported `actual` count — which is exactly what's available.
/// Recursive indicators (EMA, MACD, ATR, Waddah Attar) need the whole
/// series, not a fixed window, to replay their recurrence from a stable
/// seed.
pub(crate) fn fetch_available(
    ctx: &IndicatorContext,
    symbol: &str,
    time: crate::types::Time,
) -> Result<Vec<Bar>> {
    const PROBE: usize = usize::MAX / 2;
    match ctx.cache.previous_n_or_compute(symbol, time, PROBE, || {
        ctx.data_source.previous_n(time, symbol, PROBE)
    }) {
        Ok(bars) => Ok(bars),
        Err(EngineError::InsufficientData { actual, .. }) => {
            if actual == 0 {
                return Err(EngineError::insufficient_data(1, 0, symbol));
            }
            ctx.cache.previous_n_or_compute(symbol, time, actual, || {
                ctx.data_source.previous_n(time, symbol, actual)
            })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_duplicate_fails() {
        let registry = IndicatorRegistry::new();
        registry.register(std::sync::Arc::new(ma::Ma)).unwrap();
        let err = registry.register(std::sync::Arc::new(ma::Ma)).unwrap_err();
        assert!(matches!(err, EngineError::IndicatorAlreadyRegistered { .. }));
    }

    #[test]
    fn get_missing_fails() {
        let registry = IndicatorRegistry::new();
        let err = registry.get(IndicatorType::Rsi).unwrap_err();
        assert!(matches!(err, EngineError::IndicatorNotFound { .. }));
    }

    #[test]
    fn remove_then_get_fails() {
        let registry = IndicatorRegistry::new();
        registry.register(std::sync::Arc::new(ma::Ma)).unwrap();
        registry.remove(IndicatorType::Ma).unwrap();
        assert!(registry.get(IndicatorType::Ma).is_err());
    }

    #[test]
    fn with_defaults_lists_all_eight() {
        let registry = IndicatorRegistry::with_defaults();
        assert_eq!(registry.list().len(), 8);
    }
}
