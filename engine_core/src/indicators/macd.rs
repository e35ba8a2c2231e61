/// macd.rs — Moving Average Convergence/Divergence (C5)
///
/// `macd = ema(fast) - ema(slow)`, computed by looking the EMA indicator
/// up through the registry rather than duplicating its recurrence. Needs
/// at least `slow` historical bars; fewer propagates `InsufficientData`.
use crate::error::{EngineError, ErrorCode, Result};
use crate::indicators::{require, ConfiguredIndicator, Indicator, IndicatorContext, IndicatorType, Param};
use crate::types::{Bar, Signal, SignalType, Time};

pub struct Macd;

impl Indicator for Macd {
    fn name(&self) -> IndicatorType {
        IndicatorType::Macd
    }

    fn config(&self, params: &[Param]) -> Result<Box<dyn ConfiguredIndicator>> {
        let fast = require(params, 0, "fast")?.as_usize()?;
        let slow = require(params, 1, "slow")?.as_usize()?;
        let signal_period = require(params, 2, "signal_period")?.as_usize()?;
        if fast == 0 || slow == 0 || signal_period == 0 {
            return Err(EngineError::InvalidPeriod {
                code: ErrorCode::InvalidPeriod,
                message: "fast, slow and signal_period must all be > 0".into(),
            });
        }
        if fast >= slow {
            return Err(EngineError::InvalidParameter {
                code: ErrorCode::InvalidParameter,
                message: format!("fast period {fast} must be < slow period {slow}"),
            });
        }
        Ok(Box::new(ConfiguredMacd { fast, slow, signal_period }))
    }
}

struct ConfiguredMacd {
    fast: usize,
    slow: usize,
    signal_period: usize,
}

impl ConfiguredMacd {
    fn compute(&self, symbol: &str, time: Time, ctx: &IndicatorContext, fast: usize, slow: usize) -> Result<f64> {
        let history = crate::indicators::fetch_available(ctx, symbol, time)?;
        if history.len() < slow {
            return Err(EngineError::insufficient_data(slow, history.len(), symbol));
        }
        let ema = ctx.registry.get(IndicatorType::Ema)?;
        let fast_ema = ema
            .config(&[Param::Int(fast as i64)])?
            .raw_value(symbol, time, ctx, &[])?;
        let slow_ema = ema
            .config(&[Param::Int(slow as i64)])?
            .raw_value(symbol, time, ctx, &[])?;
        Ok(fast_ema - slow_ema)
    }
}

impl ConfiguredIndicator for ConfiguredMacd {
    fn get_signal(&self, bar: &Bar, ctx: &IndicatorContext) -> Result<Signal> {
        let macd = self.compute(&bar.symbol, bar.time, ctx, self.fast, self.slow)?;
        let signal_type = if macd > 0.0 {
            SignalType::BuyLong
        } else if macd < 0.0 {
            SignalType::SellShort
        } else {
            SignalType::NoAction
        };
        let mut raw_value = std::collections::HashMap::new();
        raw_value.insert("macd".to_owned(), macd);
        Ok(Signal {
            time: bar.time,
            signal_type,
            indicator: "macd".to_owned(),
            symbol: bar.symbol.clone(),
            reason: format!("macd={macd:.4}"),
            raw_value,
        })
    }

    fn raw_value(&self, symbol: &str, time: Time, ctx: &IndicatorContext, overrides: &[Param]) -> Result<f64> {
        let (fast, slow) = match (overrides.first(), overrides.get(1)) {
            (Some(f), Some(s)) => (f.as_usize()?, s.as_usize()?),
            _ => (self.fast, self.slow),
        };
        let _ = self.signal_period;
        self.compute(symbol, time, ctx, fast, slow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SlidingWindowCache;
    use crate::datasource::{CacheLayer, DataSource};
    use crate::indicators::IndicatorRegistry;
    use crate::result_cache::ResultCache;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    fn bar(t: Time, close: f64) -> Bar {
        Bar::new("BTCUSDT", t, close, close, close, close, 1.0)
    }

    #[test]
    fn uptrend_is_positive_macd() {
        let store = Arc::new(InMemoryStore::from_bars(
            (0..40).map(|t| bar(t, 100.0 + t as f64)),
        ));
        let ds = DataSource::new(store, CacheLayer::Sliding(Arc::new(SlidingWindowCache::new(64))));
        let registry = IndicatorRegistry::with_defaults();
        let cache = ResultCache::new();
        let ctx = IndicatorContext { data_source: &ds, registry: &registry, cache: &cache };

        let macd = Macd.config(&[Param::Int(12), Param::Int(26), Param::Int(9)]).unwrap();
        let signal = macd.get_signal(&bar(39, 139.0), &ctx).unwrap();
        assert_eq!(signal.signal_type, SignalType::BuyLong);
    }

    #[test]
    fn fast_must_be_less_than_slow() {
        assert!(Macd.config(&[Param::Int(26), Param::Int(12), Param::Int(9)]).is_err());
    }

    #[test]
    fn insufficient_history_propagates() {
        let store = Arc::new(InMemoryStore::from_bars((0..5).map(|t| bar(t, 100.0))));
        let ds = DataSource::new(store, CacheLayer::Sliding(Arc::new(SlidingWindowCache::new(64))));
        let registry = IndicatorRegistry::with_defaults();
        let cache = ResultCache::new();
        let ctx = IndicatorContext { data_source: &ds, registry: &registry, cache: &cache };

        let macd = Macd.config(&[Param::Int(12), Param::Int(26), Param::Int(9)]).unwrap();
        let err = macd.raw_value("BTCUSDT", 4, &ctx, &[]).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));
    }
}
