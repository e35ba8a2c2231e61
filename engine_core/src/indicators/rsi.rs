/// rsi.rs — Relative Strength Index, Wilder's smoothing (C5)
///
/// Takes a single typed `RsiConfig { period, lower, upper }` rather than
/// accepting `lower`/`upper` as independent optional positions — the
/// teacher's original models had two incompatible ways to pass these
/// (by struct vs. by loose trailing args); this crate keeps exactly one.
/// The thresholds are set as a unit: either both are given or neither is,
/// never a lone `lower` with a defaulted `upper`.
///
/// Computes gains/losses over the full available close series, seeds
/// average gain/loss over the first `period` differences, then applies
/// `avg_t = (avg_{t-1} * (period - 1) + x_t) / period` through the rest of
/// the series. `rsi = 100 - 100 / (1 + avg_gain / avg_loss)`;
/// `avg_loss == 0` is treated as maximally overbought (`rsi = 100`).
use crate::error::{EngineError, ErrorCode, Result};
use crate::indicators::{fetch_available, require, ConfiguredIndicator, Indicator, IndicatorContext, IndicatorType, Param};
use crate::types::{Bar, Signal, SignalType, Time};

#[derive(Debug, Clone, Copy)]
pub struct RsiConfig {
    pub period: usize,
    pub lower: f64,
    pub upper: f64,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self { period: 14, lower: 30.0, upper: 70.0 }
    }
}

pub struct Rsi;

impl Indicator for Rsi {
    fn name(&self) -> IndicatorType {
        IndicatorType::Rsi
    }

    /// `params[0]` is the period. `lower`/`upper` are set together as a
    /// unit: omit both to take the defaults, or supply both at
    /// `params[1]`/`params[2]`. A lone `lower` with no `upper` is rejected
    /// rather than silently defaulting the missing side.
    fn config(&self, params: &[Param]) -> Result<Box<dyn ConfiguredIndicator>> {
        let period = require(params, 0, "period")?.as_usize()?;
        if period == 0 {
            return Err(EngineError::InvalidPeriod {
                code: ErrorCode::InvalidPeriod,
                message: "period must be > 0".into(),
            });
        }
        let (lower, upper) = if params.len() <= 1 {
            (RsiConfig::default().lower, RsiConfig::default().upper)
        } else {
            (require(params, 1, "lower")?.as_f64()?, require(params, 2, "upper")?.as_f64()?)
        };
        if !(0.0..=100.0).contains(&lower) || !(0.0..=100.0).contains(&upper) || lower >= upper {
            return Err(EngineError::InvalidParameter {
                code: ErrorCode::InvalidParameter,
                message: format!("invalid rsi thresholds lower={lower} upper={upper}"),
            });
        }
        Ok(Box::new(ConfiguredRsi { config: RsiConfig { period, lower, upper } }))
    }
}

struct ConfiguredRsi {
    config: RsiConfig,
}

impl ConfiguredRsi {
    fn compute(&self, symbol: &str, time: Time, ctx: &IndicatorContext, period: usize) -> Result<f64> {
        let history = fetch_available(ctx, symbol, time)?;
        if history.len() < period + 1 {
            return Err(EngineError::insufficient_data(period + 1, history.len(), symbol));
        }
        let diffs: Vec<f64> = history.windows(2).map(|w| w[1].close - w[0].close).collect();
        let (seed_gains, seed_losses): (Vec<f64>, Vec<f64>) = diffs[..period]
            .iter()
            .map(|d| (d.max(0.0), (-d).max(0.0)))
            .unzip();
        let mut avg_gain = seed_gains.iter().sum::<f64>() / period as f64;
        let mut avg_loss = seed_losses.iter().sum::<f64>() / period as f64;

        for d in &diffs[period..] {
            let gain = d.max(0.0);
            let loss = (-d).max(0.0);
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }

        if avg_loss == 0.0 {
            return Ok(100.0);
        }
        let rs = avg_gain / avg_loss;
        Ok(100.0 - 100.0 / (1.0 + rs))
    }
}

impl ConfiguredIndicator for ConfiguredRsi {
    fn get_signal(&self, bar: &Bar, ctx: &IndicatorContext) -> Result<Signal> {
        let rsi = self.compute(&bar.symbol, bar.time, ctx, self.config.period)?;
        let signal_type = if rsi < self.config.lower {
            SignalType::BuyLong
        } else if rsi > self.config.upper {
            SignalType::SellShort
        } else {
            SignalType::NoAction
        };
        let mut raw_value = std::collections::HashMap::new();
        raw_value.insert("rsi".to_owned(), rsi);
        Ok(Signal {
            time: bar.time,
            signal_type,
            indicator: "rsi".to_owned(),
            symbol: bar.symbol.clone(),
            reason: format!("rsi={rsi:.2}"),
            raw_value,
        })
    }

    fn raw_value(&self, symbol: &str, time: Time, ctx: &IndicatorContext, overrides: &[Param]) -> Result<f64> {
        let period = match overrides.first() {
            Some(p) => p.as_usize()?,
            None => self.config.period,
        };
        self.compute(symbol, time, ctx, period)
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
    fn all_gains_saturates_to_100() {
        let store = Arc::new(InMemoryStore::from_bars(
            (0..20).map(|t| bar(t, 100.0 + t as f64)),
        ));
        let ds = DataSource::new(store, CacheLayer::Sliding(Arc::new(SlidingWindowCache::new(32))));
        let registry = IndicatorRegistry::new();
        let cache = ResultCache::new();
        let ctx = IndicatorContext { data_source: &ds, registry: &registry, cache: &cache };

        let rsi = Rsi.config(&[Param::Int(14)]).unwrap();
        let v = rsi.raw_value("BTCUSDT", 19, &ctx, &[]).unwrap();
        assert!((v - 100.0).abs() < 1e-9);
    }

    #[test]
    fn signal_thresholds() {
        let store = Arc::new(InMemoryStore::from_bars(
            (0..20).map(|t| bar(t, 100.0 + t as f64)),
        ));
        let ds = DataSource::new(store, CacheLayer::Sliding(Arc::new(SlidingWindowCache::new(32))));
        let registry = IndicatorRegistry::new();
        let cache = ResultCache::new();
        let ctx = IndicatorContext { data_source: &ds, registry: &registry, cache: &cache };

        let rsi = Rsi.config(&[Param::Int(14)]).unwrap();
        let signal = rsi.get_signal(&bar(19, 119.0), &ctx).unwrap();
        assert_eq!(signal.signal_type, SignalType::SellShort);
    }

    #[test]
    fn invalid_thresholds_rejected() {
        assert!(Rsi.config(&[Param::Int(14), Param::Float(80.0), Param::Float(20.0)]).is_err());
    }

    #[test]
    fn partial_threshold_override_rejected() {
        // lower given without upper must fail rather than silently default upper.
        assert!(Rsi.config(&[Param::Int(14), Param::Float(25.0)]).is_err());
    }

    #[test]
    fn both_thresholds_together_is_accepted() {
        assert!(Rsi.config(&[Param::Int(14), Param::Float(25.0), Param::Float(75.0)]).is_ok());
    }

    #[test]
    fn insufficient_history_errors() {
        let store = Arc::new(InMemoryStore::from_bars((0..5).map(|t| bar(t, 100.0))));
        let ds = DataSource::new(store, CacheLayer::Sliding(Arc::new(SlidingWindowCache::new(10))));
        let registry = IndicatorRegistry::new();
        let cache = ResultCache::new();
        let ctx = IndicatorContext { data_source: &ds, registry: &registry, cache: &cache };

        let rsi = Rsi.config(&[Param::Int(14)]).unwrap();
        let err = rsi.raw_value("BTCUSDT", 4, &ctx, &[]).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));
    }
}
