/// bollinger.rs — Bollinger Bands (C5)
///
/// `middle` is the SMA(period) of closes drawn from the last `lookback`
/// bars; `upper`/`lower` are `middle +/- std_dev * sigma`, sigma the
/// population standard deviation over the same window. Signal: `BuyLong`
/// below the lower band, `SellLong` above the upper band, else
/// `NoAction`. Requires at least `period` bars.
use crate::error::{EngineError, ErrorCode, Result};
use crate::indicators::{require, ConfiguredIndicator, Indicator, IndicatorContext, IndicatorType, Param};
use crate::types::{Bar, Signal, SignalType, Time};

pub struct Bollinger;

#[derive(Debug, Clone, Copy)]
pub struct Bands {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

impl Indicator for Bollinger {
    fn name(&self) -> IndicatorType {
        IndicatorType::Bollinger
    }

    fn config(&self, params: &[Param]) -> Result<Box<dyn ConfiguredIndicator>> {
        let period = require(params, 0, "period")?.as_usize()?;
        let std_dev = require(params, 1, "std_dev")?.as_f64()?;
        let lookback = require(params, 2, "lookback")?.as_usize()?;
        if period == 0 {
            return Err(EngineError::InvalidPeriod {
                code: ErrorCode::InvalidPeriod,
                message: "period must be > 0".into(),
            });
        }
        if lookback < period {
            return Err(EngineError::InvalidParameter {
                code: ErrorCode::InvalidParameter,
                message: format!("lookback {lookback} must be >= period {period}"),
            });
        }
        if std_dev <= 0.0 {
            return Err(EngineError::InvalidParameter {
                code: ErrorCode::InvalidParameter,
                message: format!("std_dev must be > 0, got {std_dev}"),
            });
        }
        Ok(Box::new(ConfiguredBollinger { period, std_dev, lookback }))
    }
}

struct ConfiguredBollinger {
    period: usize,
    std_dev: f64,
    lookback: usize,
}

impl ConfiguredBollinger {
    fn bands(&self, symbol: &str, time: Time, ctx: &IndicatorContext) -> Result<Bands> {
        let fetched = ctx.cache.previous_n_or_compute(symbol, time, self.lookback, || {
            ctx.data_source.previous_n(time, symbol, self.lookback)
        })?;
        if fetched.len() < self.period {
            return Err(EngineError::insufficient_data(self.period, fetched.len(), symbol));
        }
        let window = &fetched[fetched.len() - self.period..];
        let closes: Vec<f64> = window.iter().map(|b| b.close).collect();
        let middle = closes.iter().sum::<f64>() / closes.len() as f64;
        let variance = closes.iter().map(|c| (c - middle).powi(2)).sum::<f64>() / closes.len() as f64;
        let sigma = variance.sqrt();
        Ok(Bands { middle, upper: middle + self.std_dev * sigma, lower: middle - self.std_dev * sigma })
    }
}

impl ConfiguredIndicator for ConfiguredBollinger {
    fn get_signal(&self, bar: &Bar, ctx: &IndicatorContext) -> Result<Signal> {
        let bands = self.bands(&bar.symbol, bar.time, ctx)?;
        let signal_type = if bar.close < bands.lower {
            SignalType::BuyLong
        } else if bar.close > bands.upper {
            SignalType::SellLong
        } else {
            SignalType::NoAction
        };
        let mut raw_value = std::collections::HashMap::new();
        raw_value.insert("middle".to_owned(), bands.middle);
        raw_value.insert("upper".to_owned(), bands.upper);
        raw_value.insert("lower".to_owned(), bands.lower);
        Ok(Signal {
            time: bar.time,
            signal_type,
            indicator: "bollinger".to_owned(),
            symbol: bar.symbol.clone(),
            reason: format!("close={:.4} band=[{:.4},{:.4}]", bar.close, bands.lower, bands.upper),
            raw_value,
        })
    }

    fn raw_value(&self, symbol: &str, time: Time, ctx: &IndicatorContext, _overrides: &[Param]) -> Result<f64> {
        Ok(self.bands(symbol, time, ctx)?.middle)
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
    fn flat_series_has_zero_width_bands() {
        let store = Arc::new(InMemoryStore::from_bars((0..20).map(|t| bar(t, 100.0))));
        let ds = DataSource::new(store, CacheLayer::Sliding(Arc::new(SlidingWindowCache::new(32))));
        let registry = IndicatorRegistry::new();
        let cache = ResultCache::new();
        let ctx = IndicatorContext { data_source: &ds, registry: &registry, cache: &cache };

        let bb = Bollinger.config(&[Param::Int(10), Param::Float(2.0), Param::Int(10)]).unwrap();
        let bands = bb.bands("BTCUSDT", 19, &ctx).unwrap();
        assert!((bands.upper - bands.lower).abs() < 1e-9);
        assert!((bands.middle - 100.0).abs() < 1e-9);
    }

    #[test]
    fn breakout_above_upper_signals_sell_long() {
        let mut bars: Vec<Bar> = (0..19).map(|t| bar(t, 100.0)).collect();
        bars.push(bar(19, 150.0));
        let store = Arc::new(InMemoryStore::from_bars(bars.clone()));
        let ds = DataSource::new(store, CacheLayer::Sliding(Arc::new(SlidingWindowCache::new(32))));
        let registry = IndicatorRegistry::new();
        let cache = ResultCache::new();
        let ctx = IndicatorContext { data_source: &ds, registry: &registry, cache: &cache };

        let bb = Bollinger.config(&[Param::Int(10), Param::Float(2.0), Param::Int(10)]).unwrap();
        let signal = bb.get_signal(bars.last().unwrap(), &ctx).unwrap();
        assert_eq!(signal.signal_type, SignalType::SellLong);
    }

    #[test]
    fn lookback_below_period_rejected() {
        assert!(Bollinger.config(&[Param::Int(20), Param::Float(2.0), Param::Int(10)]).is_err());
    }
}
