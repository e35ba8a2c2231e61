/// waddah_attar.rs — Waddah Attar Explosion (C5)
///
/// Composes two registered indicators rather than reimplementing their
/// math: `trend = macd(fast, slow, signal_period) * multiplier`,
/// `explosion = atr(atr_period) * multiplier`. Signals only fire while
/// the explosion term is positive.
use crate::error::{EngineError, ErrorCode, Result};
use crate::indicators::{require, ConfiguredIndicator, Indicator, IndicatorContext, IndicatorType, Param};
use crate::types::{Bar, Signal, SignalType, Time};

pub struct WaddahAttar;

impl Indicator for WaddahAttar {
    fn name(&self) -> IndicatorType {
        IndicatorType::WaddahAttar
    }

    fn config(&self, params: &[Param]) -> Result<Box<dyn ConfiguredIndicator>> {
        let fast = require(params, 0, "fast")?.as_usize()?;
        let slow = require(params, 1, "slow")?.as_usize()?;
        let signal_period = require(params, 2, "signal_period")?.as_usize()?;
        let atr_period = require(params, 3, "atr_period")?.as_usize()?;
        let multiplier = require(params, 4, "multiplier")?.as_f64()?;
        if fast == 0 || slow == 0 || signal_period == 0 || atr_period == 0 {
            return Err(EngineError::InvalidPeriod {
                code: ErrorCode::InvalidPeriod,
                message: "all periods must be > 0".into(),
            });
        }
        if fast >= slow {
            return Err(EngineError::InvalidParameter {
                code: ErrorCode::InvalidParameter,
                message: format!("fast period {fast} must be < slow period {slow}"),
            });
        }
        if multiplier <= 0.0 {
            return Err(EngineError::InvalidParameter {
                code: ErrorCode::InvalidParameter,
                message: format!("multiplier must be > 0, got {multiplier}"),
            });
        }
        Ok(Box::new(ConfiguredWaddahAttar { fast, slow, signal_period, atr_period, multiplier }))
    }
}

struct ConfiguredWaddahAttar {
    fast: usize,
    slow: usize,
    signal_period: usize,
    atr_period: usize,
    multiplier: f64,
}

struct Reading {
    trend: f64,
    explosion: f64,
}

impl ConfiguredWaddahAttar {
    fn read(&self, symbol: &str, time: Time, ctx: &IndicatorContext) -> Result<Reading> {
        let macd = ctx.registry.get(IndicatorType::Macd)?;
        let macd_value = macd
            .config(&[Param::Int(self.fast as i64), Param::Int(self.slow as i64), Param::Int(self.signal_period as i64)])?
            .raw_value(symbol, time, ctx, &[])?;
        let atr = ctx.registry.get(IndicatorType::Atr)?;
        let atr_value = atr
            .config(&[Param::Int(self.atr_period as i64)])?
            .raw_value(symbol, time, ctx, &[])?;
        Ok(Reading { trend: macd_value * self.multiplier, explosion: atr_value * self.multiplier })
    }
}

impl ConfiguredIndicator for ConfiguredWaddahAttar {
    fn get_signal(&self, bar: &Bar, ctx: &IndicatorContext) -> Result<Signal> {
        let reading = self.read(&bar.symbol, bar.time, ctx)?;
        let signal_type = if reading.explosion > 0.0 && reading.trend > 0.0 {
            SignalType::BuyLong
        } else if reading.explosion > 0.0 && reading.trend < 0.0 {
            SignalType::SellShort
        } else {
            SignalType::NoAction
        };
        let mut raw_value = std::collections::HashMap::new();
        raw_value.insert("trend".to_owned(), reading.trend);
        raw_value.insert("explosion".to_owned(), reading.explosion);
        Ok(Signal {
            time: bar.time,
            signal_type,
            indicator: "waddah_attar".to_owned(),
            symbol: bar.symbol.clone(),
            reason: format!("trend={:.4} explosion={:.4}", reading.trend, reading.explosion),
            raw_value,
        })
    }

    fn raw_value(&self, symbol: &str, time: Time, ctx: &IndicatorContext, _overrides: &[Param]) -> Result<f64> {
        Ok(self.read(symbol, time, ctx)?.trend)
    }
}
