/// ema.rs — Exponential moving average (C5)
///
/// Seeds with the SMA of the first `period` closes (earliest first), then
/// recursively applies `ema_t = close_t * alpha + ema_{t-1} * (1 - alpha)`
/// with `alpha = 2 / (period + 1)`. If fewer than `period` bars exist,
/// returns the SMA of whatever is available instead of failing.
use crate::error::{EngineError, ErrorCode, Result};
use crate::indicators::{fetch_available, require, ConfiguredIndicator, Indicator, IndicatorContext, IndicatorType, Param};
use crate::types::{Bar, Signal, Time};

pub struct Ema;

impl Indicator for Ema {
    fn name(&self) -> IndicatorType {
        IndicatorType::Ema
    }

    fn config(&self, params: &[Param]) -> Result<Box<dyn ConfiguredIndicator>> {
        let period = require(params, 0, "period")?.as_usize()?;
        if period == 0 {
            return Err(EngineError::InvalidPeriod {
                code: ErrorCode::InvalidPeriod,
                message: "period must be > 0".into(),
            });
        }
        Ok(Box::new(ConfiguredEma { period }))
    }
}

pub(crate) struct ConfiguredEma {
    pub(crate) period: usize,
}

impl ConfiguredEma {
    pub(crate) fn compute(&self, symbol: &str, time: Time, ctx: &IndicatorContext, period: usize) -> Result<f64> {
        let history = fetch_available(ctx, symbol, time)?;
        let n = history.len();
        if n <= period {
            return Ok(history.iter().map(|b| b.close).sum::<f64>() / n as f64);
        }
        let alpha = 2.0 / (period as f64 + 1.0);
        let seed = history[..period].iter().map(|b| b.close).sum::<f64>() / period as f64;
        let mut ema = seed;
        for bar in &history[period..n] {
            ema = bar.close * alpha + ema * (1.0 - alpha);
        }
        Ok(ema)
    }
}

impl ConfiguredIndicator for ConfiguredEma {
    fn get_signal(&self, bar: &Bar, _ctx: &IndicatorContext) -> Result<Signal> {
        Ok(Signal::no_action(bar.time, "ema", &bar.symbol))
    }

    fn raw_value(&self, symbol: &str, time: Time, ctx: &IndicatorContext, overrides: &[Param]) -> Result<f64> {
        let period = match overrides.first() {
            Some(p) => p.as_usize()?,
            None => self.period,
        };
        self.compute(symbol, time, ctx, period)
    }
}
