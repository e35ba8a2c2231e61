/// ma.rs — Simple moving average (C5)
///
/// Reference indicator: averages the last `period` closes. `get_signal`
/// always emits `NoAction` — MA exists for other indicators and strategies
/// to query, not to drive decisions on its own.
use crate::error::{EngineError, ErrorCode, Result};
use crate::indicators::{require, ConfiguredIndicator, Indicator, IndicatorContext, IndicatorType, Param};
use crate::types::{Bar, Signal, Time};

pub struct Ma;

impl Indicator for Ma {
    fn name(&self) -> IndicatorType {
        IndicatorType::Ma
    }

    fn config(&self, params: &[Param]) -> Result<Box<dyn ConfiguredIndicator>> {
        let period = require(params, 0, "period")?.as_usize()?;
        if period == 0 {
            return Err(EngineError::InvalidPeriod {
                code: ErrorCode::InvalidPeriod,
                message: "period must be > 0".into(),
            });
        }
        Ok(Box::new(ConfiguredMa { period }))
    }
}

struct ConfiguredMa {
    period: usize,
}

impl ConfiguredMa {
    fn average(&self, symbol: &str, time: Time, ctx: &IndicatorContext, period: usize) -> Result<f64> {
        let bars = ctx.cache.previous_n_or_compute(symbol, time, period, || {
            ctx.data_source.previous_n(time, symbol, period)
        })?;
        Ok(bars.iter().map(|b| b.close).sum::<f64>() / period as f64)
    }
}

impl ConfiguredIndicator for ConfiguredMa {
    fn get_signal(&self, bar: &Bar, _ctx: &IndicatorContext) -> Result<Signal> {
        Ok(Signal::no_action(bar.time, "ma", &bar.symbol))
    }

    fn raw_value(&self, symbol: &str, time: Time, ctx: &IndicatorContext, overrides: &[Param]) -> Result<f64> {
        let period = match overrides.first() {
            Some(p) => p.as_usize()?,
            None => self.period,
        };
        self.average(symbol, time, ctx, period)
    }
}
