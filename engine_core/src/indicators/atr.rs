/// atr.rs — Average True Range (C5)
///
/// True range for bar `i` is `max(h-l, |h-c_{i-1}|, |l-c_{i-1}|)` (the
/// first bar in the series has no predecessor, so its TR is simply
/// `h-l`). The TR series is then smoothed with the same seed-then-recurse
/// EMA recurrence used by [`crate::indicators::ema`], applied here
/// directly over true ranges rather than closes. Always a volatility
/// read — `get_signal` is `NoAction`.
use crate::error::{EngineError, ErrorCode, Result};
use crate::indicators::{fetch_available, require, ConfiguredIndicator, Indicator, IndicatorContext, IndicatorType, Param};
use crate::types::{Bar, Signal, Time};

pub struct Atr;

impl Indicator for Atr {
    fn name(&self) -> IndicatorType {
        IndicatorType::Atr
    }

    fn config(&self, params: &[Param]) -> Result<Box<dyn ConfiguredIndicator>> {
        let period = require(params, 0, "period")?.as_usize()?;
        if period == 0 {
            return Err(EngineError::InvalidPeriod {
                code: ErrorCode::InvalidPeriod,
                message: "period must be > 0".into(),
            });
        }
        Ok(Box::new(ConfiguredAtr { period }))
    }
}

pub(crate) fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let range = bar.high - bar.low;
            if i == 0 {
                return range;
            }
            let prev_close = bars[i - 1].close;
            range.max((bar.high - prev_close).abs()).max((bar.low - prev_close).abs())
        })
        .collect()
}

/// Seed-then-recurse EMA over an arbitrary series (the same recurrence
/// [`crate::indicators::ema`] applies to closes).
pub(crate) fn smooth(series: &[f64], period: usize) -> f64 {
    let n = series.len();
    if n <= period {
        return series.iter().sum::<f64>() / n as f64;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = series[..period].iter().sum::<f64>() / period as f64;
    let mut value = seed;
    for x in &series[period..n] {
        value = x * alpha + value * (1.0 - alpha);
    }
    value
}

struct ConfiguredAtr {
    period: usize,
}

impl ConfiguredAtr {
    fn compute(&self, symbol: &str, time: Time, ctx: &IndicatorContext, period: usize) -> Result<f64> {
        let history = fetch_available(ctx, symbol, time)?;
        if history.is_empty() {
            return Err(EngineError::insufficient_data(period, 0, symbol));
        }
        let trs = true_ranges(&history);
        Ok(smooth(&trs, period))
    }
}

impl ConfiguredIndicator for ConfiguredAtr {
    fn get_signal(&self, bar: &Bar, _ctx: &IndicatorContext) -> Result<Signal> {
        Ok(Signal::no_action(bar.time, "atr", &bar.symbol))
    }

    fn raw_value(&self, symbol: &str, time: Time, ctx: &IndicatorContext, overrides: &[Param]) -> Result<f64> {
        let period = match overrides.first() {
            Some(p) => p.as_usize()?,
            None => self.period,
        };
        self.compute(symbol, time, ctx, period)
    }
}
