/// range_filter.rs — Range Filter (C5)
///
/// Stateful trend filter. Because the per-bar cache is cleared at every
/// bar advance, "state" here is not carried incrementally between calls:
/// it is replayed in full from the available history on every call and
/// memoized only for the lifetime of the current bar, so repeated queries
/// within one bar are cheap and deterministic, and a fresh bar always gets
/// a from-scratch, order-independent recomputation.
use crate::error::{EngineError, ErrorCode, Result};
use crate::indicators::{fetch_available, require, ConfiguredIndicator, Indicator, IndicatorContext, IndicatorType, Param};
use crate::types::{Bar, Signal, SignalType, Time};

pub struct RangeFilter;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeFilterState {
    pub filt: f64,
    pub prev_source: f64,
    pub upward: u64,
    pub downward: u64,
}

impl Indicator for RangeFilter {
    fn name(&self) -> IndicatorType {
        IndicatorType::RangeFilter
    }

    fn config(&self, params: &[Param]) -> Result<Box<dyn ConfiguredIndicator>> {
        let period = require(params, 0, "period")?.as_usize()?;
        let multiplier = require(params, 1, "multiplier")?.as_f64()?;
        if period == 0 {
            return Err(EngineError::InvalidPeriod {
                code: ErrorCode::InvalidPeriod,
                message: "period must be > 0".into(),
            });
        }
        if multiplier <= 0.0 {
            return Err(EngineError::InvalidParameter {
                code: ErrorCode::InvalidParameter,
                message: format!("multiplier must be > 0, got {multiplier}"),
            });
        }
        Ok(Box::new(ConfiguredRangeFilter { period, multiplier }))
    }
}

/// Running EMA at every prefix of `values`, seeded with SMA once `period`
/// values are available (partial SMA before that, full recurrence after).
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = Vec::with_capacity(n);
    if n == 0 {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut running_sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        running_sum += v;
        if i + 1 < period {
            out.push(running_sum / (i + 1) as f64);
        } else if i + 1 == period {
            out.push(running_sum / period as f64);
        } else {
            let prev = out[i - 1];
            out.push(v * alpha + prev * (1.0 - alpha));
        }
    }
    out
}

struct ConfiguredRangeFilter {
    period: usize,
    multiplier: f64,
}

impl ConfiguredRangeFilter {
    fn replay(&self, symbol: &str, time: Time, ctx: &IndicatorContext) -> Result<RangeFilterState> {
        let key = format!("range_filter:{symbol}:{}:{}", self.period, self.multiplier.to_bits());
        if let Some(state) = ctx.cache.get_state::<RangeFilterState>(&key) {
            return Ok(state);
        }

        let history = fetch_available(ctx, symbol, time)?;
        if history.is_empty() {
            return Err(EngineError::insufficient_data(1, 0, symbol));
        }
        let closes: Vec<f64> = history.iter().map(|b| b.close).collect();
        let deltas: Vec<f64> = closes.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
        let ema_fast = ema_series(&deltas, self.period);
        let ema_slow = ema_series(&deltas, 2 * self.period - 1);

        let mut filt = closes[0];
        let mut prev_source = closes[0];
        let mut upward = 0u64;
        let mut downward = 0u64;

        for i in 1..closes.len() {
            let src = closes[i];
            let d_idx = i - 1;
            let smrng = deltas[d_idx] * (ema_fast[d_idx] * 0.4 + ema_slow[d_idx] * 0.6) * self.multiplier;
            let prev_filt = filt;
            filt = if src > prev_filt {
                prev_filt.max(src - smrng)
            } else {
                prev_filt.min(src + smrng)
            };
            if filt > prev_filt {
                upward += 1;
            } else {
                upward = 0;
            }
            if filt < prev_filt {
                downward += 1;
            } else {
                downward = 0;
            }
            prev_source = src;
        }

        let state = RangeFilterState { filt, prev_source, upward, downward };
        ctx.cache.put_state(key, state);
        Ok(state)
    }
}

impl ConfiguredIndicator for ConfiguredRangeFilter {
    fn get_signal(&self, bar: &Bar, ctx: &IndicatorContext) -> Result<Signal> {
        let state = self.replay(&bar.symbol, bar.time, ctx)?;
        let signal_type = if state.upward > 0 {
            SignalType::BuyLong
        } else if state.downward > 0 {
            SignalType::SellShort
        } else {
            SignalType::NoAction
        };
        let mut raw_value = std::collections::HashMap::new();
        raw_value.insert("filt".to_owned(), state.filt);
        raw_value.insert("upward".to_owned(), state.upward as f64);
        raw_value.insert("downward".to_owned(), state.downward as f64);
        Ok(Signal {
            time: bar.time,
            signal_type,
            indicator: "range_filter".to_owned(),
            symbol: bar.symbol.clone(),
            reason: format!("filt={:.4} up={} down={}", state.filt, state.upward, state.downward),
            raw_value,
        })
    }

    fn raw_value(&self, symbol: &str, time: Time, ctx: &IndicatorContext, _overrides: &[Param]) -> Result<f64> {
        Ok(self.replay(symbol, time, ctx)?.filt)
    }
}
