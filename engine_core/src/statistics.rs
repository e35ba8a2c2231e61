/// statistics.rs — Per-symbol trade statistics (C8)
///
/// Pure aggregation over [`crate::accounting::Accounting`]'s trade log
/// and derived [`crate::accounting::Position`] — this module holds no
/// state of its own.
use std::collections::VecDeque;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::accounting::Accounting;
use crate::types::{PositionType, Side, Time, Trade};

#[derive(Debug, Clone, PartialEq)]
pub struct HoldingTime {
    pub min_hours: f64,
    pub max_hours: f64,
    pub avg_hours: i64,
}

#[derive(Debug, Clone)]
pub struct SymbolStats {
    pub symbol: String,
    pub number_of_trades: usize,
    pub winning: usize,
    pub losing: usize,
    pub win_rate: Decimal,
    pub max_drawdown: Decimal,
    pub holding_time: Option<HoldingTime>,
    pub total_fees: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub maximum_loss: Decimal,
    pub maximum_profit: Decimal,
}

/// Computes statistics for `symbol` from `accounting`'s full trade log.
/// `last_close` is required to value unrealized P&L on an open long
/// position; pass `None` if unavailable (unrealized is then `0`).
pub fn compute_stats(accounting: &Accounting, symbol: &str, last_close: Option<Decimal>) -> SymbolStats {
    let trades: Vec<Trade> = accounting
        .get_all_trades()
        .into_iter()
        .filter(|t| t.order.symbol == symbol)
        .collect();

    let pnls: Vec<Decimal> = trades.iter().filter_map(|t| t.pnl).collect();
    let number_of_trades = pnls.len();
    let winning = pnls.iter().filter(|p| **p > Decimal::ZERO).count();
    let losing = pnls.iter().filter(|p| **p < Decimal::ZERO).count();
    let win_rate = if number_of_trades > 0 {
        Decimal::from(winning) / Decimal::from(number_of_trades)
    } else {
        Decimal::ZERO
    };
    let worst = pnls.iter().cloned().fold(Decimal::ZERO, |acc, p| acc.min(p));
    let best = pnls.iter().cloned().fold(Decimal::ZERO, |acc, p| acc.max(p));

    let total_fees: Decimal = trades.iter().map(|t| t.fee).sum();
    let position = accounting.get_position(symbol);
    let realized_pnl = position.total_pnl();
    let unrealized_pnl = match last_close {
        Some(close) if position.long_open_qty() > Decimal::ZERO => {
            position.long_open_qty() * (close - position.avg_long_entry())
        }
        _ => Decimal::ZERO,
    };

    SymbolStats {
        symbol: symbol.to_owned(),
        number_of_trades,
        winning,
        losing,
        win_rate,
        max_drawdown: worst.abs(),
        holding_time: holding_time(&trades),
        total_fees,
        realized_pnl,
        unrealized_pnl,
        maximum_loss: worst,
        maximum_profit: best,
    }
}

/// FIFO-matches each closing trade (long sell / short cover) against the
/// earliest still-open entry on the same side, joining buy and sell rows
/// by `sell.executed_at > buy.executed_at`. Returns `None` if no closing
/// trades exist yet.
fn holding_time(trades: &[Trade]) -> Option<HoldingTime> {
    let mut long_entries: VecDeque<Time> = VecDeque::new();
    let mut short_entries: VecDeque<Time> = VecDeque::new();
    let mut durations_hours: Vec<f64> = Vec::new();

    for trade in trades {
        let order = &trade.order;
        match (order.position_type, order.side) {
            (PositionType::Long, Side::Buy) => long_entries.push_back(trade.executed_at),
            (PositionType::Short, Side::Sell) => short_entries.push_back(trade.executed_at),
            (PositionType::Long, Side::Sell) => {
                if let Some(entry) = long_entries.pop_front() {
                    durations_hours.push(hours_between(entry, trade.executed_at));
                }
            }
            (PositionType::Short, Side::Buy) => {
                if let Some(entry) = short_entries.pop_front() {
                    durations_hours.push(hours_between(entry, trade.executed_at));
                }
            }
        }
    }

    if durations_hours.is_empty() {
        return None;
    }
    let min_hours = durations_hours.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_hours = durations_hours.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let avg_hours = durations_hours.iter().sum::<f64>() / durations_hours.len() as f64;
    Some(HoldingTime { min_hours, max_hours, avg_hours: avg_hours.round() as i64 })
}

fn hours_between(entry: Time, exit: Time) -> f64 {
    const NANOS_PER_HOUR: f64 = 3_600.0 * 1_000_000_000.0;
    (exit - entry).to_f64().unwrap_or(0.0) / NANOS_PER_HOUR
}
