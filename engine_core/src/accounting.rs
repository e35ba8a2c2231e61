/// accounting.rs — Trade/position accounting engine (C7)
///
/// Maintains two append-only logs, `orders` and `trades`, behind one
/// reader-writer lock. `Position` is never stored — every read recomputes
/// it as an aggregate over `trades` for that symbol, matching the four
/// directional buckets below.
use std::path::Path;
use std::sync::RwLock;

use rust_decimal::Decimal;

use crate::error::{EngineError, ErrorCode, Result};
use crate::types::{Order, OrderId, PositionType, Side, Time, Trade};

/// One directional accumulator: running quantity, notional amount, and
/// fees for either the "in" or "out" side of a long or short position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Bucket {
    qty: Decimal,
    amount: Decimal,
    fee: Decimal,
}

impl Bucket {
    fn accumulate(&mut self, qty: Decimal, price: Decimal, fee: Decimal) {
        self.qty += qty;
        self.amount += qty * price;
        self.fee += fee;
    }
}

/// A symbol's position, derived from its trade history. Any divide-by-zero
/// bucket yields `0` rather than failing.
#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: String,
    pub strategy_name: String,
    pub open_timestamp: Option<Time>,
    long_in: Bucket,
    long_out: Bucket,
    short_in: Bucket,
    short_out: Bucket,
}

impl Position {
    fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            strategy_name: String::new(),
            open_timestamp: None,
            long_in: Bucket::default(),
            long_out: Bucket::default(),
            short_in: Bucket::default(),
            short_out: Bucket::default(),
        }
    }

    pub fn avg_long_entry(&self) -> Decimal {
        safe_div(self.long_in.amount + self.long_in.fee, self.long_in.qty)
    }

    pub fn avg_long_exit(&self) -> Decimal {
        safe_div(self.long_out.amount - self.long_out.fee, self.long_out.qty)
    }

    pub fn avg_short_entry(&self) -> Decimal {
        safe_div(self.short_in.amount - self.short_in.fee, self.short_in.qty)
    }

    pub fn avg_short_exit(&self) -> Decimal {
        safe_div(self.short_out.amount + self.short_out.fee, self.short_out.qty)
    }

    pub fn long_open_qty(&self) -> Decimal {
        self.long_in.qty - self.long_out.qty
    }

    pub fn short_open_qty(&self) -> Decimal {
        self.short_in.qty - self.short_out.qty
    }

    pub fn long_pnl(&self) -> Decimal {
        self.long_out.qty * (self.avg_long_exit() - self.avg_long_entry())
    }

    pub fn short_pnl(&self) -> Decimal {
        self.short_out.qty * (self.avg_short_entry() - self.avg_short_exit())
    }

    pub fn total_pnl(&self) -> Decimal {
        self.long_pnl() + self.short_pnl()
    }
}

fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

fn position_from_trades(symbol: &str, trades: &[Trade]) -> Position {
    let mut position = Position::empty(symbol);
    let mut open_timestamps: Vec<Time> = Vec::new();

    for trade in trades.iter().filter(|t| t.order.symbol == symbol) {
        let order = &trade.order;
        position.strategy_name = order.strategy_name.clone();
        match (order.position_type, order.side) {
            (PositionType::Long, Side::Buy) => {
                position.long_in.accumulate(trade.executed_qty, trade.executed_price, trade.fee);
                open_timestamps.push(trade.executed_at);
            }
            (PositionType::Long, Side::Sell) => {
                position.long_out.accumulate(trade.executed_qty, trade.executed_price, trade.fee);
            }
            (PositionType::Short, Side::Sell) => {
                position.short_in.accumulate(trade.executed_qty, trade.executed_price, trade.fee);
                open_timestamps.push(trade.executed_at);
            }
            (PositionType::Short, Side::Buy) => {
                position.short_out.accumulate(trade.executed_qty, trade.executed_price, trade.fee);
            }
        }
    }

    position.open_timestamp = open_timestamps.into_iter().min();
    position
}

/// `{order, trade, is_new_position}` returned per input order, in order.
#[derive(Debug, Clone)]
pub struct UpdateResult {
    pub order: Order,
    pub trade: Trade,
    pub is_new_position: bool,
}

#[derive(Default)]
struct Ledger {
    orders: Vec<Order>,
    trades: Vec<Trade>,
}

pub struct Accounting {
    ledger: RwLock<Ledger>,
}

impl Accounting {
    pub fn new() -> Self {
        Self { ledger: RwLock::new(Ledger::default()) }
    }

    /// Intake a batch of orders. Each is assigned a fresh `order_id`,
    /// validated, matched against the symbol's current position to
    /// decide `is_new_position` and any realized `pnl`, then appended to
    /// both logs. A failure on any order rolls the *entire* batch back —
    /// the logs are truncated to their pre-call length and the error
    /// propagates.
    pub fn update(&self, orders: Vec<Order>) -> Result<Vec<UpdateResult>> {
        let mut guard = self.ledger.write().expect("accounting lock poisoned");
        let orders_checkpoint = guard.orders.len();
        let trades_checkpoint = guard.trades.len();

        let mut results = Vec::with_capacity(orders.len());
        for mut order in orders {
            match apply_order(&mut guard, &mut order) {
                Ok(result) => results.push(result),
                Err(e) => {
                    guard.orders.truncate(orders_checkpoint);
                    guard.trades.truncate(trades_checkpoint);
                    return Err(e);
                }
            }
        }
        Ok(results)
    }

    pub fn get_order_by_id(&self, id: OrderId) -> Option<Order> {
        let guard = self.ledger.read().expect("accounting lock poisoned");
        guard.orders.iter().find(|o| o.order_id == Some(id)).cloned()
    }

    pub fn get_position(&self, symbol: &str) -> Position {
        let guard = self.ledger.read().expect("accounting lock poisoned");
        position_from_trades(symbol, &guard.trades)
    }

    pub fn get_all_positions(&self) -> Vec<Position> {
        let guard = self.ledger.read().expect("accounting lock poisoned");
        let mut symbols: Vec<&str> = guard.trades.iter().map(|t| t.order.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();
        symbols.into_iter().map(|s| position_from_trades(s, &guard.trades)).collect()
    }

    pub fn get_all_trades(&self) -> Vec<Trade> {
        self.ledger.read().expect("accounting lock poisoned").trades.clone()
    }

    pub fn get_all_orders(&self) -> Vec<Order> {
        self.ledger.read().expect("accounting lock poisoned").orders.clone()
    }

    /// Drops and recreates both tables.
    pub fn cleanup(&self) {
        let mut guard = self.ledger.write().expect("accounting lock poisoned");
        guard.orders.clear();
        guard.trades.clear();
    }

    /// Exports `orders` and `trades` to CSV files under `dir`. The literal
    /// on-disk format is intentionally unspecified, so CSV stands in as an
    /// inspectable, widely-supported columnar representation.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let guard = self.ledger.read().expect("accounting lock poisoned");
        write_orders_csv(&dir.join("orders.csv"), &guard.orders)?;
        write_trades_csv(&dir.join("trades.csv"), &guard.trades)?;
        Ok(())
    }
}

impl Default for Accounting {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_order(ledger: &mut Ledger, order: &mut Order) -> Result<UpdateResult> {
    order.validate()?;
    order.order_id = Some(OrderId::new());

    let position = position_from_trades(&order.symbol, &ledger.trades);
    let is_new_position = order.position_type == PositionType::Long
        && order.side == Side::Buy
        && position.long_open_qty() == Decimal::ZERO;

    let pnl = closing_pnl(&position, order);

    let trade = Trade {
        order: order.clone(),
        executed_at: order.timestamp,
        executed_qty: order.quantity,
        executed_price: order.price,
        fee: order.fee,
        pnl,
    };

    ledger.orders.push(order.clone());
    ledger.trades.push(trade.clone());

    Ok(UpdateResult { order: order.clone(), trade, is_new_position })
}

/// `pnl` is set only when this order closes (part of) an existing
/// position; opening orders carry `None`. Uses the position's running
/// average entry price *as of just before this order* — exact for the
/// common single-round-trip case; see DESIGN.md for the documented
/// limitation under interleaved re-entries.
fn closing_pnl(position: &Position, order: &Order) -> Option<Decimal> {
    match (order.position_type, order.side) {
        (PositionType::Long, Side::Sell) if position.long_open_qty() > Decimal::ZERO => {
            let entry = position.avg_long_entry();
            Some(order.quantity * order.price - order.quantity * entry - order.fee)
        }
        (PositionType::Short, Side::Buy) if position.short_open_qty() > Decimal::ZERO => {
            let entry = position.avg_short_entry();
            Some(order.quantity * entry - order.quantity * order.price - order.fee)
        }
        _ => None,
    }
}

/// Given a balance, price, and commission schedule, the largest `q >= 0`
/// with `q*price + commission(q) <= balance`, rounded down to
/// `precision` decimal places.
pub fn max_buy_quantity(
    balance: Decimal,
    price: Decimal,
    commission: &dyn crate::commission::CommissionPolicy,
    precision: u32,
) -> Decimal {
    if price <= Decimal::ZERO || balance <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let step = Decimal::new(1, precision);
    let mut q = (balance / price).round_dp(precision);
    while q > Decimal::ZERO && q * price + commission.commission(q) > balance {
        q -= step;
    }
    q.max(Decimal::ZERO)
}

fn write_orders_csv(path: &Path, orders: &[Order]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_err("orders", path, e))?;
    for order in orders {
        writer
            .write_record([
                order.order_id.map(|id| id.to_string()).unwrap_or_default(),
                order.symbol.clone(),
                format!("{:?}", order.side),
                order.quantity.to_string(),
                order.price.to_string(),
                order.timestamp.to_string(),
                format!("{:?}", order.position_type),
                order.strategy_name.clone(),
                format!("{:?}", order.status),
                order.is_completed.to_string(),
                order.fee.to_string(),
            ])
            .map_err(|e| csv_err("orders", path, e))?;
    }
    writer.flush().map_err(|e| csv_err("orders", path, e.into()))?;
    Ok(())
}

fn write_trades_csv(path: &Path, trades: &[Trade]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_err("trades", path, e))?;
    for trade in trades {
        writer
            .write_record([
                trade.order.order_id.map(|id| id.to_string()).unwrap_or_default(),
                trade.order.symbol.clone(),
                trade.executed_at.to_string(),
                trade.executed_qty.to_string(),
                trade.executed_price.to_string(),
                trade.fee.to_string(),
                trade.pnl.map(|p| p.to_string()).unwrap_or_default(),
            ])
            .map_err(|e| csv_err("trades", path, e))?;
    }
    writer.flush().map_err(|e| csv_err("trades", path, e.into()))?;
    Ok(())
}

fn csv_err(table: &str, path: &Path, cause: csv::Error) -> EngineError {
    EngineError::SessionIo {
        code: ErrorCode::SessionIo,
        message: format!("failed to write {table} to {}", path.display()),
        cause: Some(Box::new(cause)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commission::ZeroCommission;
    use crate::types::Reason;

    fn order(side: Side, position_type: PositionType, qty: i64, price: i64, fee: i64, ts: Time) -> Order {
        Order {
            order_id: None,
            symbol: "BTCUSDT".into(),
            side,
            quantity: Decimal::from(qty),
            price: Decimal::from(price),
            timestamp: ts,
            position_type,
            reason: Reason::new("test", "test order"),
            strategy_name: "demo".into(),
            status: crate::types::OrderStatus::Pending,
            is_completed: false,
            fee: Decimal::from(fee),
        }
    }

    #[test]
    fn long_round_trip_pnl_s5() {
        let accounting = Accounting::new();
        let buy = order(Side::Buy, PositionType::Long, 100, 100, 10, 0);
        let sell = order(Side::Sell, PositionType::Long, 100, 110, 10, 1);
        let results = accounting.update(vec![buy, sell]).unwrap();

        assert!(results[0].is_new_position);
        assert!(results[0].trade.pnl.is_none());
        assert_eq!(results[1].trade.pnl, Some(Decimal::from(980)));

        let position = accounting.get_position("BTCUSDT");
        assert_eq!(position.total_pnl(), Decimal::from(980));
    }

    #[test]
    fn short_round_trip_pnl_s6() {
        let accounting = Accounting::new();
        let short_entry = order(Side::Sell, PositionType::Short, 100, 100, 10, 0);
        let cover = order(Side::Buy, PositionType::Short, 100, 90, 10, 1);
        let results = accounting.update(vec![short_entry, cover]).unwrap();

        assert_eq!(results[1].trade.pnl, Some(Decimal::from(980)));
        let position = accounting.get_position("BTCUSDT");
        assert_eq!(position.total_pnl(), Decimal::from(980));
    }

    #[test]
    fn is_new_position_only_on_first_long_buy() {
        let accounting = Accounting::new();
        let buy1 = order(Side::Buy, PositionType::Long, 10, 100, 0, 0);
        let buy2 = order(Side::Buy, PositionType::Long, 10, 100, 0, 1);
        let results = accounting.update(vec![buy1, buy2]).unwrap();
        assert!(results[0].is_new_position);
        assert!(!results[1].is_new_position);
    }

    #[test]
    fn invalid_order_rolls_back_whole_batch() {
        let accounting = Accounting::new();
        let good = order(Side::Buy, PositionType::Long, 10, 100, 0, 0);
        let mut bad = order(Side::Buy, PositionType::Long, 0, 100, 0, 1); // qty == 0 invalid
        bad.quantity = Decimal::ZERO;
        let err = accounting.update(vec![good, bad]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrder { .. }));
        assert!(accounting.get_all_trades().is_empty());
        assert!(accounting.get_all_orders().is_empty());
    }

    #[test]
    fn avg_price_identities_with_fees() {
        // property 5
        let accounting = Accounting::new();
        let buy = order(Side::Buy, PositionType::Long, 10, 100, 5, 0);
        accounting.update(vec![buy]).unwrap();
        let position = accounting.get_position("BTCUSDT");
        assert!(position.avg_long_entry() >= Decimal::from(100));
    }

    #[test]
    fn divide_by_zero_bucket_yields_zero() {
        let position = Position::empty("BTCUSDT");
        assert_eq!(position.avg_long_entry(), Decimal::ZERO);
        assert_eq!(position.total_pnl(), Decimal::ZERO);
    }

    #[test]
    fn max_buy_quantity_respects_balance_and_fees() {
        let q = max_buy_quantity(Decimal::from(1005), Decimal::from(100), &ZeroCommission, 2);
        assert_eq!(q, Decimal::from(10));
    }

    #[test]
    fn cleanup_clears_both_tables() {
        let accounting = Accounting::new();
        accounting.update(vec![order(Side::Buy, PositionType::Long, 1, 1, 0, 0)]).unwrap();
        accounting.cleanup();
        assert!(accounting.get_all_trades().is_empty());
        assert!(accounting.get_all_orders().is_empty());
    }
}
