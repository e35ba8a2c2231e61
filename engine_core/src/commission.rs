/// commission.rs — Pluggable commission-fee policies (C9)
///
/// A policy is just `quantity -> fee`; callers combine it with an order's
/// quantity wherever a fee needs computing (C7's `update`, the max-buy-
/// quantity helper). `for_broker` is a name-keyed selector with a
/// zero-fee fallback for unknown brokers.
use std::sync::Arc;

use rust_decimal::Decimal;

pub trait CommissionPolicy: Send + Sync {
    fn commission(&self, quantity: Decimal) -> Decimal;
}

/// No fees at all.
pub struct ZeroCommission;

impl CommissionPolicy for ZeroCommission {
    fn commission(&self, _quantity: Decimal) -> Decimal {
        Decimal::ZERO
    }
}

/// Example tiered schedule: `max(0.005 * quantity, 1.0)`.
pub struct TieredCommission;

impl CommissionPolicy for TieredCommission {
    fn commission(&self, quantity: Decimal) -> Decimal {
        let rate = Decimal::new(5, 3) * quantity; // 0.005 * quantity
        rate.max(Decimal::ONE)
    }
}

/// Selector used at session wiring time. Unknown broker names get
/// `ZeroCommission` rather than failing — fee policy selection is not
/// itself something the core should consider fatal.
pub fn for_broker(name: &str) -> Arc<dyn CommissionPolicy> {
    match name {
        "tiered" => Arc::new(TieredCommission),
        _ => Arc::new(ZeroCommission),
    }
}
