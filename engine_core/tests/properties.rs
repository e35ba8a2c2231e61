/// Property-based tests for the engine's universal invariants.
/// Each property is checked against the real implementation, not a model —
/// these are black-box through the public API of each component.
use std::sync::Arc;

use proptest::prelude::*;
use rust_decimal::Decimal;

use engine_core::accounting::Accounting;
use engine_core::cache::SlidingWindowCache;
use engine_core::datasource::{CacheLayer, DataSource};
use engine_core::indicators::{ConfiguredIndicator, Indicator, IndicatorContext, IndicatorRegistry, IndicatorType, Param};
use engine_core::result_cache::ResultCache;
use engine_core::store::{InMemoryStore, MarketDataStore};
use engine_core::types::{Bar, Order, OrderStatus, PositionType, Reason, Side, Time};
use engine_core::version;

fn bar(symbol: &str, t: Time, close: f64) -> Bar {
    Bar::new(symbol, t, close, close, close, close, 1.0)
}

fn order(side: Side, position_type: PositionType, qty: i64, price: i64, fee: i64, ts: Time) -> Order {
    Order {
        order_id: None,
        symbol: "SYM".into(),
        side,
        quantity: Decimal::from(qty),
        price: Decimal::from(price),
        timestamp: ts,
        position_type,
        reason: Reason::new("prop", "property test order"),
        strategy_name: "prop".into(),
        status: OrderStatus::Pending,
        is_completed: false,
        fee: Decimal::from(fee),
    }
}

proptest! {
    /// Property 1: chronological monotonicity of `previous_n`.
    #[test]
    fn previous_n_is_strictly_increasing_and_bounded(
        count in 1usize..40,
        n in 1usize..10,
        closes in proptest::collection::vec(1.0f64..1000.0, 40),
    ) {
        let bars: Vec<Bar> = (0..count).map(|i| bar("SYM", i as Time, closes[i])).collect();
        let store = Arc::new(InMemoryStore::from_bars(bars.clone()));
        let ds = DataSource::new(store, CacheLayer::Sliding(Arc::new(SlidingWindowCache::new(32))));
        let end = (count as Time).saturating_sub(1);

        if let Ok(result) = ds.previous_n(end, "SYM", n) {
            for w in result.windows(2) {
                prop_assert!(w[0].time < w[1].time);
            }
            if let Some(last) = result.last() {
                prop_assert!(last.time <= end);
            }
        }
    }

    /// Property 2: cache/store equivalence — whenever a query succeeds
    /// against both the layered source and the raw store it falls back to,
    /// the results agree, regardless of how much of the cache is
    /// pre-populated.
    #[test]
    fn layered_source_agrees_with_raw_store(
        count in 1usize..40,
        n in 1usize..10,
        prefill in 0usize..40,
        closes in proptest::collection::vec(1.0f64..1000.0, 40),
    ) {
        let bars: Vec<Bar> = (0..count).map(|i| bar("SYM", i as Time, closes[i])).collect();
        let store = Arc::new(InMemoryStore::from_bars(bars.clone()));
        let cache = SlidingWindowCache::new(32);
        for b in bars.iter().take(prefill.min(count)) {
            cache.add(b.clone());
        }
        let ds = DataSource::new(store.clone(), CacheLayer::Sliding(Arc::new(cache)));
        let end = (count as Time).saturating_sub(1);

        let from_source = ds.previous_n(end, "SYM", n);
        let from_store = store.previous_n(end, "SYM", n);
        match (from_source, from_store) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(_), Err(_)) => {}
            (a, b) => prop_assert!(false, "layered source and raw store disagreed: {:?} vs {:?}", a, b),
        }

        let start = 0;
        let from_source_range = ds.range(start, end, None);
        let from_store_range = store.range(start, end, None);
        match (from_source_range, from_store_range) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(_), Err(_)) => {}
            (a, b) => prop_assert!(false, "layered source and raw store disagreed on range: {:?} vs {:?}", a, b),
        }
    }

    /// Property 3: bounded cache.
    #[test]
    fn sliding_cache_never_exceeds_max_size(
        max_size in 0usize..20,
        n_adds in 0usize..60,
        closes in proptest::collection::vec(1.0f64..1000.0, 60),
    ) {
        let cache = SlidingWindowCache::new(max_size);
        for i in 0..n_adds {
            cache.add(bar("SYM", i as Time, closes[i]));
        }
        prop_assert!(cache.size("SYM") <= max_size);
        if max_size == 0 {
            prop_assert_eq!(cache.total_size(), 0);
        }
    }

    /// Property 4: position reconstruction — total_pnl equals the sum of
    /// per-trade pnl contributions recorded by the ledger.
    #[test]
    fn position_total_pnl_matches_sum_of_trade_pnls(
        n_round_trips in 1usize..6,
        entry_price in 50i64..200,
        exit_delta in (-50i64)..50,
        qty in 1i64..20,
    ) {
        let accounting = Accounting::new();
        let exit_price = (entry_price + exit_delta).max(1);
        let mut orders = Vec::new();
        let mut ts = 0;
        for _ in 0..n_round_trips {
            orders.push(order(Side::Buy, PositionType::Long, qty, entry_price, 0, ts));
            ts += 1;
            orders.push(order(Side::Sell, PositionType::Long, qty, exit_price, 0, ts));
            ts += 1;
        }
        let results = accounting.update(orders).unwrap();
        let pnl_sum: Decimal = results.iter().filter_map(|r| r.trade.pnl).sum();
        let position = accounting.get_position("SYM");
        prop_assert_eq!(position.total_pnl(), pnl_sum);
    }

    /// Property 5: average price identities under fees.
    #[test]
    fn avg_price_identities_hold_with_positive_fees(
        price in 10i64..500,
        fee in 1i64..50,
        qty in 1i64..20,
    ) {
        let accounting = Accounting::new();
        accounting.update(vec![order(Side::Buy, PositionType::Long, qty, price, fee, 0)]).unwrap();
        let position = accounting.get_position("SYM");
        prop_assert!(position.avg_long_entry() >= Decimal::from(price));

        accounting.update(vec![order(Side::Sell, PositionType::Long, qty, price, fee, 1)]).unwrap();
        let position = accounting.get_position("SYM");
        prop_assert!(position.avg_long_exit() <= Decimal::from(price));
    }

    /// Property 6: EMA continuity on constant input.
    #[test]
    fn ema_on_constant_series_returns_the_constant(
        c in 1.0f64..10_000.0,
        count in 5usize..60,
        period in 1usize..20,
    ) {
        let bars: Vec<Bar> = (0..count).map(|i| bar("SYM", i as Time, c)).collect();
        let store = Arc::new(InMemoryStore::from_bars(bars));
        let ds = DataSource::new(store, CacheLayer::Sliding(Arc::new(SlidingWindowCache::new(128))));
        let registry = IndicatorRegistry::with_defaults();
        let cache = ResultCache::new();
        let ctx = IndicatorContext { data_source: &ds, registry: &registry, cache: &cache };

        let ema_factory = registry.get(IndicatorType::Ema).unwrap();
        let ema = ema_factory.config(&[Param::Int(period as i64)]).unwrap();
        let v = ema.raw_value("SYM", (count - 1) as Time, &ctx, &[]).unwrap();
        prop_assert!((v - c).abs() < 1e-6);
    }

    /// Property 7: RSI bounds, with monotone extremes approaching 0/100.
    #[test]
    fn rsi_stays_within_bounds(
        count in 20usize..50,
        period in 1usize..14,
        deltas in proptest::collection::vec(-5.0f64..5.0, 50),
    ) {
        let mut price = 100.0;
        let bars: Vec<Bar> = (0..count)
            .map(|i| {
                price = (price + deltas[i]).max(0.01);
                bar("SYM", i as Time, price)
            })
            .collect();
        let store = Arc::new(InMemoryStore::from_bars(bars));
        let ds = DataSource::new(store, CacheLayer::Sliding(Arc::new(SlidingWindowCache::new(128))));
        let registry = IndicatorRegistry::with_defaults();
        let cache = ResultCache::new();
        let ctx = IndicatorContext { data_source: &ds, registry: &registry, cache: &cache };

        let rsi_factory = registry.get(IndicatorType::Rsi).unwrap();
        let rsi = rsi_factory.config(&[Param::Int(period as i64)]).unwrap();
        if let Ok(v) = rsi.raw_value("SYM", (count - 1) as Time, &ctx, &[]) {
            prop_assert!((0.0..=100.0).contains(&v));
        }
    }

    /// Property 10: version compatibility iff major.minor agree, or either
    /// side is "main".
    #[test]
    fn version_compat_matches_major_minor_or_main(
        major_a in 0u64..5, minor_a in 0u64..5, patch_a in 0u64..5,
        major_b in 0u64..5, minor_b in 0u64..5, patch_b in 0u64..5,
    ) {
        let a = format!("{major_a}.{minor_a}.{patch_a}");
        let b = format!("{major_b}.{minor_b}.{patch_b}");
        let expected = major_a == major_b && minor_a == minor_b;
        prop_assert_eq!(version::check_compatibility(&a, &b).is_ok(), expected);
        prop_assert!(version::check_compatibility("main", &b).is_ok());
        prop_assert!(version::check_compatibility(&a, "main").is_ok());
    }
}

/// Strictly increasing prices drive RSI to 100; strictly decreasing drives
/// it to 0 (property 7's monotone-extreme clause — deterministic, not
/// randomized, since the direction must be unambiguous).
#[test]
fn rsi_saturates_at_extremes_for_monotone_series() {
    let up: Vec<Bar> = (0..30).map(|i| bar("SYM", i as Time, 100.0 + i as f64)).collect();
    let down: Vec<Bar> = (0..30).map(|i| bar("SYM", i as Time, 200.0 - i as f64)).collect();

    for (bars, expected) in [(up, 100.0), (down, 0.0)] {
        let store = Arc::new(InMemoryStore::from_bars(bars));
        let ds = DataSource::new(store, CacheLayer::Sliding(Arc::new(SlidingWindowCache::new(64))));
        let registry = IndicatorRegistry::with_defaults();
        let cache = ResultCache::new();
        let ctx = IndicatorContext { data_source: &ds, registry: &registry, cache: &cache };

        let rsi_factory = registry.get(IndicatorType::Rsi).unwrap();
        let rsi = rsi_factory.config(&[Param::Int(14)]).unwrap();
        let v = rsi.raw_value("SYM", 29, &ctx, &[]).unwrap();
        assert!((v - expected).abs() < 1e-9);
    }
}
