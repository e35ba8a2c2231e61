/// main.rs — Demonstration backtest runner
///
/// A thin CLI over `engine_core`: seeds an in-memory bar store with a
/// synthetic price path, wires up the default indicator registry, steps a
/// minimal long-only fast/slow moving-average crossover strategy through
/// the bars, books every fill through `Accounting`, and prints a summary
/// report. This is a reference wiring, not a production strategy — it
/// exists to exercise the engine end-to-end the way a real strategy
/// process would.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;

use engine_core::accounting::Accounting;
use engine_core::cache::SlidingWindowCache;
use engine_core::commission::{self, CommissionPolicy};
use engine_core::config::EngineConfig;
use engine_core::datasource::{CacheLayer, DataSource};
use engine_core::indicators::{ConfiguredIndicator, Indicator, IndicatorContext, IndicatorRegistry, IndicatorType, Param};
use engine_core::result_cache::ResultCache;
use engine_core::session::SessionManager;
use engine_core::statistics::compute_stats;
use engine_core::store::InMemoryStore;
use engine_core::types::{Bar, Order, OrderStatus, PositionType, Reason, Side, Time};

#[derive(Parser)]
#[command(name = "backtest")]
#[command(about = "engine_core demonstration runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bundled MA-crossover demonstration over synthetic bars.
    Run {
        #[arg(short, long, default_value = "DEMOUSDT")]
        symbol: String,
        #[arg(short, long, default_value_t = 500)]
        bars: usize,
        #[arg(short, long, default_value = "./data")]
        data_root: PathBuf,
        #[arg(long, default_value_t = 5)]
        fast_period: usize,
        #[arg(long, default_value_t = 20)]
        slow_period: usize,
    },
    /// List sessions recorded for a given date (YYYY-MM-DD) under data-root.
    Sessions {
        #[arg(short, long)]
        date: String,
        #[arg(short, long, default_value = "./data")]
        data_root: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { symbol, bars, data_root, fast_period, slow_period } => {
            run(&symbol, bars, &data_root, fast_period, slow_period)
        }
        Commands::Sessions { date, data_root } => list_sessions(&date, &data_root),
    }
}

const NANOS_PER_MINUTE: Time = 60 * 1_000_000_000;

/// A deterministic, reproducible sine-plus-drift price path. Good enough
/// to drive a crossover through both regimes without needing a bundled
/// data file.
fn synthetic_bars(symbol: &str, count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let t = i as f64;
            let price = 100.0 + t * 0.05 + (t / 15.0).sin() * 8.0;
            let time = i as Time * NANOS_PER_MINUTE;
            Bar::new(symbol, time, price, price + 0.5, price - 0.5, price, 10.0)
        })
        .collect()
}

fn run(symbol: &str, bar_count: usize, data_root: &PathBuf, fast_period: usize, slow_period: usize) -> Result<()> {
    if fast_period == 0 || slow_period <= fast_period {
        return Err(anyhow!("fast-period must be > 0 and slow-period must exceed fast-period"));
    }

    let mut config = EngineConfig::from_env().unwrap_or_default();
    config.data_root = data_root.clone();
    info!(symbol, bar_count, fast_period, slow_period, "starting demonstration run");

    let session = SessionManager::initialize(&config.data_root)?;
    info!(run = %session.run_name(), path = %session.current_run_path().display(), "session initialized");

    let bars = synthetic_bars(symbol, bar_count);
    let store = Arc::new(InMemoryStore::from_bars(bars.clone()));
    let data_source = DataSource::new(store, CacheLayer::Sliding(Arc::new(SlidingWindowCache::new(config.cache_max_size))));
    let registry = IndicatorRegistry::with_defaults();
    let result_cache = ResultCache::new();
    let ctx = IndicatorContext { data_source: &data_source, registry: &registry, cache: &result_cache };

    let ma_factory = registry.get(IndicatorType::Ma)?;
    let fast = ma_factory.config(&[Param::Int(fast_period as i64)])?;
    let slow = ma_factory.config(&[Param::Int(slow_period as i64)])?;
    let broker = commission::for_broker("tiered");

    let accounting = Accounting::new();
    let mut holding = false;

    for bar in &bars {
        // The per-bar cache is scoped to a single bar; clear it on every
        // advance so a stateful indicator never sees a prior bar's
        // memoized state or query results.
        result_cache.clear();
        data_source.ingest(bar.clone());
        let fast_v = match fast.raw_value(symbol, bar.time, &ctx, &[]) {
            Ok(v) => v,
            Err(_) => continue, // not enough history yet
        };
        let slow_v = match slow.raw_value(symbol, bar.time, &ctx, &[]) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let price = Decimal::try_from(bar.close).unwrap_or(Decimal::ZERO);
        let qty = Decimal::from(1);
        let fee = broker.commission(qty);

        if !holding && fast_v > slow_v {
            let order = buy_order(symbol, qty, price, fee, bar.time);
            accounting.update(vec![order])?;
            holding = true;
        } else if holding && fast_v < slow_v {
            let order = sell_order(symbol, qty, price, fee, bar.time);
            accounting.update(vec![order])?;
            holding = false;
        }
    }

    accounting.write(&session.current_run_path())?;

    let last_close = bars.last().map(|b| Decimal::try_from(b.close).unwrap_or(Decimal::ZERO));
    let stats = compute_stats(&accounting, symbol, last_close);
    print_report(&stats);

    Ok(())
}

fn buy_order(symbol: &str, qty: Decimal, price: Decimal, fee: Decimal, ts: Time) -> Order {
    Order {
        order_id: None,
        symbol: symbol.to_owned(),
        side: Side::Buy,
        quantity: qty,
        price,
        timestamp: ts,
        position_type: PositionType::Long,
        reason: Reason::new("ma_crossover", "fast crossed above slow"),
        strategy_name: "demo_ma_crossover".into(),
        status: OrderStatus::Pending,
        is_completed: false,
        fee,
    }
}

fn sell_order(symbol: &str, qty: Decimal, price: Decimal, fee: Decimal, ts: Time) -> Order {
    Order {
        order_id: None,
        symbol: symbol.to_owned(),
        side: Side::Sell,
        quantity: qty,
        price,
        timestamp: ts,
        position_type: PositionType::Long,
        reason: Reason::new("ma_crossover", "fast crossed below slow"),
        strategy_name: "demo_ma_crossover".into(),
        status: OrderStatus::Pending,
        is_completed: false,
        fee,
    }
}

fn print_report(stats: &engine_core::statistics::SymbolStats) {
    println!("=== {} ===", stats.symbol);
    println!("trades:        {}", stats.number_of_trades);
    println!("winning:       {}", stats.winning);
    println!("losing:        {}", stats.losing);
    println!("win rate:      {}", stats.win_rate);
    println!("realized pnl:  {}", stats.realized_pnl);
    println!("unrealized:    {}", stats.unrealized_pnl);
    println!("max drawdown:  {}", stats.max_drawdown);
    println!("total fees:    {}", stats.total_fees);
    if let Some(ht) = &stats.holding_time {
        println!(
            "holding time:  min {:.2}h max {:.2}h avg {}h",
            ht.min_hours, ht.max_hours, ht.avg_hours
        );
    }
}

fn list_sessions(date: &str, data_root: &PathBuf) -> Result<()> {
    let config = EngineConfig { data_root: data_root.clone(), ..EngineConfig::default() };
    let session = SessionManager::initialize(&config.data_root)?;
    let sessions = session.list_sessions_for_date(date)?;
    if sessions.is_empty() {
        println!("no sessions recorded for {date}");
    } else {
        for name in sessions {
            println!("{name}");
        }
    }
    Ok(())
}
