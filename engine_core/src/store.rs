/// store.rs — Durable OHLCV market-data store (C1)
///
/// `MarketDataStore` is the trait every layered data source (C3) ultimately
/// falls back to. Two implementations are provided:
///
/// - `InMemoryStore`: a plain sorted-per-symbol `Vec<Bar>` store. Used by
///   tests and by `engine_runner`'s demonstration binary.
/// - `ParquetStore`: loads bars from a parquet file via `polars` (the
///   teacher crate's own data-access stack) and serves the same contract
///   against the in-memory, sorted representation loaded at construction
///   (or refreshed via `reload`).
///
/// Aggregation buckets are epoch-aligned, fixed-width windows in minutes,
/// computed in UTC with no calendar-specific adjustment.
use std::collections::BTreeMap;
use std::path::Path;

use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::{EngineError, ErrorCode, Result};
use crate::types::{Bar, Time};

/// Bar-count aggregation bucket width, expressed in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub minutes: i64,
}

impl Interval {
    pub fn minutes(minutes: i64) -> Self {
        Self { minutes }
    }

    fn nanos(self) -> i64 {
        self.minutes * 60 * 1_000_000_000
    }

    /// Epoch-aligned bucket start for `time`.
    fn bucket_start(self, time: Time) -> Time {
        let width = self.nanos();
        time.div_euclid(width) * width
    }
}

pub trait MarketDataStore: Send + Sync {
    fn count(&self, start: Option<Time>, end: Option<Time>) -> Result<u64>;
    fn range(&self, start: Time, end: Time, interval: Option<Interval>) -> Result<Vec<Bar>>;
    fn previous_n(&self, end: Time, symbol: &str, n: usize) -> Result<Vec<Bar>>;
    fn last(&self, symbol: &str) -> Result<Bar>;
    fn point(&self, symbol: &str, time: Time) -> Result<Bar>;
    /// Ascending, restartable, finite. Both implementations here keep the
    /// whole table resident and return it fully materialized — neither
    /// actually streams in bounded batches; see DESIGN.md for the gap this
    /// leaves against a true large-range streaming reader.
    fn read_all(&self, start: Option<Time>, end: Option<Time>) -> Result<Vec<Bar>>;
    fn all_symbols(&self) -> Result<Vec<String>>;
}

/// Sorted, per-symbol bar storage shared by both store implementations.
#[derive(Default)]
pub(crate) struct BarTable {
    by_symbol: BTreeMap<String, Vec<Bar>>,
}

impl BarTable {
    pub(crate) fn insert(&mut self, bar: Bar) {
        let bars = self.by_symbol.entry(bar.symbol.clone()).or_default();
        match bars.binary_search_by_key(&bar.time, |b| b.time) {
            Ok(i) => bars[i] = bar,
            Err(i) => bars.insert(i, bar),
        }
    }

    pub(crate) fn symbols(&self) -> Vec<String> {
        self.by_symbol.keys().cloned().collect()
    }

    fn count(&self, start: Option<Time>, end: Option<Time>) -> u64 {
        self.by_symbol
            .values()
            .flat_map(|bars| bars.iter())
            .filter(|b| in_bounds(b.time, start, end))
            .count() as u64
    }

    fn range(&self, start: Time, end: Time, interval: Option<Interval>) -> Vec<Bar> {
        let mut flat: Vec<Bar> = self
            .by_symbol
            .values()
            .flat_map(|bars| bars.iter().cloned())
            .filter(|b| b.time >= start && b.time <= end)
            .collect();
        flat.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.time.cmp(&b.time)));

        let Some(interval) = interval else {
            flat.sort_by_key(|b| b.time);
            return flat;
        };

        // Group by (bucket, symbol); tie-break first-open/last-close by
        // ascending time within the bucket.
        let mut buckets: BTreeMap<(Time, String), Vec<Bar>> = BTreeMap::new();
        for bar in flat {
            let key = (interval.bucket_start(bar.time), bar.symbol.clone());
            buckets.entry(key).or_default().push(bar);
        }

        let mut out: Vec<Bar> = buckets
            .into_iter()
            .map(|((bucket_time, symbol), mut bars)| {
                bars.sort_by_key(|b| b.time);
                let open = bars.first().unwrap().open;
                let close = bars.last().unwrap().close;
                let high = bars.iter().fold(f64::MIN, |acc, b| acc.max(b.high));
                let low = bars.iter().fold(f64::MAX, |acc, b| acc.min(b.low));
                let volume: f64 = bars.iter().map(|b| b.volume).sum();
                Bar::new(symbol, bucket_time, open, high, low, close, volume)
            })
            .collect();
        out.sort_by_key(|b| b.time);
        out
    }

    fn previous_n(&self, end: Time, symbol: &str, n: usize) -> std::result::Result<Vec<Bar>, (usize, usize)> {
        let Some(bars) = self.by_symbol.get(symbol) else {
            return Err((n, 0));
        };
        let end_idx = bars.partition_point(|b| b.time <= end);
        if end_idx < n {
            return Err((n, end_idx));
        }
        Ok(bars[end_idx - n..end_idx].to_vec())
    }

    fn last(&self, symbol: &str) -> Option<Bar> {
        self.by_symbol.get(symbol).and_then(|bars| bars.last().cloned())
    }

    fn point(&self, symbol: &str, time: Time) -> Option<Bar> {
        let bars = self.by_symbol.get(symbol)?;
        let idx = bars.binary_search_by_key(&time, |b| b.time).ok()?;
        Some(bars[idx].clone())
    }

    fn read_all(&self, start: Option<Time>, end: Option<Time>) -> Vec<Bar> {
        let mut flat: Vec<Bar> = self
            .by_symbol
            .values()
            .flat_map(|bars| bars.iter().cloned())
            .filter(|b| in_bounds(b.time, start, end))
            .collect();
        flat.sort_by_key(|b| b.time);
        flat
    }
}

fn in_bounds(t: Time, start: Option<Time>, end: Option<Time>) -> bool {
    start.map_or(true, |s| t >= s) && end.map_or(true, |e| t <= e)
}

/// In-memory store: no persistence, used by tests and the demo runner.
pub struct InMemoryStore {
    table: BarTable,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { table: BarTable::default() }
    }

    pub fn from_bars(bars: impl IntoIterator<Item = Bar>) -> Self {
        let mut table = BarTable::default();
        for bar in bars {
            table.insert(bar);
        }
        Self { table }
    }

    pub fn insert(&mut self, bar: Bar) {
        self.table.insert(bar);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataStore for InMemoryStore {
    fn count(&self, start: Option<Time>, end: Option<Time>) -> Result<u64> {
        Ok(self.table.count(start, end))
    }

    fn range(&self, start: Time, end: Time, interval: Option<Interval>) -> Result<Vec<Bar>> {
        Ok(self.table.range(start, end, interval))
    }

    fn previous_n(&self, end: Time, symbol: &str, n: usize) -> Result<Vec<Bar>> {
        self.table
            .previous_n(end, symbol, n)
            .map_err(|(required, actual)| EngineError::insufficient_data(required, actual, symbol))
    }

    fn last(&self, symbol: &str) -> Result<Bar> {
        self.table
            .last(symbol)
            .ok_or_else(|| EngineError::not_found(format!("no bars for symbol {symbol}")))
    }

    fn point(&self, symbol: &str, time: Time) -> Result<Bar> {
        self.table
            .point(symbol, time)
            .ok_or_else(|| EngineError::not_found(format!("no bar for {symbol} at {time}")))
    }

    fn read_all(&self, start: Option<Time>, end: Option<Time>) -> Result<Vec<Bar>> {
        Ok(self.table.read_all(start, end))
    }

    fn all_symbols(&self) -> Result<Vec<String>> {
        Ok(self.table.symbols())
    }
}

/// Parquet-backed store. Bars are read eagerly into the same sorted
/// `BarTable` representation at construction (and on `reload`); writes
/// flush the full table back to parquet.
pub struct ParquetStore {
    path: std::path::PathBuf,
    table: BarTable,
}

impl ParquetStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = Self::load(&path)?;
        Ok(Self { path, table })
    }

    pub fn reload(&mut self) -> Result<()> {
        self.table = Self::load(&self.path)?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let symbols: Vec<&str> = self.table.by_symbol.keys().map(String::as_str).collect();
        let mut sym_col = Vec::new();
        let mut time_col = Vec::new();
        let mut open_col = Vec::new();
        let mut high_col = Vec::new();
        let mut low_col = Vec::new();
        let mut close_col = Vec::new();
        let mut vol_col = Vec::new();
        for symbol in symbols {
            for bar in &self.table.by_symbol[symbol] {
                sym_col.push(bar.symbol.clone());
                time_col.push(bar.time);
                open_col.push(bar.open);
                high_col.push(bar.high);
                low_col.push(bar.low);
                close_col.push(bar.close);
                vol_col.push(bar.volume);
            }
        }
        let mut df = df! {
            "symbol" => sym_col,
            "time" => time_col,
            "open" => open_col,
            "high" => high_col,
            "low" => low_col,
            "close" => close_col,
            "volume" => vol_col,
        }
        .map_err(|e| EngineError::SessionIo {
            code: ErrorCode::SessionIo,
            message: "failed to build market_data frame".into(),
            cause: Some(Box::new(e)),
        })?;

        let mut file = std::fs::File::create(&self.path).map_err(|e| EngineError::SessionIo {
            code: ErrorCode::SessionIo,
            message: format!("failed to create {}", self.path.display()),
            cause: Some(Box::new(e)),
        })?;
        ParquetWriter::new(&mut file).finish(&mut df).map_err(|e| EngineError::SessionIo {
            code: ErrorCode::SessionIo,
            message: "failed to write parquet".into(),
            cause: Some(Box::new(e)),
        })?;
        Ok(())
    }

    fn load(path: &Path) -> Result<BarTable> {
        if !path.exists() {
            debug!("market data file {} absent, starting empty", path.display());
            return Ok(BarTable::default());
        }
        let df = LazyFrame::scan_parquet(path, ScanArgsParquet::default())
            .and_then(|lf| lf.collect())
            .map_err(|e| {
                let message = format!("failed to read {}", path.display());
                let wrapped = EngineError::wrap(
                    ErrorCode::HistoricalDataFailed,
                    message,
                    EngineError::DataNotFound { code: ErrorCode::DataNotFound, message: e.to_string() },
                );
                warn!("{wrapped}");
                wrapped
            })?;

        let mut table = BarTable::default();
        let symbol_col = df.column("symbol").and_then(|c| c.str()).ok();
        let time_col = df.column("time").and_then(|c| c.i64()).ok();
        let open_col = df.column("open").and_then(|c| c.f64()).ok();
        let high_col = df.column("high").and_then(|c| c.f64()).ok();
        let low_col = df.column("low").and_then(|c| c.f64()).ok();
        let close_col = df.column("close").and_then(|c| c.f64()).ok();
        let vol_col = df.column("volume").and_then(|c| c.f64()).ok();

        let (Some(symbol_col), Some(time_col), Some(open_col), Some(high_col), Some(low_col), Some(close_col), Some(vol_col)) =
            (symbol_col, time_col, open_col, high_col, low_col, close_col, vol_col)
        else {
            return Err(EngineError::DataNotFound {
                code: ErrorCode::DataNotFound,
                message: format!("{} is missing expected OHLCV columns", path.display()),
            });
        };

        for i in 0..df.height() {
            let (Some(symbol), Some(time), Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
                symbol_col.get(i),
                time_col.get(i),
                open_col.get(i),
                high_col.get(i),
                low_col.get(i),
                close_col.get(i),
                vol_col.get(i),
            ) else {
                continue;
            };
            table.insert(Bar::new(symbol, time, open, high, low, close, volume));
        }
        Ok(table)
    }
}

impl MarketDataStore for ParquetStore {
    fn count(&self, start: Option<Time>, end: Option<Time>) -> Result<u64> {
        Ok(self.table.count(start, end))
    }

    fn range(&self, start: Time, end: Time, interval: Option<Interval>) -> Result<Vec<Bar>> {
        Ok(self.table.range(start, end, interval))
    }

    fn previous_n(&self, end: Time, symbol: &str, n: usize) -> Result<Vec<Bar>> {
        self.table
            .previous_n(end, symbol, n)
            .map_err(|(required, actual)| EngineError::insufficient_data(required, actual, symbol))
    }

    fn last(&self, symbol: &str) -> Result<Bar> {
        self.table
            .last(symbol)
            .ok_or_else(|| EngineError::not_found(format!("no bars for symbol {symbol}")))
    }

    fn point(&self, symbol: &str, time: Time) -> Result<Bar> {
        self.table
            .point(symbol, time)
            .ok_or_else(|| EngineError::not_found(format!("no bar for {symbol} at {time}")))
    }

    fn read_all(&self, start: Option<Time>, end: Option<Time>) -> Result<Vec<Bar>> {
        Ok(self.table.read_all(start, end))
    }

    fn all_symbols(&self) -> Result<Vec<String>> {
        Ok(self.table.symbols())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(symbol: &str, t: Time, close: f64) -> Bar {
        Bar::new(symbol, t, close, close, close, close, 10.0)
    }

    const MIN: i64 = 60 * 1_000_000_000;

    #[test]
    fn previous_n_ascending_and_bounded() {
        let store = InMemoryStore::from_bars((0..5).map(|t| bar("BTCUSDT", t * MIN, 100.0 + t as f64)));
        let got = store.previous_n(4 * MIN, "BTCUSDT", 3).unwrap();
        assert_eq!(got.len(), 3);
        assert!(got[0].time < got[1].time && got[1].time < got[2].time);
        assert_eq!(got[2].time, 4 * MIN);
    }

    #[test]
    fn previous_n_insufficient_reports_counts() {
        let store = InMemoryStore::from_bars((0..2).map(|t| bar("BTCUSDT", t * MIN, 100.0)));
        let err = store.previous_n(1 * MIN, "BTCUSDT", 5).unwrap_err();
        match err {
            EngineError::InsufficientData { required, actual, .. } => {
                assert_eq!(required, 5);
                assert_eq!(actual, 2);
            }
            other => panic!("expected InsufficientData, got {other:?}"),
        }
    }

    #[test]
    fn aggregation_buckets_align_to_epoch() {
        let bars = vec![
            bar("BTCUSDT", 0, 100.0),
            bar("BTCUSDT", 1 * MIN, 101.0),
            bar("BTCUSDT", 2 * MIN, 99.0),
            bar("BTCUSDT", 5 * MIN, 102.0),
        ];
        let store = InMemoryStore::from_bars(bars);
        let got = store
            .range(0, 5 * MIN, Some(Interval::minutes(3)))
            .unwrap();
        // bucket [0,3m): bars at 0,1m,2m -> open=100 (t=0), close=99 (t=2m)
        // bucket [3m,6m): bar at 5m -> open=close=102
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].open, 100.0);
        assert_eq!(got[0].close, 99.0);
        assert_eq!(got[1].open, 102.0);
    }

    #[test]
    fn all_symbols_ascending() {
        let store = InMemoryStore::from_bars(vec![bar("ETHUSDT", 0, 1.0), bar("BTCUSDT", 0, 2.0)]);
        assert_eq!(store.all_symbols().unwrap(), vec!["BTCUSDT", "ETHUSDT"]);
    }
}
