/// datasource.rs — Layered data source (C3)
///
/// Wraps a [`MarketDataStore`] (C1) behind either a [`SlidingWindowCache`]
/// (C2, live/streaming use) or an [`IndexedPreload`] (batch/backtest use).
/// Dispatch: try the cache/preload first; on a miss, fall through to the
/// store. Store errors are never cached, so a transient failure can be
/// retried on the next call.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::cache::SlidingWindowCache;
use crate::error::{EngineError, Result};
use crate::store::{Interval, MarketDataStore};
use crate::types::{Bar, Time};

/// An in-memory, per-symbol ascending array of bars with O(1) offset
/// access, for backtests that preload the full history up front.
pub struct IndexedPreload {
    bars: RwLock<HashMap<String, Vec<Bar>>>,
    current_bar_index: AtomicUsize,
    preloaded: std::sync::atomic::AtomicBool,
}

impl IndexedPreload {
    pub fn new() -> Self {
        Self {
            bars: RwLock::new(HashMap::new()),
            current_bar_index: AtomicUsize::new(0),
            preloaded: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Iterate `store.read_all(start, end)`, partition by symbol into
    /// ascending arrays. Replaces any previous preload.
    pub fn preload(
        &self,
        store: &dyn MarketDataStore,
        start: Option<Time>,
        end: Option<Time>,
    ) -> Result<()> {
        let all = store.read_all(start, end)?;
        let mut by_symbol: HashMap<String, Vec<Bar>> = HashMap::new();
        for bar in all {
            by_symbol.entry(bar.symbol.clone()).or_default().push(bar);
        }
        for bars in by_symbol.values_mut() {
            bars.sort_by_key(|b| b.time);
        }
        *self.bars.write().expect("preload lock poisoned") = by_symbol;
        self.current_bar_index.store(0, Ordering::SeqCst);
        self.preloaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_preloaded(&self) -> bool {
        self.preloaded.load(Ordering::SeqCst)
    }

    pub fn set_current_bar_index(&self, i: usize) {
        self.current_bar_index.store(i, Ordering::SeqCst);
    }

    pub fn current_bar_index(&self) -> usize {
        self.current_bar_index.load(Ordering::SeqCst)
    }

    /// The slice `[i+1-n, i+1)` of `symbol`'s array, where `i` is the
    /// current bar index. Fails with `InsufficientData` if `n > i+1`.
    pub fn previous_n_bars(&self, symbol: &str, n: usize) -> Result<Vec<Bar>> {
        if !self.is_preloaded() {
            return Err(EngineError::not_found("indexed preload has not been populated"));
        }
        let guard = self.bars.read().expect("preload lock poisoned");
        let bars = guard
            .get(symbol)
            .ok_or_else(|| EngineError::not_found(format!("no preloaded bars for {symbol}")))?;
        let i = self.current_bar_index();
        if n > i + 1 {
            return Err(EngineError::insufficient_data(n, i + 1, symbol));
        }
        Ok(bars[i + 1 - n..i + 1].to_vec())
    }

    pub fn bar_at(&self, symbol: &str, index: usize) -> Result<Bar> {
        let guard = self.bars.read().expect("preload lock poisoned");
        let bars = guard
            .get(symbol)
            .ok_or_else(|| EngineError::not_found(format!("no preloaded bars for {symbol}")))?;
        bars.get(index)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("{symbol} has no bar at index {index}")))
    }

    pub fn total_bars(&self, symbol: &str) -> usize {
        let guard = self.bars.read().expect("preload lock poisoned");
        guard.get(symbol).map_or(0, Vec::len)
    }
}

impl Default for IndexedPreload {
    fn default() -> Self {
        Self::new()
    }
}

/// Either live-streaming caching (C2) or batch indexed preload, never both.
pub enum CacheLayer {
    Sliding(Arc<SlidingWindowCache>),
    Indexed(Arc<IndexedPreload>),
    None,
}

pub struct DataSource {
    store: Arc<dyn MarketDataStore>,
    cache_layer: CacheLayer,
}

impl DataSource {
    pub fn new(store: Arc<dyn MarketDataStore>, cache_layer: CacheLayer) -> Self {
        Self { store, cache_layer }
    }

    pub fn store(&self) -> &dyn MarketDataStore {
        self.store.as_ref()
    }

    pub fn cache_layer(&self) -> &CacheLayer {
        &self.cache_layer
    }

    pub fn range(&self, start: Time, end: Time, interval: Option<Interval>) -> Result<Vec<Bar>> {
        if interval.is_none() {
            if let CacheLayer::Sliding(cache) = &self.cache_layer {
                if let Some(bars) = cache.range(start, end) {
                    return Ok(bars);
                }
            }
        }
        self.store.range(start, end, interval)
    }

    pub fn previous_n(&self, end: Time, symbol: &str, n: usize) -> Result<Vec<Bar>> {
        match &self.cache_layer {
            CacheLayer::Sliding(cache) => {
                if let Some(bars) = cache.previous_n(end, symbol, n) {
                    return Ok(bars);
                }
                self.store.previous_n(end, symbol, n)
            }
            CacheLayer::Indexed(preload) if preload.is_preloaded() => {
                preload.previous_n_bars(symbol, n)
            }
            _ => self.store.previous_n(end, symbol, n),
        }
    }

    pub fn last(&self, symbol: &str) -> Result<Bar> {
        if let CacheLayer::Sliding(cache) = &self.cache_layer {
            if let Some(bar) = cache.last(symbol) {
                return Ok(bar);
            }
        }
        self.store.last(symbol)
    }

    pub fn point(&self, symbol: &str, time: Time) -> Result<Bar> {
        if let CacheLayer::Sliding(cache) = &self.cache_layer {
            if let Some(bar) = cache.point(symbol, time) {
                return Ok(bar);
            }
        }
        self.store.point(symbol, time)
    }

    /// Feed a freshly observed bar into the sliding-window cache (no-op
    /// for indexed/no-cache configurations).
    pub fn ingest(&self, bar: Bar) {
        if let CacheLayer::Sliding(cache) = &self.cache_layer {
            cache.add(bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn bar(symbol: &str, t: Time, close: f64) -> Bar {
        Bar::new(symbol, t, close, close, close, close, 1.0)
    }

    #[test]
    fn cache_hit_avoids_store_for_previous_n() {
        let store = Arc::new(InMemoryStore::from_bars(vec![bar("BTCUSDT", 0, 1.0)]));
        let cache = Arc::new(SlidingWindowCache::new(10));
        cache.add(bar("BTCUSDT", 1, 2.0));
        cache.add(bar("BTCUSDT", 2, 3.0));
        let ds = DataSource::new(store, CacheLayer::Sliding(cache));
        let got = ds.previous_n(2, "BTCUSDT", 2).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].time, 1);
    }

    #[test]
    fn cache_miss_falls_back_to_store() {
        let store = Arc::new(InMemoryStore::from_bars(
            (0..5).map(|t| bar("BTCUSDT", t, 100.0 + t as f64)),
        ));
        let cache = Arc::new(SlidingWindowCache::new(10));
        let ds = DataSource::new(store, CacheLayer::Sliding(cache));
        let got = ds.previous_n(4, "BTCUSDT", 3).unwrap();
        assert_eq!(got.len(), 3);
    }

    #[test]
    fn indexed_preload_previous_n_bars() {
        let store = InMemoryStore::from_bars((0..5).map(|t| bar("BTCUSDT", t, 100.0 + t as f64)));
        let preload = Arc::new(IndexedPreload::new());
        preload.preload(&store, None, None).unwrap();
        preload.set_current_bar_index(4);
        let got = preload.previous_n_bars("BTCUSDT", 3).unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got.last().unwrap().time, 4);
    }

    #[test]
    fn indexed_preload_insufficient_data() {
        let store = InMemoryStore::from_bars((0..2).map(|t| bar("BTCUSDT", t, 100.0)));
        let preload = IndexedPreload::new();
        preload.preload(&store, None, None).unwrap();
        preload.set_current_bar_index(1);
        let err = preload.previous_n_bars("BTCUSDT", 5).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));
    }

    #[test]
    fn not_preloaded_fails() {
        let preload = IndexedPreload::new();
        assert!(!preload.is_preloaded());
        assert!(preload.previous_n_bars("BTCUSDT", 1).is_err());
    }
}
