/// cache.rs — Sliding-window cache (C2)
///
/// A bounded, per-symbol store of the most recent `max_size` bars, ordered
/// ascending by time. One reader-writer lock guards the whole cache:
/// writes are serialized, reads run in parallel.
use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{Bar, Time};

pub struct SlidingWindowCache {
    max_size: usize,
    symbols: RwLock<HashMap<String, Vec<Bar>>>,
}

impl SlidingWindowCache {
    pub fn new(max_size: usize) -> Self {
        Self { max_size, symbols: RwLock::new(HashMap::new()) }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Add a bar, keyed by `bar.symbol`. `max_size == 0` disables all
    /// writes (silent no-op).
    pub fn add(&self, bar: Bar) {
        if self.max_size == 0 {
            return;
        }
        let mut guard = self.symbols.write().expect("cache lock poisoned");
        let bars = guard.entry(bar.symbol.clone()).or_default();

        match bars.last() {
            None => bars.push(bar),
            Some(last) if bar.time > last.time => bars.push(bar),
            Some(last) if bar.time == last.time => {
                let idx = bars.len() - 1;
                bars[idx] = bar;
            }
            _ => {
                // Out-of-order arrival: binary-search insert, O(log n + n).
                let pos = match bars.binary_search_by_key(&bar.time, |b| b.time) {
                    Ok(i) => {
                        bars[i] = bar;
                        return self.truncate(bars);
                    }
                    Err(i) => i,
                };
                bars.insert(pos, bar);
            }
        }
        self.truncate(bars);
    }

    fn truncate(&self, bars: &mut Vec<Bar>) {
        if bars.len() > self.max_size {
            let overflow = bars.len() - self.max_size;
            bars.drain(0..overflow);
        }
    }

    /// Concatenated, time-sorted bars across all cached symbols within
    /// `[start, end]`. Returns `None` (miss) when no symbol has been
    /// populated yet, or when any populated symbol's earliest cached bar
    /// starts after `start` — in that case the cache cannot certify
    /// completeness for the requested range and the caller must fall back
    /// to the store (see SPEC_FULL.md §11 for the precise rule covering
    /// symbols never added to the cache).
    pub fn range(&self, start: Time, end: Time) -> Option<Vec<Bar>> {
        if self.max_size == 0 {
            return None;
        }
        let guard = self.symbols.read().expect("cache lock poisoned");
        if guard.is_empty() {
            return None;
        }
        for bars in guard.values() {
            if let Some(first) = bars.first() {
                if first.time > start {
                    return None;
                }
            }
        }
        let mut out: Vec<Bar> = guard
            .values()
            .flat_map(|bars| bars.iter().cloned())
            .filter(|b| b.time >= start && b.time <= end)
            .collect();
        out.sort_by_key(|b| b.time);
        Some(out)
    }

    /// The `n` most recent bars for `symbol` with time <= `end`, ascending.
    /// `None` (miss) if fewer than `n` are available in the cache.
    pub fn previous_n(&self, end: Time, symbol: &str, n: usize) -> Option<Vec<Bar>> {
        if self.max_size == 0 || n == 0 {
            return if n == 0 { Some(Vec::new()) } else { None };
        }
        let guard = self.symbols.read().expect("cache lock poisoned");
        let bars = guard.get(symbol)?;
        let end_idx = bars.partition_point(|b| b.time <= end);
        if end_idx < n {
            return None;
        }
        Some(bars[end_idx - n..end_idx].to_vec())
    }

    pub fn point(&self, symbol: &str, time: Time) -> Option<Bar> {
        let guard = self.symbols.read().expect("cache lock poisoned");
        let bars = guard.get(symbol)?;
        let idx = bars.binary_search_by_key(&time, |b| b.time).ok()?;
        Some(bars[idx].clone())
    }

    pub fn last(&self, symbol: &str) -> Option<Bar> {
        let guard = self.symbols.read().expect("cache lock poisoned");
        guard.get(symbol).and_then(|bars| bars.last().cloned())
    }

    pub fn size(&self, symbol: &str) -> usize {
        let guard = self.symbols.read().expect("cache lock poisoned");
        guard.get(symbol).map_or(0, Vec::len)
    }

    pub fn total_size(&self) -> usize {
        let guard = self.symbols.read().expect("cache lock poisoned");
        guard.values().map(Vec::len).sum()
    }

    pub fn clear(&self) {
        let mut guard = self.symbols.write().expect("cache lock poisoned");
        guard.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(t: Time, close: f64) -> Bar {
        Bar::new("BTCUSDT", t, close, close, close, close, 1.0)
    }

    #[test]
    fn eviction_keeps_max_size() {
        // S2 — sliding-window eviction
        let cache = SlidingWindowCache::new(3);
        for t in 0..5 {
            cache.add(bar(t, 100.0 + t as f64));
        }
        assert!(cache.point("BTCUSDT", 0).is_none());
        assert!(cache.point("BTCUSDT", 1).is_none());
        assert_eq!(cache.last("BTCUSDT").unwrap().close, 104.0);
        assert_eq!(cache.size("BTCUSDT"), 3);
    }

    #[test]
    fn previous_n_ascending() {
        // S3 — previous-N correctness
        let cache = SlidingWindowCache::new(10);
        for t in 0..5 {
            cache.add(bar(t, 100.0 + t as f64));
        }
        let got = cache.previous_n(4, "BTCUSDT", 3).unwrap();
        let closes: Vec<f64> = got.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn zero_max_size_disables_everything() {
        let cache = SlidingWindowCache::new(0);
        cache.add(bar(0, 100.0));
        assert_eq!(cache.total_size(), 0);
        assert!(cache.range(0, 10).is_none());
        assert!(cache.previous_n(0, "BTCUSDT", 1).is_none());
    }

    #[test]
    fn previous_n_miss_when_insufficient() {
        let cache = SlidingWindowCache::new(10);
        cache.add(bar(3, 100.0));
        cache.add(bar(4, 101.0));
        // S10 — cache-fallback correctness: only 2 bars cached, 5 requested
        assert!(cache.previous_n(4, "BTCUSDT", 5).is_none());
    }

    #[test]
    fn out_of_order_add_inserts_in_place() {
        let cache = SlidingWindowCache::new(10);
        cache.add(bar(0, 100.0));
        cache.add(bar(2, 102.0));
        cache.add(bar(1, 101.0));
        let all = cache.previous_n(2, "BTCUSDT", 3).unwrap();
        let times: Vec<Time> = all.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![0, 1, 2]);
    }
}
