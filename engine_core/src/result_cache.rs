/// result_cache.rs — Per-bar result cache (C6)
///
/// Memoizes [`DataSource`] query results within a single bar: `previous_n`
/// is keyed by `(symbol, end_nanos, n)`, `range` by `(start_nanos,
/// end_nanos, interval_tag)`. Also holds named, typed stateful blobs for
/// stateful indicators (`RangeFilterState`, `WaddahAttarState`). Cleared
/// wholesale on every bar advance. Only successful results are memoized;
/// failures propagate unchanged so the caller can retry.
use std::any::Any;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{Bar, Time};

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum Key {
    PreviousN { symbol: String, end_nanos: Time, n: usize },
    Range { start_nanos: Time, end_nanos: Time, interval_tag: String },
}

/// A double-checked-locking guard: the first miss wins the right to fetch
/// from the store; concurrent misses on the same key wait for that fetch
/// rather than duplicating it.
pub struct ResultCache {
    entries: RwLock<HashMap<Key, Vec<Bar>>>,
    state: RwLock<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()), state: RwLock::new(HashMap::new()) }
    }

    pub fn clear(&self) {
        self.entries.write().expect("result cache lock poisoned").clear();
        self.state.write().expect("result cache state lock poisoned").clear();
    }

    /// Fetch-or-compute for a `previous_n` query. `compute` is invoked at
    /// most once per distinct key even under concurrent callers: a second
    /// thread that misses the read-lock check re-checks after acquiring
    /// the write lock before calling `compute` itself.
    pub fn previous_n_or_compute<F>(
        &self,
        symbol: &str,
        end_nanos: Time,
        n: usize,
        compute: F,
    ) -> Result<Vec<Bar>, crate::error::EngineError>
    where
        F: FnOnce() -> Result<Vec<Bar>, crate::error::EngineError>,
    {
        let key = Key::PreviousN { symbol: symbol.to_owned(), end_nanos, n };
        if let Some(hit) = self.entries.read().expect("result cache lock poisoned").get(&key) {
            return Ok(hit.clone());
        }
        let mut guard = self.entries.write().expect("result cache lock poisoned");
        if let Some(hit) = guard.get(&key) {
            return Ok(hit.clone());
        }
        let result = compute()?;
        guard.insert(key, result.clone());
        Ok(result)
    }

    pub fn range_or_compute<F>(
        &self,
        start_nanos: Time,
        end_nanos: Time,
        interval_tag: &str,
        compute: F,
    ) -> Result<Vec<Bar>, crate::error::EngineError>
    where
        F: FnOnce() -> Result<Vec<Bar>, crate::error::EngineError>,
    {
        let key = Key::Range { start_nanos, end_nanos, interval_tag: interval_tag.to_owned() };
        if let Some(hit) = self.entries.read().expect("result cache lock poisoned").get(&key) {
            return Ok(hit.clone());
        }
        let mut guard = self.entries.write().expect("result cache lock poisoned");
        if let Some(hit) = guard.get(&key) {
            return Ok(hit.clone());
        }
        let result = compute()?;
        guard.insert(key, result.clone());
        Ok(result)
    }

    /// Store a named stateful blob (e.g. per-symbol `RangeFilterState`),
    /// overwriting any previous value under the same name.
    pub fn put_state<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.state
            .write()
            .expect("result cache state lock poisoned")
            .insert(name.into(), Box::new(value));
    }

    /// Retrieve and clone a previously stored stateful blob.
    pub fn get_state<T: Any + Send + Sync + Clone>(&self, name: &str) -> Option<T> {
        self.state
            .read()
            .expect("result cache state lock poisoned")
            .get(name)
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bar(t: Time) -> Bar {
        Bar::new("BTCUSDT", t, 1.0, 1.0, 1.0, 1.0, 1.0)
    }

    #[test]
    fn repeated_identical_calls_hit_cache() {
        let rc = ResultCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![bar(1)])
        };
        let a = rc.previous_n_or_compute("BTCUSDT", 10, 3, compute).unwrap();
        let b = rc.previous_n_or_compute("BTCUSDT", 10, 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![bar(99)])
        }).unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_resets_both_maps() {
        let rc = ResultCache::new();
        rc.previous_n_or_compute("BTCUSDT", 1, 1, || Ok(vec![bar(1)])).unwrap();
        rc.put_state("range_filter:BTCUSDT", 42i64);
        rc.clear();
        assert_eq!(rc.get_state::<i64>("range_filter:BTCUSDT"), None);
        let calls = std::cell::Cell::new(0);
        rc.previous_n_or_compute("BTCUSDT", 1, 1, || {
            calls.set(calls.get() + 1);
            Ok(vec![bar(2)])
        }).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failed_compute_is_not_memoized() {
        let rc = ResultCache::new();
        let first: Result<Vec<Bar>, crate::error::EngineError> =
            rc.previous_n_or_compute("BTCUSDT", 1, 1, || {
                Err(crate::error::EngineError::insufficient_data(1, 0, "BTCUSDT"))
            });
        assert!(first.is_err());
        let second = rc.previous_n_or_compute("BTCUSDT", 1, 1, || Ok(vec![bar(5)])).unwrap();
        assert_eq!(second, vec![bar(5)]);
    }
}
