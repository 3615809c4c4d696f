//! TTL cache with change notification, and the memoizing wrapper built on
//! top of it (C4). Grounded in
//! `original_source/lol_scraper/data_types.py`'s `SimpleCache`/`cache_autostore`.
//!
//! The engine only ever uses this to memoize `get_last_patch_version`
//! (`engine::PatchTracker`), but the cache and memoizer themselves are
//! generic, matching the source's design.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    ttl: Duration,
    inserted_at: Instant,
}

/// A `key -> (value, ttl, insertion time)` cache guarded by a single lock
/// (spec.md §5: "cache is single-threaded logically but accessed from
/// arbitrary workers").
#[derive(Default)]
pub struct SimpleCache {
    store: Mutex<HashMap<String, Entry>>,
}

impl SimpleCache {
    pub fn new() -> Self {
        SimpleCache::default()
    }

    /// `ttl == Duration::ZERO` means "never expires".
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        let mut store = self.store.lock().unwrap();
        store.insert(
            key.into(),
            Entry {
                value: value.into(),
                ttl,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut store = self.store.lock().unwrap();
        match store.get(key) {
            Some(entry) if entry.ttl.is_zero() || entry.inserted_at.elapsed() < entry.ttl => {
                Some(entry.value.clone())
            }
            Some(_) => {
                store.remove(key);
                None
            }
            None => None,
        }
    }
}

/// Memoizes a fallible, asynchronously-produced string behind `cache`,
/// calling `on_change` whenever the freshly-computed value differs from the
/// last one seen under `key`. Mirrors `cache_autostore`'s shadow-entry trick
/// (a `"{key}_old"` entry with `ttl=0` records the last value produced).
///
/// `compute` is a closure returning the future rather than the future
/// itself, so it is only ever driven on a cache miss.
pub async fn cache_autostore<F, Fut, E>(
    cache: &SimpleCache,
    key: &str,
    ttl: Duration,
    on_change: impl FnOnce(Option<String>, String),
    compute: F,
) -> Result<String, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<String, E>>,
{
    if let Some(hit) = cache.get(key) {
        return Ok(hit);
    }
    let new_value = compute().await?;
    cache.set(key, new_value.clone(), ttl);

    let shadow_key = format!("{key}_old");
    let old = cache.get(&shadow_key);
    cache.set(&shadow_key, new_value.clone(), Duration::ZERO);
    if old.as_deref() != Some(new_value.as_str()) {
        on_change(old, new_value.clone());
    }
    Ok(new_value)
}
