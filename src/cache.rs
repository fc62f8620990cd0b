//! Shared Response Cache
//!
//! Process-scoped read-through cache for contract responses, keyed by an
//! opaque string (`{chainId}-{address}-{resource}[-{identifier}]`).
//!
//! - A key is either settled (value returned immediately) or in flight
//! - Concurrent requests for an in-flight key await the same fetch
//! - Failed fetches are not stored; the next request retries
//!
//! No expiry: keys are scoped by chain and address, and callers only
//! cache reads they treat as immutable for that contract.

use alloy_primitives::Address;
use eyre::{eyre, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

type CachedValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, std::result::Result<CachedValue, Arc<eyre::Report>>>>;

enum Slot {
    Ready(CachedValue),
    InFlight(SharedFetch),
}

/// Counters for cache diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Requests that joined a fetch already in flight
    pub coalesced: u64,
}

#[derive(Default)]
pub struct ResponseCache {
    slots: Mutex<HashMap<String, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached value for `key`, or run `producer` once and cache its result.
    ///
    /// At most one producer runs per key at a time; concurrent callers share its outcome.
    pub async fn get_or_fetch<V, F, Fut>(&self, key: &str, producer: F) -> Result<V>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let fetch = {
            let mut slots = self.slots();
            match slots.get(key) {
                Some(Slot::Ready(value)) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    trace!("Cache hit: {}", key);
                    return downcast(value, key);
                }
                Some(Slot::InFlight(fetch)) => {
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    trace!("Joining in-flight fetch: {}", key);
                    fetch.clone()
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let pending = producer();
                    let fetch = async move {
                        pending.await
                            .map(|value| Arc::new(value) as CachedValue)
                            .map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    slots.insert(key.to_string(), Slot::InFlight(fetch.clone()));
                    fetch
                }
            }
        };

        let outcome = fetch.clone().await;
        self.settle(key, &fetch, &outcome);

        match outcome {
            Ok(value) => downcast(&value, key),
            Err(e) => Err(eyre!("{}", e)),
        }
    }

    /// Replace the in-flight slot with the settled value (or drop it on failure)
    fn settle(
        &self,
        key: &str,
        fetch: &SharedFetch,
        outcome: &std::result::Result<CachedValue, Arc<eyre::Report>>,
    ) {
        let mut slots = self.slots();
        let still_ours = matches!(slots.get(key), Some(Slot::InFlight(current)) if current.ptr_eq(fetch));
        if !still_ours {
            return;
        }
        match outcome {
            Ok(value) => {
                slots.insert(key.to_string(), Slot::Ready(value.clone()));
            }
            Err(e) => {
                debug!("Not caching failed fetch for {}: {}", key, e);
                slots.remove(key);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.slots().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

fn downcast<V: Clone + 'static>(value: &CachedValue, key: &str) -> Result<V> {
    value
        .downcast_ref::<V>()
        .cloned()
        .ok_or_else(|| eyre!("Cache entry {} holds a different type", key))
}

/// `{chainId}-{address}-{resource}`
pub fn cache_key(chain_id: u64, address: &Address, resource: &str) -> String {
    format!("{}-{}-{}", chain_id, address, resource)
}

/// `{chainId}-{address}-{resource}-{identifier}`
pub fn indexed_cache_key(chain_id: u64, address: &Address, resource: &str, identifier: impl std::fmt::Display) -> String {
    format!("{}-{}-{}-{}", chain_id, address, resource, identifier)
}

// ============================================
// TESTS
// ============================================
