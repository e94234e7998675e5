//! Single-flight attribute resolver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use crate::error::Error;
use crate::Result;

/// Fetches the current value for a key from its authoritative source.
pub type AttributeLookup<V> = Arc<dyn Fn(String) -> BoxFuture<'static, Result<V>> + Send + Sync>;

type SharedLookup<V> = Shared<BoxFuture<'static, Result<V>>>;

enum Slot<V> {
    Ready(V),
    Pending {
        generation: u64,
        future: SharedLookup<V>,
    },
}

struct Fallback<V> {
    default: V,
    is_degenerate: Box<dyn Fn(&V) -> bool + Send + Sync>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Answered from a cached value.
    pub hits: u64,
    /// Joined a lookup already in flight.
    pub joined: u64,
    /// Started a new lookup.
    pub misses: u64,
    pub failures: u64,
    pub invalidations: u64,
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    joined: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
    invalidations: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> ResolverStats {
        ResolverStats {
            hits: self.hits.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Lazily resolves and caches per-key values, with at most one lookup in
/// flight per key.
///
/// Successful values are cached until [`invalidate`](Self::invalidate); failed
/// lookups are not cached, so the next call for that key retries.
pub struct AttributesResolver<V> {
    lookup: AttributeLookup<V>,
    slots: Arc<DashMap<String, Slot<V>>>,
    fallback: Option<Arc<Fallback<V>>>,
    next_generation: AtomicU64,
    stats: Arc<AtomicStats>,
}

impl<V> AttributesResolver<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F>(lookup: F) -> Self
    where
        F: Fn(String) -> BoxFuture<'static, Result<V>> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
            slots: Arc::new(DashMap::new()),
            fallback: None,
            next_generation: AtomicU64::new(0),
            stats: Arc::new(AtomicStats::default()),
        }
    }

    /// Replace looked-up values for which `is_degenerate` holds with `default`.
    pub fn with_fallback<P>(mut self, default: V, is_degenerate: P) -> Self
    where
        P: Fn(&V) -> bool + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(Fallback {
            default,
            is_degenerate: Box::new(is_degenerate),
        }));
        self
    }

    /// Resolve `key`. Concurrent callers for the same key share one lookup.
    pub fn resolve(&self, key: &str) -> BoxFuture<'static, Result<V>> {
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(e) => match e.get() {
                Slot::Ready(value) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    future::ready(Ok(value.clone())).boxed()
                }
                Slot::Pending { future, .. } => {
                    self.stats.joined.fetch_add(1, Ordering::Relaxed);
                    future.clone().boxed()
                }
            },
            Entry::Vacant(v) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let shared = self.start_lookup(key.to_string(), generation);
                v.insert(Slot::Pending {
                    generation,
                    future: shared.clone(),
                });
                shared.boxed()
            }
        }
    }

    fn start_lookup(&self, key: String, generation: u64) -> SharedLookup<V> {
        let lookup = Arc::clone(&self.lookup);
        let slots = Arc::clone(&self.slots);
        let fallback = self.fallback.clone();
        let stats = Arc::clone(&self.stats);
        async move {
            debug!(key = %key, "resolving attributes");
            let outcome = lookup(key.clone()).await.map(|value| match &fallback {
                Some(f) if (f.is_degenerate)(&value) => f.default.clone(),
                _ => value,
            });
            let current = |slot: &Slot<V>| {
                matches!(slot, Slot::Pending { generation: g, .. } if *g == generation)
            };
            match outcome {
                Ok(value) => {
                    if let Some(mut slot) = slots.get_mut(&key) {
                        if current(slot.value()) {
                            *slot.value_mut() = Slot::Ready(value.clone());
                        }
                    }
                    Ok(value)
                }
                Err(cause) => {
                    stats.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %cause, "attribute lookup failed");
                    slots.remove_if(&key, |_, slot| current(slot));
                    Err(Error::Resolution {
                        key,
                        source: Arc::new(cause),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }

    /// The cached value for `key`, if resolved.
    pub fn cached(&self, key: &str) -> Option<V> {
        match self.slots.get(key)?.value() {
            Slot::Ready(v) => Some(v.clone()),
            Slot::Pending { .. } => None,
        }
    }

    /// Forget `key`; a lookup still in flight completes for its waiters but is not cached.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.slots.remove(key).is_some();
        if removed {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats.to_stats()
    }
}
