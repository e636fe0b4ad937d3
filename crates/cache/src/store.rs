//! Single-flight TTL cache
//!
//! Every (kind, key) pair owns a slot guarded by an async mutex. A caller
//! that finds the slot empty or expired runs the refresh while holding the
//! slot lock, so concurrent callers for the same key queue on the lock and
//! then observe the freshly stored value instead of hitting the upstream
//! themselves. Different keys never contend beyond the brief map lookup.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{SharedClock, SystemClock};
use parking_lot::Mutex;
use tokio::sync::Mutex as SlotLock;
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::kind::{age, ResourceKind, TtlPolicy};

/// Freshness of a cache entry at the moment it was inspected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than its TTL
    Fresh,
    /// Present but past its TTL
    Stale,
    /// Never fetched, or invalidated
    Absent,
}

#[derive(Clone)]
struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    fetched_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn new<T: Send + Sync + 'static>(value: T, fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            value: Arc::new(value),
            fetched_at,
            ttl,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        age(self.fetched_at, now) < self.ttl
    }

    fn downcast<T: Clone + 'static>(&self) -> Option<T> {
        self.value.downcast_ref::<T>().cloned()
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("fetched_at", &self.fetched_at)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: ResourceKind,
    key: String,
}

type Slot = Arc<SlotLock<Option<CacheEntry>>>;

/// Resource-kind keyed cache shared across components
///
/// Values of any `Clone + Send + Sync` type can be stored; each owner reads
/// back the type it wrote.
pub struct CacheStore {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    clock: SharedClock,
    policy: TtlPolicy,
}

impl CacheStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            clock,
            policy: TtlPolicy::standard(),
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(SystemClock::shared())
    }

    pub fn policy(&self) -> TtlPolicy {
        self.policy
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    fn slot(&self, kind: ResourceKind, key: &str) -> Slot {
        let mut slots = self.slots.lock();
        slots
            .entry(CacheKey {
                kind,
                key: key.to_string(),
            })
            .or_insert_with(|| Arc::new(SlotLock::new(None)))
            .clone()
    }

    fn existing_slot(&self, kind: ResourceKind, key: &str) -> Option<Slot> {
        self.slots
            .lock()
            .get(&CacheKey {
                kind,
                key: key.to_string(),
            })
            .cloned()
    }

    /// Return the cached value if fresh, otherwise run `refresh` and store its result
    ///
    /// Concurrent calls for the same (kind, key) share one refresh. If the
    /// refresh fails and an expired value of the right type exists, the
    /// expired value is served instead of the error.
    pub async fn get_or_refresh<T, F, Fut, E>(
        &self,
        kind: ResourceKind,
        key: &str,
        ttl: Duration,
        refresh: F,
    ) -> CacheResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let slot = self.slot(kind, key);
        let mut entry = slot.lock().await;

        if let Some(existing) = entry.as_ref() {
            if existing.is_fresh(self.clock.now()) {
                match existing.downcast::<T>() {
                    Some(value) => {
                        record(kind, "hit");
                        return Ok(value);
                    }
                    None => warn!(
                        kind = %kind,
                        key,
                        expected = std::any::type_name::<T>(),
                        "Cached value has unexpected type, refreshing"
                    ),
                }
            }
        }

        record(kind, "miss");
        debug!(kind = %kind, key, "Refreshing cache entry");

        match refresh().await {
            Ok(value) => {
                *entry = Some(CacheEntry::new(value.clone(), self.clock.now(), ttl));
                Ok(value)
            }
            Err(e) => {
                if let Some(previous) = entry.as_ref().and_then(|prev| prev.downcast::<T>()) {
                    warn!(kind = %kind, key, error = %e, "Refresh failed, serving expired value");
                    record(kind, "stale_served");
                    return Ok(previous);
                }
                Err(CacheError::RefreshFailed {
                    kind,
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// [`get_or_refresh`](Self::get_or_refresh) with the kind's standard TTL
    pub async fn get_or_refresh_default<T, F, Fut, E>(
        &self,
        kind: ResourceKind,
        key: &str,
        refresh: F,
    ) -> CacheResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let ttl = self.policy.ttl_for(kind);
        self.get_or_refresh(kind, key, ttl, refresh).await
    }

    /// Store a value the owner already has in hand
    pub async fn insert<T>(&self, kind: ResourceKind, key: &str, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        let slot = self.slot(kind, key);
        let mut entry = slot.lock().await;
        *entry = Some(CacheEntry::new(value, self.clock.now(), ttl));
    }

    /// Read an entry without refreshing it
    ///
    /// Returns the value together with its freshness; `None` when absent or
    /// stored under a different type.
    pub async fn peek<T>(&self, kind: ResourceKind, key: &str) -> Option<(T, Freshness)>
    where
        T: Clone + 'static,
    {
        let slot = self.existing_slot(kind, key)?;
        let entry = slot.lock().await;
        let existing = entry.as_ref()?;
        let value = existing.downcast::<T>()?;
        let freshness = if existing.is_fresh(self.clock.now()) {
            Freshness::Fresh
        } else {
            Freshness::Stale
        };
        Some((value, freshness))
    }

    /// Freshness of an entry regardless of its value type
    pub async fn freshness(&self, kind: ResourceKind, key: &str) -> Freshness {
        let Some(slot) = self.existing_slot(kind, key) else {
            return Freshness::Absent;
        };
        let entry = slot.lock().await;
        match entry.as_ref() {
            Some(existing) if existing.is_fresh(self.clock.now()) => Freshness::Fresh,
            Some(_) => Freshness::Stale,
            None => Freshness::Absent,
        }
    }

    /// When the entry was last fetched
    pub async fn fetched_at(&self, kind: ResourceKind, key: &str) -> Option<DateTime<Utc>> {
        let slot = self.existing_slot(kind, key)?;
        let entry = slot.lock().await;
        entry.as_ref().map(|e| e.fetched_at)
    }

    /// Drop one entry, or every entry of `kind` when `key` is `None`
    ///
    /// Returns the number of keys removed. A refresh already in flight for a
    /// removed key completes into a detached slot; the next read refreshes.
    pub fn invalidate(&self, kind: ResourceKind, key: Option<&str>) -> usize {
        let mut slots = self.slots.lock();
        let removed = match key {
            Some(key) => slots
                .remove(&CacheKey {
                    kind,
                    key: key.to_string(),
                })
                .map_or(0, |_| 1),
            None => {
                let before = slots.len();
                slots.retain(|k, _| k.kind != kind);
                before - slots.len()
            }
        };

        debug!(kind = %kind, key = ?key, removed, "Cache invalidated");
        removed
    }

    /// Number of keys currently tracked for `kind`
    pub fn tracked_keys(&self, kind: ResourceKind) -> usize {
        self.slots.lock().keys().filter(|k| k.kind == kind).count()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::with_system_clock()
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("keys", &self.slots.lock().len())
            .finish()
    }
}

fn record(kind: ResourceKind, outcome: &'static str) {
    metrics::counter!(
        "cache_requests_total",
        "kind" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
