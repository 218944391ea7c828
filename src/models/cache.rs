//! Expiring in-process cache.
//!
//! Every entry carries its insertion time and the cache has a single ttl.
//! Expiration is lazy: an entry is only checked, and dropped, when a read or a
//! racing write touches it. There is no background sweeper.

use crate::error::{BoxError, CacheError};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::borrow::Borrow;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Name of the currency catalogue cache.
pub const CURRENCIES_CACHE: &str = "currencies";
/// Name of the per-currency exchange rate cache.
pub const EXCHANGE_RATES_CACHE: &str = "exchange-rates";

/// A stored value and the moment it was stored. Never mutated after creation.
#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            inserted_at: Utc::now(),
        }
    }

    fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.inserted_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Thread-safe key/value cache with a fixed time-to-live.
pub struct ExpiringCache<K, V> {
    name: String,
    ttl: Duration,
    store: DashMap<K, Arc<CacheEntry<V>>>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    pub fn new(name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            ttl,
            store: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Return the value if present and unexpired. An expired entry found
    /// here is removed.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Display + ?Sized,
    {
        let entry = self.current(key)?;
        if !self.is_expired(&entry) {
            debug!(cache = %self.name, key = %key, "Cache hit");
            return Some(entry.value.clone());
        }

        debug!(cache = %self.name, key = %key, "Cache entry expired");
        // Only drop the entry we saw; a concurrent writer may have replaced it.
        self.store
            .remove_if(key, |_, current| Arc::ptr_eq(current, &entry));
        None
    }

    /// Store a fresh entry, replacing whatever was there.
    pub fn insert(&self, key: K, value: V) {
        self.store.insert(key, Arc::new(CacheEntry::new(value)));
    }

    /// Store `Some(value)`; `None` removes the key instead.
    pub fn put(&self, key: K, value: Option<V>) {
        match value {
            Some(value) => self.insert(key, value),
            None => {
                self.evict(&key);
            }
        }
    }

    /// Store only if the slot is empty or expired. Returns the live value that
    /// prevented the store, if any.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<V> {
        match self.store.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(CacheEntry::new(value)));
                None
            }
            Entry::Occupied(mut slot) => {
                if self.is_expired(slot.get()) {
                    slot.insert(Arc::new(CacheEntry::new(value)));
                    None
                } else {
                    Some(slot.get().value.clone())
                }
            }
        }
    }

    /// Remove one key. Reports whether anything was stored under it.
    pub fn evict<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.store.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Clear, reporting whether the cache held anything.
    pub fn invalidate(&self) -> bool {
        let had_entries = !self.store.is_empty();
        self.store.clear();
        had_entries
    }

    /// Return the live value for `key`, or run `loader` and store its result.
    ///
    /// The loop never holds a lock across the loader. When two callers miss
    /// at the same time both loaders run; whichever entry lands first is
    /// returned to both, so the loader is not guaranteed to run only once.
    /// A failing loader leaves the cache untouched.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, mut loader: F) -> Result<V, CacheError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<BoxError>,
    {
        loop {
            if let Some(entry) = self.current(&key) {
                if !self.is_expired(&entry) {
                    debug!(cache = %self.name, key = %key, "Cache hit");
                    return Ok(entry.value.clone());
                }
            }

            debug!(cache = %self.name, key = %key, "Cache miss, loading");
            let candidate = match loader().await {
                Ok(value) => Arc::new(CacheEntry::new(value)),
                Err(e) => {
                    return Err(CacheError::LoadFailure {
                        cache: self.name.clone(),
                        key: key.to_string(),
                        source: e.into(),
                    });
                }
            };

            match self.insert_if_absent(key.clone(), Arc::clone(&candidate)) {
                None => return Ok(candidate.value.clone()),
                Some(existing) if !self.is_expired(&existing) => {
                    debug!(
                        cache = %self.name,
                        key = %key,
                        "Another writer stored first, discarding loaded value"
                    );
                    return Ok(existing.value.clone());
                }
                Some(expired) => {
                    if self.compare_and_replace(&key, &expired, Arc::clone(&candidate)) {
                        return Ok(candidate.value.clone());
                    }
                    debug!(cache = %self.name, key = %key, "Lost replace race, retrying");
                }
            }
        }
    }

    fn current<Q>(&self, key: &Q) -> Option<Arc<CacheEntry<V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.store.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        entry.age() >= self.ttl
    }

    /// Store `entry` if the slot is empty, else hand back the occupant.
    fn insert_if_absent(&self, key: K, entry: Arc<CacheEntry<V>>) -> Option<Arc<CacheEntry<V>>> {
        match self.store.entry(key) {
            Entry::Occupied(slot) => Some(Arc::clone(slot.get())),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                None
            }
        }
    }

    /// Swap in `replacement` only while the slot still holds `expected`.
    fn compare_and_replace(
        &self,
        key: &K,
        expected: &Arc<CacheEntry<V>>,
        replacement: Arc<CacheEntry<V>>,
    ) -> bool {
        match self.store.entry(key.clone()) {
            Entry::Occupied(mut slot) if Arc::ptr_eq(slot.get(), expected) => {
                slot.insert(replacement);
                true
            }
            _ => false,
        }
    }
}

/// Shared cache handle.
pub type SharedCache<K, V> = Arc<ExpiringCache<K, V>>;
