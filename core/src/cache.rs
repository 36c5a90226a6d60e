//! Injectable TTL cache, owned by its caller.
//!
//! Catalog title lookups hit an external metadata service; handlers that
//! validate titles cache resolutions here instead of sharing a
//! process-wide singleton. Expiry and capacity are explicit policy.

use crate::clock::Clock;
use crate::error::Result;
use crate::external::CatalogResolver;
use crate::types::{CatalogTitle, TitleId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// A bounded map whose entries expire after a fixed TTL.
///
/// Expired entries are dropped lazily on access and eagerly swept when
/// an insert finds the cache full; if the sweep frees nothing, the
/// oldest entry is evicted. Clones share the same backing map.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    entries: Arc<Mutex<HashMap<K, CachedValue<V>>>>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

struct CachedValue<V> {
    value: V,
    inserted_at: DateTime<Utc>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Create a cache with the given TTL and capacity.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            capacity: capacity.max(1),
            clock,
        }
    }

    /// Look up a key, dropping it first if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(cached) if now - cached.inserted_at < self.ttl => Some(cached.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert a value, evicting as needed to stay within capacity.
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let ttl = self.ttl;
            entries.retain(|_, cached| now - cached.inserted_at < ttl);

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, cached)| cached.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CachedValue {
                value,
                inserted_at: now,
            },
        );
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Catalog resolver that caches successful resolutions.
///
/// Misses and transport failures are never cached; a title that does
/// not resolve today may be imported tomorrow.
#[derive(Clone)]
pub struct CachedCatalog<C> {
    inner: C,
    cache: TtlCache<TitleId, CatalogTitle>,
}

impl<C: CatalogResolver> CachedCatalog<C> {
    /// Wrap a resolver with the given cache policy.
    #[must_use]
    pub fn new(inner: C, ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl, capacity, clock),
        }
    }
}

impl<C: CatalogResolver> CatalogResolver for CachedCatalog<C> {
    async fn resolve_title(&self, id: TitleId) -> Result<CatalogTitle> {
        if let Some(hit) = self.cache.get(&id) {
            return Ok(hit);
        }

        let resolved = self.inner.resolve_title(id).await?;
        self.cache.insert(id, resolved.clone());
        Ok(resolved)
    }
}
