use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::foundation::error::{BrokerError, BrokerResult};
use crate::request::fingerprint::Fingerprint;

/// Default number of artifacts kept in memory.
pub const DEFAULT_CAPACITY: usize = 32;

/// One cached artifact.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    /// Key the entry was stored under.
    pub fingerprint: Fingerprint,
    /// Rendered bytes, shared between the cache and in-flight readers.
    pub bytes: Arc<Vec<u8>>,
    /// Decoded SVG text, vector output only.
    pub vector_text: Option<String>,
}

/// Bounded, strictly least-recently-used artifact store.
///
/// All access goes through one mutex that guards only the in-memory map. Rendering never happens
/// while it is held.
pub struct ContentCache {
    inner: Mutex<LruCache<Fingerprint, CacheEntry>>,
    capacity: NonZeroUsize,
}

impl ContentCache {
    pub fn new(capacity: usize) -> BrokerResult<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| BrokerError::config("cache capacity must be non-zero"))?;
        Ok(Self {
            inner: Mutex::new(LruCache::new(capacity)),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an entry, promoting it to most-recently-used on a hit.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.inner.lock().get(fingerprint).cloned()
    }

    /// Check presence without touching recency.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.lock().contains(fingerprint)
    }

    /// Store the artifact produced for `fingerprint`.
    ///
    /// Replacing an existing key promotes it. Inserting a new key at capacity evicts the
    /// least-recently-used entry first; its fingerprint is returned.
    pub fn put(
        &self,
        fingerprint: Fingerprint,
        bytes: Arc<Vec<u8>>,
        vector_text: Option<String>,
    ) -> Option<Fingerprint> {
        let entry = CacheEntry {
            fingerprint,
            bytes,
            vector_text,
        };
        let mut guard = self.inner.lock();
        match guard.push(fingerprint, entry) {
            Some((evicted, _)) if evicted != fingerprint => Some(evicted),
            _ => None,
        }
    }

    /// Fingerprints from most- to least-recently-used.
    pub fn keys_by_recency(&self) -> Vec<Fingerprint> {
        self.inner.lock().iter().map(|(k, _)| *k).collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/content.rs"]
mod tests;
