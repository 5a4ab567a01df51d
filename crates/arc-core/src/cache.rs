//! Version-stamped resource cache.
//!
//! One stamp covers the whole manifest. A persisted stamp at or above the
//! declared version means every resource is served from the store; anything
//! else overwrites the stamp and every resource is fetched again.

use crate::storage::KeyValueStore;
use crate::types::{ArcResult, Version};

/// Store key holding the persisted version stamp.
pub const VERSION_KEY: &str = "file_version";

/// Manifest-wide cache over a flat key/value store.
#[derive(Debug)]
pub struct VersionedCache<S> {
    store: S,
}

impl<S: KeyValueStore> VersionedCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The stamp currently persisted, if any. Unparseable stamps count as absent.
    pub fn persisted_version(&self) -> Option<Version> {
        self.store
            .get(VERSION_KEY)
            .and_then(|raw| Version::parse(&raw).ok())
    }

    /// Whether previously persisted content may be served for `declared`.
    pub fn is_valid(&self, declared: Version) -> bool {
        self.persisted_version()
            .is_some_and(|persisted| persisted >= declared)
    }

    pub fn record_version(&mut self, declared: Version) -> ArcResult<()> {
        self.store.set(VERSION_KEY, declared.to_string())
    }

    /// Boot-time decision: `true` to serve from the store, `false` after
    /// stamping `declared` so the caller refetches everything.
    pub fn check(&mut self, declared: Version) -> ArcResult<bool> {
        if self.is_valid(declared) {
            tracing::debug!("Cache valid for version {declared}");
            return Ok(true);
        }
        tracing::info!(
            "Cache stale (persisted {:?}, declared {declared}); refetching",
            self.persisted_version().map(|v| v.0)
        );
        self.record_version(declared)?;
        Ok(false)
    }

    pub fn get(&self, cache_key: &str) -> Option<String> {
        self.store.get(cache_key)
    }

    pub fn put(&mut self, cache_key: &str, content: String) -> ArcResult<()> {
        self.store.set(cache_key, content)
    }

    /// Number of cached resources, excluding the version stamp.
    pub fn entry_count(&self) -> usize {
        self.store
            .keys()
            .iter()
            .filter(|k| k.as_str() != VERSION_KEY)
            .count()
    }

    /// Wipe the whole namespace, stamp included.
    pub fn clear(&mut self) -> ArcResult<()> {
        self.store.clear()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_empty_store_is_stale() {
        let mut cache = VersionedCache::new(MemoryStore::new());
        assert!(!cache.is_valid(Version(1.0)));
        assert!(!cache.check(Version(1.0)).unwrap());
        assert_eq!(cache.persisted_version(), Some(Version(1.0)));
    }

    #[test]
    fn test_same_or_older_declared_version_is_valid() {
        let mut cache = VersionedCache::new(MemoryStore::new());
        cache.record_version(Version(5.0)).unwrap();
        assert!(cache.check(Version(5.0)).unwrap());
        assert!(cache.check(Version(4.0)).unwrap());
        assert_eq!(cache.persisted_version(), Some(Version(5.0)));
    }

    #[test]
    fn test_bump_invalidates_everything() {
        let mut cache = VersionedCache::new(MemoryStore::new());
        cache.record_version(Version(1.0)).unwrap();
        cache.put("file_a_js", "a".to_string()).unwrap();
        cache.put("file_b_css", "b".to_string()).unwrap();

        assert!(!cache.check(Version(2.0)).unwrap());
        assert_eq!(cache.persisted_version(), Some(Version(2.0)));
        // Content stays in place; it is overwritten by the refetch.
        assert_eq!(cache.get("file_a_js").as_deref(), Some("a"));
        assert_eq!(cache.entry_count(), 2);
    }

    #[test]
    fn test_fractional_stamps_compare_numerically() {
        let mut cache = VersionedCache::new(MemoryStore::new());
        cache.record_version(Version(1.5)).unwrap();
        assert!(cache.check(Version(1.2)).unwrap());

        let mut cache = VersionedCache::new(MemoryStore::new());
        cache.record_version(Version(1.2)).unwrap();
        assert!(!cache.check(Version(1.5)).unwrap());
        assert_eq!(cache.persisted_version(), Some(Version(1.5)));
    }

    #[test]
    fn test_garbage_stamp_counts_as_absent() {
        let mut store = MemoryStore::new();
        store.set(VERSION_KEY, "not-a-version".to_string()).unwrap();
        let cache = VersionedCache::new(store);
        assert_eq!(cache.persisted_version(), None);
        assert!(!cache.is_valid(Version(0.0)));
    }

    #[test]
    fn test_clear() {
        let mut cache = VersionedCache::new(MemoryStore::new());
        cache.record_version(Version(3.0)).unwrap();
        cache.put("file_a_js", "a".to_string()).unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.persisted_version(), None);
        assert_eq!(cache.entry_count(), 0);
    }
}
