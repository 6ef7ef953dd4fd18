//! In-memory cache backend

use super::{CacheError, ClassCache, CACHE_VERSION};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

type Store = FxHashMap<(String, u32), Vec<u8>>;

/// Process-local cache
///
/// Clones and [`MemoryClassCache::with_version`] views share one store.
#[derive(Clone)]
pub struct MemoryClassCache {
    store: Arc<RwLock<Store>>,
    version: u32,
    writing: bool,
}

impl MemoryClassCache {
    /// Create an empty writable cache at [`CACHE_VERSION`]
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(FxHashMap::default())),
            version: CACHE_VERSION,
            writing: true,
        }
    }

    /// View of the same store under another version
    pub fn with_version(&self, version: u32) -> Self {
        Self {
            store: Arc::clone(&self.store),
            version,
            writing: self.writing,
        }
    }

    /// Make `put` a no-op
    pub fn read_only(mut self) -> Self {
        self.writing = false;
        self
    }

    /// Number of entries across all versions
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }
}

impl Default for MemoryClassCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassCache for MemoryClassCache {
    fn get(&self, class_name: &str) -> Option<Vec<u8>> {
        self.store
            .read()
            .get(&(class_name.to_string(), self.version))
            .cloned()
    }

    fn put(&self, class_name: &str, bytes: &[u8]) -> Result<(), CacheError> {
        if self.writing {
            self.store
                .write()
                .insert((class_name.to_string(), self.version), bytes.to_vec());
        }
        Ok(())
    }

    fn is_writing(&self) -> bool {
        self.writing
    }

    fn version(&self) -> u32 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_isolated() {
        let v1 = MemoryClassCache::new();
        let v2 = v1.with_version(CACHE_VERSION + 1);
        v1.put("a.B", b"one").unwrap();
        assert_eq!(v1.get("a.B"), Some(b"one".to_vec()));
        assert_eq!(v2.get("a.B"), None);

        v2.put("a.B", b"two").unwrap();
        assert_eq!(v1.get("a.B"), Some(b"one".to_vec()));
        assert_eq!(v2.get("a.B"), Some(b"two".to_vec()));
        assert_eq!(v1.len(), 2);
    }

    #[test]
    fn test_read_only_ignores_put() {
        let cache = MemoryClassCache::new().read_only();
        assert!(!cache.is_writing());
        cache.put("a.B", b"bytes").unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let cache = MemoryClassCache::new();
        cache.put("a.B", b"first").unwrap();
        cache.put("a.B", b"second").unwrap();
        assert_eq!(cache.get("a.B"), Some(b"second".to_vec()));
    }
}
