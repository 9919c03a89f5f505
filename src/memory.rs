use std::collections::BTreeMap;
use std::sync::RwLock;

use bytes::Bytes;

use crate::config::{StoreConfig, StorePlugin};
use crate::store::Store;
use crate::{Error, StoreKey};

/// In-memory, `BTreeMap`-based store.
///
/// Intended for tests and embedding, and the reference implementation of
/// the configuration round-trip: it is registered under the `"memory"`
/// kind. Keys iterate in lexicographic order.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<StoreKey, Bytes>>,
}

inventory::submit! {
    StorePlugin::new(MemoryStore::KIND, MemoryStore::reconstruct)
}

impl MemoryStore {
    pub const KIND: &'static str = "memory";

    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn reconstruct(config: &StoreConfig) -> crate::Result<std::sync::Arc<dyn Store>> {
        if config.kind != Self::KIND {
            return Err(Error::ConfigMismatch {
                expected: Self::KIND.to_string(),
                found: config.kind.clone(),
            });
        }
        Ok(std::sync::Arc::new(Self::new()))
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &StoreKey) -> crate::Result<Bytes> {
        let map = self.entries.read().expect("lock poisoned");
        map.get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn set(&self, key: &StoreKey, value: Bytes) -> crate::Result<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        map.insert(key.clone(), value);
        Ok(())
    }

    fn delete(&self, key: &StoreKey) -> crate::Result<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        map.remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn list(&self) -> crate::Result<Vec<StoreKey>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.keys().cloned().collect())
    }

    fn len(&self) -> crate::Result<usize> {
        Ok(self.entries.read().expect("lock poisoned").len())
    }

    fn config(&self) -> Option<StoreConfig> {
        Some(StoreConfig::new(Self::KIND))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entries.read().expect("lock poisoned").len();
        f.debug_struct("MemoryStore").field("keys", &count).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let store = MemoryStore::new();
        let key = StoreKey::new("a/b").unwrap();
        store.set(&key, Bytes::from_static(b"v")).unwrap();
        assert_eq!(store.get(&key).unwrap(), Bytes::from_static(b"v"));
        assert_eq!(store.len().unwrap(), 1);
        store.delete(&key).unwrap();
        assert!(matches!(store.get(&key), Err(Error::NotFound(_))));
        assert!(matches!(store.delete(&key), Err(Error::NotFound(_))));
    }

    #[test]
    fn lists_in_order() {
        let store = MemoryStore::new();
        for k in ["b", "a/x", "a"] {
            store
                .set(&StoreKey::new(k).unwrap(), Bytes::new())
                .unwrap();
        }
        let keys: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(keys, vec!["a", "a/x", "b"]);
    }
}
