use std::sync::Arc;

use bytes::Bytes;

use crate::StoreKey;
use crate::config::StoreConfig;

/// The uniform store contract.
///
/// Implemented by backing stores (the base store, plain shards, and
/// array-shard children) and by [`ShardedStore`](crate::ShardedStore)
/// itself, so composed stores nest transparently.
///
/// All implementations must satisfy these invariants:
/// - Operations are synchronous and complete fully before returning.
/// - `get` and `delete` report an absent key as [`Error::NotFound`],
///   propagated verbatim through composition.
/// - Errors are propagated, never silently ignored; retry policy belongs
///   to the backing store, not the composition layer.
///
/// [`Error::NotFound`]: crate::Error::NotFound
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Read the value at `key`.
    fn get(&self, key: &StoreKey) -> crate::Result<Bytes>;

    /// Write `value` at `key`, replacing any previous value.
    fn set(&self, key: &StoreKey, value: Bytes) -> crate::Result<()>;

    /// Remove the value at `key`.
    fn delete(&self, key: &StoreKey) -> crate::Result<()>;

    /// Every live key, in the store's stable order.
    fn list(&self) -> crate::Result<Vec<StoreKey>>;

    /// Number of live keys.
    fn len(&self) -> crate::Result<usize>;

    fn is_empty(&self) -> crate::Result<bool> {
        Ok(self.len()? == 0)
    }

    fn is_readable(&self) -> bool {
        true
    }

    fn is_writeable(&self) -> bool {
        true
    }

    fn is_listable(&self) -> bool {
        true
    }

    fn is_erasable(&self) -> bool {
        true
    }

    /// Release any resources held by the store. Further operations are
    /// undefined after closing.
    fn close(&self) -> crate::Result<()> {
        Ok(())
    }

    /// The chunk-coordinate separator this store expects, if it declares
    /// one. Composition fails on a mismatch with the composed store's.
    fn dimension_separator(&self) -> Option<char> {
        None
    }

    /// Self-description for [`describe`](crate::config::describe).
    ///
    /// Stores that cannot be reconstructed from a configuration document
    /// return `None`.
    fn config(&self) -> Option<StoreConfig> {
        None
    }
}

/// Creates the backing store for one shard of an array-sharded array.
///
/// Invoked once per coordinate combination when the array's metadata
/// document is first written (and again on every rewrite of it).
pub trait ShardFactory: Send + Sync {
    /// Build the store holding chunks whose leading coordinate is
    /// `coordinate` (a separator-joined string such as `"0/1"`).
    fn create_for(&self, coordinate: &str) -> crate::Result<Arc<dyn Store>>;
}

impl<F> ShardFactory for F
where
    F: Fn(&str) -> crate::Result<Arc<dyn Store>> + Send + Sync,
{
    fn create_for(&self, coordinate: &str) -> crate::Result<Arc<dyn Store>> {
        self(coordinate)
    }
}
