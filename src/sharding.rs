use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use log::{debug, trace};

use crate::codec;
use crate::metadata::{ARRAY_METADATA_KEY, ArrayMetadata, is_metadata_document};
use crate::store::{ShardFactory, Store};
use crate::{Error, StoreKey};

/// A mount whose array is split across child stores selected by the
/// leading chunk-coordinate dimensions.
///
/// Children do not exist until the array's metadata document is written
/// through the composed store; every rewrite of that document replaces
/// them wholesale.
pub struct ArrayShardGroup {
    path: StoreKey,
    dims: usize,
    factory: Option<Arc<dyn ShardFactory>>,
    children: RwLock<BTreeMap<String, Arc<dyn Store>>>,
}

/// Where a key under an array-shard mount lands.
pub(crate) enum GroupResolution {
    /// Metadata documents and not-yet-materialized coordinates stay in
    /// the base store under the unstripped key.
    Base,
    Child(Arc<dyn Store>, StoreKey),
}

impl ArrayShardGroup {
    pub(crate) fn new(
        path: StoreKey,
        dims: usize,
        factory: Option<Arc<dyn ShardFactory>>,
    ) -> crate::Result<Self> {
        if dims == 0 {
            return Err(Error::InvalidShardConfiguration(format!(
                "array-shard mount '{path}' must shard at least one dimension"
            )));
        }
        Ok(Self {
            path,
            dims,
            factory,
            children: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn path(&self) -> &StoreKey {
        &self.path
    }

    /// Number of leading chunk-coordinate dimensions selecting a child.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Length of the coordinate part of a chunk key: one digit plus one
    /// separator per sharded dimension, except the last.
    fn shard_path_len(&self) -> usize {
        2 * self.dims - 1
    }

    pub(crate) fn factory(&self) -> Option<Arc<dyn ShardFactory>> {
        self.factory.clone()
    }

    /// The materialized child for `coordinate`, if any.
    pub fn child(&self, coordinate: &str) -> Option<Arc<dyn Store>> {
        self.children
            .read()
            .expect("lock poisoned")
            .get(coordinate)
            .cloned()
    }

    /// Every materialized child with its coordinate, in coordinate order.
    pub fn children(&self) -> Vec<(String, Arc<dyn Store>)> {
        self.children
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(coordinate, store)| (coordinate.clone(), store.clone()))
            .collect()
    }

    pub(crate) fn insert_child(&self, coordinate: String, store: Arc<dyn Store>) {
        self.children
            .write()
            .expect("lock poisoned")
            .insert(coordinate, store);
    }

    /// Route `key` (which must lie under this mount) to its destination,
    /// materializing children first when `write_value` carries the array
    /// metadata document.
    pub(crate) fn resolve(
        &self,
        key: &StoreKey,
        write_value: Option<&Bytes>,
        separator: char,
    ) -> crate::Result<GroupResolution> {
        let prefix_len = self.path.len() + 1;
        if prefix_len + self.shard_path_len() >= key.len() {
            return Err(Error::InsufficientChunkDimensions {
                key: key.to_string(),
                dims: self.dims,
            });
        }
        let postfix = &key.as_str()[prefix_len..];

        if is_metadata_document(postfix) {
            if postfix == ARRAY_METADATA_KEY
                && let Some(value) = write_value
            {
                self.materialize(separator, value)?;
            }
            return Ok(GroupResolution::Base);
        }

        // An ASCII separator at the boundary also guarantees the slice
        // below lands on a character boundary.
        if postfix.as_bytes()[self.shard_path_len()] != separator as u8 {
            return Ok(GroupResolution::Base);
        }
        let coordinate = &postfix[..self.shard_path_len()];
        match self.child(coordinate) {
            Some(child) => {
                let subkey = StoreKey::new(&postfix[self.shard_path_len() + 1..])?;
                Ok(GroupResolution::Child(child, subkey))
            }
            None => {
                trace!("no shard '{coordinate}' under '{}', trying base", self.path);
                Ok(GroupResolution::Base)
            }
        }
    }

    /// Create one child store per coordinate combination and seed each
    /// with the rewritten metadata document.
    ///
    /// Replaces existing children. If creating or seeding the Nth child
    /// fails, the earlier children stay in place; there is no rollback.
    fn materialize(&self, separator: char, value: &Bytes) -> crate::Result<()> {
        let meta = ArrayMetadata::from_bytes(value)?;
        let child_meta = meta.child_metadata(self.dims)?;
        codec::resolve(meta.compressor.as_ref())?;
        let factory = self.factory.as_ref().ok_or_else(|| {
            Error::InvalidShardConfiguration(format!(
                "array-shard mount '{}' has no shard factory",
                self.path
            ))
        })?;

        let encoded = child_meta.to_bytes()?;
        let meta_key =
            StoreKey::new(ARRAY_METADATA_KEY).expect("metadata document key should be valid");
        let coordinates = coordinate_strings(meta.shard_counts(self.dims), separator);
        for coordinate in coordinates {
            let child = factory.create_for(&coordinate)?;
            if let Some(found) = child.dimension_separator()
                && found != separator
            {
                return Err(Error::SeparatorMismatch {
                    expected: separator,
                    found,
                });
            }
            child.set(&meta_key, encoded.clone())?;
            self.insert_child(coordinate, child);
        }

        debug!(
            "materialized {} shard stores under '{}'",
            self.children.read().expect("lock poisoned").len(),
            self.path
        );
        Ok(())
    }
}

impl std::fmt::Debug for ArrayShardGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayShardGroup")
            .field("path", &self.path)
            .field("dims", &self.dims)
            .field(
                "children",
                &self.children.read().expect("lock poisoned").len(),
            )
            .finish()
    }
}

/// Separator-joined coordinate strings for the Cartesian product of
/// `0..count` per dimension, last dimension varying fastest.
fn coordinate_strings(counts: &[u64], separator: char) -> Vec<String> {
    let mut coordinates = vec![String::new()];
    for &count in counts {
        let mut next = Vec::with_capacity(coordinates.len() * count as usize);
        for prefix in &coordinates {
            for index in 0..count {
                let mut coordinate = prefix.clone();
                if !coordinate.is_empty() {
                    coordinate.push(separator);
                }
                coordinate.push_str(&index.to_string());
                next.push(coordinate);
            }
        }
        coordinates = next;
    }
    coordinates
}
