use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{StoreConfig, StorePlugin, reconstruct};
use crate::mount::{MountTable, Resolution};
use crate::sharding::ArrayShardGroup;
use crate::store::{ShardFactory, Store};
use crate::{Error, StoreKey};

/// Store composed of a base store and additional component stores
/// mounted on subtrees of the key space.
///
/// Keys under a plain shard's mount path go to that shard with the
/// prefix stripped; keys under an array-shard mount go to the child
/// store selected by the leading chunk coordinate; everything else,
/// including all metadata documents, goes to the base store.
///
/// `ShardedStore` implements [`Store`] itself, so composed stores nest.
#[derive(Debug)]
pub struct ShardedStore {
    base: Arc<dyn Store>,
    table: MountTable,
    separator: char,
}

inventory::submit! {
    StorePlugin::new(ShardedStore::KIND, reconstruct_sharded)
}

fn reconstruct_sharded(config: &StoreConfig) -> crate::Result<Arc<dyn Store>> {
    Ok(Arc::new(ShardedStore::from_config(config)?))
}

impl ShardedStore {
    pub const KIND: &'static str = "sharded";

    /// Start composing a store over `base`.
    pub fn builder(base: Arc<dyn Store>) -> ShardedStoreBuilder {
        ShardedStoreBuilder {
            base,
            separator: '/',
            shards: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// The chunk-coordinate separator shared by every component store.
    pub fn separator(&self) -> char {
        self.separator
    }

    /// Route `key` to the store owning it and the key to use there.
    ///
    /// `write_value` is the value about to be written, if any; writing an
    /// array-shard mount's metadata document materializes that mount's
    /// child stores before the route is returned.
    pub fn resolve(
        &self,
        key: &StoreKey,
        write_value: Option<&Bytes>,
    ) -> crate::Result<(Arc<dyn Store>, StoreKey)> {
        match self.table.resolve(key, write_value, self.separator)? {
            Resolution::Base => Ok((self.base.clone(), key.clone())),
            Resolution::Target(store, subkey) => Ok((store, subkey)),
        }
    }

    /// Structurally identical composed store with every leaf store
    /// replaced by `transform(leaf, mount path, coordinate)`.
    ///
    /// The base store is passed with no mount path; plain shards with
    /// their mount path; materialized array-shard children with their
    /// group's mount path and their coordinate string. Groups keep their
    /// dimension count and factory.
    pub fn map_shards<F>(&self, transform: F) -> crate::Result<ShardedStore>
    where
        F: Fn(&Arc<dyn Store>, Option<&StoreKey>, Option<&str>) -> crate::Result<Arc<dyn Store>>,
    {
        let mut builder = Self::builder(transform(&self.base, None, None)?)
            .dimension_separator(self.separator);
        for (path, store) in self.table.shards() {
            builder = builder.shard(path.as_str(), transform(store, Some(path), None)?);
        }
        for group in self.table.groups() {
            let mut children = Vec::new();
            for (coordinate, child) in group.children() {
                let transformed = transform(&child, Some(group.path()), Some(&coordinate))?;
                children.push((coordinate, transformed));
            }
            builder = builder.restore_group(
                group.path().as_str().to_string(),
                group.dims(),
                group.factory(),
                children,
            );
        }
        builder.build()
    }

    /// Every component store: base, plain shards, materialized children.
    fn components(&self) -> Vec<Arc<dyn Store>> {
        let mut stores = vec![self.base.clone()];
        stores.extend(self.table.shards().map(|(_, store)| store.clone()));
        for group in self.table.groups() {
            stores.extend(group.children().into_iter().map(|(_, store)| store));
        }
        stores
    }

    /// Rebuild a composed store from its configuration document.
    ///
    /// The inverse of [`config`](Store::config), registered under the
    /// `"sharded"` kind. Component stores are rebuilt through the store
    /// registry; already-materialized array-shard children come back as
    /// components in their own right.
    pub fn from_config(config: &StoreConfig) -> crate::Result<Self> {
        if config.kind != Self::KIND {
            return Err(Error::ConfigMismatch {
                expected: Self::KIND.to_string(),
                found: config.kind.clone(),
            });
        }
        let parameters: ShardedStoreParameters =
            serde_json::from_value(serde_json::Value::Object(config.parameters.clone()))?;

        let mut builder = Self::builder(reconstruct(&parameters.base)?)
            .dimension_separator(parameters.dimension_separator);
        for (path, shard_config) in &parameters.shards {
            builder = builder.shard(path.as_str(), reconstruct(shard_config)?);
        }
        for (path, group) in &parameters.array_shards {
            let mut children = Vec::new();
            for (coordinate, child_config) in &group.chunk_stores {
                children.push((coordinate.clone(), reconstruct(child_config)?));
            }
            // Factories are not serializable; a reconstructed group routes
            // to its existing children but cannot materialize new ones.
            builder = builder.restore_group(path.clone(), group.dimensions, None, children);
        }
        let store = builder.build()?;
        debug!(
            "reconstructed sharded store with {} shards and {} array-shard mounts",
            parameters.shards.len(),
            parameters.array_shards.len()
        );
        Ok(store)
    }
}

impl Store for ShardedStore {
    fn get(&self, key: &StoreKey) -> crate::Result<Bytes> {
        let (store, subkey) = self.resolve(key, None)?;
        store.get(&subkey)
    }

    fn set(&self, key: &StoreKey, value: Bytes) -> crate::Result<()> {
        let (store, subkey) = self.resolve(key, Some(&value))?;
        store.set(&subkey, value)
    }

    fn delete(&self, key: &StoreKey) -> crate::Result<()> {
        let (store, subkey) = self.resolve(key, None)?;
        store.delete(&subkey)
    }

    /// Base keys first, unmodified, then each plain shard's keys behind
    /// its mount path, in declaration order. Array-shard children hold
    /// chunk payloads only and are not listed; their arrays are visible
    /// through the metadata documents in the base store.
    fn list(&self) -> crate::Result<Vec<StoreKey>> {
        let mut keys = self.base.list()?;
        for (path, store) in self.table.shards() {
            for key in store.list()? {
                keys.push(
                    StoreKey::new(format!("{path}/{key}"))
                        .expect("prefixed key should be valid"),
                );
            }
        }
        Ok(keys)
    }

    /// Live keys in the base store and plain shards. Array-shard
    /// children are excluded, mirroring [`list`](Store::list).
    fn len(&self) -> crate::Result<usize> {
        let mut total = self.base.len()?;
        for (_, store) in self.table.shards() {
            total += store.len()?;
        }
        Ok(total)
    }

    fn is_readable(&self) -> bool {
        self.components().iter().all(|store| store.is_readable())
    }

    fn is_writeable(&self) -> bool {
        self.components().iter().all(|store| store.is_writeable())
    }

    fn is_listable(&self) -> bool {
        self.components().iter().all(|store| store.is_listable())
    }

    fn is_erasable(&self) -> bool {
        self.components().iter().all(|store| store.is_erasable())
    }

    /// Close materialized array-shard children, then plain shards, then
    /// the base store.
    fn close(&self) -> crate::Result<()> {
        for group in self.table.groups() {
            for (_, child) in group.children() {
                child.close()?;
            }
        }
        for (_, store) in self.table.shards() {
            store.close()?;
        }
        self.base.close()
    }

    fn dimension_separator(&self) -> Option<char> {
        Some(self.separator)
    }

    fn config(&self) -> Option<StoreConfig> {
        let mut shards = BTreeMap::new();
        for (path, store) in self.table.shards() {
            shards.insert(path.as_str().to_string(), store.config()?);
        }
        let mut array_shards = BTreeMap::new();
        for group in self.table.groups() {
            let mut chunk_stores = BTreeMap::new();
            for (coordinate, child) in group.children() {
                chunk_stores.insert(coordinate, child.config()?);
            }
            array_shards.insert(
                group.path().as_str().to_string(),
                ArrayShardGroupParameters {
                    dimensions: group.dims(),
                    chunk_stores,
                },
            );
        }
        let parameters = ShardedStoreParameters {
            dimension_separator: self.separator,
            base: self.base.config()?,
            shards,
            array_shards,
        };
        let serde_json::Value::Object(parameters) = serde_json::to_value(parameters).ok()? else {
            return None;
        };
        Some(StoreConfig {
            kind: Self::KIND.to_string(),
            location: None,
            parameters,
        })
    }
}

/// Declarative description of a [`ShardedStore`]'s composition.
#[derive(Debug, Serialize, Deserialize)]
struct ShardedStoreParameters {
    #[serde(default = "default_separator")]
    dimension_separator: char,
    base: StoreConfig,
    #[serde(default)]
    shards: BTreeMap<String, StoreConfig>,
    #[serde(default)]
    array_shards: BTreeMap<String, ArrayShardGroupParameters>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArrayShardGroupParameters {
    dimensions: usize,
    #[serde(default)]
    chunk_stores: BTreeMap<String, StoreConfig>,
}

fn default_separator() -> char {
    '/'
}

/// Builds a [`ShardedStore`]; mount validation happens in
/// [`build`](ShardedStoreBuilder::build).
pub struct ShardedStoreBuilder {
    base: Arc<dyn Store>,
    separator: char,
    shards: Vec<(String, Arc<dyn Store>)>,
    groups: Vec<PendingGroup>,
}

struct PendingGroup {
    path: String,
    dims: usize,
    factory: Option<Arc<dyn ShardFactory>>,
    children: Vec<(String, Arc<dyn Store>)>,
}

impl ShardedStoreBuilder {
    /// Mount `store` on the subtree at `path`.
    pub fn shard(mut self, path: impl Into<String>, store: Arc<dyn Store>) -> Self {
        self.shards.push((path.into(), store));
        self
    }

    /// Mount an array at `path` whose chunks are sharded over the first
    /// `dims` chunk-coordinate dimensions, with `factory` creating the
    /// store for each coordinate combination.
    ///
    /// Shard stores are created when the array's metadata document is
    /// written. Coordinates are encoded one digit per dimension, so each
    /// sharded dimension must have an extent below 10.
    pub fn array_shard(
        mut self,
        path: impl Into<String>,
        dims: usize,
        factory: Arc<dyn ShardFactory>,
    ) -> Self {
        self.groups.push(PendingGroup {
            path: path.into(),
            dims,
            factory: Some(factory),
            children: Vec::new(),
        });
        self
    }

    /// Set the chunk-coordinate separator (default `/`).
    pub fn dimension_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub(crate) fn restore_group(
        mut self,
        path: String,
        dims: usize,
        factory: Option<Arc<dyn ShardFactory>>,
        children: Vec<(String, Arc<dyn Store>)>,
    ) -> Self {
        self.groups.push(PendingGroup {
            path,
            dims,
            factory,
            children,
        });
        self
    }

    /// Validate the mounts and build the composed store.
    pub fn build(self) -> crate::Result<ShardedStore> {
        if !matches!(self.separator, '/' | '.') {
            return Err(Error::InvalidShardConfiguration(format!(
                "dimension separator must be '/' or '.', got '{}'",
                self.separator
            )));
        }
        check_separator(self.separator, self.base.as_ref())?;

        let mut shards = Vec::with_capacity(self.shards.len());
        for (path, store) in self.shards {
            check_separator(self.separator, store.as_ref())?;
            shards.push((StoreKey::new(path)?, store));
        }
        let mut groups = Vec::with_capacity(self.groups.len());
        for pending in self.groups {
            let group = ArrayShardGroup::new(StoreKey::new(pending.path)?, pending.dims, pending.factory)?;
            for (coordinate, child) in pending.children {
                check_separator(self.separator, child.as_ref())?;
                group.insert_child(coordinate, child);
            }
            groups.push(Arc::new(group));
        }

        Ok(ShardedStore {
            base: self.base,
            table: MountTable::new(shards, groups)?,
            separator: self.separator,
        })
    }
}

fn check_separator(separator: char, store: &dyn Store) -> crate::Result<()> {
    if let Some(found) = store.dimension_separator()
        && found != separator
    {
        return Err(Error::SeparatorMismatch {
            expected: separator,
            found,
        });
    }
    Ok(())
}
