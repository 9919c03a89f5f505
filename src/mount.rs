use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use log::trace;

use crate::sharding::{ArrayShardGroup, GroupResolution};
use crate::store::Store;
use crate::{Error, StoreKey};

#[derive(Debug)]
enum Mount {
    Shard(Arc<dyn Store>),
    Group(Arc<ArrayShardGroup>),
}

/// Where the mount table routed a key.
pub(crate) enum Resolution {
    /// Unclaimed by any mount; the caller's base store owns it.
    Base,
    Target(Arc<dyn Store>, StoreKey),
}

/// Non-overlapping subtree mounts with longest-applicable-prefix lookup.
///
/// Mount-path strings are indexed by length: a key can only sit under a
/// mount of length `L` if it extends past `L` with a separator at
/// position `L`, so lookup probes each distinct length instead of
/// scanning mounts in sorted order. Keys no longer than the shortest
/// mount path cannot sit under any mount at all.
#[derive(Debug)]
pub(crate) struct MountTable {
    by_path: HashMap<String, Mount>,
    shards: Vec<(StoreKey, Arc<dyn Store>)>,
    groups: Vec<Arc<ArrayShardGroup>>,
    lengths: BTreeSet<usize>,
    min_len: usize,
}

impl MountTable {
    pub(crate) fn new(
        shards: Vec<(StoreKey, Arc<dyn Store>)>,
        groups: Vec<Arc<ArrayShardGroup>>,
    ) -> crate::Result<Self> {
        let paths: Vec<&StoreKey> = shards
            .iter()
            .map(|(path, _)| path)
            .chain(groups.iter().map(|group| group.path()))
            .collect();
        for (index, outer) in paths.iter().enumerate() {
            for (other, inner) in paths.iter().enumerate() {
                if index != other && outer.is_ancestor_of(inner) {
                    return Err(Error::OverlappingMount {
                        outer: outer.to_string(),
                        inner: inner.to_string(),
                    });
                }
            }
        }

        let mut by_path = HashMap::with_capacity(paths.len());
        let mut lengths = BTreeSet::new();
        for (path, store) in &shards {
            if by_path
                .insert(path.to_string(), Mount::Shard(store.clone()))
                .is_some()
            {
                return Err(Error::OverlappingMount {
                    outer: path.to_string(),
                    inner: path.to_string(),
                });
            }
            lengths.insert(path.len());
        }
        for group in &groups {
            let path = group.path();
            if by_path
                .insert(path.to_string(), Mount::Group(group.clone()))
                .is_some()
            {
                return Err(Error::OverlappingMount {
                    outer: path.to_string(),
                    inner: path.to_string(),
                });
            }
            lengths.insert(path.len());
        }

        // With no mounts at all, every key belongs to the base store.
        let min_len = lengths.iter().next().copied().unwrap_or(usize::MAX);
        Ok(Self {
            by_path,
            shards,
            groups,
            lengths,
            min_len,
        })
    }

    /// Plain shards in declaration order.
    pub(crate) fn shards(&self) -> impl Iterator<Item = (&StoreKey, &Arc<dyn Store>)> {
        self.shards.iter().map(|(path, store)| (path, store))
    }

    /// Array-shard groups in declaration order.
    pub(crate) fn groups(&self) -> impl Iterator<Item = &Arc<ArrayShardGroup>> {
        self.groups.iter()
    }

    /// Route `key` to the mount owning it, if any.
    ///
    /// A write value is threaded through so that an array-shard group can
    /// materialize its children when the value is the group's array
    /// metadata document.
    pub(crate) fn resolve(
        &self,
        key: &StoreKey,
        write_value: Option<&Bytes>,
        separator: char,
    ) -> crate::Result<Resolution> {
        if key.len() <= self.min_len {
            return Ok(Resolution::Base);
        }
        for &length in &self.lengths {
            // A mount of this length needs a separator boundary at
            // `length` and a non-empty remainder behind it.
            if key.len() <= length + 1 {
                continue;
            }
            if key.as_str().as_bytes()[length] != b'/' {
                continue;
            }
            let Some(prefix) = key.as_str().get(..length) else {
                continue;
            };
            match self.by_path.get(prefix) {
                Some(Mount::Shard(store)) => {
                    trace!("key '{key}' resolved to shard '{prefix}'");
                    let subkey = StoreKey::new(&key.as_str()[length + 1..])?;
                    return Ok(Resolution::Target(store.clone(), subkey));
                }
                Some(Mount::Group(group)) => {
                    return match group.resolve(key, write_value, separator)? {
                        GroupResolution::Base => Ok(Resolution::Base),
                        GroupResolution::Child(store, subkey) => {
                            Ok(Resolution::Target(store, subkey))
                        }
                    };
                }
                None => {}
            }
        }
        Ok(Resolution::Base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn shard(path: &str) -> (StoreKey, Arc<dyn Store>) {
        (StoreKey::new(path).unwrap(), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn rejects_nested_mounts() {
        let err = MountTable::new(vec![shard("simulation"), shard("simulation/fine")], vec![])
            .unwrap_err();
        assert!(matches!(err, Error::OverlappingMount { .. }));
    }

    #[test]
    fn rejects_duplicate_mounts() {
        let err = MountTable::new(vec![shard("people"), shard("people")], vec![]).unwrap_err();
        assert!(matches!(err, Error::OverlappingMount { .. }));
    }

    #[test]
    fn duplicate_across_mount_kinds_rejected() {
        let group = Arc::new(
            ArrayShardGroup::new(StoreKey::new("people").unwrap(), 1, None).unwrap(),
        );
        let err = MountTable::new(vec![shard("people")], vec![group]).unwrap_err();
        assert!(matches!(err, Error::OverlappingMount { .. }));
    }

    #[test]
    fn disjoint_and_prefix_sharing_mounts_accepted() {
        let table = MountTable::new(vec![shard("people"), shard("peoplex")], vec![]).unwrap();
        let key = StoreKey::new("peoplex/x").unwrap();
        assert!(matches!(
            table.resolve(&key, None, '/').unwrap(),
            Resolution::Target(_, _)
        ));
    }

    #[test]
    fn short_keys_bypass_to_base() {
        let table = MountTable::new(vec![shard("people")], vec![]).unwrap();
        for key in ["test", "t/e", "people", "peop"] {
            let key = StoreKey::new(key).unwrap();
            assert!(matches!(
                table.resolve(&key, None, '/').unwrap(),
                Resolution::Base
            ));
        }
    }

    #[test]
    fn sibling_with_shared_prefix_goes_to_base() {
        let table = MountTable::new(vec![shard("people")], vec![]).unwrap();
        let key = StoreKey::new("peoplex/x").unwrap();
        assert!(matches!(
            table.resolve(&key, None, '/').unwrap(),
            Resolution::Base
        ));
    }
}
