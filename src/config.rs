use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::store::Store;

/// Declarative description of a store, for cross-process reconstruction.
///
/// `kind` selects a registered [`StorePlugin`]; `location` carries the
/// store's address (a directory, a URL) where one applies; `parameters`
/// holds every other configuration attribute as plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl StoreConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            location: None,
            parameters: serde_json::Map::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// A registered store kind: maps a [`StoreConfig::kind`] string to a
/// constructor. Store implementations register themselves:
///
/// ```ignore
/// inventory::submit! {
///     StorePlugin::new("directory", DirectoryStore::reconstruct)
/// }
/// ```
pub struct StorePlugin {
    kind: &'static str,
    create: fn(&StoreConfig) -> crate::Result<Arc<dyn Store>>,
}

inventory::collect!(StorePlugin);

impl StorePlugin {
    pub const fn new(
        kind: &'static str,
        create: fn(&StoreConfig) -> crate::Result<Arc<dyn Store>>,
    ) -> Self {
        Self { kind, create }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

/// Describe a store as a configuration document.
///
/// Requires the store's [`config`](Store::config) capability; there is
/// no fallback for stores that do not describe themselves.
pub fn describe(store: &dyn Store) -> crate::Result<StoreConfig> {
    store.config().ok_or(Error::ConfigUnsupported)
}

/// Rebuild a store from a configuration document.
///
/// The strict inverse of [`describe`]: the returned store routes every
/// key the described store could resolve to the same component store.
/// Unflushed state of the original's components does not carry over.
pub fn reconstruct(config: &StoreConfig) -> crate::Result<Arc<dyn Store>> {
    for plugin in inventory::iter::<StorePlugin> {
        if plugin.kind == config.kind {
            return (plugin.create)(config);
        }
    }
    Err(Error::ConfigMismatch {
        expected: "a registered store kind".to_string(),
        found: config.kind.clone(),
    })
}
