use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized store key: a relative, `/`-delimited path.
///
/// No leading or trailing separator, no empty segments, no `.` or `..`
/// segments. Case is preserved. Mount paths use the same normal form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreKey(String);

impl StoreKey {
    /// Normalize and validate a key.
    pub fn new(key: impl AsRef<str>) -> crate::Result<Self> {
        let raw = key.as_ref();
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Err(crate::Error::invalid_key(raw, "empty key"));
        }
        for segment in trimmed.split('/') {
            match segment {
                "" => return Err(crate::Error::invalid_key(raw, "empty segment")),
                "." | ".." => {
                    return Err(crate::Error::invalid_key(raw, "relative segment"));
                }
                _ => {}
            }
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key length in bytes; mount-table lookup indexes by this.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `self` is a strict ancestor of `other`, i.e. `other` lies
    /// inside `self`'s subtree. Equal paths are not ancestors.
    pub fn is_ancestor_of(&self, other: &StoreKey) -> bool {
        other.0.len() > self.0.len() + 1
            && other.0.as_bytes()[self.0.len()] == b'/'
            && other.0.as_bytes()[..self.0.len()] == *self.0.as_bytes()
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StoreKey {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StoreKey> for String {
    fn from(value: StoreKey) -> Self {
        value.0
    }
}

impl AsRef<str> for StoreKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
