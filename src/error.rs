pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// One mount path sits inside another's subtree (or duplicates it).
    #[error("mount '{inner}' overlaps mount '{outer}' -- not supported")]
    OverlappingMount { outer: String, inner: String },

    /// The key is not a normalized relative path.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// The key is absent from the store it resolved to.
    #[error("key not found: {0}")]
    NotFound(String),

    /// A key under an array-shard mount is too short to carry both a
    /// shard coordinate and a chunk remainder.
    #[error("key '{key}' does not have enough chunk dimensions for {dims} sharded dimensions")]
    InsufficientChunkDimensions { key: String, dims: usize },

    /// The array metadata cannot be sharded as configured.
    #[error("invalid shard configuration: {0}")]
    InvalidShardConfiguration(String),

    /// A child store declares a dimension separator other than the
    /// composed store's.
    #[error("dimension separator mismatch: store uses '{found}', expected '{expected}'")]
    SeparatorMismatch { expected: char, found: char },

    /// A configuration document does not describe the expected store kind.
    #[error("configuration describes store kind '{found}', expected {expected}")]
    ConfigMismatch { expected: String, found: String },

    /// The compressor names a codec absent from the registry.
    #[error("unknown codec id: {0}")]
    UnknownCodec(String),

    /// The store does not expose a configuration description.
    #[error("store does not provide a configuration description")]
    ConfigUnsupported,

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
