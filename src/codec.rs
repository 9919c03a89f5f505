use crate::Error;
use crate::metadata::CodecConfig;

/// A registered chunk-compression codec identifier.
///
/// The composition layer never encodes or decodes chunk payloads; it
/// only checks, while rewriting array metadata for shard children, that
/// the declared compressor resolves to something the ecosystem knows.
/// Downstream crates register their own codecs:
///
/// ```
/// inventory::submit! {
///     shardedstore::codec::CodecPlugin::new("delta")
/// }
/// ```
pub struct CodecPlugin {
    id: &'static str,
}

inventory::collect!(CodecPlugin);

impl CodecPlugin {
    pub const fn new(id: &'static str) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &'static str {
        self.id
    }
}

// Identifiers of the stock numcodecs compressors.
inventory::submit! { CodecPlugin::new("blosc") }
inventory::submit! { CodecPlugin::new("zlib") }
inventory::submit! { CodecPlugin::new("gzip") }
inventory::submit! { CodecPlugin::new("bz2") }
inventory::submit! { CodecPlugin::new("lz4") }
inventory::submit! { CodecPlugin::new("lzma") }
inventory::submit! { CodecPlugin::new("zstd") }

/// Resolve a compressor configuration against the registry.
///
/// `None` (an uncompressed array) always resolves.
pub fn resolve(compressor: Option<&CodecConfig>) -> crate::Result<()> {
    let Some(config) = compressor else {
        return Ok(());
    };
    if inventory::iter::<CodecPlugin>
        .into_iter()
        .any(|plugin| plugin.id == config.id)
    {
        Ok(())
    } else {
        Err(Error::UnknownCodec(config.id.clone()))
    }
}
