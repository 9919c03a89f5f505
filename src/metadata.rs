use bytes::{Buf, Bytes};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Key of the array metadata document, relative to the array's root.
pub const ARRAY_METADATA_KEY: &str = ".zarray";
/// Key of the group metadata document.
pub const GROUP_METADATA_KEY: &str = ".zgroup";
/// Key of the attributes document.
pub const ATTRIBUTES_KEY: &str = ".zattrs";

/// Whether the final segment of `postfix` is a metadata or attributes
/// document (`.zarray`, `.zattrs`, `.zgroup`, ...).
pub(crate) fn is_metadata_document(postfix: &str) -> bool {
    postfix
        .rsplit('/')
        .next()
        .is_some_and(|segment| segment.starts_with('.'))
}

/// A chunked-array metadata document.
///
/// Fields beyond the structured ones are preserved verbatim through
/// decode/encode, so documents written by other tooling round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayMetadata {
    /// Storage format version.
    pub zarr_format: u8,
    /// Array shape, one extent per dimension.
    pub shape: Vec<u64>,
    /// Chunk shape, one size per dimension.
    pub chunks: Vec<u64>,
    /// Data type; a simple string or a structured description.
    pub dtype: serde_json::Value,
    /// Chunk compressor configuration, `None` for uncompressed.
    pub compressor: Option<CodecConfig>,
    #[serde(default)]
    pub fill_value: serde_json::Value,
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<CodecConfig>>,
    /// Separator joining chunk coordinates into chunk keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_separator: Option<char>,
    /// Unstructured remainder of the document.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_order() -> String {
    "C".to_string()
}

/// A codec configuration: an identifier plus codec-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Registry identifier, e.g. `"blosc"`.
    pub id: String,
    /// Codec-specific parameters, passed through untouched.
    #[serde(flatten)]
    pub configuration: serde_json::Map<String, serde_json::Value>,
}

impl ArrayMetadata {
    pub fn from_bytes(bytes: &Bytes) -> crate::Result<Self> {
        Ok(serde_json::from_reader(bytes.clone().reader())?)
    }

    pub fn to_bytes(&self) -> crate::Result<Bytes> {
        Ok(Bytes::from_owner(serde_json::to_vec(self)?))
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Metadata for the lower-dimensional child arrays obtained by
    /// sharding away the first `dims` dimensions.
    ///
    /// The sharded dimensions must have chunk size 1, so that one chunk
    /// coordinate selects exactly one child. The children drop the first
    /// `dims` chunk sizes; their leading extent spans the block of
    /// dimensions `1..=dims` and the remaining extents carry over.
    pub fn child_metadata(&self, dims: usize) -> crate::Result<Self> {
        if self.chunks.len() != self.shape.len() {
            return Err(Error::InvalidShardConfiguration(format!(
                "chunks rank {} does not match shape rank {}",
                self.chunks.len(),
                self.shape.len()
            )));
        }
        if dims == 0 || dims >= self.ndim() {
            return Err(Error::InvalidShardConfiguration(format!(
                "cannot shard {dims} of {} dimensions",
                self.ndim()
            )));
        }
        for (dim, &chunk_size) in self.chunks[..dims].iter().enumerate() {
            if chunk_size != 1 {
                return Err(Error::InvalidShardConfiguration(format!(
                    "sharded dimension {dim} has chunk size {chunk_size}, must be 1"
                )));
            }
        }

        let mut shape = Vec::with_capacity(self.ndim() - dims);
        shape.push(self.shape[1..=dims].iter().product());
        shape.extend_from_slice(&self.shape[dims + 1..]);

        let mut child = self.clone();
        child.shape = shape;
        child.chunks = self.chunks[dims..].to_vec();
        Ok(child)
    }

    /// Extents of the first `dims` dimensions; with chunk size 1 in each,
    /// these are the per-dimension shard counts.
    pub fn shard_counts(&self, dims: usize) -> &[u64] {
        &self.shape[..dims]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(shape: &[u64], chunks: &[u64]) -> ArrayMetadata {
        serde_json::from_value(json!({
            "zarr_format": 2,
            "shape": shape,
            "chunks": chunks,
            "dtype": "<f8",
            "compressor": {"id": "blosc", "cname": "lz4", "clevel": 5},
            "fill_value": 0.0,
            "order": "C",
        }))
        .unwrap()
    }

    #[test]
    fn child_metadata_collapses_sharded_dims() {
        let child = meta(&[2, 3, 8], &[1, 1, 4]).child_metadata(2).unwrap();
        assert_eq!(child.shape, vec![24]);
        assert_eq!(child.chunks, vec![4]);
        assert_eq!(child.compressor.as_ref().unwrap().id, "blosc");
    }

    #[test]
    fn child_metadata_keeps_trailing_dims() {
        let child = meta(&[2, 4, 6, 10], &[1, 2, 3, 5]).child_metadata(1).unwrap();
        assert_eq!(child.shape, vec![4, 6, 10]);
        assert_eq!(child.chunks, vec![2, 3, 5]);
    }

    #[test]
    fn rejects_non_unit_sharded_chunks() {
        let err = meta(&[2, 3, 8], &[1, 2, 4]).child_metadata(2).unwrap_err();
        assert!(matches!(err, Error::InvalidShardConfiguration(_)));
    }

    #[test]
    fn rejects_rank_overflow() {
        let err = meta(&[2, 3], &[1, 1]).child_metadata(2).unwrap_err();
        assert!(matches!(err, Error::InvalidShardConfiguration(_)));
    }

    #[test]
    fn preserves_unknown_fields() {
        let mut m = meta(&[4, 8], &[1, 4]);
        m.extra
            .insert("provenance".to_string(), json!({"tool": "imgproc"}));
        let bytes = m.to_bytes().unwrap();
        let back = ArrayMetadata::from_bytes(&bytes).unwrap();
        assert_eq!(back.extra.get("provenance"), m.extra.get("provenance"));
        assert_eq!(back.dimension_separator, None);
    }

    #[test]
    fn metadata_document_names() {
        assert!(is_metadata_document(".zarray"));
        assert!(is_metadata_document(".zattrs"));
        assert!(is_metadata_document("nested/.zgroup"));
        assert!(!is_metadata_document("0/1"));
        assert!(!is_metadata_document("0/1/2"));
    }
}
