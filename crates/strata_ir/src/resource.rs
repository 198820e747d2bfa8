//! Client resources identified by content hash
//!
//! Effects, index/vertex arrays and textures are immutable. Two scenes that
//! use the same bytes reference the same [`ResourceContentHash`] and share a
//! single device upload.

use serde::{Deserialize, Serialize};
use strata_core::{fnv1a_64, fnv1a_64_extend, typed_id};

typed_id! {
    /// Identity of an immutable client resource
    #[derive(Serialize, Deserialize)]
    pub struct ResourceContentHash(u64);
}

impl ResourceContentHash {
    /// Hash a resource's kind and bytes
    pub fn of(kind: ResourceKind, data: &[u8]) -> Self {
        let seed = fnv1a_64(&[kind as u8]);
        Self(fnv1a_64_extend(seed, data))
    }
}

/// Kind of client resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResourceKind {
    /// Shader program source, compiled off the update thread
    Effect = 0,
    /// Index data
    IndexArray = 1,
    /// Vertex attribute data
    VertexArray = 2,
    /// Texture pixel data
    Texture = 3,
}

impl ResourceKind {
    /// Whether uploads of this kind go through the async uploader
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Effect)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Effect => write!(f, "effect"),
            Self::IndexArray => write!(f, "index array"),
            Self::VertexArray => write!(f, "vertex array"),
            Self::Texture => write!(f, "texture"),
        }
    }
}

/// An immutable client resource with its data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Content hash (kind + data)
    pub hash: ResourceContentHash,
    /// Kind of resource
    pub kind: ResourceKind,
    /// Debug name
    pub name: String,
    /// Raw bytes (effect source, array data, pixels)
    pub data: Vec<u8>,
}

impl ResourceDescriptor {
    /// Create a descriptor, computing its content hash
    pub fn new(kind: ResourceKind, name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            hash: ResourceContentHash::of(kind, &data),
            kind,
            name: name.into(),
            data,
        }
    }

    /// Create an effect descriptor from shader source
    pub fn effect(name: impl Into<String>, source: &str) -> Self {
        Self::new(ResourceKind::Effect, name, source.as_bytes().to_vec())
    }

    /// Size of the payload in bytes
    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_depends_on_kind_and_data() {
        let a = ResourceDescriptor::new(ResourceKind::Texture, "a", vec![1, 2, 3]);
        let b = ResourceDescriptor::new(ResourceKind::Texture, "b", vec![1, 2, 3]);
        let c = ResourceDescriptor::new(ResourceKind::IndexArray, "c", vec![1, 2, 3]);

        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
        assert_eq!(a.byte_size(), 3);
    }

    #[test]
    fn test_effect_is_async() {
        let effect = ResourceDescriptor::effect("flat", "void main() {}");
        assert!(effect.kind.is_async());
        assert!(!ResourceKind::Texture.is_async());
    }
}
