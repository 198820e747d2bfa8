//! Identifiers shared by producers and the renderer

use serde::{Deserialize, Serialize};
use strata_core::typed_id;

typed_id! {
    /// Stable numeric id of a distributed scene
    #[derive(Serialize, Deserialize)]
    pub struct SceneId(u64);
}

typed_id! {
    /// A data slot declared by a scene, either providing or consuming a value
    #[derive(Serialize, Deserialize)]
    pub struct DataSlotId(u32);
}

typed_id! {
    /// Scene-local render buffer
    #[derive(Serialize, Deserialize)]
    pub struct RenderBufferHandle(u32);
}

typed_id! {
    /// Scene-local render target (set of render buffers)
    #[derive(Serialize, Deserialize)]
    pub struct RenderTargetHandle(u32);
}

typed_id! {
    /// Scene-local blit pass between two render buffers
    #[derive(Serialize, Deserialize)]
    pub struct BlitPassHandle(u32);
}

typed_id! {
    /// Scene-local mutable data buffer (index, vertex or uniform data)
    #[derive(Serialize, Deserialize)]
    pub struct DataBufferHandle(u32);
}

typed_id! {
    /// Scene-local mutable texture buffer
    #[derive(Serialize, Deserialize)]
    pub struct TextureBufferHandle(u32);
}

typed_id! {
    /// Scene-local vertex array binding an effect to data buffers
    #[derive(Serialize, Deserialize)]
    pub struct VertexArrayHandle(u32);
}

/// Any scene-local resource that maps to a device object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SceneResource {
    RenderBuffer(RenderBufferHandle),
    RenderTarget(RenderTargetHandle),
    BlitPass(BlitPassHandle),
    DataBuffer(DataBufferHandle),
    TextureBuffer(TextureBufferHandle),
    VertexArray(VertexArrayHandle),
}

impl SceneResource {
    /// Short category name used in logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::RenderBuffer(_) => "render buffer",
            Self::RenderTarget(_) => "render target",
            Self::BlitPass(_) => "blit pass",
            Self::DataBuffer(_) => "data buffer",
            Self::TextureBuffer(_) => "texture buffer",
            Self::VertexArray(_) => "vertex array",
        }
    }
}

impl std::fmt::Display for SceneResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let raw = match self {
            Self::RenderBuffer(h) => h.raw(),
            Self::RenderTarget(h) => h.raw(),
            Self::BlitPass(h) => h.raw(),
            Self::DataBuffer(h) => h.raw(),
            Self::TextureBuffer(h) => h.raw(),
            Self::VertexArray(h) => h.raw(),
        };
        write!(f, "{} #{}", self.category(), raw)
    }
}
