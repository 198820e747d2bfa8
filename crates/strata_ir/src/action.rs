//! Scene actions - declarative structural changes to a scene
//!
//! An action is a single operation a producer wants performed on its scene.
//! Actions are collected into flushes and applied atomically, in order.

use crate::ids::{
    BlitPassHandle, DataBufferHandle, DataSlotId, RenderBufferHandle, RenderTargetHandle,
    SceneResource, TextureBufferHandle, VertexArrayHandle,
};
use crate::resource::ResourceContentHash;
use crate::value::{DataValue, DataValueType};
use serde::{Deserialize, Serialize};

/// Pixel format of render and texture buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferFormat {
    R8,
    Rg8,
    Rgb8,
    Rgba8,
    Rgba16F,
    Rgba32F,
    Depth24,
    Depth24Stencil8,
    Depth32,
}

impl BufferFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::R8 => 1,
            Self::Rg8 => 2,
            Self::Rgb8 => 3,
            Self::Rgba8 | Self::Depth24 | Self::Depth24Stencil8 | Self::Depth32 => 4,
            Self::Rgba16F => 8,
            Self::Rgba32F => 16,
        }
    }

    /// Whether this is a depth (or depth-stencil) format
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth24 | Self::Depth24Stencil8 | Self::Depth32)
    }
}

/// How the renderer may access a render buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferAccess {
    /// Render-to only, never sampled (can live in transient memory)
    WriteOnly,
    /// Rendered to and sampled
    ReadWrite,
}

/// Properties of a render buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderBufferProperties {
    pub width: u32,
    pub height: u32,
    pub format: BufferFormat,
    pub access: BufferAccess,
    pub sample_count: u32,
}

impl RenderBufferProperties {
    /// Color buffer with a single sample
    pub fn color(width: u32, height: u32, access: BufferAccess) -> Self {
        Self {
            width,
            height,
            format: BufferFormat::Rgba8,
            access,
            sample_count: 1,
        }
    }

    /// Depth buffer with a single sample
    pub fn depth(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: BufferFormat::Depth24Stencil8,
            access: BufferAccess::WriteOnly,
            sample_count: 1,
        }
    }

    /// Device memory the buffer occupies
    pub fn byte_size(&self) -> u64 {
        self.width as u64
            * self.height as u64
            * self.format.bytes_per_pixel() as u64
            * self.sample_count.max(1) as u64
    }
}

/// Kind of data held by a data buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataBufferKind {
    Index,
    Vertex,
    Uniform,
}

/// Properties of a texture buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureBufferProperties {
    pub format: BufferFormat,
    /// (width, height) of each mip level, largest first
    pub mip_sizes: Vec<(u32, u32)>,
}

impl TextureBufferProperties {
    /// Device memory for all mip levels
    pub fn byte_size(&self) -> u64 {
        let bpp = self.format.bytes_per_pixel() as u64;
        self.mip_sizes
            .iter()
            .map(|&(w, h)| w as u64 * h as u64 * bpp)
            .sum()
    }

    /// Byte size of a single mip level
    pub fn mip_byte_size(&self, mip: u32) -> Option<u64> {
        let (w, h) = *self.mip_sizes.get(mip as usize)?;
        Some(w as u64 * h as u64 * self.format.bytes_per_pixel() as u64)
    }
}

/// Role of a data slot in cross-scene linking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSlotKind {
    DataProvider,
    DataConsumer,
    TransformationProvider,
    TransformationConsumer,
    TextureProvider,
    TextureConsumer,
}

impl DataSlotKind {
    /// Whether other scenes can link to this slot
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            Self::DataProvider | Self::TransformationProvider | Self::TextureProvider
        )
    }

    /// Whether this slot can be bound to a provider
    pub fn is_consumer(&self) -> bool {
        !self.is_provider()
    }

    /// The consumer kind a provider of this kind links to
    pub fn matching_consumer(&self) -> Option<DataSlotKind> {
        match self {
            Self::DataProvider => Some(Self::DataConsumer),
            Self::TransformationProvider => Some(Self::TransformationConsumer),
            Self::TextureProvider => Some(Self::TextureConsumer),
            _ => None,
        }
    }

    /// Whether a value of `ty` can live in a slot of this kind
    pub fn accepts(&self, ty: DataValueType) -> bool {
        match self {
            Self::DataProvider | Self::DataConsumer => {
                !matches!(ty, DataValueType::Texture)
            }
            Self::TransformationProvider | Self::TransformationConsumer => {
                ty == DataValueType::Mat4
            }
            Self::TextureProvider | Self::TextureConsumer => ty == DataValueType::Texture,
        }
    }
}

/// A single structural change to a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneAction {
    AllocateRenderBuffer {
        handle: RenderBufferHandle,
        properties: RenderBufferProperties,
    },
    ReleaseRenderBuffer {
        handle: RenderBufferHandle,
    },
    AllocateRenderTarget {
        handle: RenderTargetHandle,
        buffers: Vec<RenderBufferHandle>,
    },
    ReleaseRenderTarget {
        handle: RenderTargetHandle,
    },
    AllocateBlitPass {
        handle: BlitPassHandle,
        source: RenderBufferHandle,
        destination: RenderBufferHandle,
    },
    ReleaseBlitPass {
        handle: BlitPassHandle,
    },
    AllocateDataBuffer {
        handle: DataBufferHandle,
        kind: DataBufferKind,
        max_size_bytes: u32,
    },
    UpdateDataBuffer {
        handle: DataBufferHandle,
        offset: u32,
        data: Vec<u8>,
    },
    ReleaseDataBuffer {
        handle: DataBufferHandle,
    },
    AllocateTextureBuffer {
        handle: TextureBufferHandle,
        properties: TextureBufferProperties,
    },
    UpdateTextureBuffer {
        handle: TextureBufferHandle,
        mip: u32,
        data: Vec<u8>,
    },
    ReleaseTextureBuffer {
        handle: TextureBufferHandle,
    },
    AllocateVertexArray {
        handle: VertexArrayHandle,
        effect: ResourceContentHash,
        index_buffer: Option<DataBufferHandle>,
        vertex_buffers: Vec<DataBufferHandle>,
    },
    ReleaseVertexArray {
        handle: VertexArrayHandle,
    },
    CreateDataSlot {
        slot: DataSlotId,
        kind: DataSlotKind,
        value: DataValue,
    },
    DestroyDataSlot {
        slot: DataSlotId,
    },
    SetDataValue {
        slot: DataSlotId,
        value: DataValue,
    },
}

impl SceneAction {
    /// The scene resource this action allocates, if any
    pub fn allocated_resource(&self) -> Option<SceneResource> {
        match self {
            Self::AllocateRenderBuffer { handle, .. } => Some(SceneResource::RenderBuffer(*handle)),
            Self::AllocateRenderTarget { handle, .. } => Some(SceneResource::RenderTarget(*handle)),
            Self::AllocateBlitPass { handle, .. } => Some(SceneResource::BlitPass(*handle)),
            Self::AllocateDataBuffer { handle, .. } => Some(SceneResource::DataBuffer(*handle)),
            Self::AllocateTextureBuffer { handle, .. } => Some(SceneResource::TextureBuffer(*handle)),
            Self::AllocateVertexArray { handle, .. } => Some(SceneResource::VertexArray(*handle)),
            _ => None,
        }
    }

    /// The scene resource this action releases, if any
    pub fn released_resource(&self) -> Option<SceneResource> {
        match self {
            Self::ReleaseRenderBuffer { handle } => Some(SceneResource::RenderBuffer(*handle)),
            Self::ReleaseRenderTarget { handle } => Some(SceneResource::RenderTarget(*handle)),
            Self::ReleaseBlitPass { handle } => Some(SceneResource::BlitPass(*handle)),
            Self::ReleaseDataBuffer { handle } => Some(SceneResource::DataBuffer(*handle)),
            Self::ReleaseTextureBuffer { handle } => Some(SceneResource::TextureBuffer(*handle)),
            Self::ReleaseVertexArray { handle } => Some(SceneResource::VertexArray(*handle)),
            _ => None,
        }
    }

    /// Action name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::AllocateRenderBuffer { .. } => "AllocateRenderBuffer",
            Self::ReleaseRenderBuffer { .. } => "ReleaseRenderBuffer",
            Self::AllocateRenderTarget { .. } => "AllocateRenderTarget",
            Self::ReleaseRenderTarget { .. } => "ReleaseRenderTarget",
            Self::AllocateBlitPass { .. } => "AllocateBlitPass",
            Self::ReleaseBlitPass { .. } => "ReleaseBlitPass",
            Self::AllocateDataBuffer { .. } => "AllocateDataBuffer",
            Self::UpdateDataBuffer { .. } => "UpdateDataBuffer",
            Self::ReleaseDataBuffer { .. } => "ReleaseDataBuffer",
            Self::AllocateTextureBuffer { .. } => "AllocateTextureBuffer",
            Self::UpdateTextureBuffer { .. } => "UpdateTextureBuffer",
            Self::ReleaseTextureBuffer { .. } => "ReleaseTextureBuffer",
            Self::AllocateVertexArray { .. } => "AllocateVertexArray",
            Self::ReleaseVertexArray { .. } => "ReleaseVertexArray",
            Self::CreateDataSlot { .. } => "CreateDataSlot",
            Self::DestroyDataSlot { .. } => "DestroyDataSlot",
            Self::SetDataValue { .. } => "SetDataValue",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_buffer_size() {
        let props = RenderBufferProperties::color(16, 8, BufferAccess::ReadWrite);
        assert_eq!(props.byte_size(), 16 * 8 * 4);

        let msaa = RenderBufferProperties { sample_count: 4, ..props };
        assert_eq!(msaa.byte_size(), 16 * 8 * 4 * 4);
    }

    #[test]
    fn test_texture_size() {
        let props = TextureBufferProperties {
            format: BufferFormat::Rgba8,
            mip_sizes: vec![(4, 4), (2, 2), (1, 1)],
        };
        assert_eq!(props.byte_size(), (16 + 4 + 1) * 4);
        assert_eq!(props.mip_byte_size(1), Some(16));
        assert_eq!(props.mip_byte_size(3), None);
    }

    #[test]
    fn test_slot_kind_matching() {
        assert_eq!(
            DataSlotKind::TextureProvider.matching_consumer(),
            Some(DataSlotKind::TextureConsumer)
        );
        assert_eq!(DataSlotKind::DataConsumer.matching_consumer(), None);
        assert!(DataSlotKind::TransformationConsumer.accepts(DataValueType::Mat4));
        assert!(!DataSlotKind::DataProvider.accepts(DataValueType::Texture));
    }
}
