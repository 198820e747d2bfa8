//! Flush validation - checks a whole flush before any of it is applied
//!
//! The validator replays the flush's actions against a read-only view of the
//! scene plus an overlay of what earlier actions in the same flush did. If
//! any action is invalid the whole flush is rejected and the scene is left
//! untouched, which is what makes flush application atomic.

use crate::action::{DataSlotKind, SceneAction, TextureBufferProperties};
use crate::flush::Flush;
use crate::ids::{DataBufferHandle, DataSlotId, SceneResource, TextureBufferHandle};
use crate::value::DataValueType;
use std::collections::HashMap;
use thiserror::Error;

/// Result of validation
pub type ValidationResult<T = ()> = Result<T, ValidationError>;

/// Errors that can occur during validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} already exists")]
    ResourceAlreadyExists(SceneResource),

    #[error("{0} does not exist")]
    ResourceNotFound(SceneResource),

    #[error("render buffer has zero size")]
    EmptyRenderBuffer,

    #[error("render target has no buffers")]
    EmptyRenderTarget,

    #[error("blit pass source and destination are the same buffer")]
    BlitOntoItself,

    #[error("update of data buffer {handle} writes up to byte {end} but capacity is {capacity}")]
    DataBufferOverflow {
        handle: DataBufferHandle,
        end: u64,
        capacity: u32,
    },

    #[error("texture buffer {handle} has no mip level {mip}")]
    TextureMipOutOfRange { handle: TextureBufferHandle, mip: u32 },

    #[error("texture buffer {handle} mip {mip} expects {expected} bytes, got {got}")]
    TextureDataSize {
        handle: TextureBufferHandle,
        mip: u32,
        expected: u64,
        got: u64,
    },

    #[error("data slot {0} already exists")]
    SlotAlreadyExists(DataSlotId),

    #[error("data slot {0} does not exist")]
    SlotNotFound(DataSlotId),

    #[error("data slot {slot} of kind {kind:?} cannot hold a {ty} value")]
    SlotKindMismatch {
        slot: DataSlotId,
        kind: DataSlotKind,
        ty: DataValueType,
    },

    #[error("data slot {slot} holds {expected} values, got {got}")]
    SlotTypeMismatch {
        slot: DataSlotId,
        expected: DataValueType,
        got: DataValueType,
    },

    #[error("flush has {count} actions, limit is {max}")]
    TooManyActions { count: usize, max: usize },
}

/// Read-only view of a scene's current content, as seen by the validator
pub trait SceneContent {
    /// Check if a scene resource is currently allocated
    fn contains_resource(&self, resource: SceneResource) -> bool;

    /// Capacity of an allocated data buffer
    fn data_buffer_capacity(&self, handle: DataBufferHandle) -> Option<u32>;

    /// Properties of an allocated texture buffer
    fn texture_properties(&self, handle: TextureBufferHandle) -> Option<&TextureBufferProperties>;

    /// Kind and value type of an existing data slot
    fn data_slot(&self, slot: DataSlotId) -> Option<(DataSlotKind, DataValueType)>;
}

/// Changes made by earlier actions of the flush being validated
#[derive(Default)]
struct Overlay {
    /// true = allocated within this flush, false = released within this flush
    resources: HashMap<SceneResource, bool>,
    data_buffers: HashMap<DataBufferHandle, u32>,
    textures: HashMap<TextureBufferHandle, TextureBufferProperties>,
    slots: HashMap<DataSlotId, Option<(DataSlotKind, DataValueType)>>,
}

impl Overlay {
    fn exists(&self, content: &dyn SceneContent, resource: SceneResource) -> bool {
        self.resources
            .get(&resource)
            .copied()
            .unwrap_or_else(|| content.contains_resource(resource))
    }

    fn slot(&self, content: &dyn SceneContent, slot: DataSlotId) -> Option<(DataSlotKind, DataValueType)> {
        match self.slots.get(&slot) {
            Some(entry) => *entry,
            None => content.data_slot(slot),
        }
    }

    fn data_buffer_capacity(&self, content: &dyn SceneContent, handle: DataBufferHandle) -> Option<u32> {
        if !self.exists(content, SceneResource::DataBuffer(handle)) {
            return None;
        }
        self.data_buffers
            .get(&handle)
            .copied()
            .or_else(|| content.data_buffer_capacity(handle))
    }

    fn mip_byte_size(
        &self,
        content: &dyn SceneContent,
        handle: TextureBufferHandle,
        mip: u32,
    ) -> Option<Option<u64>> {
        if !self.exists(content, SceneResource::TextureBuffer(handle)) {
            return None;
        }
        let props = self
            .textures
            .get(&handle)
            .or_else(|| content.texture_properties(handle))?;
        Some(props.mip_byte_size(mip))
    }

    fn allocate(&mut self, content: &dyn SceneContent, resource: SceneResource) -> ValidationResult {
        if self.exists(content, resource) {
            return Err(ValidationError::ResourceAlreadyExists(resource));
        }
        self.resources.insert(resource, true);
        Ok(())
    }

    fn release(&mut self, content: &dyn SceneContent, resource: SceneResource) -> ValidationResult {
        if !self.exists(content, resource) {
            return Err(ValidationError::ResourceNotFound(resource));
        }
        self.resources.insert(resource, false);
        Ok(())
    }

    fn require(&self, content: &dyn SceneContent, resource: SceneResource) -> ValidationResult {
        if self.exists(content, resource) {
            Ok(())
        } else {
            Err(ValidationError::ResourceNotFound(resource))
        }
    }
}

/// Validates flushes against scene content
#[derive(Debug, Clone)]
pub struct FlushValidator {
    /// Upper bound on actions per flush
    pub max_actions_per_flush: usize,
}

impl Default for FlushValidator {
    fn default() -> Self {
        Self {
            max_actions_per_flush: 100_000,
        }
    }
}

impl FlushValidator {
    /// Create a validator with a custom action limit
    pub fn new(max_actions_per_flush: usize) -> Self {
        Self { max_actions_per_flush }
    }

    /// Validate every action of `flush` in order
    pub fn validate(&self, flush: &Flush, content: &dyn SceneContent) -> ValidationResult {
        if flush.actions.len() > self.max_actions_per_flush {
            return Err(ValidationError::TooManyActions {
                count: flush.actions.len(),
                max: self.max_actions_per_flush,
            });
        }

        let mut overlay = Overlay::default();
        for action in &flush.actions {
            self.validate_action(action, content, &mut overlay)?;
        }
        Ok(())
    }

    fn validate_action(
        &self,
        action: &SceneAction,
        content: &dyn SceneContent,
        overlay: &mut Overlay,
    ) -> ValidationResult {
        match action {
            SceneAction::AllocateRenderBuffer { properties, .. } => {
                if properties.byte_size() == 0 {
                    return Err(ValidationError::EmptyRenderBuffer);
                }
            }
            SceneAction::AllocateRenderTarget { buffers, .. } => {
                if buffers.is_empty() {
                    return Err(ValidationError::EmptyRenderTarget);
                }
                for buffer in buffers {
                    overlay.require(content, SceneResource::RenderBuffer(*buffer))?;
                }
            }
            SceneAction::AllocateBlitPass { source, destination, .. } => {
                if source == destination {
                    return Err(ValidationError::BlitOntoItself);
                }
                overlay.require(content, SceneResource::RenderBuffer(*source))?;
                overlay.require(content, SceneResource::RenderBuffer(*destination))?;
            }
            SceneAction::AllocateDataBuffer { handle, max_size_bytes, .. } => {
                overlay.data_buffers.insert(*handle, *max_size_bytes);
            }
            SceneAction::UpdateDataBuffer { handle, offset, data } => {
                let capacity = overlay
                    .data_buffer_capacity(content, *handle)
                    .ok_or(ValidationError::ResourceNotFound(SceneResource::DataBuffer(*handle)))?;
                let end = *offset as u64 + data.len() as u64;
                if end > capacity as u64 {
                    return Err(ValidationError::DataBufferOverflow {
                        handle: *handle,
                        end,
                        capacity,
                    });
                }
            }
            SceneAction::AllocateTextureBuffer { handle, properties } => {
                overlay.textures.insert(*handle, properties.clone());
            }
            SceneAction::UpdateTextureBuffer { handle, mip, data } => {
                let mip_size = overlay
                    .mip_byte_size(content, *handle, *mip)
                    .ok_or(ValidationError::ResourceNotFound(SceneResource::TextureBuffer(*handle)))?;
                let expected = mip_size.ok_or(ValidationError::TextureMipOutOfRange {
                    handle: *handle,
                    mip: *mip,
                })?;
                if expected != data.len() as u64 {
                    return Err(ValidationError::TextureDataSize {
                        handle: *handle,
                        mip: *mip,
                        expected,
                        got: data.len() as u64,
                    });
                }
            }
            SceneAction::AllocateVertexArray { index_buffer, vertex_buffers, .. } => {
                for buffer in index_buffer.iter().chain(vertex_buffers.iter()) {
                    overlay.require(content, SceneResource::DataBuffer(*buffer))?;
                }
            }
            SceneAction::CreateDataSlot { slot, kind, value } => {
                if overlay.slot(content, *slot).is_some() {
                    return Err(ValidationError::SlotAlreadyExists(*slot));
                }
                let ty = value.value_type();
                if !kind.accepts(ty) {
                    return Err(ValidationError::SlotKindMismatch { slot: *slot, kind: *kind, ty });
                }
                overlay.slots.insert(*slot, Some((*kind, ty)));
            }
            SceneAction::DestroyDataSlot { slot } => {
                if overlay.slot(content, *slot).is_none() {
                    return Err(ValidationError::SlotNotFound(*slot));
                }
                overlay.slots.insert(*slot, None);
            }
            SceneAction::SetDataValue { slot, value } => {
                let (_, expected) = overlay
                    .slot(content, *slot)
                    .ok_or(ValidationError::SlotNotFound(*slot))?;
                let got = value.value_type();
                if expected != got {
                    return Err(ValidationError::SlotTypeMismatch { slot: *slot, expected, got });
                }
            }
            _ => {}
        }

        if let Some(resource) = action.allocated_resource() {
            overlay.allocate(content, resource)?;
        }
        if let Some(resource) = action.released_resource() {
            overlay.release(content, resource)?;
        }
        Ok(())
    }
}
