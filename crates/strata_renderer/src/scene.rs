//! Renderer-side scene content
//!
//! [`RendererScene`] is the logical state built from applied flushes:
//! scene resources with their properties and data, data slots, and the set
//! of client resources the scene uses. It exists whether or not the scene
//! is mapped. While mapped, the updater mirrors every resource onto the
//! device through the scene's [`ResourceRegistry`].

use crate::device::{DeviceError, DeviceObjectKind, RenderDevice};
use crate::registry::{ResourceMetadata, ResourceRegistry};
use std::collections::{BTreeMap, BTreeSet};
use strata_ir::{
    DataBufferHandle, DataBufferKind, DataSlotId, DataSlotKind, DataValue, DataValueType, Flush,
    FlushIndex, RenderBufferHandle, RenderBufferProperties, ResourceContentHash, SceneAction,
    SceneContent, SceneId, SceneResource, TextureBufferHandle, TextureBufferProperties,
};

/// A scene resource as the scene describes it
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalResource {
    RenderBuffer(RenderBufferProperties),
    RenderTarget {
        buffers: Vec<RenderBufferHandle>,
    },
    BlitPass {
        source: RenderBufferHandle,
        destination: RenderBufferHandle,
    },
    DataBuffer {
        kind: DataBufferKind,
        capacity: u32,
        /// Bytes written so far, up to the highest written offset
        contents: Vec<u8>,
    },
    TextureBuffer {
        properties: TextureBufferProperties,
        contents: Vec<u8>,
    },
    VertexArray {
        effect: ResourceContentHash,
        index_buffer: Option<DataBufferHandle>,
        vertex_buffers: Vec<DataBufferHandle>,
    },
}

impl LogicalResource {
    /// Device memory the resource needs
    pub fn byte_size(&self) -> u64 {
        match self {
            Self::RenderBuffer(props) => props.byte_size(),
            Self::DataBuffer { capacity, .. } => *capacity as u64,
            Self::TextureBuffer { properties, .. } => properties.byte_size(),
            Self::RenderTarget { .. } | Self::BlitPass { .. } | Self::VertexArray { .. } => 0,
        }
    }

    fn object_kind(&self) -> DeviceObjectKind {
        match self {
            Self::RenderBuffer(_) => DeviceObjectKind::RenderBuffer,
            Self::RenderTarget { .. } => DeviceObjectKind::RenderTarget,
            Self::BlitPass { .. } => DeviceObjectKind::BlitPass,
            Self::DataBuffer { .. } => DeviceObjectKind::DataBuffer,
            Self::TextureBuffer { .. } => DeviceObjectKind::TextureBuffer,
            Self::VertexArray { .. } => DeviceObjectKind::VertexArray,
        }
    }

    fn metadata(&self) -> ResourceMetadata {
        match self {
            Self::RenderBuffer(props) => ResourceMetadata::RenderBuffer(*props),
            Self::RenderTarget { buffers } => ResourceMetadata::RenderTarget {
                buffers: buffers.clone(),
            },
            Self::BlitPass { source, destination } => ResourceMetadata::BlitPass {
                source: *source,
                destination: *destination,
            },
            Self::DataBuffer { kind, capacity, .. } => ResourceMetadata::DataBuffer {
                kind: *kind,
                capacity: *capacity,
            },
            Self::TextureBuffer { properties, .. } => ResourceMetadata::TextureBuffer(properties.clone()),
            Self::VertexArray { effect, .. } => ResourceMetadata::VertexArray { effect: *effect },
        }
    }

    fn contents(&self) -> &[u8] {
        match self {
            Self::DataBuffer { contents, .. } | Self::TextureBuffer { contents, .. } => contents,
            _ => &[],
        }
    }
}

/// A data slot and its local value
#[derive(Debug, Clone, PartialEq)]
pub struct DataSlot {
    pub kind: DataSlotKind,
    pub value: DataValue,
}

fn write_at(contents: &mut Vec<u8>, offset: usize, data: &[u8]) {
    let end = offset + data.len();
    if contents.len() < end {
        contents.resize(end, 0);
    }
    contents[offset..end].copy_from_slice(data);
}

fn mip_offset(properties: &TextureBufferProperties, mip: u32) -> u64 {
    (0..mip).filter_map(|m| properties.mip_byte_size(m)).sum()
}

/// Logical content of one scene
#[derive(Debug, Clone)]
pub struct RendererScene {
    id: SceneId,
    resources: BTreeMap<SceneResource, LogicalResource>,
    slots: BTreeMap<DataSlotId, DataSlot>,
    client_resources: BTreeSet<ResourceContentHash>,
    last_applied: Option<FlushIndex>,
    expiration_ms: Option<u64>,
    flushes_applied: u64,
}

impl RendererScene {
    /// Create empty content for `id`
    pub fn new(id: SceneId) -> Self {
        Self {
            id,
            resources: BTreeMap::new(),
            slots: BTreeMap::new(),
            client_resources: BTreeSet::new(),
            last_applied: None,
            expiration_ms: None,
            flushes_applied: 0,
        }
    }

    /// Scene id
    pub fn id(&self) -> SceneId {
        self.id
    }

    /// Forget everything (the scene will be sent again on resubscription)
    pub fn reset(&mut self) {
        *self = Self::new(self.id);
    }

    /// Apply one validated action to the logical content
    pub fn apply_action(&mut self, action: &SceneAction) {
        match action {
            SceneAction::AllocateRenderBuffer { handle, properties } => {
                self.resources
                    .insert(SceneResource::RenderBuffer(*handle), LogicalResource::RenderBuffer(*properties));
            }
            SceneAction::AllocateRenderTarget { handle, buffers } => {
                self.resources.insert(
                    SceneResource::RenderTarget(*handle),
                    LogicalResource::RenderTarget {
                        buffers: buffers.clone(),
                    },
                );
            }
            SceneAction::AllocateBlitPass { handle, source, destination } => {
                self.resources.insert(
                    SceneResource::BlitPass(*handle),
                    LogicalResource::BlitPass {
                        source: *source,
                        destination: *destination,
                    },
                );
            }
            SceneAction::AllocateDataBuffer { handle, kind, max_size_bytes } => {
                self.resources.insert(
                    SceneResource::DataBuffer(*handle),
                    LogicalResource::DataBuffer {
                        kind: *kind,
                        capacity: *max_size_bytes,
                        contents: Vec::new(),
                    },
                );
            }
            SceneAction::UpdateDataBuffer { handle, offset, data } => {
                if let Some(LogicalResource::DataBuffer { contents, .. }) =
                    self.resources.get_mut(&SceneResource::DataBuffer(*handle))
                {
                    write_at(contents, *offset as usize, data);
                }
            }
            SceneAction::AllocateTextureBuffer { handle, properties } => {
                self.resources.insert(
                    SceneResource::TextureBuffer(*handle),
                    LogicalResource::TextureBuffer {
                        properties: properties.clone(),
                        contents: Vec::new(),
                    },
                );
            }
            SceneAction::UpdateTextureBuffer { handle, mip, data } => {
                if let Some(LogicalResource::TextureBuffer { properties, contents }) =
                    self.resources.get_mut(&SceneResource::TextureBuffer(*handle))
                {
                    let offset = mip_offset(properties, *mip) as usize;
                    write_at(contents, offset, data);
                }
            }
            SceneAction::AllocateVertexArray {
                handle,
                effect,
                index_buffer,
                vertex_buffers,
            } => {
                self.resources.insert(
                    SceneResource::VertexArray(*handle),
                    LogicalResource::VertexArray {
                        effect: *effect,
                        index_buffer: *index_buffer,
                        vertex_buffers: vertex_buffers.clone(),
                    },
                );
            }
            SceneAction::CreateDataSlot { slot, kind, value } => {
                self.slots.insert(
                    *slot,
                    DataSlot {
                        kind: *kind,
                        value: value.clone(),
                    },
                );
            }
            SceneAction::DestroyDataSlot { slot } => {
                self.slots.remove(slot);
            }
            SceneAction::SetDataValue { slot, value } => {
                if let Some(data_slot) = self.slots.get_mut(slot) {
                    data_slot.value = value.clone();
                }
            }
            SceneAction::ReleaseRenderBuffer { .. }
            | SceneAction::ReleaseRenderTarget { .. }
            | SceneAction::ReleaseBlitPass { .. }
            | SceneAction::ReleaseDataBuffer { .. }
            | SceneAction::ReleaseTextureBuffer { .. }
            | SceneAction::ReleaseVertexArray { .. } => {
                if let Some(resource) = action.released_resource() {
                    self.resources.remove(&resource);
                }
            }
        }
    }

    /// Record the bookkeeping part of an applied flush
    pub fn finish_flush(&mut self, flush: &Flush) {
        for hash in &flush.resource_changes.removed {
            self.client_resources.remove(hash);
        }
        self.client_resources.extend(flush.resource_changes.added.iter().copied());
        self.last_applied = Some(flush.index);
        self.expiration_ms = flush.time_info.expiration_ms;
        self.flushes_applied += 1;
    }

    /// Mirror an action that was just applied onto the device
    pub fn sync_action(
        &self,
        action: &SceneAction,
        registry: &mut ResourceRegistry,
        device: &mut RenderDevice,
    ) -> Result<(), DeviceError> {
        if let Some(resource) = action.released_resource() {
            if let Ok(entry) = registry.remove(resource) {
                device.release(entry.device)?;
            }
            return Ok(());
        }
        if let Some(resource) = action.allocated_resource() {
            return self.realize_resource(resource, registry, device);
        }

        match action {
            SceneAction::UpdateDataBuffer { handle, offset, data } => {
                if let Some(device_handle) = registry.device_handle(SceneResource::DataBuffer(*handle)) {
                    device.write(device_handle, *offset as u64, data)?;
                }
            }
            SceneAction::UpdateTextureBuffer { handle, mip, data } => {
                let resource = SceneResource::TextureBuffer(*handle);
                if let (Some(device_handle), Some(properties)) =
                    (registry.device_handle(resource), self.texture_properties(*handle))
                {
                    device.write(device_handle, mip_offset(properties, *mip), data)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Create the device object for one resource, if it is not there yet
    pub fn realize_resource(
        &self,
        resource: SceneResource,
        registry: &mut ResourceRegistry,
        device: &mut RenderDevice,
    ) -> Result<(), DeviceError> {
        let Some(logical) = self.resources.get(&resource) else {
            return Ok(());
        };
        if registry.contains(resource) {
            return Ok(());
        }

        let label = format!("scene {} {}", self.id, resource);
        let handle = device.allocate(logical.object_kind(), logical.byte_size(), &label)?;
        let contents = logical.contents();
        if !contents.is_empty() {
            if let Err(e) = device.write(handle, 0, contents) {
                let _ = device.release(handle);
                return Err(e);
            }
        }

        if registry.add(resource, handle, logical.byte_size(), logical.metadata()).is_err() {
            let _ = device.release(handle);
        }
        Ok(())
    }

    /// Create device objects for every resource; returns the ones that failed
    pub fn realize(
        &self,
        registry: &mut ResourceRegistry,
        device: &mut RenderDevice,
    ) -> Vec<(SceneResource, DeviceError)> {
        self.resources
            .keys()
            .filter_map(|resource| {
                self.realize_resource(*resource, registry, device)
                    .err()
                    .map(|e| (*resource, e))
            })
            .collect()
    }

    /// Look up a data slot
    pub fn slot(&self, slot: DataSlotId) -> Option<&DataSlot> {
        self.slots.get(&slot)
    }

    /// Iterate over data slots
    pub fn slots(&self) -> impl Iterator<Item = (&DataSlotId, &DataSlot)> {
        self.slots.iter()
    }

    /// Look up a scene resource
    pub fn resource(&self, resource: SceneResource) -> Option<&LogicalResource> {
        self.resources.get(&resource)
    }

    /// Number of scene resources
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Client resources used by the applied state
    pub fn client_resources(&self) -> &BTreeSet<ResourceContentHash> {
        &self.client_resources
    }

    /// Index of the last applied flush
    pub fn last_applied(&self) -> Option<FlushIndex> {
        self.last_applied
    }

    /// Expiration of the last applied flush
    pub fn expiration_ms(&self) -> Option<u64> {
        self.expiration_ms
    }

    /// Number of flushes applied since the last reset
    pub fn flushes_applied(&self) -> u64 {
        self.flushes_applied
    }
}

impl SceneContent for RendererScene {
    fn contains_resource(&self, resource: SceneResource) -> bool {
        self.resources.contains_key(&resource)
    }

    fn data_buffer_capacity(&self, handle: DataBufferHandle) -> Option<u32> {
        match self.resources.get(&SceneResource::DataBuffer(handle)) {
            Some(LogicalResource::DataBuffer { capacity, .. }) => Some(*capacity),
            _ => None,
        }
    }

    fn texture_properties(&self, handle: TextureBufferHandle) -> Option<&TextureBufferProperties> {
        match self.resources.get(&SceneResource::TextureBuffer(handle)) {
            Some(LogicalResource::TextureBuffer { properties, .. }) => Some(properties),
            _ => None,
        }
    }

    fn data_slot(&self, slot: DataSlotId) -> Option<(DataSlotKind, DataValueType)> {
        self.slots.get(&slot).map(|s| (s.kind, s.value.value_type()))
    }
}
