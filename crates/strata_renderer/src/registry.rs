//! Per-scene resource registry
//!
//! Maps a scene's logical resources (render buffers, render targets, blit
//! passes, data buffers, texture buffers, vertex arrays) to the device
//! objects realizing them. Pure bookkeeping: every add and remove is decided
//! by the updater, and nothing is ever evicted behind its back.
//!
//! A registry must be empty when it is dropped. Whoever owns it releases
//! every device object first.

use crate::device::DeviceHandle;
use std::collections::BTreeMap;
use strata_ir::{
    BufferAccess, DataBufferKind, RenderBufferHandle, RenderBufferProperties, ResourceContentHash,
    SceneId, SceneResource, TextureBufferProperties,
};
use thiserror::Error;

/// Type-specific information kept with a registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceMetadata {
    RenderBuffer(RenderBufferProperties),
    RenderTarget { buffers: Vec<RenderBufferHandle> },
    BlitPass { source: RenderBufferHandle, destination: RenderBufferHandle },
    DataBuffer { kind: DataBufferKind, capacity: u32 },
    TextureBuffer(TextureBufferProperties),
    VertexArray { effect: ResourceContentHash },
}

/// One realized resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub device: DeviceHandle,
    pub byte_size: u64,
    pub metadata: ResourceMetadata,
}

/// Filter for [`ResourceRegistry::memory_usage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryCategory {
    RenderBuffersWriteOnly,
    RenderBuffersReadWrite,
    DataBuffers,
    TextureBuffers,
    All,
}

impl MemoryCategory {
    fn matches(&self, metadata: &ResourceMetadata) -> bool {
        match (self, metadata) {
            (Self::All, _) => true,
            (Self::RenderBuffersWriteOnly, ResourceMetadata::RenderBuffer(p)) => p.access == BufferAccess::WriteOnly,
            (Self::RenderBuffersReadWrite, ResourceMetadata::RenderBuffer(p)) => p.access == BufferAccess::ReadWrite,
            (Self::DataBuffers, ResourceMetadata::DataBuffer { .. }) => true,
            (Self::TextureBuffers, ResourceMetadata::TextureBuffer(_)) => true,
            _ => false,
        }
    }
}

/// Errors from registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{resource} of scene {scene} is already registered")]
    AlreadyRegistered { scene: SceneId, resource: SceneResource },

    #[error("{resource} of scene {scene} is not registered")]
    NotRegistered { scene: SceneId, resource: SceneResource },
}

/// Logical-to-device mapping for one scene
#[derive(Debug)]
pub struct ResourceRegistry {
    scene: SceneId,
    entries: BTreeMap<SceneResource, RegistryEntry>,
}

impl ResourceRegistry {
    /// Create an empty registry for `scene`
    pub fn new(scene: SceneId) -> Self {
        Self {
            scene,
            entries: BTreeMap::new(),
        }
    }

    /// Scene this registry belongs to
    pub fn scene(&self) -> SceneId {
        self.scene
    }

    /// Register a realized resource; fails if the resource is already present
    pub fn add(
        &mut self,
        resource: SceneResource,
        device: DeviceHandle,
        byte_size: u64,
        metadata: ResourceMetadata,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(&resource) {
            log::warn!("Scene {}: {} registered twice", self.scene, resource);
            return Err(RegistryError::AlreadyRegistered {
                scene: self.scene,
                resource,
            });
        }
        self.entries.insert(
            resource,
            RegistryEntry {
                device,
                byte_size,
                metadata,
            },
        );
        Ok(())
    }

    /// Unregister a resource, handing back its entry; fails if absent
    pub fn remove(&mut self, resource: SceneResource) -> Result<RegistryEntry, RegistryError> {
        self.entries.remove(&resource).ok_or_else(|| {
            log::warn!("Scene {}: {} removed but never registered", self.scene, resource);
            RegistryError::NotRegistered {
                scene: self.scene,
                resource,
            }
        })
    }

    /// Look up an entry
    pub fn get(&self, resource: SceneResource) -> Option<&RegistryEntry> {
        self.entries.get(&resource)
    }

    /// Check if a resource is registered
    pub fn contains(&self, resource: SceneResource) -> bool {
        self.entries.contains_key(&resource)
    }

    /// Device handle of a registered resource
    pub fn device_handle(&self, resource: SceneResource) -> Option<DeviceHandle> {
        self.entries.get(&resource).map(|entry| entry.device)
    }

    /// Total bytes of entries in `category`
    pub fn memory_usage(&self, category: MemoryCategory) -> u64 {
        self.entries
            .values()
            .filter(|entry| category.matches(&entry.metadata))
            .map(|entry| entry.byte_size)
            .sum()
    }

    /// Iterate over entries in resource order
    pub fn iter(&self) -> impl Iterator<Item = (&SceneResource, &RegistryEntry)> {
        self.entries.iter()
    }

    /// Take every entry, leaving the registry empty
    ///
    /// Render targets and blit passes come out before the buffers they use.
    pub fn drain(&mut self) -> Vec<(SceneResource, RegistryEntry)> {
        let mut drained: Vec<_> = std::mem::take(&mut self.entries).into_iter().collect();
        drained.sort_by_key(|(resource, _)| match resource {
            SceneResource::VertexArray(_) | SceneResource::RenderTarget(_) | SceneResource::BlitPass(_) => 0,
            _ => 1,
        });
        drained
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            log::error!(
                "Scene {}: resource registry dropped with {} device resources still registered",
                self.scene,
                self.entries.len()
            );
            if !std::thread::panicking() {
                debug_assert!(self.entries.is_empty(), "resource registry must be empty at teardown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceObjectKind, RenderDevice};
    use strata_ir::{DataBufferHandle, RenderBufferHandle};

    fn data_buffer(capacity: u32) -> ResourceMetadata {
        ResourceMetadata::DataBuffer {
            kind: DataBufferKind::Vertex,
            capacity,
        }
    }

    #[test]
    fn test_memory_usage_scenario() {
        let mut device = RenderDevice::null(None);
        let mut registry = ResourceRegistry::new(SceneId::new(1));
        let h1 = SceneResource::DataBuffer(DataBufferHandle::new(1));
        let d1 = device.allocate(DeviceObjectKind::DataBuffer, 100, "h1").unwrap();

        assert_eq!(registry.memory_usage(MemoryCategory::All), 0);
        registry.add(h1, d1, 100, data_buffer(100)).unwrap();
        assert_eq!(registry.memory_usage(MemoryCategory::All), 100);

        let entry = registry.remove(h1).unwrap();
        device.release(entry.device).unwrap();
        assert_eq!(registry.memory_usage(MemoryCategory::All), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rejected_operations_leave_registry_untouched() {
        let mut device = RenderDevice::null(None);
        let mut registry = ResourceRegistry::new(SceneId::new(1));
        let h1 = SceneResource::DataBuffer(DataBufferHandle::new(1));
        let h2 = SceneResource::DataBuffer(DataBufferHandle::new(2));
        let d1 = device.allocate(DeviceObjectKind::DataBuffer, 10, "h1").unwrap();

        assert!(matches!(registry.remove(h2), Err(RegistryError::NotRegistered { .. })));
        assert!(registry.is_empty());

        registry.add(h1, d1, 10, data_buffer(10)).unwrap();
        let before: Vec<_> = registry.iter().map(|(r, e)| (*r, e.clone())).collect();

        let d2 = device.allocate(DeviceObjectKind::DataBuffer, 20, "dup").unwrap();
        assert!(matches!(
            registry.add(h1, d2, 20, data_buffer(20)),
            Err(RegistryError::AlreadyRegistered { .. })
        ));
        let after: Vec<_> = registry.iter().map(|(r, e)| (*r, e.clone())).collect();
        assert_eq!(before, after);

        registry.remove(h1).unwrap();
    }

    #[test]
    fn test_add_remove_add_reproduces_state() {
        let mut device = RenderDevice::null(None);
        let mut registry = ResourceRegistry::new(SceneId::new(1));
        let h1 = SceneResource::DataBuffer(DataBufferHandle::new(1));
        let d1 = device.allocate(DeviceObjectKind::DataBuffer, 10, "h1").unwrap();

        registry.add(h1, d1, 10, data_buffer(10)).unwrap();
        let first: Vec<_> = registry.iter().map(|(r, e)| (*r, e.clone())).collect();
        let entry = registry.remove(h1).unwrap();
        registry.add(h1, entry.device, entry.byte_size, entry.metadata).unwrap();
        let second: Vec<_> = registry.iter().map(|(r, e)| (*r, e.clone())).collect();

        assert_eq!(first, second);
        registry.drain();
    }

    #[test]
    fn test_render_buffer_categories() {
        let mut device = RenderDevice::null(None);
        let mut registry = ResourceRegistry::new(SceneId::new(1));

        let write_only = RenderBufferProperties::depth(4, 4);
        let read_write = RenderBufferProperties::color(4, 4, BufferAccess::ReadWrite);
        for (i, props) in [write_only, read_write].into_iter().enumerate() {
            let handle = device
                .allocate(DeviceObjectKind::RenderBuffer, props.byte_size(), "rb")
                .unwrap();
            registry
                .add(
                    SceneResource::RenderBuffer(RenderBufferHandle::new(i as u32)),
                    handle,
                    props.byte_size(),
                    ResourceMetadata::RenderBuffer(props),
                )
                .unwrap();
        }

        assert_eq!(registry.memory_usage(MemoryCategory::RenderBuffersWriteOnly), 64);
        assert_eq!(registry.memory_usage(MemoryCategory::RenderBuffersReadWrite), 64);
        assert_eq!(registry.memory_usage(MemoryCategory::DataBuffers), 0);
        assert_eq!(registry.memory_usage(MemoryCategory::All), 128);

        assert_eq!(registry.drain().len(), 2);
    }
}
