//! Render devices
//!
//! The set of backends is fixed at build time, so the device is a closed
//! enum and every operation dispatches through one `match`. Objects live in
//! a generational [`SlotArena`]; a [`DeviceHandle`] that outlived its object
//! is rejected instead of reaching whatever took its slot.
//!
//! - `Software` keeps object contents in host memory (useful for tools and
//!   for checking what was uploaded).
//! - `Null` only does bookkeeping and bounds checks.

use crate::uploader::CompiledEffect;
use strata_core::{Handle, SlotArena};
use strata_ir::{ResourceDescriptor, ResourceKind};
use thiserror::Error;

/// What a device object is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceObjectKind {
    RenderBuffer,
    RenderTarget,
    BlitPass,
    DataBuffer,
    TextureBuffer,
    VertexArray,
    /// Compiled effect program
    Effect,
    /// Immutable index or vertex array
    ClientArray,
    /// Immutable texture
    ClientTexture,
    /// Render target owned by the renderer, not by a scene
    OffscreenBuffer,
}

impl From<ResourceKind> for DeviceObjectKind {
    fn from(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Effect => Self::Effect,
            ResourceKind::IndexArray | ResourceKind::VertexArray => Self::ClientArray,
            ResourceKind::Texture => Self::ClientTexture,
        }
    }
}

/// An object realized on a device
#[derive(Debug, Clone)]
pub struct DeviceObject {
    pub kind: DeviceObjectKind,
    pub byte_size: u64,
    pub label: String,
    contents: Vec<u8>,
}

/// Handle to a device object
pub type DeviceHandle = Handle<DeviceObject>;

/// Backend variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Software,
    Null,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Software => write!(f, "Software"),
            Self::Null => write!(f, "Null"),
        }
    }
}

/// Errors from device operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device out of memory: {requested} bytes requested, {available} available")]
    OutOfMemory { requested: u64, available: u64 },

    #[error("invalid device handle {0}")]
    InvalidHandle(DeviceHandle),

    #[error("write of {len} bytes at offset {offset} exceeds object size {size}")]
    WriteOutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("{0} resources are compiled by the uploader, not uploaded directly")]
    AsyncOnly(ResourceKind),
}

/// Object storage shared by all backends
#[derive(Debug)]
struct ObjectTable {
    objects: SlotArena<DeviceObject>,
    used: u64,
    budget: Option<u64>,
}

impl ObjectTable {
    fn new(budget: Option<u64>) -> Self {
        Self {
            objects: SlotArena::new(),
            used: 0,
            budget,
        }
    }

    fn check_budget(&self, byte_size: u64) -> Result<(), DeviceError> {
        if let Some(budget) = self.budget {
            let available = budget.saturating_sub(self.used);
            if byte_size > available {
                return Err(DeviceError::OutOfMemory {
                    requested: byte_size,
                    available,
                });
            }
        }
        Ok(())
    }

    fn insert(&mut self, object: DeviceObject) -> Result<DeviceHandle, DeviceError> {
        self.check_budget(object.byte_size)?;
        self.used += object.byte_size;
        Ok(self.objects.allocate(object))
    }

    fn remove(&mut self, handle: DeviceHandle) -> Result<DeviceObject, DeviceError> {
        let object = self
            .objects
            .release(handle)
            .map_err(|_| DeviceError::InvalidHandle(handle))?;
        self.used -= object.byte_size;
        Ok(object)
    }

    fn get_mut(&mut self, handle: DeviceHandle) -> Result<&mut DeviceObject, DeviceError> {
        self.objects
            .get_mut(handle)
            .ok_or(DeviceError::InvalidHandle(handle))
    }
}

fn check_bounds(object: &DeviceObject, offset: u64, len: u64) -> Result<(), DeviceError> {
    if offset + len > object.byte_size {
        return Err(DeviceError::WriteOutOfBounds {
            offset,
            len,
            size: object.byte_size,
        });
    }
    Ok(())
}

/// Backend that keeps object contents in host memory
#[derive(Debug)]
pub struct SoftwareDevice {
    table: ObjectTable,
}

impl SoftwareDevice {
    fn allocate(&mut self, kind: DeviceObjectKind, byte_size: u64, label: &str) -> Result<DeviceHandle, DeviceError> {
        // Host memory is only touched once the budget allows the object
        self.table.check_budget(byte_size)?;
        self.table.insert(DeviceObject {
            kind,
            byte_size,
            label: label.to_string(),
            contents: vec![0; byte_size as usize],
        })
    }

    fn write(&mut self, handle: DeviceHandle, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let object = self.table.get_mut(handle)?;
        check_bounds(object, offset, data.len() as u64)?;
        let start = offset as usize;
        object.contents[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// Backend that only tracks objects
#[derive(Debug)]
pub struct NullDevice {
    table: ObjectTable,
}

impl NullDevice {
    fn allocate(&mut self, kind: DeviceObjectKind, byte_size: u64, label: &str) -> Result<DeviceHandle, DeviceError> {
        self.table.insert(DeviceObject {
            kind,
            byte_size,
            label: label.to_string(),
            contents: Vec::new(),
        })
    }

    fn write(&mut self, handle: DeviceHandle, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let object = self.table.get_mut(handle)?;
        check_bounds(object, offset, data.len() as u64)
    }
}

/// A render device, owned by exactly one display
#[derive(Debug)]
pub enum RenderDevice {
    Software(SoftwareDevice),
    Null(NullDevice),
}

impl RenderDevice {
    /// Create a software device
    pub fn software(memory_budget: Option<u64>) -> Self {
        Self::Software(SoftwareDevice {
            table: ObjectTable::new(memory_budget),
        })
    }

    /// Create a null device
    pub fn null(memory_budget: Option<u64>) -> Self {
        Self::Null(NullDevice {
            table: ObjectTable::new(memory_budget),
        })
    }

    /// Get the backend variant
    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Software(_) => DeviceKind::Software,
            Self::Null(_) => DeviceKind::Null,
        }
    }

    fn table(&self) -> &ObjectTable {
        match self {
            Self::Software(d) => &d.table,
            Self::Null(d) => &d.table,
        }
    }

    fn table_mut(&mut self) -> &mut ObjectTable {
        match self {
            Self::Software(d) => &mut d.table,
            Self::Null(d) => &mut d.table,
        }
    }

    /// Allocate an object of `byte_size` bytes
    pub fn allocate(
        &mut self,
        kind: DeviceObjectKind,
        byte_size: u64,
        label: &str,
    ) -> Result<DeviceHandle, DeviceError> {
        let handle = match self {
            Self::Software(d) => d.allocate(kind, byte_size, label)?,
            Self::Null(d) => d.allocate(kind, byte_size, label)?,
        };
        log::trace!("{} device allocated {:?} '{}' ({} bytes) as {}", self.kind(), kind, label, byte_size, handle);
        Ok(handle)
    }

    /// Write `data` into an object at `offset`
    pub fn write(&mut self, handle: DeviceHandle, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        match self {
            Self::Software(d) => d.write(handle, offset, data),
            Self::Null(d) => d.write(handle, offset, data),
        }
    }

    /// Upload an immutable client resource synchronously
    pub fn upload_resource(&mut self, descriptor: &ResourceDescriptor) -> Result<DeviceHandle, DeviceError> {
        if descriptor.kind.is_async() {
            return Err(DeviceError::AsyncOnly(descriptor.kind));
        }
        let handle = self.allocate(descriptor.kind.into(), descriptor.byte_size(), &descriptor.name)?;
        if let Err(e) = self.write(handle, 0, &descriptor.data) {
            let _ = self.release(handle);
            return Err(e);
        }
        Ok(handle)
    }

    /// Make a compiled effect available to draw calls
    pub fn register_effect(&mut self, effect: &CompiledEffect) -> Result<DeviceHandle, DeviceError> {
        let handle = self.allocate(DeviceObjectKind::Effect, effect.binary.len() as u64, &effect.name)?;
        if let Err(e) = self.write(handle, 0, &effect.binary) {
            let _ = self.release(handle);
            return Err(e);
        }
        Ok(handle)
    }

    /// Destroy an object
    pub fn release(&mut self, handle: DeviceHandle) -> Result<(), DeviceError> {
        let object = self.table_mut().remove(handle)?;
        log::trace!("{} device released {:?} '{}'", self.kind(), object.kind, object.label);
        Ok(())
    }

    /// Look up an object
    pub fn object(&self, handle: DeviceHandle) -> Option<&DeviceObject> {
        self.table().objects.get(handle)
    }

    /// Contents of an object, if the backend keeps them
    pub fn contents(&self, handle: DeviceHandle) -> Option<&[u8]> {
        match self {
            Self::Software(d) => d.table.objects.get(handle).map(|o| o.contents.as_slice()),
            Self::Null(_) => None,
        }
    }

    /// Bytes currently allocated
    pub fn memory_used(&self) -> u64 {
        self.table().used
    }

    /// Configured memory budget
    pub fn memory_budget(&self) -> Option<u64> {
        self.table().budget
    }

    /// Replace the memory budget; live objects are kept even above it
    pub fn set_memory_budget(&mut self, budget: Option<u64>) {
        log::debug!("{} device budget set to {:?}", self.kind(), budget);
        self.table_mut().budget = budget;
    }

    /// Number of live objects
    pub fn object_count(&self) -> usize {
        self.table().objects.len()
    }
}
