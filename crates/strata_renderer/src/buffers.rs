//! Offscreen and stream buffers
//!
//! Offscreen buffers are render targets owned by the renderer. Scenes can be
//! assigned to render into one instead of the framebuffer, and texture
//! consumers in other scenes can sample it through a data link.
//!
//! Stream buffers stand for images owned by the output compositor. The
//! renderer only tracks whether the stream source behind one currently
//! provides content.

use crate::device::DeviceHandle;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use strata_core::typed_id;
use strata_ir::SceneId;
use thiserror::Error;

typed_id! {
    /// Renderer-owned render target
    #[derive(Serialize, Deserialize)]
    pub struct OffscreenBufferId(u32);
}

typed_id! {
    /// Placeholder for compositor-provided content
    #[derive(Serialize, Deserialize)]
    pub struct StreamBufferId(u32);
}

typed_id! {
    /// A compositor content source (for example a client surface)
    #[derive(Serialize, Deserialize)]
    pub struct StreamSourceId(u32);
}

/// Errors from buffer operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("offscreen buffer {0} already exists")]
    OffscreenBufferExists(OffscreenBufferId),

    #[error("offscreen buffer {0} does not exist")]
    UnknownOffscreenBuffer(OffscreenBufferId),

    #[error("offscreen buffer {buffer} is still consumed by {consumers} data links")]
    OffscreenBufferInUse { buffer: OffscreenBufferId, consumers: usize },

    #[error("offscreen buffer size {width}x{height} is invalid")]
    InvalidSize { width: u32, height: u32 },

    #[error("stream buffer {0} already exists")]
    StreamBufferExists(StreamBufferId),

    #[error("stream buffer {0} does not exist")]
    UnknownStreamBuffer(StreamBufferId),
}

/// A renderer-owned render target
#[derive(Debug, Clone)]
pub struct OffscreenBuffer {
    pub id: OffscreenBufferId,
    pub width: u32,
    pub height: u32,
    pub device: DeviceHandle,
}

impl OffscreenBuffer {
    /// Device memory for an RGBA8 buffer of this size
    pub fn byte_size_for(width: u32, height: u32) -> u64 {
        width as u64 * height as u64 * 4
    }
}

/// A compositor content placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBuffer {
    pub id: StreamBufferId,
    pub source: StreamSourceId,
    pub available: bool,
}

/// Owns offscreen buffers, stream buffers and scene assignments
#[derive(Debug, Default)]
pub struct BufferManager {
    offscreen: BTreeMap<OffscreenBufferId, OffscreenBuffer>,
    stream: BTreeMap<StreamBufferId, StreamBuffer>,
    /// Scenes rendering into an offscreen buffer; absent means framebuffer
    assignments: HashMap<SceneId, OffscreenBufferId>,
    /// Last known availability per stream source
    sources: HashMap<StreamSourceId, bool>,
}

impl BufferManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that an offscreen buffer could be created
    pub fn check_create_offscreen(&self, id: OffscreenBufferId, width: u32, height: u32) -> Result<(), BufferError> {
        if self.offscreen.contains_key(&id) {
            return Err(BufferError::OffscreenBufferExists(id));
        }
        if width == 0 || height == 0 {
            return Err(BufferError::InvalidSize { width, height });
        }
        Ok(())
    }

    /// Insert an offscreen buffer whose device object already exists
    pub fn insert_offscreen(&mut self, buffer: OffscreenBuffer) -> Result<(), BufferError> {
        self.check_create_offscreen(buffer.id, buffer.width, buffer.height)?;
        self.offscreen.insert(buffer.id, buffer);
        Ok(())
    }

    /// Remove an offscreen buffer; assigned scenes fall back to the framebuffer
    ///
    /// Returns the buffer and the scenes that were assigned to it.
    pub fn remove_offscreen(&mut self, id: OffscreenBufferId) -> Result<(OffscreenBuffer, Vec<SceneId>), BufferError> {
        let buffer = self
            .offscreen
            .remove(&id)
            .ok_or(BufferError::UnknownOffscreenBuffer(id))?;
        let reassigned = self.scenes_assigned_to(id);
        self.assignments.retain(|_, assigned| *assigned != id);
        Ok((buffer, reassigned))
    }

    /// Look up an offscreen buffer
    pub fn offscreen(&self, id: OffscreenBufferId) -> Option<&OffscreenBuffer> {
        self.offscreen.get(&id)
    }

    /// Number of offscreen buffers
    pub fn offscreen_count(&self) -> usize {
        self.offscreen.len()
    }

    /// Take every offscreen buffer, clearing all assignments
    pub fn drain_offscreen(&mut self) -> Vec<OffscreenBuffer> {
        self.assignments.clear();
        std::mem::take(&mut self.offscreen).into_values().collect()
    }

    /// Render `scene` into `buffer`, or into the framebuffer for `None`
    pub fn assign(&mut self, scene: SceneId, buffer: Option<OffscreenBufferId>) -> Result<(), BufferError> {
        match buffer {
            Some(id) => {
                if !self.offscreen.contains_key(&id) {
                    return Err(BufferError::UnknownOffscreenBuffer(id));
                }
                self.assignments.insert(scene, id);
            }
            None => {
                self.assignments.remove(&scene);
            }
        }
        Ok(())
    }

    /// Offscreen buffer a scene renders into
    pub fn assignment(&self, scene: SceneId) -> Option<OffscreenBufferId> {
        self.assignments.get(&scene).copied()
    }

    /// Scenes rendering into `buffer`, sorted
    pub fn scenes_assigned_to(&self, buffer: OffscreenBufferId) -> Vec<SceneId> {
        let scenes: BTreeSet<_> = self
            .assignments
            .iter()
            .filter(|(_, assigned)| **assigned == buffer)
            .map(|(scene, _)| *scene)
            .collect();
        scenes.into_iter().collect()
    }

    /// Forget a scene's assignment
    pub fn remove_scene(&mut self, scene: SceneId) {
        self.assignments.remove(&scene);
    }

    /// Create a stream buffer, picking up the source's last known availability
    pub fn create_stream(&mut self, id: StreamBufferId, source: StreamSourceId) -> Result<&StreamBuffer, BufferError> {
        if self.stream.contains_key(&id) {
            return Err(BufferError::StreamBufferExists(id));
        }
        let available = self.sources.get(&source).copied().unwrap_or(false);
        Ok(self.stream.entry(id).or_insert(StreamBuffer { id, source, available }))
    }

    /// Destroy a stream buffer
    pub fn destroy_stream(&mut self, id: StreamBufferId) -> Result<StreamBuffer, BufferError> {
        self.stream.remove(&id).ok_or(BufferError::UnknownStreamBuffer(id))
    }

    /// Look up a stream buffer
    pub fn stream(&self, id: StreamBufferId) -> Option<&StreamBuffer> {
        self.stream.get(&id)
    }

    /// Record a source's availability; returns the stream buffers that changed
    pub fn set_source_available(&mut self, source: StreamSourceId, available: bool) -> Vec<StreamBufferId> {
        self.sources.insert(source, available);
        self.stream
            .values_mut()
            .filter(|buffer| buffer.source == source && buffer.available != available)
            .map(|buffer| {
                buffer.available = available;
                buffer.id
            })
            .collect()
    }
}
