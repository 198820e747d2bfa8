//! Renderer events
//!
//! Every lifecycle transition, buffer operation, backpressure decision and
//! upload failure produces one event. Collaborators drain them once per
//! tick with [`SceneUpdater::drain_events`](crate::SceneUpdater::drain_events).

use crate::buffers::{OffscreenBufferId, StreamBufferId, StreamSourceId};
use crate::links::LinkSource;
use serde::Serialize;
use strata_ir::{DataSlotId, FlushIndex, ResourceContentHash, SceneId, SceneResource};

/// Outcome carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventResult {
    /// The requested operation succeeded
    Ok,
    /// The requested operation was refused or failed
    Failed,
    /// The renderer did this on its own (backpressure, cleanup)
    Indirect,
}

/// A structured renderer event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RendererEvent {
    ScenePublished { scene: SceneId, result: EventResult },
    SceneUnpublished { scene: SceneId, result: EventResult },
    SceneSubscribed { scene: SceneId, result: EventResult },
    SceneUnsubscribed { scene: SceneId, result: EventResult },
    SceneMapped { scene: SceneId, result: EventResult },
    SceneUnmapped { scene: SceneId, result: EventResult },
    SceneShown { scene: SceneId, result: EventResult },
    SceneHidden { scene: SceneId, result: EventResult },

    /// A flush carrying a version tag was applied
    SceneFlushed { scene: SceneId, version_tag: u64 },
    /// A flush failed validation and was dropped
    SceneFlushRejected { scene: SceneId, index: FlushIndex, reason: String },
    /// Pending flushes were applied without waiting for resources
    SceneFlushesForceApplied { scene: SceneId, count: usize },
    /// The scene hit the pending-flush ceiling and lost its subscription
    SceneForceUnsubscribed { scene: SceneId, pending: usize },
    SceneExpired { scene: SceneId },
    SceneRecoveredFromExpiration { scene: SceneId },

    /// A client resource could not be realized
    ResourceUploadFailed { scene: SceneId, hash: ResourceContentHash, reason: String },
    /// A scene resource could not be realized
    SceneResourceFailed { scene: SceneId, resource: SceneResource, reason: String },

    DisplayCreated { result: EventResult },
    DisplayDestroyed { result: EventResult },
    OffscreenBufferCreated { buffer: OffscreenBufferId, result: EventResult },
    OffscreenBufferDestroyed { buffer: OffscreenBufferId, result: EventResult },
    StreamBufferCreated { buffer: StreamBufferId, result: EventResult },
    StreamBufferDestroyed { buffer: StreamBufferId, result: EventResult },
    SceneAssignedToBuffer { scene: SceneId, buffer: Option<OffscreenBufferId>, result: EventResult },
    DataLinked { source: LinkSource, consumer: SceneId, slot: DataSlotId, result: EventResult },
    DataUnlinked { consumer: SceneId, slot: DataSlotId, result: EventResult },
    StreamSourceAvailabilityChanged { source: StreamSourceId, available: bool },
}

impl RendererEvent {
    /// Scene the event is about, if any
    pub fn scene(&self) -> Option<SceneId> {
        match self {
            Self::ScenePublished { scene, .. }
            | Self::SceneUnpublished { scene, .. }
            | Self::SceneSubscribed { scene, .. }
            | Self::SceneUnsubscribed { scene, .. }
            | Self::SceneMapped { scene, .. }
            | Self::SceneUnmapped { scene, .. }
            | Self::SceneShown { scene, .. }
            | Self::SceneHidden { scene, .. }
            | Self::SceneFlushed { scene, .. }
            | Self::SceneFlushRejected { scene, .. }
            | Self::SceneFlushesForceApplied { scene, .. }
            | Self::SceneForceUnsubscribed { scene, .. }
            | Self::SceneExpired { scene }
            | Self::SceneRecoveredFromExpiration { scene }
            | Self::ResourceUploadFailed { scene, .. }
            | Self::SceneResourceFailed { scene, .. }
            | Self::SceneAssignedToBuffer { scene, .. } => Some(*scene),
            Self::DataLinked { consumer, .. } | Self::DataUnlinked { consumer, .. } => Some(*consumer),
            _ => None,
        }
    }

    /// Outcome code of the event
    pub fn result(&self) -> EventResult {
        match self {
            Self::ScenePublished { result, .. }
            | Self::SceneUnpublished { result, .. }
            | Self::SceneSubscribed { result, .. }
            | Self::SceneUnsubscribed { result, .. }
            | Self::SceneMapped { result, .. }
            | Self::SceneUnmapped { result, .. }
            | Self::SceneShown { result, .. }
            | Self::SceneHidden { result, .. }
            | Self::DisplayCreated { result }
            | Self::DisplayDestroyed { result }
            | Self::OffscreenBufferCreated { result, .. }
            | Self::OffscreenBufferDestroyed { result, .. }
            | Self::StreamBufferCreated { result, .. }
            | Self::StreamBufferDestroyed { result, .. }
            | Self::SceneAssignedToBuffer { result, .. }
            | Self::DataLinked { result, .. }
            | Self::DataUnlinked { result, .. } => *result,
            Self::SceneFlushRejected { .. }
            | Self::SceneForceUnsubscribed { .. }
            | Self::SceneExpired { .. }
            | Self::ResourceUploadFailed { .. }
            | Self::SceneResourceFailed { .. } => EventResult::Failed,
            Self::SceneFlushesForceApplied { .. } => EventResult::Indirect,
            Self::SceneFlushed { .. }
            | Self::SceneRecoveredFromExpiration { .. }
            | Self::StreamSourceAvailabilityChanged { .. } => EventResult::Ok,
        }
    }
}

/// Ordered buffer of events since the last drain
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<RendererEvent>,
}

impl EventCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event
    pub fn push(&mut self, event: RendererEvent) {
        log::trace!("event: {:?}", event);
        self.events.push(event);
    }

    /// Take all recorded events
    pub fn drain(&mut self) -> Vec<RendererEvent> {
        std::mem::take(&mut self.events)
    }

    /// Peek at recorded events
    pub fn iter(&self) -> impl Iterator<Item = &RendererEvent> {
        self.events.iter()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
