//! # Strata Renderer
//!
//! The renderer side of scene distribution. It orchestrates:
//! - Per-scene flush queues and in-order application
//! - Client resource upload and unload (effects compile off-thread)
//! - Per-scene device resource registries
//! - Cross-scene data links, offscreen and stream buffers
//! - Scene lifecycle and backpressure
//!
//! ## Architecture
//!
//! ```text
//! Producers ──► SceneTransport ──► SceneUpdater queues ──► update_scenes() ──► dirty scenes + events
//!                                          │
//!                                          ▼
//!                     ResourceCache ◄──► AsyncEffectUploader (worker thread)
//!                                          │
//!                                          ▼
//!                               RenderDevice (Software | Null)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Producer order** - flushes of a scene are applied in index order, never partially
//! 2. **No silent eviction** - device resources go away only when their scene says so
//! 3. **Bounded backlog** - a stuck scene is force-applied, then force-unsubscribed
//! 4. **Clean teardown** - every registry is empty before it is dropped

pub mod config;
pub mod context;
pub mod device;
pub mod uploader;
pub mod registry;
pub mod resource_cache;
pub mod buffers;
pub mod links;
pub mod state;
pub mod scene;
pub mod event;
pub mod stats;
pub mod error;
pub mod updater;

pub use config::{ConfigError, ConfigResult, RendererConfig};
pub use context::{FrameClock, ManualClock, RendererContext};
pub use device::{DeviceError, DeviceHandle, DeviceKind, DeviceObject, DeviceObjectKind, RenderDevice};
pub use uploader::{
    AsyncEffectUploader, CompiledEffect, DefaultEffectCompiler, EffectCompiler, UploadCompletion,
    UploadError, UploadToken, UploaderStats,
};
pub use registry::{MemoryCategory, RegistryEntry, RegistryError, ResourceMetadata, ResourceRegistry};
pub use resource_cache::{ResourceCache, ResourceStatus, UnloadedResource};
pub use buffers::{
    BufferError, BufferManager, OffscreenBuffer, OffscreenBufferId, StreamBuffer, StreamBufferId,
    StreamSourceId,
};
pub use links::{DataLink, DataLinkGraph, LinkError, LinkKind, LinkSource};
pub use state::{SceneCompletion, SceneRequest, SceneState, SceneStateMachine, StateError};
pub use scene::{DataSlot, LogicalResource, RendererScene};
pub use event::{EventCollector, EventResult, RendererEvent};
pub use stats::{SceneReferenceHook, TickReport, UpdateStatistics};
pub use error::{RendererError, RendererResult};
pub use updater::{ResolvedSlot, SceneUpdater};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        EventResult, MemoryCategory, RenderDevice, RendererConfig, RendererContext, RendererError,
        RendererEvent, SceneState, SceneUpdater,
    };
}
