//! # Strata IR - Scene Deltas & Transport
//!
//! Producers never touch renderer state. They describe changes to a scene
//! as declarative actions, batch them into flushes and hand the flushes to
//! the transport. The renderer applies them at tick boundaries.
//!
//! ## Architecture
//!
//! ```text
//! Producer A ──┐
//!              ├──► SceneTransport ──► Flush ──► Renderer applies ──► Scene state
//! Producer B ──┘
//! ```
//!
//! ## Key Concepts
//!
//! - **SceneAction**: one structural change (allocate/update/release, data slots)
//! - **Flush**: an ordered, producer-numbered batch of actions applied atomically
//! - **ResourceDescriptor**: immutable client resource identified by content hash
//! - **SceneTransport**: channel that carries publications and flushes

pub mod ids;
pub mod value;
pub mod resource;
pub mod action;
pub mod flush;
pub mod validation;
pub mod transport;

pub use ids::{
    SceneId, DataSlotId, RenderBufferHandle, RenderTargetHandle, BlitPassHandle,
    DataBufferHandle, TextureBufferHandle, VertexArrayHandle, SceneResource,
};
pub use value::{DataValue, DataValueType};
pub use resource::{ResourceContentHash, ResourceDescriptor, ResourceKind};
pub use action::{
    SceneAction, BufferFormat, BufferAccess, RenderBufferProperties, DataBufferKind,
    TextureBufferProperties, DataSlotKind,
};
pub use flush::{Flush, FlushBuilder, FlushIndex, FlushTimeInfo, ResourceChanges};
pub use validation::{FlushValidator, SceneContent, ValidationError, ValidationResult};
pub use transport::{
    SceneTransport, TransportConfig, TransportError, TransportMessage, TransportStats,
    ProducerHandle,
};
