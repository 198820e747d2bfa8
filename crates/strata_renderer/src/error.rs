//! Renderer error type
//!
//! Every fallible orchestrator operation returns [`RendererError`]. The
//! component errors convert into it with `?`.

use crate::buffers::BufferError;
use crate::config::ConfigError;
use crate::device::DeviceError;
use crate::links::LinkError;
use crate::registry::RegistryError;
use crate::state::StateError;
use crate::uploader::UploadError;
use strata_ir::{SceneId, TransportError};
use thiserror::Error;

/// Errors from the scene updater
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("transport contract violated: {0}")]
    Transport(#[from] TransportError),

    #[error("scene {scene}: {source}")]
    State { scene: SceneId, source: StateError },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("uploader error: {0}")]
    Upload(#[from] UploadError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("scene {0} is not known to the renderer")]
    UnknownScene(SceneId),

    #[error("flush for scene {flush} handed to scene {expected}")]
    SceneMismatch { expected: SceneId, flush: SceneId },

    #[error("no display has been created")]
    NoDisplay,

    #[error("a display already exists")]
    DisplayAlreadyExists,

    #[error("display still in use by {scenes} scenes and {offscreen_buffers} offscreen buffers")]
    DisplayInUse { scenes: usize, offscreen_buffers: usize },
}

/// Result alias for renderer operations
pub type RendererResult<T> = Result<T, RendererError>;
