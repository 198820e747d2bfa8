//! Scene lifecycle
//!
//! ```text
//! Unknown ─publish─► Published ─subscribe─► SubscriptionRequested ─(first flush)─► Subscribed
//!                        ▲                                                            │ map
//!                        │ unsubscribe completed                                      ▼
//!                   Unsubscribing                                               MapRequested
//!                                                                                     │ (resources ready)
//!                        Subscribed ◄─unmap completed── Unmapping ◄─unmap── Mapped ◄──┘
//!                                                                       show │ ▲ hide
//!                                                                            ▼ │
//!                                                                          Rendered
//! ```
//!
//! The state machine only checks legality. It never touches resources;
//! the updater does the work and reports completions back.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a scene on the renderer side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneState {
    Unknown,
    Published,
    SubscriptionRequested,
    Subscribed,
    MapRequested,
    Mapped,
    Rendered,
    Unsubscribing,
    Unmapping,
}

impl SceneState {
    /// Whether the scene receives flushes
    pub fn is_subscribed(&self) -> bool {
        matches!(
            self,
            Self::SubscriptionRequested
                | Self::Subscribed
                | Self::MapRequested
                | Self::Mapped
                | Self::Rendered
                | Self::Unmapping
        )
    }

    /// Whether the scene needs its resources on the device
    pub fn wants_device(&self) -> bool {
        matches!(self, Self::MapRequested | Self::Mapped | Self::Rendered)
    }
}

impl std::fmt::Display for SceneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Externally requested transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneRequest {
    Publish,
    Unpublish,
    Subscribe,
    Unsubscribe,
    Map,
    Unmap,
    Show,
    Hide,
}

/// Transition reported by the updater once work is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneCompletion {
    SubscriptionReceived,
    UnsubscribeCompleted,
    MapCompleted,
    UnmapCompleted,
}

/// Errors from lifecycle transitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("cannot {request:?} a scene in state {from}")]
    InvalidTransition { from: SceneState, request: SceneRequest },

    #[error("cannot complete {completion:?} in state {from}")]
    InvalidCompletion { from: SceneState, completion: SceneCompletion },

    #[error("scene cannot be shown before a flush has been applied")]
    NothingApplied,
}

/// Per-scene lifecycle state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneStateMachine {
    state: SceneState,
    flush_applied: bool,
}

impl Default for SceneStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneStateMachine {
    /// Create a state machine in `Unknown`
    pub fn new() -> Self {
        Self {
            state: SceneState::Unknown,
            flush_applied: false,
        }
    }

    /// Current state
    pub fn state(&self) -> SceneState {
        self.state
    }

    /// Whether a flush has been applied since the last subscription
    pub fn flush_applied(&self) -> bool {
        self.flush_applied
    }

    /// Record that a flush was applied
    pub fn mark_flush_applied(&mut self) {
        self.flush_applied = true;
    }

    /// Perform an external request, returning the new state
    pub fn request(&mut self, request: SceneRequest) -> Result<SceneState, StateError> {
        use SceneRequest as R;
        use SceneState as S;

        let next = match (self.state, request) {
            (S::Unknown, R::Publish) => S::Published,
            (from, R::Unpublish) if from != S::Unknown => S::Unknown,
            (S::Published, R::Subscribe) => S::SubscriptionRequested,
            (S::SubscriptionRequested | S::Subscribed, R::Unsubscribe) => S::Unsubscribing,
            (S::Subscribed, R::Map) => S::MapRequested,
            (S::MapRequested | S::Mapped, R::Unmap) => S::Unmapping,
            (S::Mapped, R::Show) if !self.flush_applied => return Err(StateError::NothingApplied),
            (S::Mapped, R::Show) => S::Rendered,
            (S::Rendered, R::Hide) => S::Mapped,
            (from, request) => return Err(StateError::InvalidTransition { from, request }),
        };

        if next == S::Unknown || next == S::Unsubscribing {
            self.flush_applied = false;
        }
        self.state = next;
        Ok(next)
    }

    /// Report completed work, returning the new state
    pub fn complete(&mut self, completion: SceneCompletion) -> Result<SceneState, StateError> {
        use SceneCompletion as C;
        use SceneState as S;

        let next = match (self.state, completion) {
            (S::SubscriptionRequested, C::SubscriptionReceived) => S::Subscribed,
            (S::Unsubscribing, C::UnsubscribeCompleted) => S::Published,
            (S::MapRequested, C::MapCompleted) => S::Mapped,
            (S::Unmapping, C::UnmapCompleted) => S::Subscribed,
            (from, completion) => return Err(StateError::InvalidCompletion { from, completion }),
        };
        self.state = next;
        Ok(next)
    }

    /// Drop the subscription unconditionally (backpressure ceiling)
    pub fn force_unsubscribe(&mut self) -> SceneState {
        if self.state.is_subscribed() || self.state == SceneState::Unsubscribing {
            self.state = SceneState::Published;
        }
        self.flush_applied = false;
        self.state
    }
}
