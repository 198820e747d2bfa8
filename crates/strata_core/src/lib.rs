//! # strata_core - Strata Core
//!
//! Zero-dependency primitives shared by the delta model and the renderer:
//! - **Handles**: typed, generational references into a [`SlotArena`]
//! - **Ids**: newtype identifiers for scenes, slots and scene-local resources
//! - **Errors**: the small error vocabulary the primitives can produce
//!
//! Nothing here knows about scenes or devices. The renderer builds its
//! bookkeeping on top of these types.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

pub mod handle;
pub mod error;
pub mod id;

pub use handle::*;
pub use error::*;
pub use id::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::handle::{Handle, SlotArena};
    pub use crate::error::{HandleError, HandleResult};
    pub use crate::id::fnv1a_64;
}
