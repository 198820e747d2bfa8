//! Errors produced by the arena primitives

use core::fmt;

/// Why a handle could not be resolved against its [`SlotArena`](crate::SlotArena)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// The slot was released since the handle was issued
    Stale,
    /// The handle points past every slot the arena ever allocated
    OutOfBounds,
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleError::Stale => write!(f, "handle refers to a released slot"),
            HandleError::OutOfBounds => write!(f, "handle index is outside the arena"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HandleError {}

/// Result of an arena operation
pub type HandleResult<T> = core::result::Result<T, HandleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(HandleError::Stale.to_string(), "handle refers to a released slot");
        assert_eq!(HandleError::OutOfBounds.to_string(), "handle index is outside the arena");
    }
}
