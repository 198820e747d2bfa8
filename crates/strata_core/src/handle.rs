//! Generational handles and the slot arena they index
//!
//! A [`SlotArena`] owns values in a flat vector of slots. Every slot carries a
//! generation that is bumped when the value is released, so a stale handle
//! can never reach a value that was allocated later in the same slot.
//!
//! The arena deliberately exposes only `allocate`, `release` and `get` (plus
//! read-only iteration). There is no direct indexing and no sentinel value.

use core::marker::PhantomData;
use core::hash::{Hash, Hasher};
use core::fmt;
use alloc::vec::Vec;

use crate::error::{HandleError, HandleResult};

/// A type-safe handle to a value of type T stored in a [`SlotArena`]
#[repr(transparent)]
pub struct Handle<T> {
    /// Lower 32 bits: index, Upper 32 bits: generation
    bits: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Create a new handle from index and generation
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            bits: (generation as u64) << 32 | index as u64,
            _marker: PhantomData,
        }
    }

    /// Get the index portion
    #[inline]
    pub const fn index(&self) -> u32 {
        self.bits as u32
    }

    /// Get the generation portion
    #[inline]
    pub const fn generation(&self) -> u32 {
        (self.bits >> 32) as u32
    }

    /// Convert to raw bits for logging and serialization
    #[inline]
    pub const fn to_bits(&self) -> u64 {
        self.bits
    }

    /// Create from raw bits
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            bits,
            _marker: PhantomData,
        }
    }
}

// Manual trait implementations to avoid T bounds
impl<T> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.bits.cmp(&other.bits)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = core::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "Handle<{}>({}v{})", short, self.index(), self.generation())
    }
}

impl<T> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

/// One arena slot: the generation survives release, the value does not
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena of generational slots
pub struct SlotArena<T> {
    slots: Vec<Slot<T>>,
    /// Indices of released slots, reused LIFO
    free_list: Vec<u32>,
    len: usize,
}

impl<T> SlotArena<T> {
    /// Create an empty arena
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Create an empty arena with room for `capacity` values
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity / 4),
            len: 0,
        }
    }

    /// Store a value and return the handle that reaches it
    pub fn allocate(&mut self, value: T) -> Handle<T> {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            Handle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            Handle::new(index, 0)
        }
    }

    /// Remove the value behind `handle`, invalidating the handle
    pub fn release(&mut self, handle: Handle<T>) -> HandleResult<T> {
        let slot = self
            .slots
            .get_mut(handle.index() as usize)
            .ok_or(HandleError::OutOfBounds)?;
        if slot.generation != handle.generation() || slot.value.is_none() {
            return Err(HandleError::Stale);
        }

        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index());
        self.len -= 1;
        slot.value.take().ok_or(HandleError::Stale)
    }

    /// Get the value behind `handle`, or `None` for stale/unknown handles
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Mutable access to the value behind `handle`
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Check if a handle still reaches a live value
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no values are live
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total slots ever created (live + released)
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterate over all live handles and values
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|v| (Handle::new(i as u32, slot.generation), v))
        })
    }
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for SlotArena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_get() {
        let mut arena: SlotArena<&str> = SlotArena::new();
        let h1 = arena.allocate("hello");
        let h2 = arena.allocate("world");

        assert_ne!(h1, h2);
        assert_eq!(arena.get(h1), Some(&"hello"));
        assert_eq!(arena.get(h2), Some(&"world"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_release_invalidates_handle() {
        let mut arena: SlotArena<u32> = SlotArena::new();
        let h1 = arena.allocate(7);

        assert_eq!(arena.release(h1), Ok(7));
        assert_eq!(arena.get(h1), None);
        assert_eq!(arena.release(h1), Err(HandleError::Stale));
        assert!(arena.is_empty());
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut arena: SlotArena<u32> = SlotArena::new();
        let h1 = arena.allocate(1);
        arena.release(h1).unwrap();

        let h2 = arena.allocate(2);
        assert_eq!(h2.index(), h1.index());
        assert_ne!(h2.generation(), h1.generation());
        assert_eq!(arena.get(h1), None);
        assert_eq!(arena.get(h2), Some(&2));
        assert_eq!(arena.capacity(), 1);
    }

    #[test]
    fn test_out_of_bounds_release() {
        let mut arena: SlotArena<u32> = SlotArena::new();
        assert_eq!(arena.release(Handle::new(5, 0)), Err(HandleError::OutOfBounds));
    }

    #[test]
    fn test_iter_skips_released() {
        let mut arena: SlotArena<u32> = SlotArena::new();
        let a = arena.allocate(1);
        let _b = arena.allocate(2);
        arena.release(a).unwrap();

        let values: Vec<u32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2]);
    }
}
