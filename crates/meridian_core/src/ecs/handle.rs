//! # Entity Handles
//!
//! Entities are identified by generational handles:
//! - Lower 32 bits: slot index
//! - Upper 32 bits: generation counter for detecting stale references
//!
//! A live handle always has a non-zero generation, so the raw value `0` is
//! free to serve as the invalid handle and as a list terminator in the
//! binary formats.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generational entity handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct HEntity(u64);

impl HEntity {
    /// The invalid handle. Never returned for a live entity.
    pub const INVALID: Self = Self(0);

    /// Creates a handle from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Rebuilds a handle from its persisted raw value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value, as persisted.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the index portion of the handle.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the handle.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// False for [`HEntity::INVALID`] and any handle with generation 0.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.generation() != 0
    }

    /// Params key for this entity: `"__"` followed by the decimal raw value.
    #[must_use]
    pub fn to_key(self) -> String {
        format!("__{}", self.0)
    }

    /// Parses a params key produced by [`HEntity::to_key`].
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        key.strip_prefix("__")?.parse().ok().map(Self)
    }
}

impl fmt::Debug for HEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HEntity({}v{})", self.index(), self.generation())
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena addressed by [`HEntity`].
///
/// Freed slots are reused; reuse bumps the generation so handles to the
/// old occupant become stale. The arena grows on demand, but
/// [`HandleArray::allocate_with_handle`] lets persisted handles be restored
/// verbatim.
pub struct HandleArray<T> {
    slots: Vec<Slot<T>>,
    /// Candidate free indices. May hold indices that were since claimed by
    /// `allocate_with_handle`; those are skipped on pop.
    free_indices: Vec<u32>,
    alive_count: usize,
}

impl<T> Default for HandleArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleArray<T> {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_indices: Vec::new(),
            alive_count: 0,
        }
    }

    /// Creates an empty arena with reserved slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_indices: Vec::new(),
            alive_count: 0,
        }
    }

    /// Number of live values.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.alive_count
    }

    /// True if nothing is alive.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.alive_count == 0
    }

    /// Number of slots ever created. Handle indices are below this.
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Stores `value` in a free slot and returns its handle.
    ///
    /// Returns [`HEntity::INVALID`] only if the index space is exhausted.
    pub fn allocate(&mut self, value: T) -> HEntity {
        let index = loop {
            match self.free_indices.pop() {
                Some(i) if self.slots[i as usize].value.is_none() => break i,
                Some(_) => continue,
                None => {
                    let Ok(i) = u32::try_from(self.slots.len()) else {
                        return HEntity::INVALID;
                    };
                    self.slots.push(Slot {
                        generation: 0,
                        value: None,
                    });
                    break i;
                }
            }
        };

        let slot = &mut self.slots[index as usize];
        // Increment generation to invalidate old references; 0 is reserved
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            g => g,
        };
        slot.value = Some(value);
        self.alive_count += 1;

        HEntity::new(index, slot.generation)
    }

    /// Stores `value` at exactly `handle`.
    ///
    /// Fails if the handle is invalid or its slot is occupied.
    pub fn allocate_with_handle(&mut self, handle: HEntity, value: T) -> bool {
        if !handle.is_valid() {
            return false;
        }

        let index = handle.index() as usize;
        if index >= self.slots.len() {
            let Ok(first_new) = u32::try_from(self.slots.len()) else {
                return false;
            };
            self.slots.resize_with(index + 1, || Slot {
                generation: 0,
                value: None,
            });
            // Skipped-over slots become allocatable; `index` itself is claimed below
            self.free_indices.extend((first_new..handle.index()).rev());
        }

        let slot = &mut self.slots[index];
        if slot.value.is_some() {
            return false;
        }
        slot.generation = handle.generation();
        slot.value = Some(value);
        self.alive_count += 1;
        true
    }

    /// Frees the value at `handle`, returning it.
    ///
    /// Stale or invalid handles are ignored.
    pub fn free(&mut self, handle: HEntity) -> Option<T> {
        let slot = self.slot_mut(handle)?;
        let value = slot.value.take()?;
        self.alive_count -= 1;
        self.free_indices.push(handle.index());
        Some(value)
    }

    /// True if `handle` refers to a live value.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: HEntity) -> bool {
        self.get(handle).is_some()
    }

    /// Returns the value at `handle` if the handle is live.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: HEntity) -> Option<&T> {
        let slot = self.slots.get(handle.index() as usize)?;
        if !handle.is_valid() || slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Mutable access to the value at `handle`.
    #[inline]
    pub fn get_mut(&mut self, handle: HEntity) -> Option<&mut T> {
        self.slot_mut(handle)?.value.as_mut()
    }

    fn slot_mut(&mut self, handle: HEntity) -> Option<&mut Slot<T>> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if !handle.is_valid() || slot.generation != handle.generation() {
            return None;
        }
        Some(slot)
    }

    /// Handle of the live value at `index`, if any.
    #[must_use]
    pub fn handle_at(&self, index: u32) -> Option<HEntity> {
        let slot = self.slots.get(index as usize)?;
        slot.value.as_ref()?;
        Some(HEntity::new(index, slot.generation))
    }

    /// Removes everything and reserves `capacity` slots.
    pub fn clear(&mut self, capacity: usize) {
        self.slots = Vec::with_capacity(capacity);
        self.free_indices.clear();
        self.alive_count = 0;
    }

    /// Iterates live values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (HEntity, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            let value = slot.value.as_ref()?;
            #[allow(clippy::cast_possible_truncation)]
            Some((HEntity::new(i as u32, slot.generation), value))
        })
    }

    /// Iterates live values mutably in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (HEntity, &mut T)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let value = slot.value.as_mut()?;
            #[allow(clippy::cast_possible_truncation)]
            Some((HEntity::new(i as u32, slot.generation), value))
        })
    }
}

impl<T: Clone> Clone for HandleArray<T> {
    fn clone(&self) -> Self {
        Self {
            slots: self
                .slots
                .iter()
                .map(|s| Slot {
                    generation: s.generation,
                    value: s.value.clone(),
                })
                .collect(),
            free_indices: self.free_indices.clone(),
            alive_count: self.alive_count,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for HandleArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
