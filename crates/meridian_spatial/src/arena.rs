//! # Node Arena
//!
//! Sparse slot storage for tree nodes.
//!
//! Unlike a plain pool, the caller chooses a lower bound for the slot a new
//! value may take. Inserting every child after its parent keeps slot order
//! a valid parent-before-child order, which the visibility pass relies on.

use std::collections::BTreeSet;

/// Sparse arena whose slot order can be constrained on insertion.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena = NodeArena::new();
/// let root = arena.insert_after(None, "root").0;
/// let (child, reused) = arena.insert_after(Some(root), "child");
/// assert!(child > root);
/// ```
#[derive(Debug, Clone)]
pub struct NodeArena<T> {
    /// The storage array. Removed slots stay as holes.
    slots: Vec<Option<T>>,
    /// Hole indices, ordered for "first hole after" lookups.
    free: BTreeSet<u32>,
    /// Number of stored values.
    len: usize,
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodeArena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: BTreeSet::new(),
            len: 0,
        }
    }

    /// Number of stored values.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if nothing is stored.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots including holes. Every index is below this.
    #[inline]
    #[must_use]
    pub fn sparse_len(&self) -> usize {
        self.slots.len()
    }

    /// Stores `value` in the first hole after `after`, or appends it.
    ///
    /// Returns the index and whether an existing hole was reused.
    ///
    /// # Panics
    ///
    /// Panics if the arena exceeds `u32::MAX` slots.
    pub fn insert_after(&mut self, after: Option<u32>, value: T) -> (u32, bool) {
        let hole = match after {
            Some(min) => self.free.range(min + 1..).next().copied(),
            None => self.free.first().copied(),
        };

        self.len += 1;
        if let Some(index) = hole {
            self.free.remove(&index);
            self.slots[index as usize] = Some(value);
            return (index, true);
        }

        assert!(
            self.slots.len() < u32::MAX as usize,
            "node arena exceeds u32 index space"
        );
        #[allow(clippy::cast_possible_truncation)]
        let index = self.slots.len() as u32;
        self.slots.push(Some(value));
        (index, false)
    }

    /// True if a hole exists after `after`.
    #[must_use]
    pub fn has_hole_after(&self, after: u32) -> bool {
        self.free.range(after + 1..).next().is_some()
    }

    /// Removes the value at `index`, leaving a hole.
    pub fn remove(&mut self, index: u32) -> Option<T> {
        let value = self.slots.get_mut(index as usize)?.take()?;
        self.free.insert(index);
        self.len -= 1;
        Some(value)
    }

    /// Value at `index`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize)?.as_ref()
    }

    /// Mutable value at `index`.
    #[inline]
    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots.get_mut(index as usize)?.as_mut()
    }

    /// Removes everything and releases the storage.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }

    /// Iterates stored values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.iter_from(0)
    }

    /// Iterates stored values in slot order, starting at slot `start`.
    pub fn iter_from(&self, start: usize) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .skip(start)
            .filter_map(|(index, slot)| {
                #[allow(clippy::cast_possible_truncation)]
                slot.as_ref().map(|v| (index as u32, v))
            })
    }
}
