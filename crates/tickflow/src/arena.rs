//! Generational arena for blocks and cells.
//!
//! Owning references (a Block's properties, a Property's child Block) are
//! arena entries. Everything else (listeners, parent pointers, binding
//! links) holds a handle that must be validated before use.

use std::fmt;
use std::marker::PhantomData;

/// Generational index into an arena.
/// Allows safe reuse of slots with use-after-free detection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SlotId {
    pub index: u32,
    pub generation: u32,
}

impl SlotId {
    pub const INVALID: Self = Self { index: u32::MAX, generation: 0 };

    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }
}

/// Typed wrapper around a [`SlotId`].
pub trait ArenaKey: Copy {
    fn from_slot(slot: SlotId) -> Self;
    fn slot(self) -> SlotId;
}

macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) SlotId);

        impl $crate::arena::ArenaKey for $name {
            fn from_slot(slot: SlotId) -> Self {
                Self(slot)
            }

            fn slot(self) -> SlotId {
                self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({}v{})", stringify!($name), self.0.index, self.0.generation)
            }
        }
    };
}

arena_key!(
    /// Handle to a Block (or Flow) in a [`Graph`](crate::Graph).
    BlockId
);
arena_key!(
    /// Handle to a cell: a Property or a binding link.
    CellId
);

/// Properties and binding links share the cell arena.
pub type PropId = CellId;

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena allocator with generation checks.
pub struct Arena<K, T> {
    entries: Vec<Entry<T>>,
    free_list: Vec<u32>,
    live: usize,
    _key: PhantomData<K>,
}

impl<K: ArenaKey, T> Arena<K, T> {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            live: 0,
            _key: PhantomData,
        }
    }

    /// Allocate a new slot holding `value`.
    pub fn alloc(&mut self, value: T) -> K {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            // Freed slots already had their generation bumped
            let entry = &mut self.entries[index as usize];
            entry.value = Some(value);
            K::from_slot(SlotId { index, generation: entry.generation })
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(Entry { generation: 0, value: Some(value) });
            K::from_slot(SlotId { index, generation: 0 })
        }
    }

    /// Free a slot, returning its value. Stale keys return `None`.
    pub fn free(&mut self, key: K) -> Option<T> {
        let slot = key.slot();
        let entry = self.entries.get_mut(slot.index as usize)?;
        if entry.generation != slot.generation || entry.value.is_none() {
            return None;
        }
        entry.generation = entry.generation.wrapping_add(1);
        self.free_list.push(slot.index);
        self.live -= 1;
        entry.value.take()
    }

    /// Check if a key is valid (correct generation).
    pub fn is_valid(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: K) -> Option<&T> {
        let slot = key.slot();
        self.entries
            .get(slot.index as usize)
            .filter(|e| e.generation == slot.generation)
            .and_then(|e| e.value.as_ref())
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let slot = key.slot();
        self.entries
            .get_mut(slot.index as usize)
            .filter(|e| e.generation == slot.generation)
            .and_then(|e| e.value.as_mut())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate over live entries.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.entries.iter().enumerate().filter_map(|(index, e)| {
            e.value.as_ref().map(|v| {
                (K::from_slot(SlotId { index: index as u32, generation: e.generation }), v)
            })
        })
    }
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> fmt::Debug for Arena<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("slots", &self.entries.len())
            .field("live", &self.live)
            .finish()
    }
}
