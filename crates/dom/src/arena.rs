//! Slot arena backing the workspace resource tables
//!
//! ## Layout
//!
//! ```text
//! SlotArena<T>: Vec<Option<T>>
//!               [Some][None][Some]...
//!                 ↑ u32 slot index, freed slots stay vacant
//! ```
//!
//! Slots are handed out in strictly increasing order and never reused, so a
//! freed slot can only ever answer "vacant". Every slot also records the id
//! of the workspace that owns the arena: a handle minted by another
//! workspace never resolves here, even when its index happens to be in range.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one workspace instance, unique for the life of the process
pub type WorkspaceId = u64;

static NEXT_WORKSPACE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh workspace id
pub(crate) fn next_workspace_id() -> WorkspaceId {
    NEXT_WORKSPACE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Position of a resource inside one workspace table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub(crate) workspace: WorkspaceId,
    pub(crate) index: u32,
}

impl Slot {
    pub fn workspace(&self) -> WorkspaceId {
        self.workspace
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Why a slot lookup failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    /// Handle was minted by a different workspace
    ForeignWorkspace,
    /// Index was never allocated by this arena
    OutOfRange,
    /// Slot existed but has been freed
    Vacant,
}

impl std::fmt::Display for SlotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotError::ForeignWorkspace => f.write_str("belongs to another workspace"),
            SlotError::OutOfRange => f.write_str("was never allocated"),
            SlotError::Vacant => f.write_str("has been freed"),
        }
    }
}

/// Arena allocator for one resource kind
#[derive(Debug)]
pub struct SlotArena<T> {
    owner: WorkspaceId,
    entries: Vec<Option<T>>,
    live: usize,
}

impl<T> SlotArena<T> {
    /// Create an empty arena owned by `owner`
    pub fn new(owner: WorkspaceId) -> Self {
        Self {
            owner,
            entries: Vec::new(),
            live: 0,
        }
    }

    /// Store a value, returns its slot
    pub fn insert(&mut self, value: T) -> Slot {
        let index = self.entries.len() as u32;
        self.entries.push(Some(value));
        self.live += 1;
        Slot {
            workspace: self.owner,
            index,
        }
    }

    fn check(&self, slot: Slot) -> std::result::Result<usize, SlotError> {
        if slot.workspace != self.owner {
            return Err(SlotError::ForeignWorkspace);
        }
        let index = slot.index as usize;
        match self.entries.get(index) {
            None => Err(SlotError::OutOfRange),
            Some(None) => Err(SlotError::Vacant),
            Some(Some(_)) => Ok(index),
        }
    }

    /// Get value by slot (immutable)
    pub fn get(&self, slot: Slot) -> std::result::Result<&T, SlotError> {
        let index = self.check(slot)?;
        self.entries[index].as_ref().ok_or(SlotError::Vacant)
    }

    /// Get value by slot (mutable)
    pub fn get_mut(&mut self, slot: Slot) -> std::result::Result<&mut T, SlotError> {
        let index = self.check(slot)?;
        self.entries[index].as_mut().ok_or(SlotError::Vacant)
    }

    /// Free a slot and hand back its value
    pub fn take(&mut self, slot: Slot) -> std::result::Result<T, SlotError> {
        let index = self.check(slot)?;
        let value = self.entries[index].take().ok_or(SlotError::Vacant)?;
        self.live -= 1;
        Ok(value)
    }

    /// Number of occupied slots
    pub fn live(&self) -> usize {
        self.live
    }

    /// Number of slots ever allocated
    pub fn allocated(&self) -> usize {
        self.entries.len()
    }

    /// Drop every stored value. Slots stay allocated (and vacant) so later
    /// lookups keep failing instead of aliasing new values.
    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = None;
        }
        self.live = 0;
    }
}
