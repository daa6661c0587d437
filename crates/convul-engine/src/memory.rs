//! Memory registry: per-address analysis state for every oracle.
//!
//! One `RwLock` guards the whole address map. Oracle evaluation for an
//! event runs under the exclusive guard, so each read, write, or free is
//! observed atomically with respect to every other memory event.

use std::collections::{BTreeSet, HashMap};

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::event::EventId;

/// Reads and writes seen at an address, for use-after-free checks.
#[derive(Debug, Clone, Default)]
pub struct UafState {
    pub(crate) accesses: Vec<EventId>,
}

/// Null-pointer-dereference state.
#[derive(Debug, Clone, Default)]
pub struct NpdState {
    /// Dereferencing reads.
    pub(crate) reads: Vec<EventId>,
    pub(crate) null_writes: Vec<EventId>,
    pub(crate) non_null_writes: Vec<EventId>,
}

/// Double-free state.
#[derive(Debug, Clone, Default)]
pub struct DfState {
    /// Addresses whose most recent write stored this address.
    pub(crate) pointed_by: BTreeSet<usize>,
    /// Most recent write to this address, and the value it stored.
    pub(crate) last_pointer_write: Option<(EventId, usize)>,
    pub(crate) frees: Vec<EventId>,
}

/// Analysis state for one address.
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    addr: usize,
    pub(crate) uaf: UafState,
    pub(crate) npd: NpdState,
    pub(crate) df: DfState,
}

impl MemoryRecord {
    #[must_use]
    pub fn new(addr: usize) -> Self {
        Self {
            addr,
            uaf: UafState::default(),
            npd: NpdState::default(),
            df: DfState::default(),
        }
    }

    #[must_use]
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// Every read and write at this address, in arrival order.
    #[must_use]
    pub fn accesses(&self) -> &[EventId] {
        &self.uaf.accesses
    }

    #[must_use]
    pub fn deref_reads(&self) -> &[EventId] {
        &self.npd.reads
    }

    #[must_use]
    pub fn null_writes(&self) -> &[EventId] {
        &self.npd.null_writes
    }

    #[must_use]
    pub fn non_null_writes(&self) -> &[EventId] {
        &self.npd.non_null_writes
    }

    #[must_use]
    pub fn pointed_by(&self) -> &BTreeSet<usize> {
        &self.df.pointed_by
    }

    #[must_use]
    pub fn last_pointer_write(&self) -> Option<EventId> {
        self.df.last_pointer_write.map(|(id, _)| id)
    }

    /// Address this location currently points at.
    #[must_use]
    pub fn pointee(&self) -> Option<usize> {
        self.df.last_pointer_write.map(|(_, target)| target)
    }

    #[must_use]
    pub fn frees(&self) -> &[EventId] {
        &self.df.frees
    }
}

pub(crate) type MemoryMap = HashMap<usize, MemoryRecord>;

/// Record for `addr`, created empty on first touch.
pub(crate) fn record_mut(map: &mut MemoryMap, addr: usize) -> &mut MemoryRecord {
    map.entry(addr).or_insert_with(|| MemoryRecord::new(addr))
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: RwLock<MemoryMap>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, MemoryMap> {
        self.records.write()
    }

    /// Copy of the record for `addr`, if any oracle has touched it.
    #[must_use]
    pub fn snapshot(&self, addr: usize) -> Option<MemoryRecord> {
        self.records.read().get(&addr).cloned()
    }

    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        self.records.read().contains_key(&addr)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
