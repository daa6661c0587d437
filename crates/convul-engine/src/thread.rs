//! Thread registry and per-thread event logs.
//!
//! Each tracked thread owns a vector clock (initially all ones), an
//! append-only trace of events, an arena of blocks, and the map of blocks
//! it currently holds. Only the owning thread appends; other threads read
//! traces and blocks while evaluating exchangeability.
//!
//! Slots for ids below the configured bound are allocated up front and
//! never change. Ids at or above the bound get best-effort slots created on
//! demand; they have no clock component of their own, so their events never
//! tick. Consecutive events of such a thread compare equal and are always
//! exchangeable, so reports naming them may pair program-ordered events.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::clock::VectorClock;
use crate::error::Diagnostic;
use crate::event::{Block, BlockId, Event, EventId, ExecContext, LockId, OpKind};
use crate::lock::LockRecord;

#[derive(Debug)]
struct ThreadState {
    clock: VectorClock,
    trace: Vec<Arc<Event>>,
    held: BTreeMap<LockId, BlockId>,
    blocks: Vec<Block>,
}

/// One logical thread.
#[derive(Debug)]
pub struct ThreadSlot {
    id: usize,
    owns_component: bool,
    state: RwLock<ThreadState>,
}

impl ThreadSlot {
    fn new(id: usize, width: usize) -> Self {
        Self {
            id,
            owns_component: id < width,
            state: RwLock::new(ThreadState {
                clock: VectorClock::filled(width, 1),
                trace: Vec::new(),
                held: BTreeMap::new(),
                blocks: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn clock(&self) -> VectorClock {
        self.state.read().clock.clone()
    }

    #[must_use]
    pub fn trace_len(&self) -> usize {
        self.state.read().trace.len()
    }

    #[must_use]
    pub fn event(&self, seq: usize) -> Option<Arc<Event>> {
        self.state.read().trace.get(seq).cloned()
    }

    #[must_use]
    pub fn block(&self, slot: usize) -> Option<Block> {
        self.state.read().blocks.get(slot).copied()
    }

    /// Locks currently held, in handle order.
    #[must_use]
    pub fn held_locks(&self) -> Vec<LockId> {
        self.state.read().held.keys().copied().collect()
    }

    /// Tick the local clock and append a new event stamped with it.
    ///
    /// The event captures the blocks open at this moment. Fails only when
    /// the trace cannot grow; the event is then dropped.
    pub(crate) fn record(
        &self,
        op: OpKind,
        addr: usize,
        ip: usize,
        context: ExecContext,
        value: Option<usize>,
    ) -> Result<Arc<Event>, Diagnostic> {
        let mut state = self.state.write();
        if state.trace.try_reserve(1).is_err() {
            return Err(Diagnostic::EventAllocation { thread: self.id });
        }
        if self.owns_component {
            state.clock.increment(self.id);
        }
        let event = Arc::new(Event {
            id: EventId {
                thread: self.id,
                seq: state.trace.len(),
            },
            op,
            addr,
            ip,
            context,
            clock: state.clock.clone(),
            held: state.held.clone(),
            value,
        });
        state.trace.push(Arc::clone(&event));
        Ok(event)
    }

    /// Acquire side: pull the lock's history in and open a block starting at
    /// trace index `acquired_at`.
    pub(crate) fn open_block(&self, lock: &LockRecord, acquired_at: usize) -> Option<Diagnostic> {
        let mut state = self.state.write();
        lock.merge_into(&mut state.clock);

        if state.held.contains_key(&lock.id()) {
            return Some(Diagnostic::LockAlreadyHeld {
                thread: self.id,
                lock: lock.addr(),
            });
        }
        let block_id = BlockId {
            thread: self.id,
            slot: state.blocks.len(),
        };
        state.blocks.push(Block {
            thread: self.id,
            lock: lock.id(),
            acquired_at,
            released_at: None,
        });
        state.held.insert(lock.id(), block_id);
        None
    }

    /// Release side: push this thread's history into the lock and close the
    /// open block at trace index `released_at`.
    pub(crate) fn close_block(&self, lock: &LockRecord, released_at: usize) -> Option<Diagnostic> {
        let mut state = self.state.write();
        lock.absorb(&state.clock);

        match state.held.remove(&lock.id()) {
            Some(block_id) => {
                state.blocks[block_id.slot].released_at = Some(released_at);
                None
            }
            None => Some(Diagnostic::ReleaseWithoutAcquire {
                thread: self.id,
                lock: lock.addr(),
            }),
        }
    }
}

/// All logical threads of a run.
#[derive(Debug)]
pub struct ThreadRegistry {
    width: usize,
    slots: Box<[Arc<ThreadSlot>]>,
    overflow: RwLock<HashMap<usize, Arc<ThreadSlot>>>,
}

impl ThreadRegistry {
    #[must_use]
    pub fn new(width: usize) -> Self {
        let slots: Vec<Arc<ThreadSlot>> = (0..width)
            .map(|id| Arc::new(ThreadSlot::new(id, width)))
            .collect();
        Self {
            width,
            slots: slots.into_boxed_slice(),
            overflow: RwLock::new(HashMap::new()),
        }
    }

    /// Configured thread bound (clock width).
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn in_range(&self, thread: usize) -> bool {
        thread < self.width
    }

    /// Slot for `thread`, creating a best-effort slot for over-range ids.
    pub fn slot(&self, thread: usize) -> Arc<ThreadSlot> {
        if let Some(slot) = self.slots.get(thread) {
            return Arc::clone(slot);
        }
        if let Some(slot) = self.overflow.read().get(&thread) {
            return Arc::clone(slot);
        }
        let mut overflow = self.overflow.write();
        Arc::clone(
            overflow
                .entry(thread)
                .or_insert_with(|| Arc::new(ThreadSlot::new(thread, self.width))),
        )
    }

    /// Slot for `thread` if it has ever been seen.
    #[must_use]
    pub fn existing(&self, thread: usize) -> Option<Arc<ThreadSlot>> {
        match self.slots.get(thread) {
            Some(slot) => Some(Arc::clone(slot)),
            None => self.overflow.read().get(&thread).cloned(),
        }
    }

    #[must_use]
    pub fn event(&self, id: EventId) -> Option<Arc<Event>> {
        self.existing(id.thread)?.event(id.seq)
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<Block> {
        self.existing(id.thread)?.block(id.slot)
    }

    /// Number of threads with a slot, including over-range ones.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.width + self.overflow.read().len()
    }

    /// Largest clock component across every thread.
    #[must_use]
    pub fn max_clock(&self) -> u32 {
        let in_range = self.slots.iter().map(|s| s.clock().max_component());
        let overflow: Vec<u32> = self
            .overflow
            .read()
            .values()
            .map(|s| s.clock().max_component())
            .collect();
        in_range.chain(overflow).max().unwrap_or(0)
    }
}
