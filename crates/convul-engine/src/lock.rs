//! Lock registry: one vector clock per synchronization object.
//!
//! The address→handle table sits behind one `RwLock`; each lock's clock has
//! its own `RwLock` so unrelated locks never contend. Acquires merge under the
//! shared guard, releases under the exclusive guard.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::clock::VectorClock;
use crate::event::LockId;

/// Causal history of one lock up to its last release.
#[derive(Debug)]
pub struct LockRecord {
    id: LockId,
    addr: usize,
    clock: RwLock<VectorClock>,
}

impl LockRecord {
    #[must_use]
    pub fn id(&self) -> LockId {
        self.id
    }

    #[must_use]
    pub fn addr(&self) -> usize {
        self.addr
    }

    #[must_use]
    pub fn clock(&self) -> VectorClock {
        self.clock.read().clone()
    }

    /// Pull this lock's history into `thread_clock` (acquire side).
    pub fn merge_into(&self, thread_clock: &mut VectorClock) {
        thread_clock.merge_max(&self.clock.read());
    }

    /// Push `thread_clock` into this lock's history (release side).
    pub fn absorb(&self, thread_clock: &VectorClock) {
        self.clock.write().merge_max(thread_clock);
    }
}

#[derive(Debug, Default)]
struct LockTable {
    by_addr: HashMap<usize, LockId>,
    locks: Vec<Arc<LockRecord>>,
}

/// Concurrent lock registry.
#[derive(Debug)]
pub struct LockRegistry {
    width: usize,
    table: RwLock<LockTable>,
}

impl LockRegistry {
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            width,
            table: RwLock::new(LockTable::default()),
        }
    }

    /// Record for `addr`, created with an all-zero clock on first use.
    pub fn get_or_create(&self, addr: usize) -> Arc<LockRecord> {
        if let Some(record) = self.lookup(addr) {
            return record;
        }

        let mut table = self.table.write();
        // Another thread may have inserted between the two guards.
        if let Some(&id) = table.by_addr.get(&addr) {
            return Arc::clone(&table.locks[id.index()]);
        }
        let id = LockId(table.locks.len());
        let record = Arc::new(LockRecord {
            id,
            addr,
            clock: RwLock::new(VectorClock::zeroed(self.width)),
        });
        table.locks.push(Arc::clone(&record));
        table.by_addr.insert(addr, id);
        record
    }

    #[must_use]
    pub fn lookup(&self, addr: usize) -> Option<Arc<LockRecord>> {
        let table = self.table.read();
        table
            .by_addr
            .get(&addr)
            .map(|id| Arc::clone(&table.locks[id.index()]))
    }

    #[must_use]
    pub fn get(&self, id: LockId) -> Option<Arc<LockRecord>> {
        self.table.read().locks.get(id.index()).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_once_per_address() {
        let registry = LockRegistry::new(2);
        let a = registry.get_or_create(0x10);
        let b = registry.get_or_create(0x10);
        let c = registry.get_or_create(0x20);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(c.id()).unwrap().addr(), 0x20);
    }

    #[test]
    fn handles_index_the_arena_densely() {
        let registry = LockRegistry::new(1);
        for (expected, addr) in [0x30, 0x10, 0x20].into_iter().enumerate() {
            let id = registry.get_or_create(addr).id();
            assert_eq!(id.index(), expected);
            assert_eq!(registry.get(id).unwrap().addr(), addr);
        }
        assert!(registry.get(LockId(3)).is_none());
    }

    #[test]
    fn fresh_lock_clock_is_zero() {
        let registry = LockRegistry::new(3);
        assert_eq!(registry.get_or_create(0x10).clock().as_slice(), &[0, 0, 0]);
    }

    #[test]
    fn release_then_acquire_transfers_history() {
        let registry = LockRegistry::new(2);
        let lock = registry.get_or_create(0x10);

        let mut releaser = VectorClock::filled(2, 1);
        releaser.increment(0);
        releaser.increment(0);
        lock.absorb(&releaser);

        let mut acquirer = VectorClock::filled(2, 1);
        acquirer.increment(1);
        lock.merge_into(&mut acquirer);
        assert_eq!(acquirer.as_slice(), &[3, 2]);
    }

    #[test]
    fn concurrent_creation_yields_one_record() {
        let registry = Arc::new(LockRegistry::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_or_create(0xAB).id())
            })
            .collect();
        let ids: Vec<LockId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(registry.len(), 1);
    }
}
