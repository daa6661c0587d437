//! Exchangeability: could two events have run in the opposite order?
//!
//! Unordered events (equal or concurrent clocks) are exchangeable outright.
//! For causally ordered events, every lock held by both is examined: the
//! later event's critical section on that lock was entered right after some
//! `anchor` event in the later thread's trace. If the anchor is itself
//! unordered with the earlier event, the shared lock did not force the
//! observed order and the pair is exchangeable.
//!
//! This is a single hop per shared lock, not a transitive closure over the
//! happens-before graph.

use crate::clock::ClockOrder;
use crate::event::{Event, EventId};
use crate::thread::ThreadRegistry;

/// Causal relation between two events.
#[must_use]
pub fn order(a: &Event, b: &Event) -> ClockOrder {
    a.clock().compare(b.clock())
}

/// True when `a` and `b` could plausibly have executed in either order.
#[must_use]
pub fn is_exchangeable(threads: &ThreadRegistry, a: &Event, b: &Event) -> bool {
    let (early, late) = match order(a, b) {
        ClockOrder::Equal | ClockOrder::Concurrent => return true,
        ClockOrder::Before => (a, b),
        ClockOrder::After => (b, a),
    };

    for (&lock, &block_id) in late.held() {
        if !early.holds(lock) {
            continue;
        }
        let Some(block) = threads.block(block_id) else {
            continue;
        };
        // No event precedes an acquisition at the head of a trace.
        let Some(anchor_seq) = block.acquired_at.checked_sub(1) else {
            continue;
        };
        let anchor_id = EventId {
            thread: block.thread,
            seq: anchor_seq,
        };
        let Some(anchor) = threads.event(anchor_id) else {
            continue;
        };
        if !order(&anchor, early).is_ordered() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ExecContext, OpKind};
    use crate::lock::LockRegistry;
    use std::sync::Arc;

    struct World {
        threads: ThreadRegistry,
        locks: LockRegistry,
    }

    impl World {
        fn new(width: usize) -> Self {
            Self {
                threads: ThreadRegistry::new(width),
                locks: LockRegistry::new(width),
            }
        }

        fn op(&self, thread: usize, op: OpKind, addr: usize) -> Arc<Event> {
            self.threads
                .slot(thread)
                .record(op, addr, 0, ExecContext::empty(), None)
                .unwrap()
        }

        fn acquire(&self, thread: usize, addr: usize) -> Arc<Event> {
            let e = self.op(thread, OpKind::Acquire, addr);
            let lock = self.locks.get_or_create(addr);
            assert!(self.threads.slot(thread).open_block(&lock, e.seq()).is_none());
            e
        }

        fn release(&self, thread: usize, addr: usize) -> Arc<Event> {
            let e = self.op(thread, OpKind::Release, addr);
            let lock = self.locks.get_or_create(addr);
            assert!(self.threads.slot(thread).close_block(&lock, e.seq()).is_none());
            e
        }

        fn exch(&self, a: &Event, b: &Event) -> bool {
            is_exchangeable(&self.threads, a, b)
        }
    }

    const L: usize = 0x100;
    const A: usize = 0x2000;

    #[test]
    fn event_is_exchangeable_with_itself() {
        let w = World::new(2);
        let e = w.op(0, OpKind::Read, A);
        assert!(w.exch(&e, &e));
    }

    #[test]
    fn concurrent_events_are_exchangeable() {
        let w = World::new(2);
        let a = w.op(0, OpKind::Write, A);
        let b = w.op(1, OpKind::Free, A);
        assert_eq!(order(&a, &b), ClockOrder::Concurrent);
        assert!(w.exch(&a, &b));
        assert!(w.exch(&b, &a));
    }

    #[test]
    fn program_order_without_shared_lock_is_not_exchangeable() {
        let w = World::new(2);
        let a = w.op(0, OpKind::Write, A);
        let b = w.op(0, OpKind::Free, A);
        assert_eq!(order(&a, &b), ClockOrder::Before);
        assert!(!w.exch(&a, &b));
    }

    #[test]
    fn lock_forced_order_is_not_exchangeable() {
        let w = World::new(2);
        w.acquire(0, L);
        let write = w.op(0, OpKind::Write, A);
        w.release(0, L);

        // T1 starts its trace by acquiring L: no anchor before the section.
        w.acquire(1, L);
        let free = w.op(1, OpKind::Free, A);
        w.release(1, L);

        assert_eq!(order(&write, &free), ClockOrder::Before);
        assert!(!w.exch(&write, &free));
    }

    #[test]
    fn unordered_anchor_makes_locked_pair_exchangeable() {
        let w = World::new(2);
        w.acquire(0, L);
        let write = w.op(0, OpKind::Write, A);
        w.release(0, L);

        // T1 does unrelated work before entering the same critical section;
        // that work is concurrent with T0's write, so the sections could
        // have run the other way round.
        let anchor = w.op(1, OpKind::Read, 0x3000);
        w.acquire(1, L);
        let free = w.op(1, OpKind::Free, A);
        w.release(1, L);

        assert_eq!(order(&anchor, &write), ClockOrder::Concurrent);
        assert_eq!(order(&write, &free), ClockOrder::Before);
        assert!(w.exch(&write, &free));
        assert!(w.exch(&free, &write));
    }

    #[test]
    fn ordered_anchor_keeps_pair_forced() {
        let w = World::new(2);
        w.acquire(0, L);
        let write = w.op(0, OpKind::Write, A);
        w.release(0, L);

        // T1 synchronizes with T0 through L first, so its anchor for the
        // second section already follows the write.
        w.acquire(1, L);
        w.release(1, L);
        w.acquire(1, L);
        let free = w.op(1, OpKind::Free, A);

        assert!(!w.exch(&write, &free));
    }

    #[test]
    fn locks_held_by_only_one_side_are_ignored() {
        let w = World::new(2);
        w.acquire(0, L);
        let write = w.op(0, OpKind::Write, A);
        w.release(0, L);

        w.op(1, OpKind::Read, 0x3000);
        w.acquire(1, L);
        w.release(1, L);
        // Ordered after the write through L, but the free itself is outside L.
        let free = w.op(1, OpKind::Free, A);

        assert_eq!(order(&write, &free), ClockOrder::Before);
        assert!(!w.exch(&write, &free));
    }
}
