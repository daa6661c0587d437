//! Causally stamped events and the handles that link them.
//!
//! Events, blocks, and locks form a graph with no single owner. Cross
//! references are integer handles into arenas owned by the thread and lock
//! registries, so nothing can dangle and every referenced object lives as
//! long as the run.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::clock::VectorClock;

/// Handle of a lock in the lock registry's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LockId(pub(crate) usize);

impl LockId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Handle of a block in its owning thread's block arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockId {
    pub thread: usize,
    pub slot: usize,
}

/// Handle of an event: the owning thread plus its trace position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventId {
    pub thread: usize,
    pub seq: usize,
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}#{}", self.thread, self.seq)
    }
}

/// Intercepted operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Read,
    Write,
    Free,
    Acquire,
    Release,
}

impl OpKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Free => "free",
            Self::Acquire => "acquire",
            Self::Release => "release",
        }
    }
}

/// One hold interval of a lock by a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub thread: usize,
    pub lock: LockId,
    /// Trace index of the acquire event.
    pub acquired_at: usize,
    /// Trace index of the release event; `None` while held.
    pub released_at: Option<usize>,
}

impl Block {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.released_at.is_none()
    }
}

/// Opaque execution-context snapshot supplied by the instrumentation layer.
///
/// Only ever carried for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecContext(Box<[usize]>);

impl ExecContext {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_words(words: impl Into<Vec<usize>>) -> Self {
        Self(words.into().into_boxed_slice())
    }

    #[must_use]
    pub fn words(&self) -> &[usize] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An immutable record of one intercepted operation.
#[derive(Debug, Clone)]
pub struct Event {
    pub(crate) id: EventId,
    pub(crate) op: OpKind,
    pub(crate) addr: usize,
    pub(crate) ip: usize,
    pub(crate) context: ExecContext,
    pub(crate) clock: VectorClock,
    pub(crate) held: BTreeMap<LockId, BlockId>,
    pub(crate) value: Option<usize>,
}

impl Event {
    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    #[must_use]
    pub fn thread(&self) -> usize {
        self.id.thread
    }

    /// Position in the owning thread's trace.
    #[must_use]
    pub fn seq(&self) -> usize {
        self.id.seq
    }

    #[must_use]
    pub fn op(&self) -> OpKind {
        self.op
    }

    #[must_use]
    pub fn addr(&self) -> usize {
        self.addr
    }

    #[must_use]
    pub fn ip(&self) -> usize {
        self.ip
    }

    #[must_use]
    pub fn context(&self) -> &ExecContext {
        &self.context
    }

    /// Snapshot of the owning thread's clock right after its local tick.
    #[must_use]
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Blocks open on the owning thread when the event was created.
    #[must_use]
    pub fn held(&self) -> &BTreeMap<LockId, BlockId> {
        &self.held
    }

    #[must_use]
    pub fn holds(&self, lock: LockId) -> bool {
        self.held.contains_key(&lock)
    }

    /// Value stored by a write event.
    #[must_use]
    pub fn value(&self) -> Option<usize> {
        self.value
    }

    #[must_use]
    pub fn is_null_write(&self) -> bool {
        self.op == OpKind::Write && self.value == Some(0)
    }

    /// Label used in reports (`Read`, `Write`, `NULL Write`, ...).
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self.op {
            OpKind::Read => "Read",
            OpKind::Write if self.is_null_write() => "NULL Write",
            OpKind::Write => "Write",
            OpKind::Free => "Free",
            OpKind::Acquire => "Lock",
            OpKind::Release => "Unlock",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(op: OpKind, value: Option<usize>) -> Event {
        Event {
            id: EventId { thread: 0, seq: 3 },
            op,
            addr: 0x1000,
            ip: 0x40_1000,
            context: ExecContext::empty(),
            clock: VectorClock::filled(2, 1),
            held: BTreeMap::new(),
            value,
        }
    }

    #[test]
    fn labels_match_report_vocabulary() {
        assert_eq!(event(OpKind::Read, None).label(), "Read");
        assert_eq!(event(OpKind::Write, Some(0x20)).label(), "Write");
        assert_eq!(event(OpKind::Write, Some(0)).label(), "NULL Write");
        assert_eq!(event(OpKind::Free, None).label(), "Free");
        assert_eq!(event(OpKind::Acquire, None).label(), "Lock");
        assert_eq!(event(OpKind::Release, None).label(), "Unlock");
    }

    #[test]
    fn null_write_requires_write_op() {
        assert!(event(OpKind::Write, Some(0)).is_null_write());
        assert!(!event(OpKind::Read, Some(0)).is_null_write());
    }

    #[test]
    fn context_is_opaque_words() {
        let ctx = ExecContext::from_words(vec![1, 2, 3]);
        assert_eq!(ctx.words(), &[1, 2, 3]);
        assert!(ExecContext::empty().is_empty());
    }

    #[test]
    fn event_id_display() {
        assert_eq!(EventId { thread: 2, seq: 14 }.to_string(), "T2#14");
    }
}
