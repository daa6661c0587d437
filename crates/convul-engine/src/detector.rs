//! The detector: the single context object owning every registry of a run.
//!
//! The instrumentation layer calls one `on_*` method per intercepted
//! operation, from any number of OS threads concurrently. Each call stamps a
//! new event on the calling logical thread, updates lock state for
//! synchronization events, and runs the enabled oracles for memory events.
//!
//! Guards are always taken in the order memory registry, thread state, lock
//! clock, sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::DetectorConfig;
use crate::error::Diagnostic;
use crate::event::{Event, ExecContext, OpKind};
use crate::exchange;
use crate::lock::LockRegistry;
use crate::memory::MemoryRegistry;
use crate::oracle::{self, Oracle, OracleCx};
use crate::report::{EventCounts, ReportSink, Reporter, RunSummary};
use crate::thread::{ThreadRegistry, ThreadSlot};

#[derive(Debug, Default)]
struct EventCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    frees: AtomicU64,
    acquires: AtomicU64,
    releases: AtomicU64,
    dropped: AtomicU64,
}

impl EventCounters {
    fn bump(&self, op: OpKind) {
        let counter = match op {
            OpKind::Read => &self.reads,
            OpKind::Write => &self.writes,
            OpKind::Free => &self.frees,
            OpKind::Acquire => &self.acquires,
            OpKind::Release => &self.releases,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> EventCounts {
        EventCounts {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            acquires: self.acquires.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Trace-based concurrency memory-bug detector.
pub struct Detector {
    config: DetectorConfig,
    threads: ThreadRegistry,
    locks: LockRegistry,
    memory: MemoryRegistry,
    oracles: Vec<Box<dyn Oracle>>,
    reporter: Reporter,
    events: EventCounters,
}

impl Detector {
    #[must_use]
    pub fn new(config: DetectorConfig, sink: Arc<dyn ReportSink>) -> Self {
        let oracles = oracle::oracles_for(config.oracles);
        Self::with_oracles(config, sink, oracles)
    }

    /// Detector running a caller-chosen oracle list instead of the
    /// configured one.
    #[must_use]
    pub fn with_oracles(
        config: DetectorConfig,
        sink: Arc<dyn ReportSink>,
        oracles: Vec<Box<dyn Oracle>>,
    ) -> Self {
        let width = config.threads();
        Self {
            config,
            threads: ThreadRegistry::new(width),
            locks: LockRegistry::new(width),
            memory: MemoryRegistry::new(),
            oracles,
            reporter: Reporter::new(sink),
            events: EventCounters::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    #[must_use]
    pub fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    #[must_use]
    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryRegistry {
        &self.memory
    }

    /// A load from `addr`. `is_deref` marks loads whose value is then
    /// dereferenced as a pointer.
    pub fn on_read(
        &self,
        thread: usize,
        ip: usize,
        context: ExecContext,
        addr: usize,
        is_deref: bool,
    ) -> Option<Arc<Event>> {
        let (_, event) = self.stamp(thread, OpKind::Read, addr, ip, context, None)?;
        self.run_oracles(|oracle, cx| oracle.on_read(cx, &event, is_deref));
        Some(event)
    }

    /// A store of `value` to `addr`.
    pub fn on_write(
        &self,
        thread: usize,
        ip: usize,
        context: ExecContext,
        addr: usize,
        value: usize,
    ) -> Option<Arc<Event>> {
        let (_, event) = self.stamp(thread, OpKind::Write, addr, ip, context, Some(value))?;
        self.run_oracles(|oracle, cx| oracle.on_write(cx, &event));
        Some(event)
    }

    pub fn on_free(
        &self,
        thread: usize,
        ip: usize,
        context: ExecContext,
        addr: usize,
    ) -> Option<Arc<Event>> {
        let (_, event) = self.stamp(thread, OpKind::Free, addr, ip, context, None)?;
        self.run_oracles(|oracle, cx| oracle.on_free(cx, &event));
        Some(event)
    }

    /// Lock acquisition. The acquire event itself is stamped before the
    /// lock's history is merged, so it does not hold the lock.
    pub fn on_acquire(
        &self,
        thread: usize,
        ip: usize,
        context: ExecContext,
        lock_addr: usize,
    ) -> Option<Arc<Event>> {
        let (slot, event) = self.stamp(thread, OpKind::Acquire, lock_addr, ip, context, None)?;
        let lock = self.locks.get_or_create(lock_addr);
        if let Some(diagnostic) = slot.open_block(&lock, event.seq()) {
            self.reporter.diagnostic(&diagnostic);
        }
        Some(event)
    }

    /// Lock release. The release event still holds the lock.
    pub fn on_release(
        &self,
        thread: usize,
        ip: usize,
        context: ExecContext,
        lock_addr: usize,
    ) -> Option<Arc<Event>> {
        let (slot, event) = self.stamp(thread, OpKind::Release, lock_addr, ip, context, None)?;
        let lock = self.locks.get_or_create(lock_addr);
        if let Some(diagnostic) = slot.close_block(&lock, event.seq()) {
            self.reporter.diagnostic(&diagnostic);
        }
        Some(event)
    }

    #[must_use]
    pub fn is_exchangeable(&self, a: &Event, b: &Event) -> bool {
        exchange::is_exchangeable(&self.threads, a, b)
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            threads: self.threads.thread_count(),
            max_clock: self.threads.max_clock(),
            events: self.events.snapshot(),
            reports: self.reporter.counts(),
        }
    }

    /// Deliver the end-of-run summary to the sink and return it.
    pub fn end_summary(&self) -> RunSummary {
        let summary = self.summary();
        self.reporter.end_summary(&summary);
        summary
    }

    /// Stamp an event on `thread`. Out-of-range ids are diagnosed and then
    /// processed best-effort.
    fn stamp(
        &self,
        thread: usize,
        op: OpKind,
        addr: usize,
        ip: usize,
        context: ExecContext,
        value: Option<usize>,
    ) -> Option<(Arc<ThreadSlot>, Arc<Event>)> {
        if !self.threads.in_range(thread) {
            self.reporter.diagnostic(&Diagnostic::ThreadOutOfRange {
                thread,
                bound: self.threads.width(),
            });
        }
        let slot = self.threads.slot(thread);
        match slot.record(op, addr, ip, context, value) {
            Ok(event) => {
                self.events.bump(op);
                Some((slot, event))
            }
            Err(diagnostic) => {
                self.events.dropped.fetch_add(1, Ordering::Relaxed);
                self.reporter.diagnostic(&diagnostic);
                None
            }
        }
    }

    fn run_oracles(&self, hook: impl Fn(&dyn Oracle, &mut OracleCx<'_>)) {
        if self.oracles.is_empty() {
            return;
        }
        let mut records = self.memory.write();
        let mut cx = OracleCx::new(&self.threads, &mut records, &self.reporter);
        for oracle in &self.oracles {
            hook(oracle.as_ref(), &mut cx);
        }
    }
}
