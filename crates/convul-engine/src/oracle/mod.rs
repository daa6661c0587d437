//! Bug oracles layered on the exchangeability engine.
//!
//! Each oracle keeps its per-address state inside the shared
//! [`MemoryRecord`](crate::memory::MemoryRecord) and reacts to memory events
//! through the [`Oracle`] hooks. The detector runs every enabled oracle, in
//! a fixed order, while holding the memory registry's exclusive guard.

mod df;
mod npd;
mod uaf;

pub use df::DoubleFree;
pub use npd::NullPointerDeref;
pub use uaf::UseAfterFree;

use std::sync::Arc;

use crate::config::{OracleKind, OracleSet};
use crate::error::Diagnostic;
use crate::event::{Event, EventId};
use crate::exchange;
use crate::memory::{self, MemoryMap, MemoryRecord};
use crate::report::{Report, ReportKind, Reporter};
use crate::thread::ThreadRegistry;

/// View of the run handed to oracle hooks.
pub struct OracleCx<'a> {
    threads: &'a ThreadRegistry,
    records: &'a mut MemoryMap,
    reporter: &'a Reporter,
}

impl<'a> OracleCx<'a> {
    pub(crate) fn new(
        threads: &'a ThreadRegistry,
        records: &'a mut MemoryMap,
        reporter: &'a Reporter,
    ) -> Self {
        Self {
            threads,
            records,
            reporter,
        }
    }

    #[must_use]
    pub fn exchangeable(&self, a: &Event, b: &Event) -> bool {
        exchange::is_exchangeable(self.threads, a, b)
    }

    #[must_use]
    pub fn event(&self, id: EventId) -> Option<Arc<Event>> {
        self.threads.event(id)
    }

    #[must_use]
    pub fn record(&self, addr: usize) -> Option<&MemoryRecord> {
        self.records.get(&addr)
    }

    pub fn existing_mut(&mut self, addr: usize) -> Option<&mut MemoryRecord> {
        self.records.get_mut(&addr)
    }

    /// Record for `addr`, created on first touch.
    pub fn record_mut(&mut self, addr: usize) -> &mut MemoryRecord {
        memory::record_mut(self.records, addr)
    }

    pub fn report(&self, kind: ReportKind, message: &str, events: Vec<Option<Arc<Event>>>) {
        self.reporter.emit(&Report::new(kind, message, events));
    }

    pub fn diagnostic(&self, diagnostic: &Diagnostic) {
        self.reporter.diagnostic(diagnostic);
    }
}

/// A detection rule reacting to memory events.
///
/// Hooks run after the event has been stamped and appended to its thread's
/// trace. Acquire and release events never reach oracles.
pub trait Oracle: Send + Sync {
    fn kind(&self) -> OracleKind;

    fn on_read(&self, _cx: &mut OracleCx<'_>, _read: &Arc<Event>, _is_deref: bool) {}

    fn on_write(&self, _cx: &mut OracleCx<'_>, _write: &Arc<Event>) {}

    fn on_free(&self, _cx: &mut OracleCx<'_>, _free: &Arc<Event>) {}
}

/// Instantiate the enabled oracles in evaluation order (UAF, NPD, DF).
#[must_use]
pub fn oracles_for(set: OracleSet) -> Vec<Box<dyn Oracle>> {
    set.iter()
        .map(|kind| -> Box<dyn Oracle> {
            match kind {
                OracleKind::Uaf => Box::new(UseAfterFree),
                OracleKind::Npd => Box::new(NullPointerDeref),
                OracleKind::Df => Box::new(DoubleFree),
            }
        })
        .collect()
}
