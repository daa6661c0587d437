//! Violation reports and the sinks that receive them.
//!
//! Reports are the engine's only externally visible output. Each report is a
//! message plus an ordered list of involved events, any of which may be
//! absent. Sinks serialize delivery so a multi-event report is never
//! interleaved with another one.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Diagnostic;
use crate::event::{Event, EventId};
use crate::symbols::{NoSymbols, SymbolResolver};

/// Category of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    UseAfterFree,
    NullPointerDeref,
    DoubleFree,
    Diagnostic,
}

impl ReportKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UseAfterFree => "use_after_free",
            Self::NullPointerDeref => "null_pointer_deref",
            Self::DoubleFree => "double_free",
            Self::Diagnostic => "diagnostic",
        }
    }

    /// True for UAF/NPD/DF findings.
    #[must_use]
    pub const fn is_detection(self) -> bool {
        !matches!(self, Self::Diagnostic)
    }
}

pub const UAF_MESSAGE: &str = "UAF detected.";
pub const NPD_MESSAGE: &str = "NPD detected.";
pub const NPD_UNKNOWN_WRITE_MESSAGE: &str =
    "NPD detected between unknown NULL write and these events.";
pub const DF_MESSAGE: &str = "DF detected.";

/// One report: a message and the events involved, in order.
#[derive(Debug, Clone)]
pub struct Report {
    pub kind: ReportKind,
    pub message: String,
    pub events: Vec<Option<Arc<Event>>>,
}

impl Report {
    #[must_use]
    pub fn new(
        kind: ReportKind,
        message: impl Into<String>,
        events: Vec<Option<Arc<Event>>>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            events,
        }
    }

    #[must_use]
    pub fn diagnostic(diagnostic: &Diagnostic) -> Self {
        Self::new(ReportKind::Diagnostic, diagnostic.to_string(), Vec::new())
    }

    /// True when every event in `ids` appears in this report, in any slot.
    #[must_use]
    pub fn involves(&self, ids: &[EventId]) -> bool {
        ids.iter().all(|id| {
            self.events
                .iter()
                .flatten()
                .any(|event| event.id() == *id)
        })
    }
}

/// Per-kind event counters for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub reads: u64,
    pub writes: u64,
    pub frees: u64,
    pub acquires: u64,
    pub releases: u64,
    /// Events that could not be recorded.
    pub dropped: u64,
}

impl EventCounts {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.reads + self.writes + self.frees + self.acquires + self.releases
    }
}

/// Per-kind report counters for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub uaf: u64,
    pub npd: u64,
    pub df: u64,
    pub diagnostics: u64,
}

impl ReportCounts {
    #[must_use]
    pub fn detections(&self) -> u64 {
        self.uaf + self.npd + self.df
    }

    #[must_use]
    pub fn get(&self, kind: ReportKind) -> u64 {
        match kind {
            ReportKind::UseAfterFree => self.uaf,
            ReportKind::NullPointerDeref => self.npd,
            ReportKind::DoubleFree => self.df,
            ReportKind::Diagnostic => self.diagnostics,
        }
    }
}

/// Aggregate statistics delivered at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Threads seen, including over-range ones.
    pub threads: usize,
    /// Largest vector-clock component across all threads.
    pub max_clock: u32,
    pub events: EventCounts,
    pub reports: ReportCounts,
}

/// Receiver of reports.
pub trait ReportSink: Send + Sync {
    /// Deliver one report atomically.
    fn report(&self, report: &Report);

    /// Deliver the end-of-run summary.
    fn end_summary(&self, summary: &RunSummary);
}

#[derive(Debug, Default)]
pub(crate) struct ReportCounters {
    uaf: AtomicU64,
    npd: AtomicU64,
    df: AtomicU64,
    diagnostics: AtomicU64,
}

impl ReportCounters {
    fn bump(&self, kind: ReportKind) {
        let counter = match kind {
            ReportKind::UseAfterFree => &self.uaf,
            ReportKind::NullPointerDeref => &self.npd,
            ReportKind::DoubleFree => &self.df,
            ReportKind::Diagnostic => &self.diagnostics,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ReportCounts {
        ReportCounts {
            uaf: self.uaf.load(Ordering::Relaxed),
            npd: self.npd.load(Ordering::Relaxed),
            df: self.df.load(Ordering::Relaxed),
            diagnostics: self.diagnostics.load(Ordering::Relaxed),
        }
    }
}

/// Counts reports on their way to the sink.
pub(crate) struct Reporter {
    sink: Arc<dyn ReportSink>,
    counters: ReportCounters,
}

impl Reporter {
    pub(crate) fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self {
            sink,
            counters: ReportCounters::default(),
        }
    }

    pub(crate) fn emit(&self, report: &Report) {
        self.counters.bump(report.kind);
        self.sink.report(report);
    }

    pub(crate) fn diagnostic(&self, diagnostic: &Diagnostic) {
        self.emit(&Report::diagnostic(diagnostic));
    }

    pub(crate) fn counts(&self) -> ReportCounts {
        self.counters.snapshot()
    }

    pub(crate) fn end_summary(&self, summary: &RunSummary) {
        self.sink.end_summary(summary);
    }
}

// ---------------------------------------------------------------------------
// Text sink
// ---------------------------------------------------------------------------

/// Human-readable report blocks written to any `Write`.
pub struct TextSink<W: Write + Send> {
    out: Mutex<W>,
    symbols: Arc<dyn SymbolResolver>,
    write_errors: AtomicU64,
}

impl TextSink<std::io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TextSink<W> {
    #[must_use]
    pub fn new(out: W) -> Self {
        Self::with_symbols(out, Arc::new(NoSymbols))
    }

    #[must_use]
    pub fn with_symbols(out: W, symbols: Arc<dyn SymbolResolver>) -> Self {
        Self {
            out: Mutex::new(out),
            symbols,
            write_errors: AtomicU64::new(0),
        }
    }

    /// Number of blocks that failed to reach the writer.
    #[must_use]
    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn write_block(&self, block: &str) {
        let mut out = self.out.lock();
        if out.write_all(block.as_bytes()).and_then(|()| out.flush()).is_err() {
            self.write_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn describe(&self, block: &mut String, event: &Event) {
        let _ = writeln!(
            block,
            "{:<10} at address {:#x} on thread {:>2} at trace index {}",
            event.label(),
            event.addr(),
            event.thread(),
            event.seq()
        );
        let location = self.symbols.resolve(event.ip());
        if location.is_known() {
            let _ = writeln!(block, "\tin {}:{}", location.file, location.line);
        } else {
            let _ = writeln!(block, "\tin a file missing debug symbols.");
        }
    }
}

impl<W: Write + Send> ReportSink for TextSink<W> {
    fn report(&self, report: &Report) {
        let mut block = String::new();
        let _ = writeln!(block, "{}", report.message);
        if !report.events.is_empty() {
            let _ = writeln!(block, "The following events were involved:");
            for event in &report.events {
                match event {
                    Some(event) => self.describe(&mut block, event),
                    None => {
                        let _ = writeln!(block, "NULL event.");
                    }
                }
            }
            block.push('\n');
        }
        self.write_block(&block);
    }

    fn end_summary(&self, summary: &RunSummary) {
        let e = &summary.events;
        let r = &summary.reports;
        let block = format!(
            "End evaluation.\n\
             Max VC value: {}\n\
             Events: {} reads, {} writes, {} frees, {} acquires, {} releases ({} dropped)\n\
             Reports: {} UAF, {} NPD, {} DF, {} diagnostics\n",
            summary.max_clock,
            e.reads,
            e.writes,
            e.frees,
            e.acquires,
            e.releases,
            e.dropped,
            r.uaf,
            r.npd,
            r.df,
            r.diagnostics,
        );
        self.write_block(&block);
    }
}

// ---------------------------------------------------------------------------
// Collecting sink
// ---------------------------------------------------------------------------

/// Keeps every report in memory.
#[derive(Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<Report>>,
    summary: Mutex<Option<RunSummary>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    #[must_use]
    pub fn of_kind(&self, kind: ReportKind) -> Vec<Report> {
        self.reports
            .lock()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn count(&self, kind: ReportKind) -> usize {
        self.reports.lock().iter().filter(|r| r.kind == kind).count()
    }

    #[must_use]
    pub fn summary(&self) -> Option<RunSummary> {
        *self.summary.lock()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl ReportSink for CollectingSink {
    fn report(&self, report: &Report) {
        self.reports.lock().push(report.clone());
    }

    fn end_summary(&self, summary: &RunSummary) {
        *self.summary.lock() = Some(*summary);
    }
}
