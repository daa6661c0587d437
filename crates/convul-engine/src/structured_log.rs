//! JSONL report log.
//!
//! Provides:
//! - [`ReportLogEntry`]: one JSONL record per report plus a final summary record.
//! - [`JsonlSink`]: a [`ReportSink`] writing those records to any `Write`.
//! - [`validate_report_line`]: checks a single line against the schema.
//! - [`validate_report_log`]: checks an entire log file.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::report::{Report, ReportKind, ReportSink, RunSummary};
use crate::symbols::{NoSymbols, SymbolResolver};

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn for_report(kind: ReportKind) -> Self {
        if kind.is_detection() {
            Self::Warn
        } else {
            Self::Error
        }
    }
}

/// Structured description of one event in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub thread: usize,
    pub seq: usize,
    pub op: String,
    pub label: String,
    pub addr: String,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub clock: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl EventRecord {
    #[must_use]
    pub fn describe(event: &Event, symbols: &dyn SymbolResolver) -> Self {
        let location = symbols.resolve(event.ip());
        let known = location.is_known();
        Self {
            thread: event.thread(),
            seq: event.seq(),
            op: event.op().as_str().to_string(),
            label: event.label().to_string(),
            addr: format!("{:#x}", event.addr()),
            ip: format!("{:#x}", event.ip()),
            value: event.value().map(|v| format!("{v:#x}")),
            clock: event.clock().as_slice().to_vec(),
            file: known.then(|| location.file.clone()),
            line: known.then_some(location.line),
            column: known.then_some(location.column),
        }
    }
}

/// Canonical report log record.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportLogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ReportKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Involved events; `null` entries are absent events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Option<EventRecord>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

impl ReportLogEntry {
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            kind: None,
            message: None,
            events: None,
            summary: None,
        }
    }

    #[must_use]
    pub fn for_report(
        trace_id: impl Into<String>,
        report: &Report,
        symbols: &dyn SymbolResolver,
    ) -> Self {
        let events = report
            .events
            .iter()
            .map(|e| e.as_deref().map(|e| EventRecord::describe(e, symbols)))
            .collect();
        Self {
            kind: Some(report.kind),
            message: Some(report.message.clone()),
            events: Some(events),
            ..Self::new(trace_id, LogLevel::for_report(report.kind), event_name(report.kind))
        }
    }

    #[must_use]
    pub fn for_summary(trace_id: impl Into<String>, summary: &RunSummary) -> Self {
        Self {
            summary: Some(*summary),
            ..Self::new(trace_id, LogLevel::Info, "end_summary")
        }
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

const EVENT_NAMES: [&str; 5] = [
    "uaf_detected",
    "npd_detected",
    "df_detected",
    "diagnostic",
    "end_summary",
];

fn event_name(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::UseAfterFree => EVENT_NAMES[0],
        ReportKind::NullPointerDeref => EVENT_NAMES[1],
        ReportKind::DoubleFree => EVENT_NAMES[2],
        ReportKind::Diagnostic => EVENT_NAMES[3],
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

struct JsonlState<W> {
    writer: W,
    seq: u64,
}

/// Writes one JSONL record per report.
pub struct JsonlSink<W: Write + Send> {
    state: Mutex<JsonlState<W>>,
    run_id: String,
    symbols: Arc<dyn SymbolResolver>,
    write_errors: AtomicU64,
}

impl<W: Write + Send> JsonlSink<W> {
    #[must_use]
    pub fn new(writer: W, run_id: impl Into<String>) -> Self {
        Self::with_symbols(writer, run_id, Arc::new(NoSymbols))
    }

    #[must_use]
    pub fn with_symbols(
        writer: W,
        run_id: impl Into<String>,
        symbols: Arc<dyn SymbolResolver>,
    ) -> Self {
        Self {
            state: Mutex::new(JsonlState { writer, seq: 0 }),
            run_id: run_id.into(),
            symbols,
            write_errors: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    pub fn into_inner(self) -> W {
        self.state.into_inner().writer
    }

    fn emit(&self, build: impl FnOnce(String) -> ReportLogEntry) {
        let mut state = self.state.lock();
        state.seq += 1;
        let entry = build(format!("{}::{:03}", self.run_id, state.seq));
        let written = entry
            .to_jsonl()
            .map_err(std::io::Error::other)
            .and_then(|line| writeln!(state.writer, "{line}"))
            .and_then(|()| state.writer.flush());
        if written.is_err() {
            self.write_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<W: Write + Send> ReportSink for JsonlSink<W> {
    fn report(&self, report: &Report) {
        self.emit(|trace_id| ReportLogEntry::for_report(trace_id, report, self.symbols.as_ref()));
    }

    fn end_summary(&self, summary: &RunSummary) {
        self.emit(|trace_id| ReportLogEntry::for_summary(trace_id, summary));
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validation error for a log line.
#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

/// Validate a single JSONL line against the report schema.
pub fn validate_report_line(
    line: &str,
    line_number: usize,
) -> Result<ReportLogEntry, Vec<LogValidationError>> {
    let mut errors = Vec::new();
    let mut fail = |field: &str, message: String| {
        errors.push(LogValidationError {
            line_number,
            field: field.to_string(),
            message,
        });
    };

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            fail("<json>", format!("invalid JSON: {e}"));
            return Err(errors);
        }
    };
    let Some(obj) = value.as_object() else {
        fail("<root>", "expected JSON object".to_string());
        return Err(errors);
    };

    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            fail(field, "required field missing".to_string());
        }
    }

    if let Some(level) = obj.get("level").and_then(|v| v.as_str())
        && !["info", "warn", "error"].contains(&level)
    {
        fail("level", format!("invalid level: '{level}'"));
    }

    let event = obj.get("event").and_then(|v| v.as_str());
    if let Some(event) = event
        && !EVENT_NAMES.contains(&event)
    {
        fail("event", format!("unknown event: '{event}'"));
    }

    match event {
        Some("end_summary") => {
            if !obj.get("summary").is_some_and(serde_json::Value::is_object) {
                fail(
                    "summary",
                    "end_summary records must carry a summary object".to_string(),
                );
            }
        }
        Some(_) => {
            if !obj.get("message").is_some_and(serde_json::Value::is_string) {
                fail("message", "report records must carry a message".to_string());
            }
        }
        None => {}
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && !trace_id.contains("::")
    {
        fail(
            "trace_id",
            format!("trace_id should follow <run_id>::<seq> format, got: '{trace_id}'"),
        );
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<ReportLogEntry>(value).map_err(|e| {
        vec![LogValidationError {
            line_number,
            field: "<deserialization>".to_string(),
            message: format!("failed to deserialize: {e}"),
        }]
    })
}

/// Validate an entire JSONL report log.
///
/// Returns the non-empty line count and any validation errors found.
pub fn validate_report_log(
    path: &Path,
) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let mut all_errors = Vec::new();
    let mut line_count = 0;

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        line_count += 1;
        if let Err(errs) = validate_report_line(line, i + 1) {
            all_errors.extend(errs);
        }
    }

    Ok((line_count, all_errors))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();
    // Approximate calendar fields; only ordering within a run matters.
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        1970 + secs / 31_557_600,
        (secs % 31_557_600) / 2_629_800 + 1,
        (secs % 2_629_800) / 86400 + 1,
        (secs % 86400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        millis,
    )
}
