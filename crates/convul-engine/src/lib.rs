//! Trace-based detector for concurrency memory bugs.
//!
//! The engine consumes intercepted operations (reads, writes, frees, lock
//! acquires and releases) from a running multithreaded program, stamps each
//! one with a vector clock, and reports pairs of events that could have run
//! in the opposite order with harmful effect.
//!
//! # Architecture
//!
//! - **Vector clocks** (`clock`): fixed-width happens-before comparison
//! - **Events and blocks** (`event`): handle-linked causal records
//! - **Thread and lock registries** (`thread`, `lock`): per-run clock state
//! - **Exchangeability** (`exchange`): the single-hop lock-anchor heuristic
//! - **Memory registry** (`memory`): per-address oracle state
//! - **Oracles** (`oracle`): use-after-free, null-pointer dereference, double free
//! - **Reports** (`report`, `structured_log`): text, JSONL, and in-memory sinks
//! - **Detector** (`detector`): the context object tying it all together
//! - **Replay** (`trace`): JSONL traces standing in for live instrumentation

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod event;
pub mod exchange;
pub mod lock;
pub mod memory;
pub mod oracle;
pub mod report;
pub mod structured_log;
pub mod symbols;
pub mod thread;
pub mod trace;

pub use clock::{ClockOrder, VectorClock};
pub use config::{DetectorConfig, OracleKind, OracleSet};
pub use detector::Detector;
pub use error::{ConfigError, Diagnostic, SymbolError, TraceError};
pub use event::{Event, EventId, ExecContext, OpKind};
pub use oracle::Oracle;
pub use report::{CollectingSink, Report, ReportKind, ReportSink, RunSummary, TextSink};
pub use structured_log::JsonlSink;
pub use symbols::{NoSymbols, SourceLocation, SymbolResolver, SymbolTable};
pub use trace::{TraceRecord, parse_trace, replay};
