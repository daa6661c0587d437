//! Error and diagnostic types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("thread count must be at least 1")]
    ZeroThreads,
    #[error("invalid thread count: {0:?}")]
    InvalidThreadCount(String),
    #[error("unknown oracle: {0:?} (expected uaf, npd, df, all or none)")]
    UnknownOracle(String),
}

/// Failure to load a symbol table.
#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("failed to read symbol table: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed symbol table: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad instruction address in symbol table: {0:?}")]
    BadAddress(String),
}

/// Failure to read a replay trace.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Non-fatal problems noticed while processing events.
///
/// These go to the report sink as diagnostic reports; processing continues
/// with the best data available.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error(
        "thread ID {thread} >= THREADS {bound}; its events share one clock and reports \
         naming them are unreliable"
    )]
    ThreadOutOfRange { thread: usize, bound: usize },
    #[error("Failed to allocate new event on thread {thread}.")]
    EventAllocation { thread: usize },
    #[error("thread {thread} acquired lock {lock:#x} while already holding it")]
    LockAlreadyHeld { thread: usize, lock: usize },
    #[error("thread {thread} released lock {lock:#x} without a recorded acquire")]
    ReleaseWithoutAcquire { thread: usize, lock: usize },
    #[error("mem->addr = {record:#x}, e->addr = {event:#x}")]
    AddressMismatch { record: usize, event: usize },
    #[error("memory location {record:#x} points at {target:#x} without a recorded pointer write")]
    MissingPointerWrite { record: usize, target: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_render_readable_messages() {
        let d = Diagnostic::ThreadOutOfRange {
            thread: 3,
            bound: 3,
        };
        assert!(d.to_string().starts_with("thread ID 3 >= THREADS 3; "));
        assert!(d.to_string().ends_with("reports naming them are unreliable"));

        let d = Diagnostic::ReleaseWithoutAcquire {
            thread: 1,
            lock: 0x40,
        };
        assert_eq!(
            d.to_string(),
            "thread 1 released lock 0x40 without a recorded acquire"
        );
    }

    #[test]
    fn config_errors_name_the_bad_input() {
        let e = ConfigError::UnknownOracle("race".to_string());
        assert!(e.to_string().contains("\"race\""));
    }

    #[test]
    fn trace_errors_carry_line_numbers() {
        let source = serde_json::from_str::<u32>("nope").unwrap_err();
        let e = TraceError::Malformed { line: 7, source };
        assert!(e.to_string().starts_with("line 7: "));
    }
}
