//! Offline tooling around the convul detector.
//!
//! This crate provides:
//! - Trace replay: run a JSONL event trace through a detector and render the
//!   reports as text or as a JSONL report log
//! - Log validation: check a JSONL report log against the record schema

#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use convul_engine::structured_log::{LogValidationError, validate_report_log};
use convul_engine::{
    ConfigError, Detector, DetectorConfig, JsonlSink, NoSymbols, ReportSink, RunSummary,
    SymbolError, SymbolResolver, SymbolTable, TextSink, TraceError, parse_trace, replay,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Symbols(#[from] SymbolError),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Report rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report blocks.
    #[default]
    Text,
    /// One JSON record per report.
    Jsonl,
}

/// Everything a replay run needs.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub trace: PathBuf,
    /// Thread bound; `CONVUL_THREADS` or the default when absent.
    pub threads: Option<usize>,
    /// Comma-separated oracle list; `CONVUL_ORACLES` or all when absent.
    pub oracles: Option<String>,
    pub format: OutputFormat,
    pub symbols: Option<PathBuf>,
    /// Report destination; stdout when absent.
    pub output: Option<PathBuf>,
    /// Prefix of JSONL trace ids.
    pub run_id: String,
}

impl ReplayOptions {
    #[must_use]
    pub fn new(trace: impl Into<PathBuf>) -> Self {
        Self {
            trace: trace.into(),
            threads: None,
            oracles: None,
            format: OutputFormat::Text,
            symbols: None,
            output: None,
            run_id: "replay".to_string(),
        }
    }
}

/// Result of a replay run.
#[derive(Debug, Clone, Copy)]
pub struct ReplayOutcome {
    pub records: usize,
    pub summary: RunSummary,
}

impl ReplayOutcome {
    /// True when any UAF, NPD, or DF report was produced.
    #[must_use]
    pub fn detected(&self) -> bool {
        self.summary.reports.detections() > 0
    }
}

/// Combine explicit settings with the environment. A variable is only read
/// for the setting left unspecified.
pub fn resolve_config(
    threads: Option<usize>,
    oracles: Option<&str>,
) -> Result<DetectorConfig, HarnessError> {
    Ok(DetectorConfig::resolve(threads, oracles)?)
}

fn load_symbols(path: Option<&Path>) -> Result<Arc<dyn SymbolResolver>, HarnessError> {
    Ok(match path {
        Some(path) => Arc::new(SymbolTable::load(path)?),
        None => Arc::new(NoSymbols),
    })
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write + Send>, HarnessError> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(HarnessError::io(path))?,
        )),
        None => Box::new(std::io::stdout()),
    })
}

/// Replay a trace file and deliver reports plus the end summary.
pub fn run_replay(options: &ReplayOptions) -> Result<ReplayOutcome, HarnessError> {
    let config = resolve_config(options.threads, options.oracles.as_deref())?;
    let trace = File::open(&options.trace).map_err(HarnessError::io(&options.trace))?;
    let records = parse_trace(BufReader::new(trace))?;
    let symbols = load_symbols(options.symbols.as_deref())?;
    let out = open_output(options.output.as_deref())?;

    let sink: Arc<dyn ReportSink> = match options.format {
        OutputFormat::Text => Arc::new(TextSink::with_symbols(out, symbols)),
        OutputFormat::Jsonl => Arc::new(JsonlSink::with_symbols(
            out,
            options.run_id.clone(),
            symbols,
        )),
    };
    let detector = Detector::new(config, sink);
    replay(&detector, &records);
    let summary = detector.end_summary();

    Ok(ReplayOutcome {
        records: records.len(),
        summary,
    })
}

/// Outcome of validating a report log.
#[derive(Debug)]
pub struct LogCheck {
    pub lines: usize,
    pub errors: Vec<LogValidationError>,
}

impl LogCheck {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn validate_log(path: &Path) -> Result<LogCheck, HarnessError> {
    let (lines, errors) = validate_report_log(path).map_err(HarnessError::io(path))?;
    Ok(LogCheck { lines, errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use convul_engine::{OracleKind, OracleSet};

    #[test]
    fn explicit_settings_override_everything() {
        let config = resolve_config(Some(5), Some("npd")).unwrap();
        assert_eq!(config.threads(), 5);
        assert_eq!(config.oracles, OracleSet::only(OracleKind::Npd));
    }

    #[test]
    fn explicit_zero_threads_is_rejected() {
        assert!(matches!(
            resolve_config(Some(0), Some("all")),
            Err(HarnessError::Config(ConfigError::ZeroThreads))
        ));
    }
}
