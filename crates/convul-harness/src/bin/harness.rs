//! CLI entrypoint for the convul harness.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use convul_harness::{OutputFormat, ReplayOptions};

/// Concurrency memory-bug detection over recorded traces.
#[derive(Debug, Parser)]
#[command(name = "convul-harness")]
#[command(about = "Replay event traces through the convul detector")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a JSONL event trace and print the reports.
    Replay {
        /// JSONL trace file.
        #[arg(long)]
        trace: PathBuf,
        /// Thread bound (defaults to CONVUL_THREADS, then 3).
        #[arg(long)]
        threads: Option<usize>,
        /// Enabled oracles, e.g. "uaf,df" (defaults to CONVUL_ORACLES, then all).
        #[arg(long)]
        oracles: Option<String>,
        /// Report format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// JSON symbol table mapping instruction pointers to source lines.
        #[arg(long)]
        symbols: Option<PathBuf>,
        /// Write reports here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Run identifier used in JSONL trace ids.
        #[arg(long, default_value = "replay")]
        run_id: String,
        /// Exit with status 1 if any UAF, NPD, or DF was reported.
        #[arg(long)]
        fail_on_report: bool,
    },
    /// Validate a JSONL report log.
    ValidateLog {
        /// Report log path.
        #[arg(long)]
        log: PathBuf,
    },
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            trace,
            threads,
            oracles,
            format,
            symbols,
            output,
            run_id,
            fail_on_report,
        } => {
            let options = ReplayOptions {
                trace,
                threads,
                oracles,
                format,
                symbols,
                output,
                run_id,
            };
            let outcome = convul_harness::run_replay(&options)?;
            eprintln!(
                "Replayed {} records: {} UAF, {} NPD, {} DF, {} diagnostics",
                outcome.records,
                outcome.summary.reports.uaf,
                outcome.summary.reports.npd,
                outcome.summary.reports.df,
                outcome.summary.reports.diagnostics,
            );
            if fail_on_report && outcome.detected() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::ValidateLog { log } => {
            let check = convul_harness::validate_log(&log)?;
            for error in &check.errors {
                eprintln!("{error}");
            }
            eprintln!(
                "{}: {} lines, {} errors",
                log.display(),
                check.lines,
                check.errors.len()
            );
            if !check.is_valid() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
