//! Detector configuration.
//!
//! Both knobs are fixed before the first event arrives:
//! - `CONVUL_THREADS`: the number of tracked threads, i.e. the vector-clock
//!   width. Defaults to 3.
//! - `CONVUL_ORACLES`: comma-separated list of active oracles
//!   (`uaf`, `npd`, `df`, `all`, `none`). Defaults to all three.
//!
//! Disabling an oracle removes its bookkeeping entirely; oracles never read
//! each other's state.

use std::fmt;

use crate::error::ConfigError;

/// Thread bound used when `CONVUL_THREADS` is unset.
pub const DEFAULT_THREADS: usize = 3;

pub const THREADS_ENV: &str = "CONVUL_THREADS";
pub const ORACLES_ENV: &str = "CONVUL_ORACLES";

/// One of the three detection rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OracleKind {
    /// Use-after-free.
    Uaf,
    /// Null-pointer dereference.
    Npd,
    /// Double free.
    Df,
}

impl OracleKind {
    pub const ALL: [Self; 3] = [Self::Uaf, Self::Npd, Self::Df];

    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uaf" | "use-after-free" | "use_after_free" => Some(Self::Uaf),
            "npd" | "null-deref" | "null_deref" | "null-pointer-dereference" => Some(Self::Npd),
            "df" | "double-free" | "double_free" => Some(Self::Df),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uaf => "uaf",
            Self::Npd => "npd",
            Self::Df => "df",
        }
    }
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which oracles are active for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OracleSet {
    pub uaf: bool,
    pub npd: bool,
    pub df: bool,
}

impl OracleSet {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            uaf: true,
            npd: true,
            df: true,
        }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self {
            uaf: false,
            npd: false,
            df: false,
        }
    }

    #[must_use]
    pub fn only(kind: OracleKind) -> Self {
        Self::none().with(kind, true)
    }

    #[must_use]
    pub fn with(mut self, kind: OracleKind, enabled: bool) -> Self {
        match kind {
            OracleKind::Uaf => self.uaf = enabled,
            OracleKind::Npd => self.npd = enabled,
            OracleKind::Df => self.df = enabled,
        }
        self
    }

    #[must_use]
    pub const fn contains(self, kind: OracleKind) -> bool {
        match kind {
            OracleKind::Uaf => self.uaf,
            OracleKind::Npd => self.npd,
            OracleKind::Df => self.df,
        }
    }

    /// Enabled oracles in a fixed order.
    pub fn iter(self) -> impl Iterator<Item = OracleKind> {
        OracleKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        !(self.uaf || self.npd || self.df)
    }

    /// Parse a comma-separated oracle list such as `"uaf,df"`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut set = Self::none();
        for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match name.to_ascii_lowercase().as_str() {
                "all" => set = Self::all(),
                "none" => set = Self::none(),
                other => {
                    let kind = OracleKind::from_str_loose(other)
                        .ok_or_else(|| ConfigError::UnknownOracle(name.to_string()))?;
                    set = set.with(kind, true);
                }
            }
        }
        Ok(set)
    }
}

impl Default for OracleSet {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for OracleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(OracleKind::as_str).collect();
        f.write_str(&names.join(","))
    }
}

/// Static configuration of a detector run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    threads: usize,
    pub oracles: OracleSet,
}

impl DetectorConfig {
    /// Configuration tracking `threads` threads with every oracle enabled.
    pub fn new(threads: usize) -> Result<Self, ConfigError> {
        if threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        Ok(Self {
            threads,
            oracles: OracleSet::all(),
        })
    }

    #[must_use]
    pub fn with_oracles(mut self, oracles: OracleSet) -> Self {
        self.oracles = oracles;
        self
    }

    /// Number of tracked threads (vector-clock width).
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Read `CONVUL_THREADS` / `CONVUL_ORACLES`, falling back to defaults
    /// for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Explicit settings win. A variable is read only for the setting left
    /// unspecified, so a malformed `CONVUL_THREADS` does not affect a run
    /// that names its thread count.
    pub fn resolve(threads: Option<usize>, oracles: Option<&str>) -> Result<Self, ConfigError> {
        Self::resolve_with(threads, oracles, |key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::resolve_with(None, None, lookup)
    }

    fn resolve_with(
        threads: Option<usize>,
        oracles: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let threads = match threads {
            Some(n) => n,
            None => threads_from(&lookup)?,
        };
        let oracles = match oracles {
            Some(raw) => OracleSet::parse(raw)?,
            None => oracles_from(&lookup)?,
        };
        Ok(Self::new(threads)?.with_oracles(oracles))
    }
}

fn threads_from(lookup: &impl Fn(&str) -> Option<String>) -> Result<usize, ConfigError> {
    match lookup(THREADS_ENV) {
        Some(raw) => parse_thread_count(&raw),
        None => Ok(DEFAULT_THREADS),
    }
}

fn oracles_from(lookup: &impl Fn(&str) -> Option<String>) -> Result<OracleSet, ConfigError> {
    match lookup(ORACLES_ENV) {
        Some(raw) => OracleSet::parse(&raw),
        None => Ok(OracleSet::all()),
    }
}

fn parse_thread_count(raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidThreadCount(raw.to_string()))
}
