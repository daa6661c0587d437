//! Instruction-pointer to source-location resolution.
//!
//! The engine never inspects debug info itself; reports ask a
//! [`SymbolResolver`] for each involved event's `ip`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SymbolError;

/// A resolved source position. An empty `file` means unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl SourceLocation {
    #[must_use]
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !self.file.is_empty()
    }
}

pub trait SymbolResolver: Send + Sync {
    fn resolve(&self, ip: usize) -> SourceLocation;
}

/// Resolver for binaries without debug symbols.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn resolve(&self, _ip: usize) -> SourceLocation {
        SourceLocation::unknown()
    }
}

/// Exact-match table of instruction pointers.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: HashMap<usize, SourceLocation>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ip: usize, location: SourceLocation) {
        self.entries.insert(ip, location);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `{"0x401000": {"file": "a.c", "line": 12, "column": 3}, ...}`.
    ///
    /// Keys may be hex (`0x` prefix) or decimal.
    pub fn from_json(text: &str) -> Result<Self, SymbolError> {
        let raw: HashMap<String, SourceLocation> = serde_json::from_str(text)?;
        let mut table = Self::new();
        for (key, location) in raw {
            let ip = parse_address(&key).ok_or(SymbolError::BadAddress(key))?;
            table.insert(ip, location);
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, SymbolError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, ip: usize) -> SourceLocation {
        self.entries.get(&ip).cloned().unwrap_or_default()
    }
}

/// Parse a `0x`-prefixed hex or plain decimal address.
#[must_use]
pub fn parse_address(text: &str) -> Option<usize> {
    let text = text.trim();
    match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
