//! Offline event traces: JSONL records replayed through a [`Detector`].
//!
//! One record per line, tagged by `op`:
//!
//! ```text
//! {"op":"write","thread":0,"addr":"0x601040","value":"0x2a"}
//! {"op":"acquire","thread":1,"lock":"0x601000","ip":"0x401136"}
//! {"op":"read","thread":1,"addr":"0x601040","deref":true}
//! {"op":"free","thread":1,"addr":"0x2a"}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::io::BufRead;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::detector::Detector;
use crate::error::TraceError;
use crate::event::ExecContext;
use crate::symbols::parse_address;

/// One intercepted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum TraceRecord {
    Read {
        thread: usize,
        #[serde(default, deserialize_with = "address")]
        ip: usize,
        #[serde(deserialize_with = "address")]
        addr: usize,
        #[serde(default)]
        deref: bool,
    },
    Write {
        thread: usize,
        #[serde(default, deserialize_with = "address")]
        ip: usize,
        #[serde(deserialize_with = "address")]
        addr: usize,
        #[serde(deserialize_with = "address")]
        value: usize,
    },
    Free {
        thread: usize,
        #[serde(default, deserialize_with = "address")]
        ip: usize,
        #[serde(deserialize_with = "address")]
        addr: usize,
    },
    Acquire {
        thread: usize,
        #[serde(default, deserialize_with = "address")]
        ip: usize,
        #[serde(deserialize_with = "address")]
        lock: usize,
    },
    Release {
        thread: usize,
        #[serde(default, deserialize_with = "address")]
        ip: usize,
        #[serde(deserialize_with = "address")]
        lock: usize,
    },
}

impl TraceRecord {
    #[must_use]
    pub fn thread(&self) -> usize {
        match *self {
            Self::Read { thread, .. }
            | Self::Write { thread, .. }
            | Self::Free { thread, .. }
            | Self::Acquire { thread, .. }
            | Self::Release { thread, .. } => thread,
        }
    }

    /// Deliver this record to the matching detector callback.
    pub fn apply(&self, detector: &Detector) {
        let ctx = ExecContext::empty;
        match *self {
            Self::Read {
                thread,
                ip,
                addr,
                deref,
            } => {
                detector.on_read(thread, ip, ctx(), addr, deref);
            }
            Self::Write {
                thread,
                ip,
                addr,
                value,
            } => {
                detector.on_write(thread, ip, ctx(), addr, value);
            }
            Self::Free { thread, ip, addr } => {
                detector.on_free(thread, ip, ctx(), addr);
            }
            Self::Acquire { thread, ip, lock } => {
                detector.on_acquire(thread, ip, ctx(), lock);
            }
            Self::Release { thread, ip, lock } => {
                detector.on_release(thread, ip, ctx(), lock);
            }
        }
    }
}

/// Accepts a JSON integer or a `"0x..."`/decimal string.
fn address<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(usize),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(value) => Ok(value),
        Raw::Text(text) => parse_address(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid address: {text:?}"))),
    }
}

/// Read a JSONL trace.
pub fn parse_trace(reader: impl BufRead) -> Result<Vec<TraceRecord>, TraceError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|source| TraceError::Malformed {
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Feed `records` through `detector` in order.
pub fn replay(detector: &Detector, records: &[TraceRecord]) {
    for record in records {
        record.apply(detector);
    }
}
