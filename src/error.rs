//! Error kinds surfaced across the engine.
//!
//! One enum covers both the binary-decode layer and the higher-level
//! façade/expression-engine/storage-bridge operations, with an `io::Error`
//! conversion so the varint/page decoders can use `?` directly.

use std::fmt;
use std::io;

/// Error kinds surfaced by the engine's public API.
#[derive(Debug)]
pub enum Fts5Error {
    /// Allocation failed. The posting buffer poisons itself and reports
    /// this once at the first failed append.
    OutOfMemory,
    /// Invalid varint, term-order violation, or page checksum mismatch.
    Corrupt(String),
    /// `MATCH` expression failed to parse, or a phrase/NEAR term set is malformed.
    Malformed(String),
    /// Duplicate rowid, NOT NULL violation, or unknown ON CONFLICT action.
    Constraint(String),
    /// The externally injected interrupt flag was observed set.
    Interrupted,
    /// An out-of-range value (column index, savepoint id, rowid).
    Range(String),
    /// Caller misuse: wrong state, cursor closed, writer-only op on a reader, etc.
    Misuse(String),
    /// The host signalled the resource was busy (reserved for host integration).
    Busy,
    /// Catch-all for parse/config failures and unrecognised special commands.
    Error(String),
}

impl fmt::Display for Fts5Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fts5Error::OutOfMemory => write!(f, "out of memory"),
            Fts5Error::Corrupt(msg) => write!(f, "database disk image is malformed: {msg}"),
            Fts5Error::Malformed(msg) => write!(f, "malformed MATCH expression: {msg}"),
            Fts5Error::Constraint(msg) => write!(f, "constraint failed: {msg}"),
            Fts5Error::Interrupted => write!(f, "interrupted"),
            Fts5Error::Range(msg) => write!(f, "value out of range: {msg}"),
            Fts5Error::Misuse(msg) => write!(f, "misuse: {msg}"),
            Fts5Error::Busy => write!(f, "busy"),
            Fts5Error::Error(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Fts5Error {}

impl From<io::Error> for Fts5Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                Fts5Error::Corrupt(e.to_string())
            }
            _ => Fts5Error::Error(e.to_string()),
        }
    }
}

pub type Fts5Result<T> = Result<T, Fts5Error>;
