//! Shared small types used across modules.
//!
//! Validated construction, `Copy` value types, ordering that matches the
//! domain rule rather than the raw integer's natural order where they
//! differ.

use crate::error::{Fts5Error, Fts5Result};

/// A document identifier. Signed; rowid 0 is reserved as "no such row".
pub type Rowid = i64;

pub const NO_ROW: Rowid = 0;

/// Direction an expression or cursor iterates rowids in, fixed for the
/// lifetime of the iterator once `first()` chooses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A validated column index: `0..n_col`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnIndex(u32);

impl ColumnIndex {
    pub fn new(col: u32, n_col: u32) -> Fts5Result<Self> {
        if col >= n_col {
            return Err(Fts5Error::Range(format!(
                "column {col} out of range for {n_col} columns"
            )));
        }
        Ok(ColumnIndex(col))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// A token offset within a column. Column and offset are kept as separate
/// fields end to end rather than packed into one integer, since nothing in
/// this crate ever needs a packed representation on the wire (only the
/// delta-encoded poslist form is persisted).
pub type Offset = u32;
