//! Poslist writer and reader.
//!
//! Delta-encodes `(column, offset)` token positions over the alphabet
//! `{0x01, column_varint, offset_delta_varints...}`. The `+2` offset bias
//! and the `0x01` column-change marker mirror the append step SQLite's own
//! FTS5 hash table uses; the delta-style shape (store a transform of the
//! raw value so repeated runs compress well) is the same idea as any
//! incremental posting-list codec.

use crate::error::{Fts5Error, Fts5Result};
use crate::varint::{decode_varint, encode_varint};

/// Column-change marker. Never a valid offset-delta-plus-bias value because
/// the bias keeps real deltas at 2 or above... except a delta of exactly
/// `-1` biased would also be 1, which can't happen since deltas must be
/// strictly positive (see `PoslistWriter::write`). Only column 0 at a fresh
/// rowid could coincide with 1, which is why the marker is reserved at the
/// byte level, not the decoded-value level: a writer never emits a bare `1`
/// unescaped at the start of a column's delta stream because the first
/// delta in a column is `off - 0 + 2 >= 2`.
const COLUMN_MARKER: u64 = 0x01;

/// Builds a poslist for a single rowid, one token at a time, in increasing
/// `(column, offset)` order.
#[derive(Debug, Default)]
pub struct PoslistWriter {
    buf: Vec<u8>,
    last_col: u32,
    last_off: u32,
    have_col: bool,
}

impl PoslistWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a token at `(col, off)`. `col` must be `>=` the last column
    /// written and, within a column, `off` must be strictly greater than the
    /// last offset written in that column.
    pub fn write(&mut self, col: u32, off: u32) -> Fts5Result<()> {
        if self.have_col {
            if col < self.last_col {
                return Err(Fts5Error::Misuse(format!(
                    "poslist column went backwards: {col} < {}",
                    self.last_col
                )));
            }
            if col == self.last_col && off <= self.last_off {
                return Err(Fts5Error::Misuse(format!(
                    "poslist offset went backwards: {off} <= {}",
                    self.last_off
                )));
            }
        }
        if !self.have_col || col > self.last_col {
            encode_varint(COLUMN_MARKER, &mut self.buf);
            encode_varint(u64::from(col), &mut self.buf);
            self.last_col = col;
            self.last_off = 0;
            self.have_col = true;
        }
        encode_varint(u64::from(off - self.last_off) + 2, &mut self.buf);
        self.last_off = off;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// One decoded token position within a poslist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub col: u32,
    pub off: u32,
}

/// Forward-only iterator over a poslist byte slice.
pub struct PoslistReader<'a> {
    buf: &'a [u8],
    pos: usize,
    col: u32,
    off: u32,
    have_col: bool,
}

impl<'a> PoslistReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            col: 0,
            off: 0,
            have_col: false,
        }
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Decode and return the next position, advancing the cursor. There is
    /// no separate peek-without-consume step: callers that need to look
    /// ahead should clone the reader, which is cheap — it is just a slice
    /// and three integers.
    pub fn advance(&mut self) -> Fts5Result<Option<Position>> {
        if self.at_eof() {
            return Ok(None);
        }
        let (first, used) = decode_varint(&self.buf[self.pos..])?;
        self.pos += used;
        if first == COLUMN_MARKER {
            let (col, used) = decode_varint(&self.buf[self.pos..])?;
            self.pos += used;
            self.col = col as u32;
            self.off = 0;
            self.have_col = true;
            if self.at_eof() {
                return Err(Fts5Error::Corrupt(
                    "poslist ends immediately after column marker".into(),
                ));
            }
            let (delta, used) = decode_varint(&self.buf[self.pos..])?;
            self.pos += used;
            self.apply_delta(delta)
        } else {
            if !self.have_col {
                return Err(Fts5Error::Corrupt(
                    "poslist offset delta before any column marker".into(),
                ));
            }
            self.apply_delta(first)
        }
    }

    fn apply_delta(&mut self, delta: u64) -> Fts5Result<Option<Position>> {
        if delta < 2 {
            return Err(Fts5Error::Corrupt(format!(
                "poslist offset delta underflow: {delta}"
            )));
        }
        let delta = (delta - 2) as u32;
        self.off = self
            .off
            .checked_add(delta)
            .ok_or_else(|| Fts5Error::Corrupt("poslist offset overflow".into()))?;
        Ok(Some(Position {
            col: self.col,
            off: self.off,
        }))
    }

    /// Non-consuming look at the raw remaining bytes, used by NEAR/phrase
    /// matching in the expression engine to snapshot a restart point.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

impl Clone for PoslistReader<'_> {
    fn clone(&self) -> Self {
        PoslistReader {
            buf: self.buf,
            pos: self.pos,
            col: self.col,
            off: self.off,
            have_col: self.have_col,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_column_round_trips() {
        let mut w = PoslistWriter::new();
        w.write(0, 1).unwrap();
        w.write(0, 3).unwrap();
        w.write(0, 10).unwrap();
        let bytes = w.finish();
        let mut r = PoslistReader::new(&bytes);
        assert_eq!(r.advance().unwrap(), Some(Position { col: 0, off: 1 }));
        assert_eq!(r.advance().unwrap(), Some(Position { col: 0, off: 3 }));
        assert_eq!(r.advance().unwrap(), Some(Position { col: 0, off: 10 }));
        assert_eq!(r.advance().unwrap(), None);
        assert!(r.at_eof());
    }

    #[test]
    fn column_change_emits_marker() {
        let mut w = PoslistWriter::new();
        w.write(0, 0).unwrap();
        w.write(2, 5).unwrap();
        let bytes = w.finish();
        let mut r = PoslistReader::new(&bytes);
        assert_eq!(r.advance().unwrap(), Some(Position { col: 0, off: 0 }));
        assert_eq!(r.advance().unwrap(), Some(Position { col: 2, off: 5 }));
        assert!(r.at_eof());
    }

    #[test]
    fn rejects_offset_going_backwards_within_column() {
        let mut w = PoslistWriter::new();
        w.write(0, 5).unwrap();
        assert!(w.write(0, 3).is_err());
    }

    #[test]
    fn rejects_column_going_backwards() {
        let mut w = PoslistWriter::new();
        w.write(2, 0).unwrap();
        assert!(w.write(1, 0).is_err());
    }

    #[test]
    fn rejects_repeated_offset_within_column() {
        let mut w = PoslistWriter::new();
        w.write(0, 5).unwrap();
        assert!(w.write(0, 5).is_err());
    }

    #[test]
    fn empty_poslist_is_immediately_eof() {
        let r = PoslistReader::new(&[]);
        assert!(r.at_eof());
    }

    proptest::proptest! {
        #[test]
        fn round_trip_strictly_increasing_positions(
            positions in proptest::collection::vec((0u32..8, 1u32..2000), 1..50)
        ) {
            let mut sorted = positions;
            sorted.sort();
            sorted.dedup();
            let mut w = PoslistWriter::new();
            let mut last: Option<(u32, u32)> = None;
            let mut expected = Vec::new();
            for (col, off) in sorted {
                if let Some((lc, lo)) = last {
                    if col < lc || (col == lc && off <= lo) {
                        continue;
                    }
                }
                w.write(col, off).unwrap();
                expected.push(Position { col, off });
                last = Some((col, off));
            }
            let bytes = w.finish();
            let mut r = PoslistReader::new(&bytes);
            let mut actual = Vec::new();
            while let Some(p) = r.advance().unwrap() {
                actual.push(p);
            }
            proptest::prop_assert_eq!(actual, expected);
        }
    }
}
