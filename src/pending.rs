//! Pending hash: the in-memory term -> doclist accumulator.
//!
//! The hash function, the growth/back-patching write path, and the
//! bottom-up binary-buddy merge sort follow SQLite's own FTS5 hash table
//! (`sqlite3Fts5HashWrite`/`fts5HashEntrySort`/`fts5HashEntryMerge`)
//! algorithm-for-algorithm. What changes is the representation: the
//! original keeps one big inline allocation per entry and links entries
//! with raw pointers; here each entry owns its own `Vec<u8>` doclist buffer
//! and chains are plain `Vec<PendingEntry>` per slot, which a borrow-checked
//! port can do safely without losing the shape of the algorithm (the
//! logical "singly-linked chain" becomes an owned `Vec`, the "singly-linked
//! scan list" becomes a `Vec` merge).

use crate::error::{Fts5Error, Fts5Result};
use crate::varint::{decode_varint, encode_varint, patch4};

const INITIAL_SLOTS: usize = 256;

/// A single pending-hash entry: a term and the doclist bytes accumulated for
/// it so far, plus the write-path cursor state needed to append the next
/// posting without re-scanning what's already been written.
struct PendingEntry {
    term: Vec<u8>,
    data: Vec<u8>,
    last_rowid: i64,
    /// Byte offset of the 4-byte slot reserved for the in-progress poslist's
    /// size, back-patched on the next rowid transition or at flush.
    poslist_size_at: usize,
    last_col: u32,
    last_off: u32,
    have_col: bool,
}

impl PendingEntry {
    fn new(term: &[u8], rowid: i64) -> Self {
        let mut data = Vec::with_capacity(term.len() + 16);
        encode_varint(rowid as u64, &mut data);
        let poslist_size_at = data.len();
        data.extend_from_slice(&[0u8; 4]);
        PendingEntry {
            term: term.to_vec(),
            data,
            last_rowid: rowid,
            poslist_size_at,
            last_col: 0,
            last_off: 0,
            have_col: false,
        }
    }

    fn start_new_rowid(&mut self, rowid: i64) -> Fts5Result<()> {
        if rowid <= self.last_rowid {
            return Err(Fts5Error::Misuse(format!(
                "pending hash rowid went backwards: {rowid} <= {}",
                self.last_rowid
            )));
        }
        self.close_poslist();
        encode_varint((rowid - self.last_rowid) as u64, &mut self.data);
        self.poslist_size_at = self.data.len();
        self.data.extend_from_slice(&[0u8; 4]);
        self.last_rowid = rowid;
        self.last_col = 0;
        self.last_off = 0;
        self.have_col = false;
        Ok(())
    }

    fn write_token(&mut self, col: u32, off: u32) -> Fts5Result<()> {
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
            encode_varint(0x01, &mut self.data);
            encode_varint(u64::from(col), &mut self.data);
            self.last_col = col;
            self.last_off = 0;
            self.have_col = true;
        }
        encode_varint(u64::from(off - self.last_off) + 2, &mut self.data);
        self.last_off = off;
        Ok(())
    }

    /// Back-patch the reserved 4-byte slot with the byte length of the
    /// poslist that has accumulated since it was reserved.
    fn close_poslist(&mut self) {
        let size = (self.data.len() - self.poslist_size_at - 4) as u32;
        patch4(&mut self.data, self.poslist_size_at, size);
    }

    /// Clone of the doclist with the in-progress poslist size slot patched,
    /// without mutating this entry. Used by `scan`, which must leave the
    /// hash intact.
    fn closed_doclist_clone(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        let size = (data.len() - self.poslist_size_at - 4) as u32;
        patch4(&mut data, self.poslist_size_at, size);
        data
    }
}

/// fts5HashKey, ported verbatim: iterate term bytes in reverse, `h = 13`
/// folded by `(h << 3) ^ h ^ byte` at each step, wrapping on overflow exactly
/// as the C `int` arithmetic does.
fn hash_key(term: &[u8], n_slot: usize) -> usize {
    let mut h: u32 = 13;
    for &b in term.iter().rev() {
        h = h.wrapping_shl(3) ^ h ^ u32::from(b);
    }
    (h as usize) % n_slot
}

/// In-memory term -> doclist accumulator.
pub struct PendingHash {
    slots: Vec<Vec<PendingEntry>>,
    n_entry: usize,
    /// Running total of doclist bytes across all live entries, exposed so a
    /// host can trigger a flush under memory pressure.
    total_bytes: usize,
}

impl Default for PendingHash {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingHash {
    pub fn new() -> Self {
        PendingHash {
            slots: (0..INITIAL_SLOTS).map(|_| Vec::new()).collect(),
            n_entry: 0,
            total_bytes: 0,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.n_entry
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.n_entry == 0
    }

    /// Append `(term, rowid, col, pos)`. `col < 0` is the delete sentinel:
    /// it records the rowid transition with an empty poslist and writes no
    /// position. Rejects an empty term.
    pub fn write(&mut self, term: &[u8], rowid: i64, col: i32, pos: u32) -> Fts5Result<()> {
        if term.is_empty() {
            return Err(Fts5Error::Error("empty term".into()));
        }
        if (self.n_entry * 2) >= self.slots.len() {
            self.resize();
        }
        let slot = hash_key(term, self.slots.len());
        let chain = &mut self.slots[slot];
        let idx = chain.iter().position(|e| e.term == term);
        let before;
        let after;
        match idx {
            Some(i) => {
                let entry = &mut chain[i];
                before = entry.data.len();
                if rowid != entry.last_rowid {
                    entry.start_new_rowid(rowid)?;
                }
                if col >= 0 {
                    entry.write_token(col as u32, pos)?;
                }
                after = entry.data.len();
            }
            None => {
                let mut entry = PendingEntry::new(term, rowid);
                before = 0;
                if col >= 0 {
                    entry.write_token(col as u32, pos)?;
                }
                after = entry.data.len();
                chain.push(entry);
                self.n_entry += 1;
            }
        }
        self.total_bytes += after - before;
        Ok(())
    }

    fn resize(&mut self) {
        let new_n = (self.slots.len() * 2).max(INITIAL_SLOTS);
        let mut new_slots: Vec<Vec<PendingEntry>> = (0..new_n).map(|_| Vec::new()).collect();
        for chain in self.slots.drain(..) {
            for entry in chain {
                let slot = hash_key(&entry.term, new_n);
                new_slots[slot].push(entry);
            }
        }
        self.slots = new_slots;
    }

    /// Drain the hash into a term-sorted stream of `(term, doclist)` pairs,
    /// using the bottom-up, <=32-binary-buddy-slot merge from
    /// `fts5HashEntrySort`. Leaves the hash empty.
    pub fn drain(&mut self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut ap: Vec<Option<Vec<PendingEntry>>> = (0..32).map(|_| None).collect();
        for chain in self.slots.iter_mut() {
            for mut entry in chain.drain(..) {
                entry.close_poslist();
                let mut merged = vec![entry];
                let mut i = 0;
                loop {
                    if i == ap.len() {
                        ap.push(None);
                    }
                    match ap[i].take() {
                        Some(existing) => {
                            merged = merge_sorted(merged, existing);
                            i += 1;
                        }
                        None => {
                            ap[i] = Some(merged);
                            break;
                        }
                    }
                }
            }
        }
        let mut sorted: Vec<PendingEntry> = Vec::new();
        for bucket in ap.into_iter().flatten() {
            sorted = merge_sorted(sorted, bucket);
        }
        self.n_entry = 0;
        self.total_bytes = 0;
        sorted.into_iter().map(|e| (e.term, e.data)).collect()
    }

    /// Same ordering as `drain`, but only over entries whose term starts
    /// with `prefix`, and non-destructive: the hash is left intact.
    pub fn scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut ap: Vec<Option<Vec<(Vec<u8>, Vec<u8>)>>> = (0..32).map(|_| None).collect();
        for chain in &self.slots {
            for entry in chain {
                if !entry.term.starts_with(prefix) {
                    continue;
                }
                let pair = (entry.term.clone(), entry.closed_doclist_clone());
                let mut merged = vec![pair];
                let mut i = 0;
                loop {
                    if i == ap.len() {
                        ap.push(None);
                    }
                    match ap[i].take() {
                        Some(existing) => {
                            merged = merge_sorted_pairs(merged, existing);
                            i += 1;
                        }
                        None => {
                            ap[i] = Some(merged);
                            break;
                        }
                    }
                }
            }
        }
        let mut sorted: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for bucket in ap.into_iter().flatten() {
            sorted = merge_sorted_pairs(sorted, bucket);
        }
        sorted
    }
}

/// Merge two term-sorted entry lists, unsigned byte-wise comparison on the
/// term, mirroring `fts5HashEntryMerge`.
fn merge_sorted(a: Vec<PendingEntry>, b: Vec<PendingEntry>) -> Vec<PendingEntry> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut ai = a.into_iter().peekable();
    let mut bi = b.into_iter().peekable();
    loop {
        match (ai.peek(), bi.peek()) {
            (Some(x), Some(y)) => {
                if x.term <= y.term {
                    out.push(ai.next().unwrap());
                } else {
                    out.push(bi.next().unwrap());
                }
            }
            (Some(_), None) => out.push(ai.next().unwrap()),
            (None, Some(_)) => out.push(bi.next().unwrap()),
            (None, None) => break,
        }
    }
    out
}

fn merge_sorted_pairs(
    a: Vec<(Vec<u8>, Vec<u8>)>,
    b: Vec<(Vec<u8>, Vec<u8>)>,
) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut ai = a.into_iter().peekable();
    let mut bi = b.into_iter().peekable();
    loop {
        match (ai.peek(), bi.peek()) {
            (Some(x), Some(y)) => {
                if x.0 <= y.0 {
                    out.push(ai.next().unwrap());
                } else {
                    out.push(bi.next().unwrap());
                }
            }
            (Some(_), None) => out.push(ai.next().unwrap()),
            (None, Some(_)) => out.push(bi.next().unwrap()),
            (None, None) => break,
        }
    }
    out
}

/// Walk a closed doclist, yielding `(rowid, poslist_bytes)` pairs. Shared by
/// the segment writer (flushing a drained entry) and tests that assert on
/// pending-hash output shape directly.
pub fn iter_doclist(doclist: &[u8]) -> Fts5Result<Vec<(i64, Vec<u8>)>> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    let mut rowid: i64 = 0;
    let mut first = true;
    while pos < doclist.len() {
        let (delta, used) = decode_varint(&doclist[pos..])?;
        pos += used;
        rowid = if first {
            first = false;
            delta as i64
        } else {
            rowid + delta as i64
        };
        if pos + 4 > doclist.len() {
            return Err(Fts5Error::Corrupt("doclist truncated before size slot".into()));
        }
        let (size, _) = crate::varint::get4(doclist[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let size = size as usize;
        if pos + size > doclist.len() {
            return Err(Fts5Error::Corrupt("doclist poslist overruns buffer".into()));
        }
        out.push((rowid, doclist[pos..pos + size].to_vec()));
        pos += size;
    }
    Ok(out)
}
