//! Segment store: immutable, sorted term -> doclist stores, organized into
//! levels with a tiered merge policy.
//!
//! Offset bookkeeping follows a one-function-computes-the-layout
//! discipline: everything else calls it rather than recomputing page
//! boundaries inline. The merge-cascade policy follows the same
//! level/fan-out shape SQLite's own FTS5 extension uses.

pub mod merge;
pub mod page;
pub mod structure;

use crate::error::{Fts5Error, Fts5Result};
use crate::pending::iter_doclist;
use crate::varint::decode_varint;
use page::{InteriorEntry, LeafRecord};

/// A single immutable segment: a flat sequence of leaf/continuation pages
/// plus one root interior page indexing the leaves (see the simplification
/// note in `page.rs`).
#[derive(Clone)]
pub struct Segment {
    pub level: u32,
    pub segment_id: u64,
    pub doc_count: u64,
    pages: Vec<Vec<u8>>,
    /// First term of each leaf page, cached for binary search; mirrors what
    /// the root interior page separately encodes.
    leaf_first_keys: Vec<Vec<u8>>,
    crc32: u32,
}

impl Segment {
    /// Build a new segment from entries already sorted by term (the shape
    /// `PendingHash::drain()` or a merge step produces), default page size
    /// 4096 bytes.
    pub fn build(
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        segment_id: u64,
        level: u32,
        pgsz: usize,
    ) -> Fts5Result<Self> {
        crate::contracts::check_terms_strictly_increasing(
            &entries.iter().map(|(t, _)| t.clone()).collect::<Vec<_>>(),
        );
        let mut pages: Vec<Vec<u8>> = Vec::new();
        let mut leaf_first_keys: Vec<Vec<u8>> = Vec::new();
        let mut doc_count: u64 = 0;
        for (_, doclist) in &entries {
            doc_count += iter_doclist(doclist)?.len() as u64;
        }

        let mut idx = 0usize;
        while idx < entries.len() {
            let page_start = idx;
            let (mut buf, consumed, spill) = page::encode_leaf_page(&entries, idx, pgsz);
            leaf_first_keys.push(entries[page_start].0.clone());
            if let Some(room) = spill {
                // Continue spilling the same entry's doclist across
                // continuation pages until it's fully written.
                let (term_idx_term, doclist) = &entries[consumed];
                let _ = term_idx_term;
                let mut offset = room;
                pages.push(std::mem::take(&mut buf));
                loop {
                    let remaining = doclist.len() - offset;
                    let take = remaining.min(pgsz.saturating_sub(2).max(1));
                    let has_next = offset + take < doclist.len();
                    pages.push(page::encode_continuation_page(
                        &doclist[offset..offset + take],
                        has_next,
                    ));
                    offset += take;
                    if !has_next {
                        break;
                    }
                }
                idx = consumed + 1;
            } else {
                pages.push(buf);
                idx = consumed;
            }
        }

        let mut interior_entries = Vec::new();
        for (i, key) in leaf_first_keys.iter().enumerate().skip(1) {
            interior_entries.push(InteriorEntry {
                separator: key.clone(),
                child_page: (i - 1) as u32,
            });
        }
        let root = if leaf_first_keys.is_empty() {
            page::encode_interior_page(&[], 0)
        } else {
            page::encode_interior_page(&interior_entries, (leaf_first_keys.len() - 1) as u32)
        };
        pages.push(root);

        let crc32 = {
            let mut hasher = crc32fast::Hasher::new();
            for p in &pages {
                hasher.update(p);
            }
            hasher.finalize()
        };

        Ok(Segment {
            level,
            segment_id,
            doc_count,
            pages,
            leaf_first_keys,
            crc32,
        })
    }

    fn leaf_count(&self) -> usize {
        self.pages.len().saturating_sub(1)
    }

    fn root(&self) -> &[u8] {
        self.pages.last().expect("segment always has a root page")
    }

    /// Verify the segment's checksum against its pages. Any CRC or bounds
    /// violation returns `Corrupt`.
    pub fn verify_integrity(&self) -> Fts5Result<()> {
        let mut hasher = crc32fast::Hasher::new();
        for p in &self.pages {
            hasher.update(p);
        }
        if hasher.finalize() != self.crc32 {
            return Err(Fts5Error::Corrupt(format!(
                "segment {} failed CRC verification",
                self.segment_id
            )));
        }
        let (_, rightmost) = page::decode_interior_page(self.root())?;
        if rightmost as usize + 1 != self.leaf_count() && self.leaf_count() > 0 {
            return Err(Fts5Error::Corrupt("interior page rightmost child out of range".into()));
        }
        Ok(())
    }

    /// Binary search the cached leaf first-keys for the leaf that could
    /// contain `term`, then scan within that leaf.
    pub fn lookup(&self, term: &[u8]) -> Fts5Result<Option<Vec<u8>>> {
        if self.leaf_first_keys.is_empty() {
            return Ok(None);
        }
        let leaf_idx = match self.leaf_first_keys.binary_search_by(|k| k.as_slice().cmp(term)) {
            Ok(i) => i,
            Err(0) => return Ok(None),
            Err(i) => i - 1,
        };
        self.doclist_in_leaf(leaf_idx, term)
    }

    fn doclist_in_leaf(&self, mut leaf_idx: usize, term: &[u8]) -> Fts5Result<Option<Vec<u8>>> {
        loop {
            let records = page::decode_leaf_page(&self.pages[leaf_idx])?;
            for (i, record) in records.iter().enumerate() {
                if record.term == term {
                    return self.materialize_doclist(leaf_idx, i, &records);
                }
            }
            break;
        }
        let _ = &mut leaf_idx;
        Ok(None)
    }

    fn materialize_doclist(
        &self,
        leaf_idx: usize,
        record_idx: usize,
        records: &[LeafRecord],
    ) -> Fts5Result<Option<Vec<u8>>> {
        let record = &records[record_idx];
        if record.bytes.len() == record.total_len {
            return Ok(Some(record.bytes.clone()));
        }
        let mut full = record.bytes.clone();
        let is_last_record_on_page = record_idx + 1 == records.len();
        if !is_last_record_on_page {
            return Err(Fts5Error::Corrupt(
                "spilled doclist is not the last record on its page".into(),
            ));
        }
        let mut page_idx = leaf_idx + 1;
        while full.len() < record.total_len {
            if page_idx >= self.pages.len() - 1 {
                return Err(Fts5Error::Corrupt("doclist continuation ran past segment end".into()));
            }
            let tail = page::decode_continuation_page(&self.pages[page_idx]);
            full.extend_from_slice(tail);
            let has_next = page::page_has_next(&self.pages[page_idx]);
            page_idx += 1;
            if !has_next {
                break;
            }
        }
        if full.len() != record.total_len {
            return Err(Fts5Error::Corrupt("doclist continuation length mismatch".into()));
        }
        Ok(Some(full))
    }

    /// Walk every term and doclist in the segment, checking that terms are
    /// strictly increasing and that each doclist's rowids are strictly
    /// increasing. Unlike the `debug_assert!`-based checks applied at build
    /// time, this runs in release builds too, so `'integrity-check'` can
    /// catch on-disk corruption that a build-time invariant can't see.
    pub fn verify_ordering(&self) -> Fts5Result<()> {
        let entries = self.iter_all()?;
        let mut prev_term: Option<&[u8]> = None;
        for (term, doclist) in &entries {
            if let Some(prev) = prev_term {
                if prev >= term.as_slice() {
                    return Err(Fts5Error::Corrupt(format!(
                        "segment {} has out-of-order terms",
                        self.segment_id
                    )));
                }
            }
            prev_term = Some(term.as_slice());

            let rowids: Vec<i64> = doclist_entries(doclist)?.into_iter().map(|(r, _)| r).collect();
            if rowids.windows(2).any(|w| w[0] >= w[1]) {
                return Err(Fts5Error::Corrupt(format!(
                    "segment {} has out-of-order rowids for a term",
                    self.segment_id
                )));
            }
        }
        Ok(())
    }

    /// Iterate every `(term, doclist)` pair in the segment, in term order.
    /// Used by merges and the expression engine's term lookup fallback.
    pub fn iter_all(&self) -> Fts5Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        let mut page_idx = 0;
        while page_idx < self.leaf_count() {
            let records = page::decode_leaf_page(&self.pages[page_idx])?;
            let n = records.len();
            for (i, record) in records.into_iter().enumerate() {
                if record.bytes.len() == record.total_len {
                    out.push((record.term, record.bytes));
                } else if i + 1 == n {
                    let doclist = self
                        .materialize_doclist(page_idx, i, &page::decode_leaf_page(&self.pages[page_idx])?)?
                        .expect("record located by its own index must resolve");
                    out.push((record.term, doclist));
                } else {
                    return Err(Fts5Error::Corrupt("mid-page spill is malformed".into()));
                }
            }
            page_idx += 1;
            // Skip any continuation pages belonging to the last record.
            while page_idx < self.leaf_count() && page::page_type(&self.pages[page_idx]) == page::PAGE_TYPE_LEAF_CONTINUATION {
                page_idx += 1;
            }
        }
        Ok(out)
    }
}

/// Walk a doclist byte slice into `(rowid, poslist_bytes)` pairs; exposed
/// here too since segment readers need it without importing from `pending`
/// directly in call sites that only deal with segments.
pub fn doclist_entries(doclist: &[u8]) -> Fts5Result<Vec<(i64, Vec<u8>)>> {
    iter_doclist(doclist)
}

pub fn doclist_is_tombstone_only(doclist: &[u8]) -> Fts5Result<bool> {
    Ok(doclist_entries(doclist)?.iter().all(|(_, p)| p.is_empty()))
}

/// Decode the leading rowid-delta of a doclist without materialising the
/// rest; used by integrity-check to spot-verify without a full walk.
pub fn first_rowid(doclist: &[u8]) -> Fts5Result<i64> {
    let (delta, _) = decode_varint(doclist)?;
    Ok(delta as i64)
}
