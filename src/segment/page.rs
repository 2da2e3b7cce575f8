//! Leaf and interior page encoding.
//!
//! Front coding: each key stores a varint shared-prefix length against the
//! previous key, plus the remaining suffix bytes. The 2-byte page header
//! `{page_type, payload_start_offset}` follows a "single function computes
//! all offsets" discipline.
//!
//! Simplification versus a production B-tree: this crate keeps a single
//! flat leaf level plus one root interior page (no recursive interior
//! fan-out), since segments here are in-memory blobs rather than
//! disk-paged structures — noted in DESIGN.md. The page *framing* (prefix
//! compression, continuation bit, 2-byte header) is otherwise unchanged.

use crate::error::{Fts5Error, Fts5Result};
use crate::varint::{decode_varint, encode_varint};

pub const PAGE_TYPE_LEAF: u8 = 0x01;
pub const PAGE_TYPE_LEAF_CONTINUATION: u8 = 0x02;
pub const PAGE_TYPE_INTERIOR: u8 = 0x03;
const HAS_NEXT_BIT: u8 = 0x80;

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// A decoded leaf entry: a term and the doclist bytes this page holds for
/// it. `total_len` is the full doclist length; if it exceeds `bytes.len()`
/// the remainder continues in subsequent `LeafContinuation` pages.
pub struct LeafRecord {
    pub term: Vec<u8>,
    pub bytes: Vec<u8>,
    pub total_len: usize,
}

/// Encode one leaf page from `entries`, writing as many whole or
/// partial-doclist records as fit within `pgsz` bytes. Returns the encoded
/// page plus the entries (and partial progress) that did not fit, so the
/// caller can keep paging.
pub fn encode_leaf_page(
    entries: &[(Vec<u8>, Vec<u8>)],
    start_idx: usize,
    pgsz: usize,
) -> (Vec<u8>, usize, Option<usize>) {
    let mut buf = vec![PAGE_TYPE_LEAF, 2];
    let mut prev: Vec<u8> = Vec::new();
    let mut idx = start_idx;
    while idx < entries.len() {
        let (term, doclist) = &entries[idx];
        let shared = common_prefix_len(&prev, term);
        let mut header = Vec::new();
        encode_varint(shared as u64, &mut header);
        encode_varint((term.len() - shared) as u64, &mut header);
        encode_varint(doclist.len() as u64, &mut header);

        let room = pgsz.saturating_sub(buf.len() + header.len() + (term.len() - shared));
        if buf.len() + header.len() + (term.len() - shared) + doclist.len() <= pgsz {
            // Whole record fits.
            buf.extend_from_slice(&header);
            buf.extend_from_slice(&term[shared..]);
            buf.extend_from_slice(doclist);
            prev = term.clone();
            idx += 1;
            if buf.len() >= pgsz {
                return (buf, idx, None);
            }
        } else if room > 0 {
            // Spill: write the term and as much of the doclist as fits, mark
            // has_next_page, and let the caller continue from a partial
            // offset into this same entry's doclist. Applies even to the
            // first record on an otherwise-empty page: an oversized doclist
            // must spill rather than be written whole over the page budget.
            buf[0] |= HAS_NEXT_BIT;
            buf.extend_from_slice(&header);
            buf.extend_from_slice(&term[shared..]);
            buf.extend_from_slice(&doclist[..room]);
            return (buf, idx, Some(room));
        } else if buf.len() == 2 {
            // Not even the term and header fit with room to spare for a
            // single spilled byte; write the record whole so the page
            // still makes forward progress instead of looping forever.
            buf.extend_from_slice(&header);
            buf.extend_from_slice(&term[shared..]);
            buf.extend_from_slice(doclist);
            prev = term.clone();
            idx += 1;
            return (buf, idx, None);
        } else {
            break;
        }
    }
    (buf, idx, None)
}

/// Encode a continuation page carrying raw doclist bytes with no framing.
pub fn encode_continuation_page(chunk: &[u8], has_next: bool) -> Vec<u8> {
    let mut buf = vec![
        PAGE_TYPE_LEAF_CONTINUATION | if has_next { HAS_NEXT_BIT } else { 0 },
        2,
    ];
    buf.extend_from_slice(chunk);
    buf
}

pub fn page_type(buf: &[u8]) -> u8 {
    buf[0] & !HAS_NEXT_BIT
}

pub fn page_has_next(buf: &[u8]) -> bool {
    buf[0] & HAS_NEXT_BIT != 0
}

/// Decode a leaf page's framed records (does not resolve continuations).
pub fn decode_leaf_page(buf: &[u8]) -> Fts5Result<Vec<LeafRecord>> {
    if buf.len() < 2 {
        return Err(Fts5Error::Corrupt("leaf page shorter than header".into()));
    }
    let start = buf[1] as usize;
    let mut pos = start;
    let mut prev: Vec<u8> = Vec::new();
    let mut out = Vec::new();
    while pos < buf.len() {
        let (shared, used) = decode_varint(&buf[pos..])?;
        pos += used;
        let (suffix_len, used) = decode_varint(&buf[pos..])?;
        pos += used;
        let (total_len, used) = decode_varint(&buf[pos..])?;
        pos += used;
        let shared = shared as usize;
        if shared > prev.len() {
            return Err(Fts5Error::Corrupt("leaf page prefix length exceeds previous key".into()));
        }
        let suffix_len = suffix_len as usize;
        let suffix_end = pos + suffix_len;
        if suffix_end > buf.len() {
            return Err(Fts5Error::Corrupt("leaf page term suffix overruns buffer".into()));
        }
        let mut term = prev[..shared].to_vec();
        term.extend_from_slice(&buf[pos..suffix_end]);
        pos = suffix_end;
        let remaining_in_page = buf.len() - pos;
        let chunk_len = remaining_in_page.min(total_len as usize);
        let chunk = buf[pos..pos + chunk_len].to_vec();
        pos += chunk_len;
        prev = term.clone();
        out.push(LeafRecord {
            term,
            bytes: chunk,
            total_len: total_len as usize,
        });
    }
    Ok(out)
}

/// Decode a continuation page's raw payload.
pub fn decode_continuation_page(buf: &[u8]) -> &[u8] {
    &buf[(buf[1] as usize)..]
}

/// One interior-page entry: the separator (first key of the right child)
/// and the child's page index within the segment.
pub struct InteriorEntry {
    pub separator: Vec<u8>,
    pub child_page: u32,
}

pub fn encode_interior_page(entries: &[InteriorEntry], rightmost_child: u32) -> Vec<u8> {
    let mut buf = vec![PAGE_TYPE_INTERIOR, 6];
    buf.extend_from_slice(&rightmost_child.to_be_bytes());
    let mut prev: Vec<u8> = Vec::new();
    for e in entries {
        let shared = common_prefix_len(&prev, &e.separator);
        encode_varint(shared as u64, &mut buf);
        encode_varint((e.separator.len() - shared) as u64, &mut buf);
        buf.extend_from_slice(&e.separator[shared..]);
        encode_varint(u64::from(e.child_page), &mut buf);
        prev = e.separator.clone();
    }
    buf
}

pub fn decode_interior_page(buf: &[u8]) -> Fts5Result<(Vec<InteriorEntry>, u32)> {
    if buf.len() < 6 {
        return Err(Fts5Error::Corrupt("interior page shorter than header".into()));
    }
    let rightmost_child = u32::from_be_bytes(buf[2..6].try_into().unwrap());
    let mut pos = buf[1] as usize;
    let mut prev: Vec<u8> = Vec::new();
    let mut out = Vec::new();
    while pos < buf.len() {
        let (shared, used) = decode_varint(&buf[pos..])?;
        pos += used;
        let (suffix_len, used) = decode_varint(&buf[pos..])?;
        pos += used;
        let shared = shared as usize;
        if shared > prev.len() {
            return Err(Fts5Error::Corrupt("interior page prefix length exceeds previous key".into()));
        }
        let suffix_len = suffix_len as usize;
        let mut separator = prev[..shared].to_vec();
        separator.extend_from_slice(&buf[pos..pos + suffix_len]);
        pos += suffix_len;
        let (child_page, used) = decode_varint(&buf[pos..])?;
        pos += used;
        prev = separator.clone();
        out.push(InteriorEntry {
            separator,
            child_page: child_page as u32,
        });
    }
    Ok((out, rightmost_child))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_page_round_trips_small_entries() {
        let entries = vec![
            (b"apple".to_vec(), b"doclist-a".to_vec()),
            (b"application".to_vec(), b"doclist-b".to_vec()),
            (b"banana".to_vec(), b"doclist-c".to_vec()),
        ];
        let (buf, consumed, spill) = encode_leaf_page(&entries, 0, 4096);
        assert_eq!(consumed, 3);
        assert!(spill.is_none());
        let records = decode_leaf_page(&buf).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].term, b"apple");
        assert_eq!(records[1].term, b"application");
        assert_eq!(records[2].bytes, b"doclist-c");
    }

    #[test]
    fn leaf_page_spills_oversized_doclist_across_continuations() {
        let big = vec![7u8; 500];
        let entries = vec![(b"term".to_vec(), big.clone())];
        let (buf, consumed, spill) = encode_leaf_page(&entries, 0, 64);
        assert_eq!(consumed, 0);
        let room = spill.expect("expected a spill");
        assert!(page_has_next(&buf));
        let records = decode_leaf_page(&buf).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_len, 500);
        assert_eq!(records[0].bytes.len(), room);

        let cont = encode_continuation_page(&big[room..], false);
        assert!(!page_has_next(&cont));
        let tail = decode_continuation_page(&cont);
        let mut full = records[0].bytes.clone();
        full.extend_from_slice(tail);
        assert_eq!(full, big);
    }

    #[test]
    fn interior_page_round_trips() {
        let entries = vec![
            InteriorEntry { separator: b"brown".to_vec(), child_page: 1 },
            InteriorEntry { separator: b"quick".to_vec(), child_page: 2 },
        ];
        let buf = encode_interior_page(&entries, 0);
        let (decoded, rightmost) = decode_interior_page(&buf).unwrap();
        assert_eq!(rightmost, 0);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].separator, b"brown");
        assert_eq!(decoded[1].child_page, 2);
    }
}
