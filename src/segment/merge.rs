//! K-way segment merge.
//!
//! Tie-break rule: when two segments contain the same term+rowid, the one
//! with the higher segment-id wins. Tombstone cancellation: a delete
//! tombstone cancels any matching older posting and is itself dropped once
//! it has passed the deepest level. The external k-way merge shape (each
//! segment contributes a sorted stream, merged by key) generalizes the
//! two-list merge in `pending.rs` to N sources, and to merging *within* a
//! matching key as well as across keys.

use crate::error::Fts5Result;
use crate::segment::{doclist_entries, Segment};
use crate::varint::encode_varint;
use std::collections::HashMap;

/// Merge `segments` (already sorted oldest-first is not required; tie-break
/// uses segment-id, not position) into one new segment at `new_level`.
/// `is_deepest` controls whether surviving tombstones are dropped (true) or
/// retained for a future merge against even-older data (false).
pub fn merge_segments(
    segments: &[Segment],
    new_segment_id: u64,
    new_level: u32,
    pgsz: usize,
    is_deepest: bool,
) -> Fts5Result<Segment> {
    let streams: Vec<Vec<(Vec<u8>, Vec<u8>)>> = decode_segments(segments)?;
    let mut cursors = vec![0usize; streams.len()];
    let mut merged: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();

    loop {
        let mut min_term: Option<&[u8]> = None;
        for (i, stream) in streams.iter().enumerate() {
            if cursors[i] < stream.len() {
                let term = stream[cursors[i]].0.as_slice();
                min_term = Some(match min_term {
                    Some(cur) if cur <= term => cur,
                    _ => term,
                });
            }
        }
        let Some(term) = min_term else { break };
        let term = term.to_vec();

        let mut contributions: Vec<(u64, &[u8])> = Vec::new();
        for (i, stream) in streams.iter().enumerate() {
            if cursors[i] < stream.len() && stream[cursors[i]].0 == term {
                contributions.push((segments[i].segment_id, stream[cursors[i]].1.as_slice()));
                cursors[i] += 1;
            }
        }

        if let Some(doclist) = merge_term_doclists(&contributions, is_deepest)? {
            merged.push((term, doclist));
        }
    }

    Segment::build(merged, new_segment_id, new_level, pgsz)
}

/// Decode every segment's full (term, doclist) stream. Segments are
/// immutable and independent of one another, so this map phase runs across
/// threads under the `parallel` feature.
#[cfg(feature = "parallel")]
fn decode_segments(segments: &[Segment]) -> Fts5Result<Vec<Vec<(Vec<u8>, Vec<u8>)>>> {
    use rayon::prelude::*;
    segments.par_iter().map(Segment::iter_all).collect()
}

#[cfg(not(feature = "parallel"))]
fn decode_segments(segments: &[Segment]) -> Fts5Result<Vec<Vec<(Vec<u8>, Vec<u8>)>>> {
    segments.iter().map(Segment::iter_all).collect()
}

/// Resolve all segments' contributions for one term into a single merged
/// doclist, applying newer-segment-wins and tombstone cancellation.
/// Returns `None` if every rowid cancelled out (nothing left to store for
/// this term at all).
pub(crate) fn merge_term_doclists(
    contributions: &[(u64, &[u8])],
    is_deepest: bool,
) -> Fts5Result<Option<Vec<u8>>> {
    let mut winners: HashMap<i64, (u64, Vec<u8>)> = HashMap::new();
    for &(segment_id, doclist) in contributions {
        for (rowid, poslist) in doclist_entries(doclist)? {
            match winners.get(&rowid) {
                Some((existing_id, _)) if *existing_id > segment_id => {}
                _ => {
                    winners.insert(rowid, (segment_id, poslist));
                }
            }
        }
    }

    let mut rows: Vec<(i64, Vec<u8>)> = winners
        .into_iter()
        .filter(|(_, (_, poslist))| !(is_deepest && poslist.is_empty()))
        .map(|(rowid, (_, poslist))| (rowid, poslist))
        .collect();
    rows.sort_by_key(|(rowid, _)| *rowid);

    crate::contracts::check_rowids_strictly_increasing(&rows.iter().map(|(r, _)| *r).collect::<Vec<_>>());

    if rows.is_empty() {
        return Ok(None);
    }

    let mut buf = Vec::new();
    let mut last_rowid = 0i64;
    for (i, (rowid, poslist)) in rows.iter().enumerate() {
        let delta = if i == 0 { *rowid } else { rowid - last_rowid };
        encode_varint(delta as u64, &mut buf);
        let mut size_slot = [0u8; 4];
        crate::varint::put4(&mut size_slot, poslist.len() as u32);
        buf.extend_from_slice(&size_slot);
        buf.extend_from_slice(poslist);
        last_rowid = *rowid;
    }
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(entries: Vec<(&str, i64, bool)>, segment_id: u64) -> Segment {
        let mut buf: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for (term, rowid, tombstone) in entries {
            let mut h = crate::pending::PendingHash::new();
            if tombstone {
                h.write(term.as_bytes(), rowid, -1, 0).unwrap();
            } else {
                h.write(term.as_bytes(), rowid, 0, 1).unwrap();
            }
            let drained = h.drain();
            buf.extend(drained);
        }
        buf.sort_by(|a, b| a.0.cmp(&b.0));
        Segment::build(buf, segment_id, 0, 4096).unwrap()
    }

    #[test]
    fn newer_segment_wins_on_conflicting_rowid() {
        let old = build(vec![("fox", 1, false)], 1);
        let new = build(vec![("fox", 1, false)], 2);
        let merged = merge_segments(&[old, new], 3, 1, 4096, true).unwrap();
        let doclist = merged.lookup(b"fox").unwrap().unwrap();
        let rows = doclist_entries(&doclist).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn tombstone_cancels_older_posting_and_is_dropped_at_deepest_level() {
        let old = build(vec![("fox", 1, false)], 1);
        let tombstone = build(vec![("fox", 1, true)], 2);
        let merged = merge_segments(&[old, tombstone], 3, 1, 4096, true).unwrap();
        assert!(merged.lookup(b"fox").unwrap().is_none());
    }

    #[test]
    fn tombstone_survives_when_not_at_deepest_level() {
        let old = build(vec![("fox", 1, false)], 1);
        let tombstone = build(vec![("fox", 1, true)], 2);
        let merged = merge_segments(&[old, tombstone], 3, 1, 4096, false).unwrap();
        let doclist = merged.lookup(b"fox").unwrap().unwrap();
        let rows = doclist_entries(&doclist).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].1.is_empty());
    }

    #[test]
    fn disjoint_terms_merge_without_interaction() {
        let a = build(vec![("apple", 1, false)], 1);
        let b = build(vec![("banana", 2, false)], 2);
        let merged = merge_segments(&[a, b], 3, 1, 4096, true).unwrap();
        assert!(merged.lookup(b"apple").unwrap().is_some());
        assert!(merged.lookup(b"banana").unwrap().is_some());
    }
}
