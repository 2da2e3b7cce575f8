//! The structure record: the single persisted descriptor of all segments,
//! bumped on every structural change so readers can revalidate by
//! re-reading it. Plays the same "single source of truth" role a segment's
//! own page layout plays for its pages.

use crate::error::Fts5Result;
use crate::segment::merge::{merge_segments, merge_term_doclists};
use crate::segment::Segment;

/// Default segments-per-level fan-out before a cascading merge.
pub const DEFAULT_K: usize = 4;

#[derive(Default)]
pub struct StructureRecord {
    levels: Vec<Vec<Segment>>,
    next_segment_id: u64,
    /// Bumped on every structural change; readers use it to detect a stale
    /// snapshot.
    pub version: u64,
    pub fanout: usize,
}

impl StructureRecord {
    pub fn new(fanout: usize) -> Self {
        StructureRecord {
            levels: Vec::new(),
            next_segment_id: 1,
            version: 0,
            fanout,
        }
    }

    pub fn segment_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn levels(&self) -> &[Vec<Segment>] {
        &self.levels
    }

    fn alloc_segment_id(&mut self) -> u64 {
        let id = self.next_segment_id;
        self.next_segment_id += 1;
        id
    }

    /// Mint a new level-0 segment from a drained pending-hash stream, then
    /// cascade merges as needed.
    pub fn flush(&mut self, entries: Vec<(Vec<u8>, Vec<u8>)>, pgsz: usize) -> Fts5Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let id = self.alloc_segment_id();
        let segment = Segment::build(entries, id, 0, pgsz)?;
        if self.levels.is_empty() {
            self.levels.push(Vec::new());
        }
        self.levels[0].push(segment);
        self.version += 1;
        self.cascade_merges(pgsz)?;
        Ok(())
    }

    /// Merge any level holding `fanout` or more segments into the next
    /// level, cascading upward as far as needed.
    fn cascade_merges(&mut self, pgsz: usize) -> Fts5Result<()> {
        let mut level = 0;
        while level < self.levels.len() {
            if self.levels[level].len() < self.fanout {
                level += 1;
                continue;
            }
            let is_deepest = level + 1 >= self.levels.len() && self.levels.get(level + 1).map_or(true, Vec::is_empty);
            let to_merge: Vec<Segment> = self.levels[level].drain(..).collect();
            let new_id = self.alloc_segment_id();
            let merged = merge_segments(&to_merge, new_id, (level + 1) as u32, pgsz, is_deepest)?;
            if self.levels.len() <= level + 1 {
                self.levels.push(Vec::new());
            }
            self.levels[level + 1].push(merged);
            self.version += 1;
            level += 1;
        }
        Ok(())
    }

    /// `'optimize'` special command: merge every segment, at every level,
    /// down to a single one.
    pub fn optimize(&mut self, pgsz: usize) -> Fts5Result<()> {
        let all: Vec<Segment> = self.levels.drain(..).flatten().collect();
        if all.len() <= 1 {
            self.levels = if all.is_empty() { Vec::new() } else { vec![all] };
            return Ok(());
        }
        let max_level = all.iter().map(|s| s.level).max().unwrap_or(0);
        let new_id = self.alloc_segment_id();
        let merged = merge_segments(&all, new_id, max_level + 1, pgsz, true)?;
        self.levels = vec![Vec::new(); max_level as usize + 2];
        self.levels[max_level as usize + 1].push(merged);
        self.trim_empty_levels();
        self.version += 1;
        Ok(())
    }

    /// `'merge', n` special command: merge until fewer than `n` segments
    /// remain at any level.
    pub fn merge_until(&mut self, n: usize, pgsz: usize) -> Fts5Result<()> {
        loop {
            let level = self.levels.iter().position(|l| l.len() >= n.max(2));
            let Some(level) = level else { break };
            let is_deepest = level + 1 >= self.levels.len() || self.levels[level + 1].is_empty();
            let to_merge: Vec<Segment> = self.levels[level].drain(..).collect();
            let new_id = self.alloc_segment_id();
            let merged = merge_segments(&to_merge, new_id, (level + 1) as u32, pgsz, is_deepest)?;
            if self.levels.len() <= level + 1 {
                self.levels.push(Vec::new());
            }
            self.levels[level + 1].push(merged);
            self.version += 1;
        }
        Ok(())
    }

    fn trim_empty_levels(&mut self) {
        while matches!(self.levels.last(), Some(l) if l.is_empty()) {
            self.levels.pop();
        }
    }

    /// Discard the newest segments (highest segment-id) down to `n` total,
    /// used by the façade's `rollback_to` to undo everything minted since a
    /// savepoint.
    pub fn truncate_to_segment_count(&mut self, n: usize) {
        let mut all: Vec<Segment> = self.levels.drain(..).flatten().collect();
        all.sort_by_key(|s| s.segment_id);
        all.truncate(n);
        self.levels.clear();
        for seg in all {
            while self.levels.len() <= seg.level as usize {
                self.levels.push(Vec::new());
            }
            self.levels[seg.level as usize].push(seg);
        }
        self.trim_empty_levels();
        self.version += 1;
    }

    /// `'delete-all'`: drop every segment.
    pub fn delete_all(&mut self) {
        self.levels.clear();
        self.version += 1;
    }

    /// `'integrity-check'`: verify CRCs, term ordering, and rowid ordering
    /// across all segments. Ordering is checked explicitly here rather than
    /// relying on the `debug_assert!`s applied at build time, since those
    /// compile to nothing in release builds.
    pub fn integrity_check(&self) -> Fts5Result<()> {
        for level in &self.levels {
            for segment in level {
                segment.verify_integrity()?;
                segment.verify_ordering()?;
            }
        }
        Ok(())
    }

    /// Union `term`'s doclist across every live segment. Segments coexist
    /// between cascades (up to `fanout - 1` at level 0, plus one per merged
    /// level), so a term can have live postings in several of them at once;
    /// all of them must contribute, with newer-segment-wins and tombstone
    /// cancellation applied exactly as a merge would.
    pub fn lookup(&self, term: &[u8]) -> Fts5Result<Option<Vec<u8>>> {
        let mut contributions: Vec<(u64, Vec<u8>)> = Vec::new();
        for level in &self.levels {
            for segment in level {
                if let Some(doclist) = segment.lookup(term)? {
                    contributions.push((segment.segment_id, doclist));
                }
            }
        }
        let refs: Vec<(u64, &[u8])> = contributions.iter().map(|(id, d)| (*id, d.as_slice())).collect();
        merge_term_doclists(&refs, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drained(term: &str, rowid: i64) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut h = crate::pending::PendingHash::new();
        h.write(term.as_bytes(), rowid, 0, 1).unwrap();
        h.drain()
    }

    #[test]
    fn flushing_below_fanout_does_not_merge() {
        let mut s = StructureRecord::new(4);
        for i in 0..3 {
            s.flush(drained("term", i + 1), 4096).unwrap();
        }
        assert_eq!(s.segment_count(), 3);
        assert_eq!(s.levels()[0].len(), 3);
    }

    #[test]
    fn reaching_fanout_cascades_one_level() {
        let mut s = StructureRecord::new(4);
        for i in 0..4 {
            s.flush(drained("term", i + 1), 4096).unwrap();
        }
        assert_eq!(s.segment_count(), 1);
        assert_eq!(s.levels()[1].len(), 1);
    }

    #[test]
    fn optimize_collapses_to_one_segment() {
        let mut s = StructureRecord::new(4);
        for i in 0..10 {
            s.flush(drained(&format!("term{i}"), i as i64 + 1), 4096).unwrap();
        }
        s.optimize(4096).unwrap();
        assert_eq!(s.segment_count(), 1);
    }

    #[test]
    fn delete_all_empties_structure() {
        let mut s = StructureRecord::new(4);
        s.flush(drained("term", 1), 4096).unwrap();
        s.delete_all();
        assert_eq!(s.segment_count(), 0);
    }

    #[test]
    fn version_bumps_on_every_structural_change() {
        let mut s = StructureRecord::new(4);
        let before = s.version;
        s.flush(drained("term", 1), 4096).unwrap();
        assert!(s.version > before);
    }

    #[test]
    fn lookup_unions_postings_across_unmerged_segments() {
        let mut s = StructureRecord::new(4);
        s.flush(drained("brown", 1), 4096).unwrap();
        s.flush(drained("brown", 2), 4096).unwrap();
        assert_eq!(s.levels()[0].len(), 2);

        let doclist = s.lookup(b"brown").unwrap().unwrap();
        let rows = crate::segment::doclist_entries(&doclist).unwrap();
        assert_eq!(rows.iter().map(|(r, _)| *r).collect::<Vec<_>>(), vec![1, 2]);
    }
}
