//! Index façade: the open/write/flush/rollback session over the pending
//! hash and segment structure.
//!
//! Savepoint handling follows SQLite's own FTS5 extension: release is a
//! true no-op, savepoint flushes, rollback-to discards dirty state back to
//! a snapshot.

use crate::error::{Fts5Error, Fts5Result};
use crate::pending::PendingHash;
use crate::segment::structure::StructureRecord;
use crate::types::ColumnIndex;

/// Tunables exposed through the special-write option interface, plus the
/// segment fan-out.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub pgsz: usize,
    pub crisismerge: usize,
    pub automerge: usize,
    pub usermerge: usize,
    pub rank: String,
    pub fanout: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            pgsz: 4096,
            crisismerge: 16,
            automerge: 4,
            usermerge: 4,
            rank: "bm25".to_string(),
            fanout: crate::segment::structure::DEFAULT_K,
        }
    }
}

/// A snapshot taken at a savepoint boundary: the pending hash is flushed
/// immediately (rather than maintaining per-savepoint copies), so the
/// snapshot need only remember how many segments existed at that point, to
/// know what a rollback-to must discard.
struct SavepointMark {
    id: i64,
    segment_count: usize,
}

pub struct IndexFacade {
    pending: PendingHash,
    structure: StructureRecord,
    config: IndexConfig,
    reads_counter: u64,
    savepoints: Vec<SavepointMark>,
    table_name: String,
    open: bool,
    n_col: u32,
}

impl IndexFacade {
    pub fn open(table_name: impl Into<String>, n_col: usize, config: IndexConfig) -> Self {
        IndexFacade {
            pending: PendingHash::new(),
            structure: StructureRecord::new(config.fanout),
            config,
            reads_counter: 0,
            savepoints: Vec::new(),
            table_name: table_name.into(),
            open: true,
            n_col: n_col as u32,
        }
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn reads_counter(&self) -> u64 {
        self.reads_counter
    }

    pub fn load_config(&self) -> &IndexConfig {
        &self.config
    }

    /// `begin_write`: no-op marker that a write transaction has started.
    /// Kept as an explicit call, matching the host virtual-table's
    /// `xBegin`, even though this façade has no extra state to allocate for
    /// it beyond what `open` already set up.
    pub fn begin_write(&mut self) -> Fts5Result<()> {
        if !self.open {
            return Err(Fts5Error::Misuse("begin_write on a closed index".into()));
        }
        Ok(())
    }

    /// Write one token. `col < 0` is the delete-tombstone sentinel and
    /// bypasses the column bound check; any other `col` must be
    /// `0..n_col`, matching the host's column-count boundary.
    pub fn write_token(&mut self, term: &[u8], rowid: i64, col: i32, pos: u32) -> Fts5Result<()> {
        if col >= 0 {
            ColumnIndex::new(col as u32, self.n_col)?;
        }
        self.pending.write(term, rowid, col, pos)
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending.total_bytes()
    }

    /// Drain the pending hash into a new level-0 segment, cascading merges
    /// per the configured fan-out.
    pub fn flush(&mut self) -> Fts5Result<()> {
        let drained = self.pending.drain();
        self.structure.flush(drained, self.config.pgsz)
    }

    /// Savepoint: flush dirty state and remember how many segments existed,
    /// so a matching `rollback_to` knows what to discard.
    pub fn savepoint(&mut self, id: i64) -> Fts5Result<()> {
        self.flush()?;
        self.savepoints.push(SavepointMark {
            id,
            segment_count: self.structure.segment_count(),
        });
        Ok(())
    }

    /// Release: true no-op.
    pub fn release(&mut self, _id: i64) -> Fts5Result<()> {
        Ok(())
    }

    /// Rollback-to: discard all segments created since the matching
    /// savepoint and any pending-hash writes accrued after it. Because this
    /// façade flushes eagerly at every savepoint, "discard pending writes"
    /// reduces to "drop the pending hash and truncate segments back to the
    /// remembered count", without needing per-savepoint buffer copies.
    pub fn rollback_to(&mut self, id: i64) -> Fts5Result<()> {
        let pos = self
            .savepoints
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Fts5Error::Misuse(format!("no savepoint {id}")))?;
        let mark_segment_count = self.savepoints[pos].segment_count;
        self.savepoints.truncate(pos + 1);
        self.pending = PendingHash::new();
        self.structure.truncate_to_segment_count(mark_segment_count);
        Ok(())
    }

    /// `rollback` (whole-transaction): discard everything accrued this
    /// transaction — equivalent to a rollback-to the oldest open savepoint,
    /// or a full reset if none is open.
    pub fn rollback(&mut self) -> Fts5Result<()> {
        if let Some(oldest) = self.savepoints.first() {
            let id = oldest.id;
            self.rollback_to(id)?;
            self.savepoints.clear();
        } else {
            self.pending = PendingHash::new();
        }
        Ok(())
    }

    pub fn mark_read(&mut self) {
        self.reads_counter += 1;
    }

    /// Resolve a term's doclist over the union of the live pending hash and
    /// all on-disk segments, merging the two with the pending hash treated
    /// as strictly newer.
    pub fn lookup(&mut self, term: &[u8]) -> Fts5Result<Option<Vec<u8>>> {
        let pending_hit = self
            .pending
            .scan(term)
            .into_iter()
            .find(|(t, _)| t == term)
            .map(|(_, d)| d);
        self.mark_read();
        let structure_hit = self.structure.lookup(term)?;
        match (pending_hit, structure_hit) {
            (None, None) => Ok(None),
            (Some(p), None) => Ok(Some(p)),
            (None, Some(s)) => Ok(Some(s)),
            (Some(p), Some(s)) => {
                let contributions = [(1u64, s.as_slice()), (2u64, p.as_slice())];
                crate::segment::merge::merge_term_doclists(&contributions, true)
            }
        }
    }

    /// `rename`: renames the façade's own table name. The caller (the
    /// storage bridge) is responsible for forwarding the same rename to the
    /// document-store side table, since the façade owns no document-store
    /// handle itself.
    pub fn rename(&mut self, new_name: impl Into<String>) {
        self.table_name = new_name.into();
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// `'delete-all'`: drop every segment and discard any buffered writes.
    pub fn delete_all(&mut self) {
        self.pending = PendingHash::new();
        self.structure.delete_all();
    }

    pub fn structure(&self) -> &StructureRecord {
        &self.structure
    }

    pub fn structure_mut(&mut self) -> &mut StructureRecord {
        &mut self.structure
    }

    pub fn set_option(&mut self, name: &str, value: &str) -> Fts5Result<()> {
        match name {
            "pgsz" => self.config.pgsz = parse_usize(value)?,
            "crisismerge" => self.config.crisismerge = parse_usize(value)?,
            "automerge" => self.config.automerge = parse_usize(value)?,
            "usermerge" => self.config.usermerge = parse_usize(value)?,
            "rank" => self.config.rank = value.to_string(),
            other => return Err(Fts5Error::Error(format!("unknown option: {other}"))),
        }
        Ok(())
    }
}

fn parse_usize(value: &str) -> Fts5Result<usize> {
    value
        .parse()
        .map_err(|_| Fts5Error::Error(format!("invalid integer option value: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_moves_pending_writes_into_a_segment() {
        let mut idx = IndexFacade::open("t", 1, IndexConfig::default());
        idx.begin_write().unwrap();
        idx.write_token(b"quick", 1, 0, 0).unwrap();
        idx.flush().unwrap();
        assert_eq!(idx.structure().segment_count(), 1);
        assert!(idx.lookup(b"quick").unwrap().is_some());
    }

    #[test]
    fn savepoint_then_rollback_to_discards_later_writes() {
        let mut idx = IndexFacade::open("t", 1, IndexConfig::default());
        idx.write_token(b"before", 1, 0, 0).unwrap();
        idx.savepoint(1).unwrap();
        idx.write_token(b"after", 2, 0, 0).unwrap();
        idx.flush().unwrap();
        assert!(idx.lookup(b"after").unwrap().is_some());
        idx.rollback_to(1).unwrap();
        assert!(idx.lookup(b"after").unwrap().is_none());
        assert!(idx.lookup(b"before").unwrap().is_some());
    }

    #[test]
    fn release_does_not_change_state() {
        let mut idx = IndexFacade::open("t", 1, IndexConfig::default());
        idx.write_token(b"term", 1, 0, 0).unwrap();
        let before = idx.pending_bytes();
        idx.release(1).unwrap();
        assert_eq!(idx.pending_bytes(), before);
    }

    #[test]
    fn rename_updates_table_name() {
        let mut idx = IndexFacade::open("t", 1, IndexConfig::default());
        idx.rename("t2");
        assert_eq!(idx.table_name(), "t2");
    }

    #[test]
    fn reads_counter_increments_on_every_lookup() {
        let mut idx = IndexFacade::open("t", 1, IndexConfig::default());
        idx.write_token(b"quick", 1, 0, 0).unwrap();
        assert_eq!(idx.reads_counter(), 0);
        idx.lookup(b"quick").unwrap();
        assert_eq!(idx.reads_counter(), 1);
        idx.flush().unwrap();
        idx.lookup(b"quick").unwrap();
        assert_eq!(idx.reads_counter(), 2);
    }

    #[test]
    fn lookup_merges_pending_and_flushed_generations_of_the_same_term() {
        let mut idx = IndexFacade::open("t", 1, IndexConfig::default());
        idx.write_token(b"fox", 1, 0, 0).unwrap();
        idx.flush().unwrap();
        idx.write_token(b"fox", 2, 0, 0).unwrap();
        let doclist = idx.lookup(b"fox").unwrap().unwrap();
        let rows = crate::segment::doclist_entries(&doclist).unwrap();
        assert_eq!(rows.iter().map(|(r, _)| *r).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn write_token_rejects_column_out_of_range() {
        let mut idx = IndexFacade::open("t", 2, IndexConfig::default());
        idx.write_token(b"quick", 1, 1, 0).unwrap();
        assert!(matches!(idx.write_token(b"quick", 1, 2, 0), Err(Fts5Error::Range(_))));
    }

    #[test]
    fn write_token_allows_negative_delete_sentinel_regardless_of_n_col() {
        let mut idx = IndexFacade::open("t", 1, IndexConfig::default());
        idx.write_token(b"quick", 1, -1, 0).unwrap();
    }
}
