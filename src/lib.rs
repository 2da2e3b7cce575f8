//! An embedded FTS5-style full-text search inverted-index engine.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐  ┌───────────┐  ┌────────────┐
//! │ varint.rs │  │ buffer.rs │  │ poslist.rs │   wire codec
//! └─────┬─────┘  └─────┬─────┘  └─────┬──────┘
//!       └──────────────┼──────────────┘
//!                      ▼
//!               ┌─────────────┐
//!               │  pending.rs │                  in-memory write buffer
//!               └──────┬──────┘
//!                      ▼
//!               ┌─────────────┐
//!               │  segment/   │                  immutable on-disk-shaped segments
//!               │ mod/page/   │                      + tiered merge
//!               │merge/structure│
//!               └──────┬──────┘
//!                      ▼
//!                ┌───────────┐
//!                │ index.rs  │                    savepoint/rollback façade
//!                └─────┬─────┘
//!                      ▼
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//!    ┌───────────┐           ┌───────────┐
//!    │  expr.rs  │           │ storage.rs│
//!    │ AND/OR/NOT│           │  insert/  │
//!    │ NEAR/phrase│          │ delete/   │
//!    └─────┬─────┘           │  update   │
//!          ▼                 └───────────┘
//!    ┌───────────┐
//!    │ cursor.rs │                                query plans, rank invocation
//!    └───────────┘
//! ```
//!
//! `error.rs`, `types.rs`, and `contracts.rs` are used throughout: the
//! error enum and `Fts5Result` alias, the shared `Rowid`/`Direction`/
//! `ColumnIndex` types, and `debug_assert!`-based invariant checks that
//! compile to nothing in release builds.

pub mod buffer;
pub mod contracts;
pub mod cursor;
pub mod error;
pub mod expr;
pub mod index;
pub mod pending;
pub mod poslist;
pub mod segment;
pub mod storage;
pub mod types;
pub mod varint;

pub use cursor::{best_index_cost, ConstraintInfo, Cursor, PlanKind, RankContext};
pub use error::{Fts5Error, Fts5Result};
pub use expr::{Expr, ExprNode, Phrase, TermSource};
pub use index::{IndexConfig, IndexFacade};
pub use storage::StorageBridge;
pub use types::{ColumnIndex, Direction, Rowid};

#[cfg(test)]
mod tests {
    //! End-to-end scenarios exercising the full write/query/merge/delete-all path.

    use super::*;

    struct Table {
        index: IndexFacade,
        storage: StorageBridge,
    }

    impl Table {
        fn new(n_col: usize, contentless: bool) -> Self {
            Table {
                index: IndexFacade::open("t", n_col, IndexConfig::default()),
                storage: StorageBridge::new(n_col, contentless),
            }
        }

        fn insert(&mut self, rowid: Rowid, columns: &[&str]) {
            self.storage
                .insert(&mut self.index, rowid, columns.iter().map(|s| s.to_string()).collect())
                .unwrap();
        }

        fn query(&mut self, node: &ExprNode, dir: Direction) -> Vec<Rowid> {
            let mut cursor = Cursor::new(PlanKind::Match(dir));
            cursor.filter(&mut self.index, Some(node)).unwrap();
            let mut rows = Vec::new();
            while !cursor.eof() {
                rows.push(cursor.rowid());
                cursor.next();
            }
            rows
        }
    }

    fn phrase(term: &str) -> ExprNode {
        ExprNode::Phrase(Phrase::new(vec![term.as_bytes().to_vec()]).unwrap())
    }

    #[test]
    fn scenario_1_single_term_match() {
        let mut t = Table::new(1, false);
        t.insert(1, &["the quick brown fox"]);
        assert_eq!(t.query(&phrase("quick"), Direction::Ascending), vec![1]);
    }

    #[test]
    fn scenario_2_ordering_asc_and_desc() {
        let mut t = Table::new(1, false);
        t.insert(2, &["the quick brown fox"]);
        t.insert(3, &["slow brown dog"]);
        assert_eq!(t.query(&phrase("brown"), Direction::Ascending), vec![2, 3]);
        assert_eq!(t.query(&phrase("brown"), Direction::Descending), vec![3, 2]);
    }

    #[test]
    fn scenario_3_and_or_not() {
        let mut t = Table::new(1, false);
        t.insert(2, &["the quick brown fox"]);
        t.insert(3, &["slow brown dog"]);

        let and_node = ExprNode::And(Box::new(phrase("quick")), Box::new(phrase("fox")));
        assert_eq!(t.query(&and_node, Direction::Ascending), vec![2]);

        let or_node = ExprNode::Or(Box::new(phrase("quick")), Box::new(phrase("dog")));
        assert_eq!(t.query(&or_node, Direction::Ascending), vec![2, 3]);

        let not_node = ExprNode::Not(Box::new(phrase("brown")), Box::new(phrase("fox")));
        assert_eq!(t.query(&not_node, Direction::Ascending), vec![3]);
    }

    #[test]
    fn scenario_4_phrase_and_near() {
        let mut t = Table::new(1, false);
        t.insert(2, &["the quick brown fox"]);
        t.insert(3, &["slow brown dog"]);

        let phrase_node = ExprNode::Phrase(
            Phrase::new(vec![b"brown".to_vec(), b"fox".to_vec()]).unwrap(),
        );
        assert_eq!(t.query(&phrase_node, Direction::Ascending), vec![2]);

        let near_node = ExprNode::Near(
            vec![
                Phrase::new(vec![b"quick".to_vec()]).unwrap(),
                Phrase::new(vec![b"dog".to_vec()]).unwrap(),
            ],
            5,
        );
        assert!(t.query(&near_node, Direction::Ascending).is_empty());
    }

    #[test]
    fn scenario_5_optimize_collapses_segments_without_changing_results() {
        let mut t = Table::new(1, false);
        for i in 0..1000 {
            t.insert(i + 1, &[&format!("row{i} quick brown fox")]);
        }
        t.index.flush().unwrap();
        let before = t.query(&phrase("quick"), Direction::Ascending);
        assert_eq!(before.len(), 1000);

        t.index.structure_mut().optimize(t.index.load_config().pgsz).unwrap();
        assert_eq!(t.index.structure().segment_count(), 1);

        let after = t.query(&phrase("quick"), Direction::Ascending);
        assert_eq!(before, after);
    }

    #[test]
    fn scenario_6_delete_all_on_contentless_table() {
        let mut t = Table::new(1, true);
        t.insert(1, &["the quick brown fox"]);
        t.index.flush().unwrap();
        t.storage.delete_all(&mut t.index).unwrap();

        assert!(t.query(&phrase("quick"), Direction::Ascending).is_empty());

        let mut special = Cursor::new(PlanKind::Special("reads".to_string()));
        special.filter(&mut t.index, None).unwrap();
        let reads = t.index.reads_counter();
        let _ = special;
        assert!(reads < u64::MAX);
    }
}
