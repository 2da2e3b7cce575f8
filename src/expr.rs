//! Expression engine: phrase/boolean/NEAR query evaluation over posting
//! lists.
//!
//! AND/OR/NOT/NEAR semantics generalize a multi-source rowid-merge (each
//! operand contributes a sorted rowid stream, merged by key) to merging by
//! rowid over phrase match sets.
//!
//! Simplification versus a fully streaming port: rather than lazily
//! advancing raw posting-list cursors term by term, each node materializes
//! its full ascending-rowid match list once when built, then `first`/`next`
//! walk that materialized list forwards or backwards. This keeps the same
//! external iterator contract (`first(direction)`, `next()`, `eof()`,
//! `rowid()`, `poslist(phrase_index)`) while trading the hot-path zero-copy
//! streaming for a simpler, still-correct batch resolution — recorded as a
//! scope decision in DESIGN.md.

use crate::error::{Fts5Error, Fts5Result};
use crate::poslist::{Position, PoslistReader};
use crate::segment::doclist_entries;
use crate::types::{Direction, Rowid};
use std::collections::HashMap;

/// Anything that can answer "what is the doclist for this term", over
/// whatever live+on-disk union the caller maintains. `IndexFacade::lookup`
/// is the canonical implementation.
pub trait TermSource {
    fn resolve(&mut self, term: &[u8]) -> Fts5Result<Vec<u8>>;
}

impl TermSource for crate::index::IndexFacade {
    fn resolve(&mut self, term: &[u8]) -> Fts5Result<Vec<u8>> {
        Ok(self.lookup(term)?.unwrap_or_default())
    }
}

/// An ordered list of terms, each occupying consecutive token offsets
/// within one column, with an optional column restriction.
#[derive(Debug, Clone)]
pub struct Phrase {
    pub terms: Vec<Vec<u8>>,
    pub column: Option<u32>,
}

impl Phrase {
    pub fn new(terms: Vec<Vec<u8>>) -> Fts5Result<Self> {
        if terms.is_empty() {
            return Err(Fts5Error::Malformed("phrase has no terms".into()));
        }
        Ok(Phrase { terms, column: None })
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }
}

/// The query tree.
pub enum ExprNode {
    Phrase(Phrase),
    And(Box<ExprNode>, Box<ExprNode>),
    Or(Box<ExprNode>, Box<ExprNode>),
    Not(Box<ExprNode>, Box<ExprNode>),
    Near(Vec<Phrase>, u32),
}

impl ExprNode {
    fn phrase_count(&self) -> usize {
        match self {
            ExprNode::Phrase(_) => 1,
            ExprNode::And(l, r) | ExprNode::Or(l, r) => l.phrase_count() + r.phrase_count(),
            ExprNode::Not(l, _) => l.phrase_count(),
            ExprNode::Near(phrases, _) => phrases.len(),
        }
    }
}

struct MatchRow {
    rowid: Rowid,
    poslists: Vec<Vec<u8>>,
}

fn decode_positions(poslist: &[u8]) -> Fts5Result<Vec<Position>> {
    let mut r = PoslistReader::new(poslist);
    let mut out = Vec::new();
    while let Some(p) = r.advance()? {
        out.push(p);
    }
    Ok(out)
}

/// Resolve a single phrase against `source`, returning ascending-rowid
/// matches. A phrase matches a rowid when there exists a starting position
/// `p0` for the first term such that term `i` occurs at `(p0.col, p0.off +
/// i)` for every `i`, honoring an optional column restriction on `p0`.
fn resolve_phrase(source: &mut dyn TermSource, phrase: &Phrase) -> Fts5Result<Vec<MatchRow>> {
    let mut per_term_rows: Vec<HashMap<Rowid, (Vec<u8>, Vec<Position>)>> = Vec::new();
    for term in &phrase.terms {
        let doclist = source.resolve(term)?;
        let mut map = HashMap::new();
        for (rowid, poslist) in doclist_entries(&doclist)? {
            if poslist.is_empty() {
                continue;
            }
            let positions = decode_positions(&poslist)?;
            map.insert(rowid, (poslist, positions));
        }
        per_term_rows.push(map);
    }

    let mut rowids: Vec<Rowid> = per_term_rows[0].keys().copied().collect();
    for map in &per_term_rows[1..] {
        rowids.retain(|r| map.contains_key(r));
    }
    rowids.sort_unstable();

    let mut out = Vec::new();
    for rowid in rowids {
        let (first_bytes, first_positions) = &per_term_rows[0][&rowid];
        let mut matched_bytes = None;
        for p0 in first_positions {
            if let Some(col) = phrase.column {
                if p0.col != col {
                    continue;
                }
            }
            let mut ok = true;
            for (i, map) in per_term_rows.iter().enumerate().skip(1) {
                let (_, positions) = &map[&rowid];
                let want = Position {
                    col: p0.col,
                    off: p0.off + i as u32,
                };
                if !positions.contains(&want) {
                    ok = false;
                    break;
                }
            }
            if ok {
                matched_bytes = Some(first_bytes.clone());
                break;
            }
        }
        if let Some(bytes) = matched_bytes {
            out.push(MatchRow {
                rowid,
                poslists: vec![bytes],
            });
        }
    }
    Ok(out)
}

fn resolve_node(source: &mut dyn TermSource, node: &ExprNode) -> Fts5Result<Vec<MatchRow>> {
    match node {
        ExprNode::Phrase(p) => resolve_phrase(source, p),
        ExprNode::And(l, r) => {
            let left = resolve_node(source, l)?;
            let right = resolve_node(source, r)?;
            let right_map: HashMap<Rowid, usize> =
                right.iter().enumerate().map(|(i, row)| (row.rowid, i)).collect();
            let mut out = Vec::new();
            for lrow in left {
                if let Some(&ri) = right_map.get(&lrow.rowid) {
                    let mut poslists = lrow.poslists;
                    poslists.extend(right[ri].poslists.iter().cloned());
                    out.push(MatchRow {
                        rowid: lrow.rowid,
                        poslists,
                    });
                }
            }
            Ok(out)
        }
        ExprNode::Or(l, r) => {
            let left = resolve_node(source, l)?;
            let right = resolve_node(source, r)?;
            let l_count = l.phrase_count();
            let r_count = r.phrase_count();
            let mut by_rowid: std::collections::BTreeMap<Rowid, Vec<Vec<u8>>> = std::collections::BTreeMap::new();
            for row in left {
                by_rowid.insert(row.rowid, {
                    let mut v = row.poslists;
                    v.resize(l_count + r_count, Vec::new());
                    v
                });
            }
            for row in right {
                let entry = by_rowid
                    .entry(row.rowid)
                    .or_insert_with(|| vec![Vec::new(); l_count + r_count]);
                for (i, p) in row.poslists.into_iter().enumerate() {
                    entry[l_count + i] = p;
                }
            }
            Ok(by_rowid
                .into_iter()
                .map(|(rowid, poslists)| MatchRow { rowid, poslists })
                .collect())
        }
        ExprNode::Not(l, r) => {
            let left = resolve_node(source, l)?;
            let right = resolve_node(source, r)?;
            let excluded: std::collections::HashSet<Rowid> = right.iter().map(|row| row.rowid).collect();
            Ok(left.into_iter().filter(|row| !excluded.contains(&row.rowid)).collect())
        }
        ExprNode::Near(phrases, window) => {
            let mut per_phrase = Vec::new();
            for phrase in phrases {
                per_phrase.push(resolve_phrase(source, phrase)?);
            }
            let mut common: Vec<Rowid> = per_phrase[0].iter().map(|r| r.rowid).collect();
            for rows in &per_phrase[1..] {
                let set: std::collections::HashSet<Rowid> = rows.iter().map(|r| r.rowid).collect();
                common.retain(|r| set.contains(r));
            }
            common.sort_unstable();

            let mut out = Vec::new();
            for rowid in common {
                let anchors: Vec<u32> = per_phrase
                    .iter()
                    .map(|rows| {
                        let row = rows.iter().find(|r| r.rowid == rowid).unwrap();
                        decode_positions(&row.poslists[0]).unwrap_or_default()
                    })
                    .map(|positions| positions.first().map(|p| p.off).unwrap_or(0))
                    .collect();
                let min = *anchors.iter().min().unwrap();
                let max = *anchors.iter().max().unwrap();
                if max - min <= *window {
                    let poslists = per_phrase
                        .iter()
                        .map(|rows| rows.iter().find(|r| r.rowid == rowid).unwrap().poslists[0].clone())
                        .collect();
                    out.push(MatchRow { rowid, poslists });
                }
            }
            Ok(out)
        }
    }
}

/// A resolved, iterable expression. Built once via `Expr::build`; `first`
/// must be called before `rowid`/`poslist` are meaningful.
pub struct Expr {
    rows: Vec<MatchRow>,
    current: Option<usize>,
    dir: Direction,
}

impl Expr {
    pub fn build(source: &mut dyn TermSource, node: &ExprNode) -> Fts5Result<Self> {
        let rows = resolve_node(source, node)?;
        Ok(Expr {
            rows,
            current: None,
            dir: Direction::Ascending,
        })
    }

    pub fn first(&mut self, dir: Direction) {
        self.dir = dir;
        self.current = match dir {
            Direction::Ascending => {
                if self.rows.is_empty() {
                    None
                } else {
                    Some(0)
                }
            }
            Direction::Descending => {
                if self.rows.is_empty() {
                    None
                } else {
                    Some(self.rows.len() - 1)
                }
            }
        };
    }

    pub fn next(&mut self) {
        self.current = match (self.current, self.dir) {
            (Some(i), Direction::Ascending) if i + 1 < self.rows.len() => Some(i + 1),
            (Some(i), Direction::Descending) if i > 0 => Some(i - 1),
            _ => None,
        };
    }

    pub fn eof(&self) -> bool {
        self.current.is_none()
    }

    pub fn rowid(&self) -> Rowid {
        self.rows[self.current.expect("rowid() called at eof")].rowid
    }

    pub fn poslist(&self, phrase_index: usize) -> &[u8] {
        &self.rows[self.current.expect("poslist() called at eof")].poslists[phrase_index]
    }

    /// All phrase poslists for the current row, for callers (the rank
    /// invocation context) that need the whole set rather than one index
    /// at a time.
    pub fn current_poslists(&self) -> &[Vec<u8>] {
        &self.rows[self.current.expect("current_poslists() called at eof")].poslists
    }

    pub fn match_count(&self) -> usize {
        self.rows.len()
    }

    /// Random access by absolute ascending-rowid position, for
    /// `SortedMatch` plans that reorder the match set by a rank value
    /// rather than walking it rowid-ascending/descending.
    pub fn rowid_at(&self, index: usize) -> Rowid {
        self.rows[index].rowid
    }

    pub fn poslists_at(&self, index: usize) -> &[Vec<u8>] {
        &self.rows[index].poslists
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexConfig, IndexFacade};

    fn indexed(docs: &[(i64, &str)]) -> IndexFacade {
        let mut idx = IndexFacade::open("t", 1, IndexConfig::default());
        for (rowid, text) in docs {
            for (off, token) in text.split_whitespace().enumerate() {
                idx.write_token(token.as_bytes(), *rowid, 0, off as u32).unwrap();
            }
        }
        idx
    }

    #[test]
    fn single_term_match() {
        let mut idx = indexed(&[(1, "the quick brown fox")]);
        let node = ExprNode::Phrase(Phrase::new(vec![b"quick".to_vec()]).unwrap());
        let mut e = Expr::build(&mut idx, &node).unwrap();
        e.first(Direction::Ascending);
        assert_eq!(e.rowid(), 1);
        e.next();
        assert!(e.eof());
    }

    #[test]
    fn ordering_asc_and_desc() {
        let mut idx = indexed(&[(2, "the quick brown fox"), (3, "slow brown dog")]);
        let node = ExprNode::Phrase(Phrase::new(vec![b"brown".to_vec()]).unwrap());
        let mut e = Expr::build(&mut idx, &node).unwrap();
        e.first(Direction::Ascending);
        let mut asc = Vec::new();
        while !e.eof() {
            asc.push(e.rowid());
            e.next();
        }
        assert_eq!(asc, vec![2, 3]);

        e.first(Direction::Descending);
        let mut desc = Vec::new();
        while !e.eof() {
            desc.push(e.rowid());
            e.next();
        }
        assert_eq!(desc, vec![3, 2]);
    }

    #[test]
    fn and_or_not() {
        let mut idx = indexed(&[(2, "the quick brown fox"), (3, "slow brown dog")]);
        let quick = || ExprNode::Phrase(Phrase::new(vec![b"quick".to_vec()]).unwrap());
        let fox = || ExprNode::Phrase(Phrase::new(vec![b"fox".to_vec()]).unwrap());
        let dog = || ExprNode::Phrase(Phrase::new(vec![b"dog".to_vec()]).unwrap());
        let brown = || ExprNode::Phrase(Phrase::new(vec![b"brown".to_vec()]).unwrap());

        let and_node = ExprNode::And(Box::new(quick()), Box::new(fox()));
        let mut e = Expr::build(&mut idx, &and_node).unwrap();
        e.first(Direction::Ascending);
        assert_eq!(e.rowid(), 2);
        e.next();
        assert!(e.eof());

        let or_node = ExprNode::Or(Box::new(quick()), Box::new(dog()));
        let mut e = Expr::build(&mut idx, &or_node).unwrap();
        e.first(Direction::Ascending);
        let mut rows = Vec::new();
        while !e.eof() {
            rows.push(e.rowid());
            e.next();
        }
        assert_eq!(rows, vec![2, 3]);

        let not_node = ExprNode::Not(Box::new(brown()), Box::new(fox()));
        let mut e = Expr::build(&mut idx, &not_node).unwrap();
        e.first(Direction::Ascending);
        assert_eq!(e.rowid(), 3);
        e.next();
        assert!(e.eof());
    }

    #[test]
    fn phrase_match() {
        let mut idx = indexed(&[(2, "the quick brown fox"), (3, "slow brown dog")]);
        let phrase = ExprNode::Phrase(Phrase::new(vec![b"brown".to_vec(), b"fox".to_vec()]).unwrap());
        let mut e = Expr::build(&mut idx, &phrase).unwrap();
        e.first(Direction::Ascending);
        assert_eq!(e.rowid(), 2);
        e.next();
        assert!(e.eof());
    }

    #[test]
    fn near_with_no_qualifying_pair_is_empty() {
        let mut idx = indexed(&[(2, "the quick brown fox"), (3, "slow brown dog")]);
        let near = ExprNode::Near(
            vec![
                Phrase::new(vec![b"quick".to_vec()]).unwrap(),
                Phrase::new(vec![b"dog".to_vec()]).unwrap(),
            ],
            5,
        );
        let mut e = Expr::build(&mut idx, &near).unwrap();
        e.first(Direction::Ascending);
        assert!(e.eof());
    }

    #[test]
    fn near_within_window_matches() {
        let mut idx = indexed(&[(1, "quick brown slow lazy dog")]);
        let near = ExprNode::Near(
            vec![
                Phrase::new(vec![b"quick".to_vec()]).unwrap(),
                Phrase::new(vec![b"dog".to_vec()]).unwrap(),
            ],
            5,
        );
        let mut e = Expr::build(&mut idx, &near).unwrap();
        e.first(Direction::Ascending);
        assert_eq!(e.rowid(), 1);
    }
}
