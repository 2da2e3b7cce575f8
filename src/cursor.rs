//! Cursor / query plan.
//!
//! The rank invocation context's shape — a small struct handed to a user
//! callback exposing row/column/poslist accessors plus a keyed auxdata
//! slot — follows the general "context object passed to a user callback"
//! idiom. Only the API surface of rank-function invocation is implemented;
//! rank-function bodies (bm25, snippet, etc.) are a caller concern.

use crate::error::Fts5Result;
use crate::expr::{Expr, ExprNode, TermSource};
use crate::poslist::{Position, PoslistReader};
use crate::types::{Direction, Rowid};
use std::any::Any;
use std::collections::HashMap;

/// Constraints a host's query planner observed on `best_index`, abstracted
/// from the underlying `sqlite3_index_info` shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintInfo {
    pub has_match: bool,
    /// A MATCH constraint bound to a non-literal (e.g. a correlated
    /// subquery) is "unusable" and must never be chosen.
    pub match_usable: bool,
    pub rowid_equality: bool,
    /// 0, 1, or 2 — how many of `rowid > ?` / `rowid < ?` are present.
    pub rowid_range_bounds: u8,
}

/// The fixed best-index cost table: how expensive each plan kind is
/// relative to the constraints a host's query planner observed.
pub fn best_index_cost(info: &ConstraintInfo) -> f64 {
    if info.has_match && !info.match_usable {
        return 1e50;
    }
    if info.has_match && info.rowid_range_bounds >= 2 {
        return 500.0;
    }
    if info.has_match && info.rowid_equality {
        return 100.0;
    }
    if info.has_match {
        return 1000.0;
    }
    if info.rowid_equality {
        return 10.0;
    }
    1_000_000.0
}

/// The plan kinds a query planner can choose between.
pub enum PlanKind {
    Scan(Direction),
    Rowid(Rowid),
    Match(Direction),
    SortedMatch,
    Special(String),
}

struct AuxSlot {
    value: Box<dyn Any>,
}

/// Context handed to a rank function invocation.
pub struct RankContext<'a> {
    rowid: Rowid,
    phrase_poslists: &'a [Vec<u8>],
    column_texts: &'a [String],
    column_total_sizes: &'a [u64],
    row_count: u64,
    auxdata: &'a mut HashMap<String, AuxSlot>,
    function_name: &'a str,
}

impl<'a> RankContext<'a> {
    pub fn rowid(&self) -> Rowid {
        self.rowid
    }

    pub fn column_text(&self, col: usize) -> &str {
        &self.column_texts[col]
    }

    pub fn column_size(&self, col: usize) -> u32 {
        self.column_texts[col].split_whitespace().count() as u32
    }

    pub fn column_total_size(&self, col: usize) -> u64 {
        self.column_total_sizes[col]
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn phrase_count(&self) -> usize {
        self.phrase_poslists.len()
    }

    pub fn poslist(&self, phrase: usize) -> &[u8] {
        &self.phrase_poslists[phrase]
    }

    pub fn inst_count(&self, phrase: usize) -> Fts5Result<usize> {
        let mut r = PoslistReader::new(self.poslist(phrase));
        let mut n = 0;
        while r.advance()?.is_some() {
            n += 1;
        }
        Ok(n)
    }

    pub fn inst(&self, phrase: usize, index: usize) -> Fts5Result<Option<Position>> {
        let mut r = PoslistReader::new(self.poslist(phrase));
        let mut i = 0;
        while let Some(p) = r.advance()? {
            if i == index {
                return Ok(Some(p));
            }
            i += 1;
        }
        Ok(None)
    }

    pub fn query_phrase(&self, phrase: usize) -> PoslistReader<'a> {
        PoslistReader::new(self.phrase_poslists[phrase].as_slice())
    }

    /// Auxdata is keyed by the executing function's identity so two rank
    /// functions invoked on the same row never collide.
    pub fn set_auxdata(&mut self, value: Box<dyn Any>) {
        self.auxdata
            .insert(self.function_name.to_string(), AuxSlot { value });
    }

    pub fn get_auxdata(&self) -> Option<&(dyn Any)> {
        self.auxdata.get(self.function_name).map(|s| s.value.as_ref())
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        crate::storage::tokenize(text)
    }
}

/// Per-row lazy state, invalidated on every advance: content seek,
/// docsize lookup, instance array and position-list blob all become lazy
/// again.
#[derive(Default)]
struct RowCache {
    content: Option<Vec<String>>,
}

pub struct Cursor {
    plan: PlanKind,
    expr: Option<Expr>,
    sorted_order: Option<Vec<usize>>,
    sorted_pos: Option<usize>,
    reseek_required: bool,
    row_cache: RowCache,
    rank_fn_name: Option<String>,
    auxdata: HashMap<String, AuxSlot>,
}

impl Cursor {
    pub fn new(plan: PlanKind) -> Self {
        Cursor {
            plan,
            expr: None,
            sorted_order: None,
            sorted_pos: None,
            reseek_required: false,
            row_cache: RowCache::default(),
            rank_fn_name: None,
            auxdata: HashMap::new(),
        }
    }

    /// `filter(plan, args)`: resolve the expression (if any) against
    /// `source`, taking a snapshot of the segment list at filter time — a
    /// later write does not move this cursor underneath it.
    pub fn filter(&mut self, source: &mut dyn TermSource, node: Option<&ExprNode>) -> Fts5Result<()> {
        self.expr = match (node, &self.plan) {
            (Some(n), PlanKind::Match(_) | PlanKind::SortedMatch) => Some(Expr::build(source, n)?),
            _ => None,
        };
        self.reseek_required = false;
        self.row_cache = RowCache::default();
        match &self.plan {
            PlanKind::Match(dir) => {
                if let Some(e) = &mut self.expr {
                    e.first(*dir);
                }
            }
            PlanKind::SortedMatch => {
                if let Some(e) = &mut self.expr {
                    e.first(Direction::Ascending);
                }
                self.sorted_order = None;
                self.sorted_pos = None;
            }
            _ => {}
        }
        Ok(())
    }

    /// Populate `sorted_order` from a caller-supplied per-row rank, turning
    /// the plan into a `SortedMatch` auxiliary cursor over (rowid, rank).
    /// `rank_of` is called once per match, by absolute ascending-rowid
    /// position, and the plan is then walked in rank order via that index
    /// rather than via `Expr::next`.
    pub fn sort_by_rank(&mut self, mut rank_of: impl FnMut(Rowid) -> f64) -> Fts5Result<()> {
        let expr = self.expr.as_ref().expect("sort_by_rank requires a Match expression");
        let mut scored: Vec<(usize, f64)> = (0..expr.match_count())
            .map(|i| (i, rank_of(expr.rowid_at(i))))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        self.sorted_order = Some(scored.into_iter().map(|(idx, _)| idx).collect());
        self.sorted_pos = Some(0);
        Ok(())
    }

    pub fn eof(&self) -> bool {
        match &self.plan {
            PlanKind::Match(_) => self.expr.as_ref().map_or(true, Expr::eof),
            PlanKind::SortedMatch => self
                .sorted_order
                .as_ref()
                .zip(self.sorted_pos)
                .map_or(true, |(order, pos)| pos >= order.len()),
            PlanKind::Scan(_) | PlanKind::Rowid(_) | PlanKind::Special(_) => false,
        }
    }

    pub fn next(&mut self) {
        self.row_cache = RowCache::default();
        match &mut self.plan {
            PlanKind::Match(_) => {
                if let Some(e) = &mut self.expr {
                    e.next();
                }
            }
            PlanKind::SortedMatch => {
                if let Some(pos) = &mut self.sorted_pos {
                    *pos += 1;
                }
            }
            _ => {}
        }
        if self.reseek_required {
            self.reseek_required = false;
        }
    }

    pub fn rowid(&self) -> Rowid {
        match &self.plan {
            PlanKind::Match(_) => self.expr.as_ref().expect("filter must run first").rowid(),
            PlanKind::SortedMatch => {
                let index = self.sorted_index();
                self.expr.as_ref().unwrap().rowid_at(index)
            }
            PlanKind::Rowid(r) => *r,
            _ => 0,
        }
    }

    fn sorted_index(&self) -> usize {
        let order = self.sorted_order.as_ref().expect("sort_by_rank must run first");
        let pos = self.sorted_pos.expect("sort_by_rank must run first");
        order[pos]
    }

    /// Mark that a write committed while this cursor was open, requiring a
    /// reseek before the next row is trusted.
    pub fn mark_write_committed(&mut self) {
        self.reseek_required = true;
    }

    pub fn reseek_required(&self) -> bool {
        self.reseek_required
    }

    /// Resolve (and cache) the configured rank function's name once per
    /// cursor lifetime.
    pub fn resolve_rank_function(&mut self, name: &str) -> &str {
        self.rank_fn_name.get_or_insert_with(|| name.to_string())
    }

    /// Lazily fetched column text for the current row, invalidated on every
    /// `next()` and `filter()` call. Callers (the storage bridge's
    /// `xColumn` implementation) populate it with `cache_content` once per
    /// row rather than re-seeking the document store on every access.
    pub fn cached_content(&self) -> Option<&[String]> {
        self.row_cache.content.as_deref()
    }

    pub fn cache_content(&mut self, columns: Vec<String>) {
        self.row_cache.content = Some(columns);
    }

    pub fn rank_context<'a>(
        &'a mut self,
        column_texts: &'a [String],
        column_total_sizes: &'a [u64],
        row_count: u64,
    ) -> RankContext<'a> {
        let rowid = self.rowid();
        let phrase_poslists: &'a [Vec<u8>] = match (&self.plan, &self.expr) {
            (PlanKind::SortedMatch, Some(e)) => e.poslists_at(self.sorted_index()),
            (_, Some(e)) => e.current_poslists(),
            (_, None) => &[],
        };
        let function_name = self.rank_fn_name.get_or_insert_with(|| "bm25".to_string());
        RankContext {
            rowid,
            phrase_poslists,
            column_texts,
            column_total_sizes,
            row_count,
            auxdata: &mut self.auxdata,
            function_name,
        }
    }
}
