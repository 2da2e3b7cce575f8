//! Storage bridge: row insert/delete/update against a document-store side
//! table, plus the small `%_config`/`%_docsize` side tables.
//!
//! A tokenizer plugin registry is out of scope; what follows is a single
//! concrete sample tokenizer good enough to exercise this module end to
//! end (stop-word filtering is left out: it is a ranking-quality concern
//! of a search-ranking layer, not a property a generic FTS tokenizer
//! needs).

use crate::error::{Fts5Error, Fts5Result};
use crate::index::IndexFacade;
use std::collections::HashMap;

#[cfg(feature = "unicode-normalization")]
use unicode_normalization::UnicodeNormalization;

#[cfg(feature = "unicode-normalization")]
fn is_combining_mark(c: char) -> bool {
    matches!(c,
        '\u{0300}'..='\u{036F}' |
        '\u{1DC0}'..='\u{1DFF}' |
        '\u{20D0}'..='\u{20FF}' |
        '\u{FE20}'..='\u{FE2F}'
    )
}

#[cfg(feature = "unicode-normalization")]
fn normalize(value: &str) -> String {
    value.nfd().filter(|c| !is_combining_mark(*c)).collect::<String>().to_lowercase()
}

#[cfg(not(feature = "unicode-normalization"))]
fn normalize(value: &str) -> String {
    value.to_lowercase()
}

fn is_word_boundary(c: char) -> bool {
    !c.is_alphanumeric()
}

/// Split `text` into normalized tokens, recording each token's index within
/// the column (its "offset").
pub fn tokenize_with_positions(text: &str) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    let mut pos = 0u32;
    for word in text.split(is_word_boundary) {
        if word.is_empty() {
            continue;
        }
        let normalized = normalize(word);
        if normalized.is_empty() {
            continue;
        }
        out.push((normalized, pos));
        pos += 1;
    }
    out
}

/// Token strings only, exposed to rank functions via `RankContext::tokenize`.
pub fn tokenize(text: &str) -> Vec<String> {
    tokenize_with_positions(text).into_iter().map(|(t, _)| t).collect()
}

/// Tokenize every column of a row. Columns are independent, so this is the
/// map phase of an insert's map/reduce split (write-into-the-index is the
/// sequential reduce phase).
#[cfg(feature = "parallel")]
fn tokenize_columns(values: &[String]) -> Vec<Vec<(String, u32)>> {
    use rayon::prelude::*;
    values.par_iter().map(|text| tokenize_with_positions(text)).collect()
}

#[cfg(not(feature = "parallel"))]
fn tokenize_columns(values: &[String]) -> Vec<Vec<(String, u32)>> {
    values.iter().map(|text| tokenize_with_positions(text)).collect()
}

/// One stored row's indexed columns, kept verbatim for non-contentless
/// tables so deletes can re-tokenize without a separate size-only path.
#[derive(Debug, Clone)]
struct ContentRow {
    columns: Vec<String>,
}

/// Per-row per-column token counts, kept for contentless tables (where the
/// row text itself isn't retained) and used by rank functions via
/// `column_total_size`/`column_size` regardless of mode.
#[derive(Debug, Clone)]
struct DocsizeRow {
    sizes: Vec<u32>,
}

/// The `%_content`/`%_docsize`/`%_config` side tables plus the glue that
/// drives `IndexFacade` from row-level operations.
pub struct StorageBridge {
    n_col: usize,
    contentless: bool,
    content: HashMap<i64, ContentRow>,
    docsize: HashMap<i64, DocsizeRow>,
    config: HashMap<String, String>,
    column_total_sizes: Vec<u64>,
    row_count: u64,
}

impl StorageBridge {
    pub fn new(n_col: usize, contentless: bool) -> Self {
        StorageBridge {
            n_col,
            contentless,
            content: HashMap::new(),
            docsize: HashMap::new(),
            config: HashMap::new(),
            column_total_sizes: vec![0; n_col],
            row_count: 0,
        }
    }

    pub fn n_col(&self) -> usize {
        self.n_col
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn column_total_size(&self, col: usize) -> u64 {
        self.column_total_sizes[col]
    }

    pub fn column_size(&self, rowid: i64, col: usize) -> Option<u32> {
        self.docsize.get(&rowid).map(|d| d.sizes[col])
    }

    pub fn column_text(&self, rowid: i64, col: usize) -> Option<&str> {
        self.content.get(&rowid).map(|c| c.columns[col].as_str())
    }

    pub fn config_get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    pub fn config_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    fn check_column_count(&self, values: &[String]) -> Fts5Result<()> {
        if values.len() != self.n_col {
            return Err(Fts5Error::Misuse(format!(
                "expected {} columns, got {}",
                self.n_col,
                values.len()
            )));
        }
        Ok(())
    }

    /// Insert a new row: store content (unless contentless), tokenize each
    /// column once, and write every token to the index.
    ///
    /// Tokenization (map phase, independent per column) runs in parallel
    /// under the `parallel` feature; the reduce phase — writing tokens into
    /// the single-writer pending hash — stays sequential.
    pub fn insert(&mut self, index: &mut IndexFacade, rowid: i64, values: Vec<String>) -> Fts5Result<()> {
        self.check_column_count(&values)?;
        let per_column_tokens = tokenize_columns(&values);
        let mut sizes = vec![0u32; self.n_col];
        for (col, tokens) in per_column_tokens.into_iter().enumerate() {
            for (term, pos) in tokens {
                index.write_token(term.as_bytes(), rowid, col as i32, pos)?;
                sizes[col] += 1;
            }
            self.column_total_sizes[col] += u64::from(sizes[col]);
        }
        self.docsize.insert(rowid, DocsizeRow { sizes });
        if !self.contentless {
            self.content.insert(rowid, ContentRow { columns: values });
        }
        self.row_count += 1;
        Ok(())
    }

    /// Delete a row: read content back (or, for a contentless table, the
    /// caller-supplied `values` reproduced from the statement's bound
    /// `'delete', rowid, val1, …` parameters), re-tokenize, and write
    /// delete sentinels (`col = -1`) for every (term, rowid).
    pub fn delete(&mut self, index: &mut IndexFacade, rowid: i64, values: Option<Vec<String>>) -> Fts5Result<()> {
        let columns = if self.contentless {
            values.ok_or_else(|| {
                Fts5Error::Misuse("contentless delete requires reproduced column values".into())
            })?
        } else {
            self.content
                .get(&rowid)
                .map(|c| c.columns.clone())
                .ok_or_else(|| Fts5Error::Misuse(format!("no such rowid: {rowid}")))?
        };
        self.check_column_count(&columns)?;

        let sizes = self.docsize.remove(&rowid);
        for (col, text) in columns.iter().enumerate() {
            for (term, _) in tokenize_with_positions(text) {
                index.write_token(term.as_bytes(), rowid, -1, 0)?;
            }
            if let Some(sizes) = &sizes {
                self.column_total_sizes[col] = self.column_total_sizes[col].saturating_sub(u64::from(sizes.sizes[col]));
            }
        }
        self.content.remove(&rowid);
        self.row_count = self.row_count.saturating_sub(1);
        Ok(())
    }

    /// Update: a delete of the old row's tokens followed by an insert under
    /// the same or a new rowid, matching an `update(old_rowid, new_values…)`
    /// host operation.
    pub fn update(
        &mut self,
        index: &mut IndexFacade,
        old_rowid: i64,
        new_rowid: i64,
        new_values: Vec<String>,
    ) -> Fts5Result<()> {
        self.delete(index, old_rowid, None)?;
        self.insert(index, new_rowid, new_values)
    }

    /// `'rebuild'`: re-tokenize every stored row's content. Errors on a
    /// contentless table, which retains no text to re-tokenize from.
    pub fn rebuild(&mut self, index: &mut IndexFacade) -> Fts5Result<()> {
        if self.contentless {
            return Err(Fts5Error::Misuse("'rebuild' is unsupported on a contentless table".into()));
        }
        index.delete_all();
        self.column_total_sizes = vec![0; self.n_col];
        let rows: Vec<(i64, Vec<String>)> = self
            .content
            .iter()
            .map(|(rowid, row)| (*rowid, row.columns.clone()))
            .collect();
        for (rowid, columns) in rows {
            let mut sizes = vec![0u32; self.n_col];
            for (col, text) in columns.iter().enumerate() {
                for (term, pos) in tokenize_with_positions(text) {
                    index.write_token(term.as_bytes(), rowid, col as i32, pos)?;
                    sizes[col] += 1;
                }
                self.column_total_sizes[col] += u64::from(sizes[col]);
            }
            self.docsize.insert(rowid, DocsizeRow { sizes });
        }
        Ok(())
    }

    /// `'delete-all'`: drop every row and every segment. Restricted to
    /// contentless tables — a contentful table has no way to reconstruct
    /// its `%_content` rows afterwards.
    pub fn delete_all(&mut self, index: &mut IndexFacade) -> Fts5Result<()> {
        if !self.contentless {
            return Err(Fts5Error::Misuse("'delete-all' is unsupported on a contentful table".into()));
        }
        self.content.clear();
        self.docsize.clear();
        self.column_total_sizes = vec![0; self.n_col];
        self.row_count = 0;
        index.delete_all();
        Ok(())
    }

    /// `rename`: propagate to both the index façade and this bridge's own
    /// side-table identity, forwarding rather than silently no-op'ing.
    pub fn rename(&mut self, index: &mut IndexFacade, new_name: impl Into<String>) {
        index.rename(new_name);
    }
}
