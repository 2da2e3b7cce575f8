//! Runtime contracts: `debug_assert!`-gated invariant checks, zero-cost in
//! release builds. Each invariant gets its own `#[inline]` function with a
//! descriptive, value-carrying panic message.

/// Terms within a single segment, or a single drained batch, are strictly
/// increasing.
#[inline]
pub fn check_terms_strictly_increasing(terms: &[Vec<u8>]) {
    debug_assert!(
        terms.windows(2).all(|w| w[0] < w[1]),
        "terms are not strictly increasing: found adjacent pair violating order"
    );
}

/// Rowids within one doclist are strictly increasing.
#[inline]
pub fn check_rowids_strictly_increasing(rowids: &[i64]) {
    debug_assert!(
        rowids.windows(2).all(|w| w[0] < w[1]),
        "rowids are not strictly increasing within a doclist: {:?}",
        rowids
    );
}

/// Poslist invariant: column indices strictly increasing, offsets per
/// column strictly increasing.
#[inline]
pub fn check_poslist_well_formed(positions: &[(u32, u32)]) {
    for w in positions.windows(2) {
        let (c0, o0) = w[0];
        let (c1, o1) = w[1];
        debug_assert!(
            c1 > c0 || (c1 == c0 && o1 > o0),
            "poslist not well-formed: ({c0},{o0}) -> ({c1},{o1})"
        );
    }
}

/// Rowid 0 is reserved as "no such row".
#[inline]
pub fn check_rowid_nonzero(rowid: i64) {
    debug_assert!(rowid != 0, "rowid 0 used as a real row id");
}

/// Within one level, at most `k` segments.
#[inline]
pub fn check_level_fanout(segment_count: usize, k: usize) {
    debug_assert!(
        segment_count <= k,
        "level holds {segment_count} segments, exceeds configured fan-out {k}"
    );
}

/// A rowid transition's delta must be strictly positive.
#[inline]
pub fn check_rowid_delta_positive(delta: i64) {
    debug_assert!(delta > 0, "rowid delta {delta} is not strictly positive");
}
