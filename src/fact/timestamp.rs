//! Timestamp sequences and pairwise reconciliation
//!
//! A fact carries one ordering value per contributing fact. When a router
//! merges them into one value it applies `reconcile` pairwise: the newer
//! value wins only when it is strictly newer, otherwise the ordering is
//! flagged with the SUPPRESS sentinel.

use serde::{Deserialize, Serialize};

/// Sentinel marking a stale or untrustworthy causal ordering.
pub const SUPPRESS: i64 = -1;

/// Reconcile two timestamps: `t1` if strictly newer than `t2`, else SUPPRESS.
///
/// Ties and regressions are never silently accepted.
pub fn reconcile(t1: i64, t2: i64) -> i64 {
    if t1 > t2 {
        t1
    } else {
        SUPPRESS
    }
}

/// Ordering values of every fact that contributed to a fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampSeq(Vec<i64>);

impl TimestampSeq {
    pub fn new(stamps: Vec<i64>) -> Self {
        Self(stamps)
    }

    /// A sequence holding a single value
    pub fn single(stamp: i64) -> Self {
        Self(vec![stamp])
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fold the sequence left to right with [`reconcile`].
    ///
    /// Returns `None` for an empty sequence. Once SUPPRESS is reached it
    /// stays SUPPRESS: no valid time is older than the sentinel.
    pub fn resolve(&self) -> Option<i64> {
        let (first, rest) = self.0.split_first()?;
        Some(rest.iter().fold(*first, |acc, &t| reconcile(acc, t)))
    }
}

impl From<Vec<i64>> for TimestampSeq {
    fn from(stamps: Vec<i64>) -> Self {
        Self(stamps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_timestamp_wins() {
        assert_eq!(reconcile(5, 3), 5);
        assert_eq!(reconcile(1, 0), 1);
        assert_eq!(reconcile(i64::MAX, i64::MAX - 1), i64::MAX);
    }

    #[test]
    fn ties_and_regressions_suppress() {
        assert_eq!(reconcile(3, 3), SUPPRESS);
        assert_eq!(reconcile(3, 5), SUPPRESS);
        assert_eq!(reconcile(0, 0), SUPPRESS);
    }

    #[test]
    fn reconcile_is_asymmetric() {
        for (t1, t2) in [(10, 2), (7, 6), (100, 0)] {
            assert_eq!(reconcile(t1, t2), t1);
            assert_eq!(reconcile(t2, t1), SUPPRESS);
        }
    }

    #[test]
    fn resolve_pairs() {
        assert_eq!(TimestampSeq::new(vec![5, 3]).resolve(), Some(5));
        assert_eq!(TimestampSeq::new(vec![3, 3]).resolve(), Some(SUPPRESS));
    }

    #[test]
    fn resolve_single_and_empty() {
        assert_eq!(TimestampSeq::single(42).resolve(), Some(42));
        assert_eq!(TimestampSeq::new(Vec::new()).resolve(), None);
    }

    #[test]
    fn resolve_longer_sequences_fold_left() {
        assert_eq!(TimestampSeq::new(vec![9, 4, 2]).resolve(), Some(9));
        // 9 beats 4, then 9 vs 12 regresses
        assert_eq!(TimestampSeq::new(vec![9, 4, 12]).resolve(), Some(SUPPRESS));
        // once suppressed, stays suppressed
        assert_eq!(TimestampSeq::new(vec![3, 3, 1]).resolve(), Some(SUPPRESS));
    }

    #[test]
    fn serializes_as_plain_array() {
        let json = serde_json::to_string(&TimestampSeq::new(vec![5, 3])).unwrap();
        assert_eq!(json, "[5,3]");
    }
}
