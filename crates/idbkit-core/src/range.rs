//! Key ranges restricting cursor iteration, counts and deletes

use std::cmp::Ordering;

use crate::error::{StoreError, StoreResult};
use crate::key::Key;

/// A bound or unbounded interval of keys.
///
/// Mirrors the four constructors of the host's key range object. Bounds are
/// closed unless the matching `*_open` flag is set.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyRange {
    Only(Key),
    LowerBound {
        lower: Key,
        open: bool,
    },
    UpperBound {
        upper: Key,
        open: bool,
    },
    Bound {
        lower: Key,
        upper: Key,
        lower_open: bool,
        upper_open: bool,
    },
}

impl KeyRange {
    pub fn only(key: Key) -> Self {
        KeyRange::Only(key)
    }

    pub fn lower_bound(lower: Key, open: bool) -> Self {
        KeyRange::LowerBound { lower, open }
    }

    pub fn upper_bound(upper: Key, open: bool) -> Self {
        KeyRange::UpperBound { upper, open }
    }

    /// Build a two-sided range.
    ///
    /// Fails when `lower > upper`, or when the bounds are equal and either
    /// side is open (the range would be empty).
    pub fn bound(lower: Key, upper: Key, lower_open: bool, upper_open: bool) -> StoreResult<Self> {
        match lower.cmp(&upper) {
            Ordering::Greater => Err(StoreError::InvalidRange(format!(
                "lower bound {} is greater than upper bound {}",
                lower, upper
            ))),
            Ordering::Equal if lower_open || upper_open => Err(StoreError::InvalidRange(format!(
                "bounds are both {} but the range is open",
                lower
            ))),
            _ => Ok(KeyRange::Bound {
                lower,
                upper,
                lower_open,
                upper_open,
            }),
        }
    }

    /// Whether `key` falls inside the range.
    pub fn contains(&self, key: &Key) -> bool {
        match self {
            KeyRange::Only(only) => key == only,
            KeyRange::LowerBound { lower, open } => above(key, lower, *open),
            KeyRange::UpperBound { upper, open } => below(key, upper, *open),
            KeyRange::Bound {
                lower,
                upper,
                lower_open,
                upper_open,
            } => above(key, lower, *lower_open) && below(key, upper, *upper_open),
        }
    }
}

fn above(key: &Key, lower: &Key, open: bool) -> bool {
    if open {
        key > lower
    } else {
        key >= lower
    }
}

fn below(key: &Key, upper: &Key, open: bool) -> bool {
    if open {
        key < upper
    } else {
        key <= upper
    }
}

/// Whether `key` is inside `range`, treating no range as unbounded.
pub fn in_range(range: Option<&KeyRange>, key: &Key) -> bool {
    range.map_or(true, |r| r.contains(key))
}
