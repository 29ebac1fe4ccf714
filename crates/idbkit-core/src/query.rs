//! Verified operations handed to an engine
//!
//! These are the outputs of the options verifier: every default is filled
//! in, keys are typed and exactly one selection strategy is chosen.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::key::Key;
use crate::range::KeyRange;

/// Transaction mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    ReadOnly,
    ReadWrite,
}

/// Cursor direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Next,
    NextUnique,
    Prev,
    PrevUnique,
}

impl Direction {
    pub fn is_reverse(self) -> bool {
        matches!(self, Direction::Prev | Direction::PrevUnique)
    }

    pub fn is_unique(self) -> bool {
        matches!(self, Direction::NextUnique | Direction::PrevUnique)
    }
}

/// Cursor iteration parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub range: Option<KeyRange>,
    pub direction: Direction,
    /// Records moved per step after the first; always at least 1
    pub advance: u32,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            range: None,
            direction: Direction::Next,
            advance: 1,
        }
    }
}

impl Cursor {
    pub fn range(mut self, range: KeyRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn advance(mut self, advance: u32) -> Self {
        self.advance = advance.max(1);
        self
    }
}

/// The single strategy a query uses to select records.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Exact primary key lookup
    Key(Key),
    /// First record whose index key equals `key`
    Index { index: String, key: Key },
    /// Iterate a store, or an index when `index` is set
    Cursor {
        index: Option<String>,
        cursor: Cursor,
    },
}

/// A verified read request.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub store: String,
    pub mode: Mode,
    pub selection: Selection,
    pub limit: Option<u32>,
}

impl Query {
    pub fn key(store: impl Into<String>, key: impl Into<Key>) -> Self {
        Self::with(store, Selection::Key(key.into()))
    }

    pub fn index(store: impl Into<String>, index: impl Into<String>, key: impl Into<Key>) -> Self {
        Self::with(
            store,
            Selection::Index {
                index: index.into(),
                key: key.into(),
            },
        )
    }

    pub fn cursor(store: impl Into<String>, cursor: Cursor) -> Self {
        Self::with(
            store,
            Selection::Cursor {
                index: None,
                cursor,
            },
        )
    }

    pub fn index_cursor(store: impl Into<String>, index: impl Into<String>, cursor: Cursor) -> Self {
        Self::with(
            store,
            Selection::Cursor {
                index: Some(index.into()),
                cursor,
            },
        )
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    fn with(store: impl Into<String>, selection: Selection) -> Self {
        Self {
            store: store.into(),
            mode: Mode::ReadOnly,
            selection,
            limit: None,
        }
    }
}

/// A record delivered to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Cursor position: the index key for index selections, else the primary key
    pub key: Key,
    pub primary_key: Key,
    pub value: Value,
}

/// Whether a write may replace an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail on an existing key
    Add,
    /// Insert or replace
    Put,
}

/// One value to write, with its out-of-line key when the store needs one.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Value,
    pub key: Option<Key>,
}

/// A verified add/put request.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub store: String,
    pub mode: WriteMode,
    pub entries: Vec<Entry>,
}

/// What a delete removes.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteTarget {
    Key(Key),
    Range(KeyRange),
}

/// A verified delete request.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub store: String,
    pub target: DeleteTarget,
}

/// Walk the positions a cursor visits over `len` candidates.
///
/// The first candidate is always visited; each further step moves
/// `advance` positions forward. Iteration stops after `limit` visits.
pub fn cursor_positions(len: usize, advance: u32, limit: Option<u32>) -> impl Iterator<Item = usize> {
    let step = advance.max(1) as usize;
    let take = limit.map_or(usize::MAX, |l| l as usize);
    (0..len).step_by(step).take(take)
}
