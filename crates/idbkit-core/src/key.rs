//! Keys and key paths
//!
//! A [`Key`] is the subset of values the host engine accepts as record keys.
//! Keys compare the way IndexedDB compares them: every number sorts before
//! every string, and every string before every array. Strings compare by
//! UTF-16 code units, arrays element by element with a shorter prefix first.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// A valid record key
#[derive(Debug, Clone)]
pub enum Key {
    Number(f64),
    String(String),
    Array(Vec<Key>),
}

impl Key {
    /// Convert a JSON value into a key.
    ///
    /// Only finite numbers, strings and arrays of keys are accepted.
    pub fn from_value(value: &Value) -> StoreResult<Self> {
        match value {
            Value::Number(n) => {
                let n = n
                    .as_f64()
                    .ok_or_else(|| StoreError::InvalidKey(format!("{} is not representable", n)))?;
                Key::number(n)
            }
            Value::String(s) => Ok(Key::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<StoreResult<Vec<_>>>()
                .map(Key::Array),
            other => Err(StoreError::InvalidKey(format!(
                "{} is not a number, string or array",
                other
            ))),
        }
    }

    /// Build a numeric key, rejecting NaN and infinities.
    pub fn number(n: f64) -> StoreResult<Self> {
        if n.is_finite() {
            Ok(Key::Number(n))
        } else {
            Err(StoreError::InvalidKey(format!("{} is not finite", n)))
        }
    }

    /// Convert back into a JSON value.
    ///
    /// Integral numbers inside the safe integer range come back as JSON
    /// integers so that auto-increment keys read naturally.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => {
                if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
                    Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            Key::String(s) => Value::String(s.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    /// Numeric value of this key, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::String(_) => 1,
            Key::Array(_) => 2,
        }
    }
}

/// 2^53 - 1, the largest integer a JS number holds exactly.
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Key::String(a), Key::String(b)) => a.encode_utf16().cmp(b.encode_utf16()),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(n as f64)
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Number(n as f64)
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Key::Array(items)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Key::from_value(&value).map_err(D::Error::custom)
    }
}

/// Where a record's key lives inside the record.
///
/// A single path is a dotted property chain (`"profile.email"`); the empty
/// path designates the record itself. A compound path yields an array key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    Single(String),
    Compound(Vec<String>),
}

impl KeyPath {
    /// Evaluate the key path against a record.
    ///
    /// Returns `Ok(None)` when a segment is missing and `InvalidKey` when the
    /// resolved value is not a valid key.
    pub fn evaluate(&self, record: &Value) -> StoreResult<Option<Key>> {
        match self {
            KeyPath::Single(path) => match lookup(record, path).as_deref() {
                Some(value) => Key::from_value(value).map(Some),
                None => Ok(None),
            },
            KeyPath::Compound(paths) => {
                let mut parts = Vec::with_capacity(paths.len());
                for path in paths {
                    match lookup(record, path).as_deref() {
                        Some(value) => parts.push(Key::from_value(value)?),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Key::Array(parts)))
            }
        }
    }

    /// Evaluate for a multi-entry index: an array value contributes each of
    /// its valid, distinct elements; anything else behaves like `evaluate`.
    pub fn evaluate_multi(&self, record: &Value) -> Vec<Key> {
        if let KeyPath::Single(path) = self {
            if let Some(Value::Array(items)) = lookup(record, path).as_deref() {
                let mut keys: Vec<Key> = items
                    .iter()
                    .filter_map(|item| Key::from_value(item).ok())
                    .collect();
                keys.sort();
                keys.dedup();
                return keys;
            }
        }
        self.evaluate(record).ok().flatten().into_iter().collect()
    }

    /// Check the path is well formed; compound paths must be non-empty.
    pub fn validate(&self) -> StoreResult<()> {
        match self {
            KeyPath::Compound(paths) if paths.is_empty() => Err(StoreError::InvalidOption(
                "compound keyPath must not be empty".into(),
            )),
            KeyPath::Compound(paths) if paths.iter().any(|p| p.is_empty()) => Err(
                StoreError::InvalidOption("compound keyPath members must not be empty".into()),
            ),
            _ => Ok(()),
        }
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath::Single(path.to_string())
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Single(path) => write!(f, "{}", path),
            KeyPath::Compound(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

/// Walk a dotted path. `length` on a string (in UTF-16 units) or an array
/// resolves to a number, as it does for the host's key paths.
fn lookup<'a>(record: &'a Value, path: &str) -> Option<Cow<'a, Value>> {
    if path.is_empty() {
        return Some(Cow::Borrowed(record));
    }
    let mut current = record;
    let mut segments = path.split('.');
    while let Some(segment) = segments.next() {
        let length = match (current, segment) {
            (Value::String(s), "length") => s.encode_utf16().count(),
            (Value::Array(items), "length") => items.len(),
            _ => {
                current = current.get(segment)?;
                continue;
            }
        };
        // numbers have no properties to descend into
        return match segments.next() {
            Some(_) => None,
            None => Some(Cow::Owned(Value::from(length))),
        };
    }
    Some(Cow::Borrowed(current))
}
