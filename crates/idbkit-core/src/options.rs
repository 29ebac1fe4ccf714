//! Option objects and their verification
//!
//! Callers describe reads and writes with loosely-typed configuration
//! objects. Verification checks them against the [`Schema`], fills in
//! defaults and resolves the selection strategy. When several strategies
//! are present the cursor wins over the index, and the index over the key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::key::Key;
use crate::query::{
    Cursor, Delete, DeleteTarget, Direction, Entry, Mode, Query, Selection, Write, WriteMode,
};
use crate::range::KeyRange;
use crate::schema::{KeyStrategy, Schema};

/// Options for a read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub key: Option<Value>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub cursor: Option<CursorConfig>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Cursor or range options.
///
/// `only` overrides the bounds. `inclusive` applies to both bounds and
/// defaults to `true`; the per-bound flags override it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorConfig {
    #[serde(default)]
    pub lower: Option<Value>,
    #[serde(default)]
    pub upper: Option<Value>,
    #[serde(default)]
    pub only: Option<Value>,
    #[serde(default)]
    pub inclusive: Option<bool>,
    #[serde(default)]
    pub lower_inclusive: Option<bool>,
    #[serde(default)]
    pub upper_inclusive: Option<bool>,
    #[serde(default)]
    pub advance: Option<u32>,
    #[serde(default)]
    pub direction: Option<Direction>,
}

/// Options for add/put.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteConfig {
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub values: Option<Vec<Value>>,
    /// Out-of-line key; only valid with a single value
    #[serde(default)]
    pub key: Option<Value>,
}

/// Options for delete. `key` wins over `range`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteConfig {
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub key: Option<Value>,
    #[serde(default)]
    pub range: Option<CursorConfig>,
}

/// Options for count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountConfig {
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub range: Option<CursorConfig>,
}

impl CursorConfig {
    /// Build the key range these options describe, if any.
    pub fn range(&self) -> StoreResult<Option<KeyRange>> {
        if let Some(only) = &self.only {
            return Ok(Some(KeyRange::only(Key::from_value(only)?)));
        }

        let inclusive = self.inclusive.unwrap_or(true);
        let lower_open = !self.lower_inclusive.unwrap_or(inclusive);
        let upper_open = !self.upper_inclusive.unwrap_or(inclusive);

        let lower = self.lower.as_ref().map(Key::from_value).transpose()?;
        let upper = self.upper.as_ref().map(Key::from_value).transpose()?;

        let range = match (lower, upper) {
            (Some(lower), Some(upper)) => {
                Some(KeyRange::bound(lower, upper, lower_open, upper_open)?)
            }
            (Some(lower), None) => Some(KeyRange::lower_bound(lower, lower_open)),
            (None, Some(upper)) => Some(KeyRange::upper_bound(upper, upper_open)),
            (None, None) => None,
        };
        Ok(range)
    }

    /// Build the full cursor, defaulting direction and step.
    pub fn cursor(&self) -> StoreResult<Cursor> {
        let advance = self.advance.unwrap_or(1);
        if advance == 0 {
            return Err(StoreError::InvalidOption(
                "cursor advance must be at least 1".into(),
            ));
        }
        Ok(Cursor {
            range: self.range()?,
            direction: self.direction.unwrap_or_default(),
            advance,
        })
    }
}

impl QueryConfig {
    /// Verify against the schema and pick the selection strategy.
    pub fn verify(&self, schema: &Schema) -> StoreResult<Query> {
        let store_name = self
            .store
            .as_deref()
            .ok_or(StoreError::MissingField("store"))?;
        let store = schema.store(store_name)?;

        if let Some(index) = &self.index {
            store.index_def(index)?;
        }
        if self.limit == Some(0) {
            return Err(StoreError::InvalidOption("limit must be at least 1".into()));
        }

        let selection = match (&self.cursor, &self.index, &self.key) {
            (Some(cursor), index, key) => {
                if key.is_some() {
                    tracing::debug!(store = store_name, "cursor given; key ignored");
                }
                Selection::Cursor {
                    index: index.clone(),
                    cursor: cursor.cursor()?,
                }
            }
            (None, Some(index), Some(key)) => Selection::Index {
                index: index.clone(),
                key: Key::from_value(key)?,
            },
            (None, Some(index), None) => Selection::Cursor {
                index: Some(index.clone()),
                cursor: Cursor::default(),
            },
            (None, None, Some(key)) => Selection::Key(Key::from_value(key)?),
            (None, None, None) => Selection::Cursor {
                index: None,
                cursor: Cursor::default(),
            },
        };

        tracing::debug!(store = store_name, ?selection, "query verified");

        Ok(Query {
            store: store_name.to_string(),
            mode: self.mode.unwrap_or_default(),
            selection,
            limit: self.limit,
        })
    }
}

impl WriteConfig {
    /// Verify values and keys against the store's key strategy.
    pub fn verify(&self, schema: &Schema, mode: WriteMode) -> StoreResult<Write> {
        let store_name = self
            .store
            .as_deref()
            .ok_or(StoreError::MissingField("store"))?;
        let store = schema.store(store_name)?;

        let values: Vec<Value> = match (&self.value, &self.values) {
            (Some(_), Some(_)) => {
                return Err(StoreError::InvalidOption(
                    "give either value or values, not both".into(),
                ))
            }
            (Some(value), None) => vec![value.clone()],
            (None, Some(values)) if !values.is_empty() => values.clone(),
            _ => return Err(StoreError::MissingField("value")),
        };

        let key = self.key.as_ref().map(Key::from_value).transpose()?;
        if key.is_some() && values.len() > 1 {
            return Err(StoreError::InvalidOption(
                "an explicit key can only accompany a single value".into(),
            ));
        }

        let entries = match &store.key {
            KeyStrategy::KeyPath(path) => {
                if key.is_some() {
                    return Err(StoreError::InvalidOption(format!(
                        "store '{}' uses in-line keys at '{}'; do not pass a key",
                        store_name, path
                    )));
                }
                values
                    .into_iter()
                    .map(|value| match path.evaluate(&value)? {
                        Some(_) => Ok(Entry { value, key: None }),
                        None => Err(StoreError::InvalidKey(format!(
                            "record has no key at '{}'",
                            path
                        ))),
                    })
                    .collect::<StoreResult<Vec<_>>>()?
            }
            KeyStrategy::OutOfLine => {
                let key = key.ok_or(StoreError::MissingField("key"))?;
                values
                    .into_iter()
                    .map(|value| Entry {
                        value,
                        key: Some(key.clone()),
                    })
                    .collect()
            }
            KeyStrategy::AutoIncrement => values
                .into_iter()
                .map(|value| Entry {
                    value,
                    key: key.clone(),
                })
                .collect(),
        };

        Ok(Write {
            store: store_name.to_string(),
            mode,
            entries,
        })
    }
}

impl DeleteConfig {
    pub fn verify(&self, schema: &Schema) -> StoreResult<Delete> {
        let store_name = self
            .store
            .as_deref()
            .ok_or(StoreError::MissingField("store"))?;
        schema.store(store_name)?;

        let target = if let Some(key) = &self.key {
            DeleteTarget::Key(Key::from_value(key)?)
        } else if let Some(range) = &self.range {
            let range = range.range()?.ok_or_else(|| {
                StoreError::InvalidOption("delete range has no bounds; use clear".into())
            })?;
            DeleteTarget::Range(range)
        } else {
            return Err(StoreError::InvalidOption(
                "delete needs a key or a range".into(),
            ));
        };

        Ok(Delete {
            store: store_name.to_string(),
            target,
        })
    }
}

impl CountConfig {
    pub fn verify(&self, schema: &Schema) -> StoreResult<(String, Option<KeyRange>)> {
        let store_name = self
            .store
            .as_deref()
            .ok_or(StoreError::MissingField("store"))?;
        schema.store(store_name)?;
        let range = match &self.range {
            Some(range) => range.range()?,
            None => None,
        };
        Ok((store_name.to_string(), range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{IndexDef, StoreDef};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::builder("shop", 1)
            .store(
                StoreDef::new("items")
                    .key_path("sku")
                    .index(IndexDef::new("name"))
                    .index(IndexDef::new("price")),
            )
            .store(StoreDef::new("events").auto_increment())
            .store(StoreDef::new("blobs"))
            .build()
            .unwrap()
    }

    fn query(value: serde_json::Value) -> StoreResult<Query> {
        let config: QueryConfig = serde_json::from_value(value).unwrap();
        config.verify(&schema())
    }

    #[test]
    fn test_key_lookup() {
        let q = query(json!({"store": "items", "key": "A-1"})).unwrap();
        assert_eq!(q.selection, Selection::Key(Key::from("A-1")));
        assert_eq!(q.mode, Mode::ReadOnly);
        assert_eq!(q.limit, None);
    }

    #[test]
    fn test_index_overrides_key() {
        let q = query(json!({"store": "items", "key": "Lamp", "index": "name"})).unwrap();
        assert_eq!(
            q.selection,
            Selection::Index {
                index: "name".into(),
                key: Key::from("Lamp")
            }
        );
    }

    #[test]
    fn test_cursor_overrides_index_and_key() {
        let q = query(json!({
            "store": "items",
            "key": "ignored",
            "index": "price",
            "mode": "readwrite",
            "cursor": {"lower": 10, "upper": 20, "upperInclusive": false, "advance": 2}
        }))
        .unwrap();
        assert_eq!(q.mode, Mode::ReadWrite);
        assert_eq!(
            q.selection,
            Selection::Cursor {
                index: Some("price".into()),
                cursor: Cursor {
                    range: Some(KeyRange::Bound {
                        lower: Key::from(10),
                        upper: Key::from(20),
                        lower_open: false,
                        upper_open: true,
                    }),
                    direction: Direction::Next,
                    advance: 2,
                }
            }
        );
    }

    #[test]
    fn test_index_without_key_iterates_index() {
        let q = query(json!({"store": "items", "index": "name"})).unwrap();
        assert_eq!(
            q.selection,
            Selection::Cursor {
                index: Some("name".into()),
                cursor: Cursor::default()
            }
        );
    }

    #[test]
    fn test_no_selection_iterates_store() {
        let q = query(json!({"store": "items", "limit": 5})).unwrap();
        assert_eq!(
            q.selection,
            Selection::Cursor {
                index: None,
                cursor: Cursor::default()
            }
        );
        assert_eq!(q.limit, Some(5));
    }

    #[test]
    fn test_only_overrides_bounds() {
        let cursor = CursorConfig {
            only: Some(json!(3)),
            lower: Some(json!(1)),
            ..Default::default()
        };
        assert_eq!(cursor.range().unwrap(), Some(KeyRange::only(Key::from(3))));
    }

    #[test]
    fn test_inclusive_flag_applies_to_both_bounds() {
        let cursor = CursorConfig {
            lower: Some(json!("a")),
            upper: Some(json!("m")),
            inclusive: Some(false),
            upper_inclusive: Some(true),
            ..Default::default()
        };
        assert_eq!(
            cursor.range().unwrap(),
            Some(KeyRange::Bound {
                lower: Key::from("a"),
                upper: Key::from("m"),
                lower_open: true,
                upper_open: false,
            })
        );
    }

    #[test]
    fn test_one_sided_cursor() {
        let cursor = CursorConfig {
            upper: Some(json!(9)),
            ..Default::default()
        };
        assert_eq!(
            cursor.range().unwrap(),
            Some(KeyRange::upper_bound(Key::from(9), false))
        );
    }

    #[test]
    fn test_invalid_options() {
        assert_eq!(
            query(json!({"key": 1})).unwrap_err(),
            StoreError::MissingField("store")
        );
        assert_eq!(
            query(json!({"store": "nope"})).unwrap_err(),
            StoreError::UnknownStore("nope".into())
        );
        assert!(matches!(
            query(json!({"store": "items", "index": "color", "key": 1})),
            Err(StoreError::UnknownIndex { .. })
        ));
        assert!(matches!(
            query(json!({"store": "items", "key": {"not": "a key"}})),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            query(json!({"store": "items", "cursor": {"advance": 0}})),
            Err(StoreError::InvalidOption(_))
        ));
        assert!(matches!(
            query(json!({"store": "items", "limit": 0})),
            Err(StoreError::InvalidOption(_))
        ));
        assert!(matches!(
            query(json!({"store": "items", "cursor": {"lower": 5, "upper": 1}})),
            Err(StoreError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_write_in_line_keys() {
        let config = WriteConfig {
            store: Some("items".into()),
            values: Some(vec![json!({"sku": "A"}), json!({"sku": "B"})]),
            ..Default::default()
        };
        let write = config.verify(&schema(), WriteMode::Put).unwrap();
        assert_eq!(write.entries.len(), 2);
        assert!(write.entries.iter().all(|e| e.key.is_none()));

        let missing = WriteConfig {
            store: Some("items".into()),
            value: Some(json!({"name": "no sku"})),
            ..Default::default()
        };
        assert!(matches!(
            missing.verify(&schema(), WriteMode::Add),
            Err(StoreError::InvalidKey(_))
        ));

        let explicit = WriteConfig {
            store: Some("items".into()),
            value: Some(json!({"sku": "A"})),
            key: Some(json!("A")),
            ..Default::default()
        };
        assert!(matches!(
            explicit.verify(&schema(), WriteMode::Add),
            Err(StoreError::InvalidOption(_))
        ));
    }

    #[test]
    fn test_write_out_of_line_requires_key() {
        let config = WriteConfig {
            store: Some("blobs".into()),
            value: Some(json!("payload")),
            ..Default::default()
        };
        assert_eq!(
            config.verify(&schema(), WriteMode::Put).unwrap_err(),
            StoreError::MissingField("key")
        );

        let keyed = WriteConfig {
            key: Some(json!(["a", 1])),
            ..config
        };
        let write = keyed.verify(&schema(), WriteMode::Put).unwrap();
        assert_eq!(
            write.entries[0].key,
            Some(Key::Array(vec![Key::from("a"), Key::from(1)]))
        );
    }

    #[test]
    fn test_write_auto_increment_key_optional() {
        let config = WriteConfig {
            store: Some("events".into()),
            values: Some(vec![json!({"t": 1}), json!({"t": 2})]),
            ..Default::default()
        };
        let write = config.verify(&schema(), WriteMode::Add).unwrap();
        assert_eq!(write.mode, WriteMode::Add);
        assert!(write.entries.iter().all(|e| e.key.is_none()));
    }

    #[test]
    fn test_write_value_shapes() {
        let both = WriteConfig {
            store: Some("events".into()),
            value: Some(json!(1)),
            values: Some(vec![json!(2)]),
            ..Default::default()
        };
        assert!(both.verify(&schema(), WriteMode::Add).is_err());

        let none = WriteConfig {
            store: Some("events".into()),
            ..Default::default()
        };
        assert_eq!(
            none.verify(&schema(), WriteMode::Add).unwrap_err(),
            StoreError::MissingField("value")
        );

        let key_with_many = WriteConfig {
            store: Some("events".into()),
            values: Some(vec![json!(1), json!(2)]),
            key: Some(json!(1)),
            ..Default::default()
        };
        assert!(key_with_many.verify(&schema(), WriteMode::Add).is_err());
    }

    #[test]
    fn test_delete_targets() {
        let by_key = DeleteConfig {
            store: Some("items".into()),
            key: Some(json!("A")),
            range: Some(CursorConfig {
                lower: Some(json!("Z")),
                ..Default::default()
            }),
        };
        assert_eq!(
            by_key.verify(&schema()).unwrap().target,
            DeleteTarget::Key(Key::from("A"))
        );

        let by_range = DeleteConfig {
            store: Some("items".into()),
            key: None,
            range: Some(CursorConfig {
                lower: Some(json!("M")),
                ..Default::default()
            }),
        };
        assert_eq!(
            by_range.verify(&schema()).unwrap().target,
            DeleteTarget::Range(KeyRange::lower_bound(Key::from("M"), false))
        );

        let unbounded = DeleteConfig {
            store: Some("items".into()),
            key: None,
            range: Some(CursorConfig::default()),
        };
        assert!(unbounded.verify(&schema()).is_err());

        let nothing = DeleteConfig {
            store: Some("items".into()),
            ..Default::default()
        };
        assert!(nothing.verify(&schema()).is_err());
    }

    #[test]
    fn test_count_config() {
        let config = CountConfig {
            store: Some("events".into()),
            range: Some(CursorConfig {
                only: Some(json!(4)),
                ..Default::default()
            }),
        };
        let (store, range) = config.verify(&schema()).unwrap();
        assert_eq!(store, "events");
        assert_eq!(range, Some(KeyRange::only(Key::from(4))));
    }
}
