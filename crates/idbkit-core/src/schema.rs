//! Schema declaration and normalization
//!
//! A schema is declared once, before the database is opened. It arrives
//! either as a configuration object ([`SchemaConfig`], deserialized from JS or
//! JSON) or through [`SchemaBuilder`]. Both paths end in the same validation,
//! which fills in defaults and enforces the schema invariants:
//!
//! - name, version and a non-empty store list are required
//! - store names are unique within the schema
//! - a store uses a key path *or* auto-increment, never both
//! - index names are unique per store

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::key::KeyPath;

// ============================================================================
// Raw configuration
// ============================================================================

/// Schema configuration object as supplied by the caller.
///
/// ```json
/// {
///   "name": "library",
///   "version": 2,
///   "stores": [
///     { "name": "books", "keyPath": "isbn", "indexes": { "title": false } },
///     { "name": "loans", "autoIncrement": true }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub stores: Option<Vec<StoreConfig>>,
    /// Delete stores and indexes the schema no longer declares on upgrade.
    #[serde(default)]
    pub prune: bool,
}

/// One object store entry of a [`SchemaConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub key_path: Option<KeyPath>,
    #[serde(default)]
    pub auto_increment: Option<bool>,
    #[serde(default)]
    pub indexes: Option<IndexesConfig>,
}

/// Index declarations in either of the accepted shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexesConfig {
    /// `{ "email": true }`: index name to uniqueness flag, key path = name
    ///
    /// Indexes declared this way are created in name order, not in the order
    /// the object lists them. Use the list form when order matters.
    Flags(BTreeMap<String, bool>),
    /// `[{ "name": "email", "keyPath": "contact.email", "unique": true }]`
    List(Vec<IndexConfig>),
}

/// Detailed index declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    pub name: String,
    #[serde(default)]
    pub key_path: Option<KeyPath>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub multi_entry: bool,
}

impl SchemaConfig {
    /// Validate the configuration and fill in defaults.
    pub fn normalize(self) -> StoreResult<Schema> {
        let name = self.name.ok_or(StoreError::MissingField("name"))?;
        let version = self.version.ok_or(StoreError::MissingField("version"))?;
        let stores = self.stores.ok_or(StoreError::MissingField("stores"))?;

        let stores = stores
            .into_iter()
            .map(StoreConfig::normalize)
            .collect::<StoreResult<Vec<_>>>()?;

        validate(name, version, stores, self.prune)
    }
}

impl StoreConfig {
    fn normalize(self) -> StoreResult<StoreDef> {
        let name = self.name.ok_or(StoreError::MissingField("stores[].name"))?;

        let key = match (self.key_path, self.auto_increment.unwrap_or(false)) {
            (Some(_), true) => return Err(StoreError::ConflictingKeyStrategy(name)),
            (Some(path), false) => KeyStrategy::KeyPath(path),
            (None, true) => KeyStrategy::AutoIncrement,
            (None, false) => KeyStrategy::OutOfLine,
        };

        let indexes = match self.indexes {
            None => Vec::new(),
            Some(IndexesConfig::Flags(flags)) => flags
                .into_iter()
                .map(|(name, unique)| IndexDef {
                    key_path: KeyPath::Single(name.clone()),
                    name,
                    unique,
                    multi_entry: false,
                })
                .collect(),
            Some(IndexesConfig::List(list)) => list
                .into_iter()
                .map(|index| IndexDef {
                    key_path: index
                        .key_path
                        .unwrap_or_else(|| KeyPath::Single(index.name.clone())),
                    name: index.name,
                    unique: index.unique,
                    multi_entry: index.multi_entry,
                })
                .collect(),
        };

        Ok(StoreDef { name, key, indexes })
    }
}

// ============================================================================
// Normalized schema
// ============================================================================

/// A validated database schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    version: u32,
    stores: Vec<StoreDef>,
    prune: bool,
}

/// How a store obtains the key of each record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Key is read from the record at this path
    KeyPath(KeyPath),
    /// Key is generated by the engine unless supplied with the write
    AutoIncrement,
    /// Key is always supplied with the write
    OutOfLine,
}

/// A validated object store definition.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreDef {
    pub name: String,
    pub key: KeyStrategy,
    pub indexes: Vec<IndexDef>,
}

/// A validated index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub key_path: KeyPath,
    pub unique: bool,
    pub multi_entry: bool,
}

impl Schema {
    /// Start building a schema in code.
    pub fn builder(name: impl Into<String>, version: u32) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            version,
            stores: Vec::new(),
            prune: false,
        }
    }

    /// Parse and normalize a JSON schema configuration.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let config: SchemaConfig = serde_json::from_str(json)?;
        config.normalize()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn stores(&self) -> &[StoreDef] {
        &self.stores
    }

    pub fn prune(&self) -> bool {
        self.prune
    }

    /// Look up a store definition by name.
    pub fn store(&self, name: &str) -> StoreResult<&StoreDef> {
        self.stores
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }
}

impl StoreDef {
    /// A store with out-of-line keys and no indexes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: KeyStrategy::OutOfLine,
            indexes: Vec::new(),
        }
    }

    pub fn key_path(mut self, path: impl Into<KeyPath>) -> Self {
        self.key = KeyStrategy::KeyPath(path.into());
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.key = KeyStrategy::AutoIncrement;
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Look up an index definition by name.
    pub fn index_def(&self, name: &str) -> StoreResult<&IndexDef> {
        self.indexes
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| StoreError::UnknownIndex {
                store: self.name.clone(),
                index: name.to_string(),
            })
    }
}

impl IndexDef {
    /// A non-unique index whose key path is its name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key_path: KeyPath::Single(name.clone()),
            name,
            unique: false,
            multi_entry: false,
        }
    }

    pub fn key_path(mut self, path: impl Into<KeyPath>) -> Self {
        self.key_path = path.into();
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn multi_entry(mut self) -> Self {
        self.multi_entry = true;
        self
    }
}

/// Builder for [`Schema`]; `build` runs the same validation as
/// [`SchemaConfig::normalize`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    version: u32,
    stores: Vec<StoreDef>,
    prune: bool,
}

impl SchemaBuilder {
    pub fn store(mut self, store: StoreDef) -> Self {
        self.stores.push(store);
        self
    }

    pub fn prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn build(self) -> StoreResult<Schema> {
        validate(self.name, self.version as u64, self.stores, self.prune)
    }
}

fn validate(name: String, version: u64, stores: Vec<StoreDef>, prune: bool) -> StoreResult<Schema> {
    if name.is_empty() {
        return Err(StoreError::MissingField("name"));
    }
    let version = u32::try_from(version)
        .ok()
        .filter(|v| *v > 0)
        .ok_or(StoreError::InvalidVersion(version))?;
    if stores.is_empty() {
        return Err(StoreError::MissingField("stores"));
    }

    let mut store_names = HashSet::new();
    for store in &stores {
        if store.name.is_empty() {
            return Err(StoreError::MissingField("stores[].name"));
        }
        if !store_names.insert(store.name.as_str()) {
            return Err(StoreError::DuplicateStore(store.name.clone()));
        }
        if let KeyStrategy::KeyPath(path) = &store.key {
            path.validate()?;
        }

        let mut index_names = HashSet::new();
        for index in &store.indexes {
            if index.name.is_empty() {
                return Err(StoreError::MissingField("indexes[].name"));
            }
            if !index_names.insert(index.name.as_str()) {
                return Err(StoreError::DuplicateIndex {
                    store: store.name.clone(),
                    index: index.name.clone(),
                });
            }
            index.key_path.validate()?;
            if index.multi_entry && matches!(index.key_path, KeyPath::Compound(_)) {
                return Err(StoreError::InvalidOption(format!(
                    "index '{}' on '{}' cannot be multiEntry with a compound keyPath",
                    index.name, store.name
                )));
            }
        }
    }

    tracing::debug!(
        db = %name,
        version,
        stores = stores.len(),
        "schema normalized"
    );

    Ok(Schema {
        name,
        version,
        stores,
        prune,
    })
}
