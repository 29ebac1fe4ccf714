//! In-memory engine for testing
//!
//! Behaves like the browser engine for everything idbkit relies on: version
//! upgrades, key ordering, range inclusion, cursor stepping, uniqueness and
//! all-or-nothing transactions. Data lives as long as the [`MemoryFactory`],
//! so closing and reopening a database sees earlier writes.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::key::{Key, MAX_SAFE_INTEGER};
use crate::query::{
    cursor_positions, Cursor, Delete, DeleteTarget, Query, Record, Selection, Write, WriteMode,
};
use crate::range::{in_range, KeyRange};
use crate::schema::{IndexDef, KeyStrategy, Schema, StoreDef};
use crate::upgrade::{plan_upgrade, StoreSnapshot, UpgradeStep};

#[derive(Debug, Clone, Default)]
struct DatabaseData {
    version: u32,
    stores: BTreeMap<String, StoreData>,
}

#[derive(Debug, Clone)]
struct StoreData {
    key: KeyStrategy,
    indexes: Vec<IndexDef>,
    records: BTreeMap<Key, Value>,
    /// Next generated key for auto-increment stores
    next_id: f64,
}

impl StoreData {
    fn new(def: &StoreDef) -> Self {
        Self {
            key: def.key.clone(),
            indexes: def.indexes.clone(),
            records: BTreeMap::new(),
            next_id: 1.0,
        }
    }

    fn index(&self, store: &str, name: &str) -> StoreResult<&IndexDef> {
        self.indexes
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| StoreError::UnknownIndex {
                store: store.to_string(),
                index: name.to_string(),
            })
    }

    /// Records of an index as (index key, primary key, value), in index order.
    fn index_entries(&self, index: &IndexDef, range: Option<&KeyRange>) -> Vec<Record> {
        let mut entries = Vec::new();
        for (primary_key, value) in &self.records {
            let keys = if index.multi_entry {
                index.key_path.evaluate_multi(value)
            } else {
                index
                    .key_path
                    .evaluate(value)
                    .ok()
                    .flatten()
                    .into_iter()
                    .collect()
            };
            for key in keys.into_iter().filter(|k| in_range(range, k)) {
                entries.push(Record {
                    key,
                    primary_key: primary_key.clone(),
                    value: value.clone(),
                });
            }
        }
        entries.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| a.primary_key.cmp(&b.primary_key))
        });
        entries
    }

    fn check_unique(&self, store: &str, index: &IndexDef) -> StoreResult<()> {
        let entries = self.index_entries(index, None);
        for pair in entries.windows(2) {
            if pair[0].key == pair[1].key {
                return Err(StoreError::Constraint(format!(
                    "unique index '{}' on '{}' already contains {}",
                    index.name, store, pair[0].key
                )));
            }
        }
        Ok(())
    }
}

/// Owner of all in-memory databases.
#[derive(Debug, Default)]
pub struct MemoryFactory {
    databases: HashMap<String, Rc<RefCell<DatabaseData>>>,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a database, running an upgrade when the schema version is
    /// newer than the stored one.
    pub fn open(&mut self, schema: Schema) -> StoreResult<MemoryDatabase> {
        let data = self
            .databases
            .entry(schema.name().to_string())
            .or_default()
            .clone();

        if let Err(err) = upgrade_if_needed(&schema, &data) {
            // A database that failed its first upgrade does not exist
            if data.borrow().version == 0 {
                self.databases.remove(schema.name());
            }
            return Err(err);
        }

        Ok(MemoryDatabase {
            schema,
            data,
            closed: false,
        })
    }

    /// Delete a database and all of its stores.
    ///
    /// Returns `true` if the database existed.
    pub fn delete_database(&mut self, name: &str) -> bool {
        self.databases.remove(name).is_some()
    }

    /// Stored version of a database, `None` if it does not exist.
    pub fn version(&self, name: &str) -> Option<u32> {
        self.databases.get(name).map(|d| d.borrow().version)
    }
}

fn upgrade_if_needed(schema: &Schema, data: &RefCell<DatabaseData>) -> StoreResult<()> {
    let mut current = data.borrow_mut();
    if schema.version() < current.version {
        return Err(StoreError::Version(format!(
            "requested version {} is less than existing version {}",
            schema.version(),
            current.version
        )));
    }
    if schema.version() > current.version {
        tracing::debug!(
            db = schema.name(),
            old_version = current.version,
            new_version = schema.version(),
            "upgrade needed"
        );
        // Upgrade runs on a copy so a failed step leaves the old state
        let mut upgraded = current.clone();
        apply_upgrade(schema, &mut upgraded)?;
        upgraded.version = schema.version();
        *current = upgraded;
    }
    Ok(())
}

fn apply_upgrade(schema: &Schema, data: &mut DatabaseData) -> StoreResult<()> {
    let snapshot: Vec<StoreSnapshot> = data
        .stores
        .iter()
        .map(|(name, store)| StoreSnapshot {
            name: name.clone(),
            key: store.key.clone(),
            indexes: store.indexes.clone(),
        })
        .collect();

    for step in plan_upgrade(schema, &snapshot) {
        tracing::debug!(?step, "applying upgrade step");
        match step {
            UpgradeStep::CreateStore(def) => {
                data.stores.insert(def.name.clone(), StoreData::new(&def));
            }
            UpgradeStep::DeleteStore(name) => {
                data.stores.remove(&name);
            }
            UpgradeStep::CreateIndex { store, index } => {
                let target = data
                    .stores
                    .get_mut(&store)
                    .ok_or_else(|| StoreError::UnknownStore(store.clone()))?;
                if index.unique {
                    target.check_unique(&store, &index)?;
                }
                target.indexes.push(index);
            }
            UpgradeStep::DeleteIndex { store, index } => {
                if let Some(target) = data.stores.get_mut(&store) {
                    target.indexes.retain(|i| i.name != index);
                }
            }
        }
    }
    Ok(())
}

/// Connection to an in-memory database.
#[derive(Debug)]
pub struct MemoryDatabase {
    schema: Schema,
    data: Rc<RefCell<DatabaseData>>,
    closed: bool,
}

impl MemoryDatabase {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn version(&self) -> u32 {
        self.data.borrow().version
    }

    /// Names of the stores that exist, in sorted order.
    pub fn store_names(&self) -> Vec<String> {
        self.data.borrow().stores.keys().cloned().collect()
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Exact primary key lookup.
    pub fn get(&self, store: &str, key: &Key) -> StoreResult<Option<Value>> {
        self.read(store, |data| Ok(data.records.get(key).cloned()))
    }

    /// First record whose index key equals `key`.
    pub fn get_by_index(&self, store: &str, index: &str, key: &Key) -> StoreResult<Option<Record>> {
        self.read(store, |data| {
            let index = data.index(store, index)?;
            let range = KeyRange::only(key.clone());
            Ok(data.index_entries(index, Some(&range)).into_iter().next())
        })
    }

    /// Run a query and collect every record it delivers.
    pub fn query(&self, query: &Query) -> StoreResult<Vec<Record>> {
        let mut records = Vec::new();
        self.for_each(query, |record| {
            records.push(record);
            ControlFlow::Continue(())
        })?;
        Ok(records)
    }

    /// Run a query, handing each record to `visit` until it breaks.
    pub fn for_each<F>(&self, query: &Query, mut visit: F) -> StoreResult<()>
    where
        F: FnMut(Record) -> ControlFlow<()>,
    {
        let records: Vec<Record> = self.read(&query.store, |data| match &query.selection {
            Selection::Key(key) => Ok(data
                .records
                .get(key)
                .map(|value| Record {
                    key: key.clone(),
                    primary_key: key.clone(),
                    value: value.clone(),
                })
                .into_iter()
                .collect()),
            Selection::Index { index, key } => {
                let index = data.index(&query.store, index)?;
                let range = KeyRange::only(key.clone());
                Ok(data
                    .index_entries(index, Some(&range))
                    .into_iter()
                    .take(1)
                    .collect())
            }
            Selection::Cursor { index, cursor } => {
                let candidates = match index {
                    Some(index) => {
                        let index = data.index(&query.store, index)?;
                        data.index_entries(index, cursor.range.as_ref())
                    }
                    None => data
                        .records
                        .iter()
                        .filter(|(k, _)| in_range(cursor.range.as_ref(), k))
                        .map(|(k, v)| Record {
                            key: k.clone(),
                            primary_key: k.clone(),
                            value: v.clone(),
                        })
                        .collect(),
                };
                Ok(walk(candidates, cursor, query.limit))
            }
        })?;

        for record in records {
            if visit(record).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Number of records in a store, optionally within a range.
    pub fn count(&self, store: &str, range: Option<&KeyRange>) -> StoreResult<usize> {
        self.read(store, |data| {
            Ok(data.records.keys().filter(|k| in_range(range, k)).count())
        })
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Apply an add/put. All entries are written or none are.
    ///
    /// Returns the primary key of each written record.
    pub fn write(&self, write: &Write) -> StoreResult<Vec<Key>> {
        self.modify(&write.store, |data| {
            let mut keys = Vec::with_capacity(write.entries.len());
            for entry in &write.entries {
                let key = match (&data.key, &entry.key) {
                    (KeyStrategy::KeyPath(path), _) => {
                        path.evaluate(&entry.value)?.ok_or_else(|| {
                            StoreError::InvalidKey(format!("record has no key at '{}'", path))
                        })?
                    }
                    (KeyStrategy::OutOfLine, Some(key)) => key.clone(),
                    (KeyStrategy::OutOfLine, None) => {
                        return Err(StoreError::MissingField("key"));
                    }
                    (KeyStrategy::AutoIncrement, Some(key)) => {
                        if let Some(n) = key.as_f64() {
                            if n >= data.next_id {
                                data.next_id = n.floor() + 1.0;
                            }
                        }
                        key.clone()
                    }
                    (KeyStrategy::AutoIncrement, None) => {
                        if data.next_id > MAX_SAFE_INTEGER {
                            return Err(StoreError::Constraint("key generator exhausted".into()));
                        }
                        let key = Key::Number(data.next_id);
                        data.next_id += 1.0;
                        key
                    }
                };

                if write.mode == WriteMode::Add && data.records.contains_key(&key) {
                    return Err(StoreError::Constraint(format!(
                        "key {} already exists in '{}'",
                        key, write.store
                    )));
                }
                data.records.insert(key.clone(), entry.value.clone());
                keys.push(key);
            }

            for index in data.indexes.iter().filter(|i| i.unique) {
                data.check_unique(&write.store, index)?;
            }
            Ok(keys)
        })
    }

    /// Delete one key or every key in a range. Returns how many records went.
    pub fn delete(&self, delete: &Delete) -> StoreResult<usize> {
        self.modify(&delete.store, |data| {
            let before = data.records.len();
            match &delete.target {
                DeleteTarget::Key(key) => {
                    data.records.remove(key);
                }
                DeleteTarget::Range(range) => data.records.retain(|k, _| !range.contains(k)),
            }
            Ok(before - data.records.len())
        })
    }

    /// Remove every record of a store.
    pub fn clear(&self, store: &str) -> StoreResult<()> {
        self.modify(store, |data| {
            data.records.clear();
            Ok(())
        })
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn read<T>(&self, store: &str, f: impl FnOnce(&StoreData) -> StoreResult<T>) -> StoreResult<T> {
        self.ensure_open()?;
        let data = self.data.borrow();
        let store_data = data
            .stores
            .get(store)
            .ok_or_else(|| StoreError::UnknownStore(store.to_string()))?;
        f(store_data)
    }

    /// Run `f` against a copy of the store and keep the copy only on success.
    fn modify<T>(
        &self,
        store: &str,
        f: impl FnOnce(&mut StoreData) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.ensure_open()?;
        let mut data = self.data.borrow_mut();
        let current = data
            .stores
            .get(store)
            .ok_or_else(|| StoreError::UnknownStore(store.to_string()))?;
        let mut working = current.clone();
        let result = f(&mut working)?;
        data.stores.insert(store.to_string(), working);
        Ok(result)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Closed(self.schema.name().to_string()));
        }
        Ok(())
    }
}

/// Order candidates for the cursor direction and apply stepping and limit.
///
/// `candidates` arrive sorted by (key, primary key). Unique directions keep
/// the lowest primary key of each key, in either direction.
fn walk(mut candidates: Vec<Record>, cursor: &Cursor, limit: Option<u32>) -> Vec<Record> {
    if cursor.direction.is_unique() {
        candidates.dedup_by(|later, earlier| later.key == earlier.key);
    }
    if cursor.direction.is_reverse() {
        candidates.reverse();
    }
    let positions: Vec<usize> = cursor_positions(candidates.len(), cursor.advance, limit).collect();
    candidates
        .into_iter()
        .enumerate()
        .filter(|(i, _)| positions.binary_search(i).is_ok())
        .map(|(_, record)| record)
        .collect()
}
