//! IndexedDB-backed database connection.
//!
//! Mirrors the operations of `idbkit_core::MemoryDatabase` as async methods:
//! same inputs, same outputs, same error semantics. Every operation runs in
//! its own single-store transaction and resolves once that transaction
//! completes.

use std::cell::Cell;
use std::ops::ControlFlow;
use std::rc::Rc;

use idbkit_core::{
    Cursor, Delete, DeleteTarget, Key, KeyRange, Mode, Query, Record, Schema, Selection,
    StoreError, Write, WriteMode,
};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{IdbCursorWithValue, IdbDatabase, IdbObjectStore, IdbRequest};

use crate::convert::{
    direction_to_idb, js_to_key, js_to_value, key_to_js, mode_to_idb, range_or_undefined,
    range_to_js, value_to_js,
};
use crate::error::{IndexedDbError, Result};
use crate::idb;

/// An open connection to a browser database.
///
/// The connection closes itself when another context asks to upgrade the
/// database; later calls then fail with `StoreError::Closed`.
pub struct IndexedDb {
    db: IdbDatabase,
    schema: Schema,
    closed: Rc<Cell<bool>>,
    _on_version_change: Closure<dyn FnMut(web_sys::Event)>,
}

impl IndexedDb {
    /// Open the database `schema` describes, upgrading it when needed.
    pub async fn open(schema: Schema) -> Result<Self> {
        let db = idb::open_database(&schema).await?;
        let closed = Rc::new(Cell::new(false));

        let db_for_close = db.clone();
        let closed_flag = closed.clone();
        let name = schema.name().to_string();
        let on_version_change = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            tracing::warn!(db = %name, "closing connection for a newer version");
            db_for_close.close();
            closed_flag.set(true);
        }) as Box<dyn FnMut(web_sys::Event)>);
        db.set_onversionchange(Some(on_version_change.as_ref().unchecked_ref()));

        tracing::info!(db = schema.name(), version = db.version() as u64, "database open");
        Ok(Self {
            db,
            schema,
            closed,
            _on_version_change: on_version_change,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Version reported by the live connection.
    pub fn version(&self) -> u32 {
        self.db.version() as u32
    }

    /// Names of the stores that exist, in sorted order.
    pub fn store_names(&self) -> Vec<String> {
        let names = self.db.object_store_names();
        (0..names.length()).filter_map(|i| names.get(i)).collect()
    }

    /// Close the database connection.
    pub fn close(&self) {
        self.db.close();
        self.closed.set(true);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Delete the database by name.
    pub async fn delete_database(db_name: &str) -> Result<()> {
        idb::delete_database(db_name).await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Exact primary key lookup.
    pub async fn get(&self, store_name: &str, key: &Key) -> Result<Option<Value>> {
        let (tx, store) = self.begin(store_name, Mode::ReadOnly)?;
        let req = store.get(&key_to_js(key))?;
        let result = idb::await_request(&req).await?;
        idb::await_transaction(&tx).await?;

        if result.is_undefined() {
            return Ok(None);
        }
        Ok(Some(js_to_value(&result)?))
    }

    /// First record whose index key equals `key`.
    pub async fn get_by_index(
        &self,
        store_name: &str,
        index: &str,
        key: &Key,
    ) -> Result<Option<Record>> {
        let query = Query::index(store_name, index, key.clone());
        Ok(self.query(&query).await?.into_iter().next())
    }

    /// Run a query and collect every record it delivers.
    pub async fn query(&self, query: &Query) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        self.for_each(query, |record| {
            records.push(record);
            ControlFlow::Continue(())
        })
        .await?;
        Ok(records)
    }

    /// Run a query, handing each record to `visit` until it breaks.
    pub async fn for_each<F>(&self, query: &Query, mut visit: F) -> Result<()>
    where
        F: FnMut(Record) -> ControlFlow<()>,
    {
        let (tx, store) = self.begin(&query.store, query.mode)?;

        match &query.selection {
            Selection::Key(key) => {
                let req = store.get(&key_to_js(key))?;
                let result = idb::await_request(&req).await?;
                if !result.is_undefined() {
                    let _ = visit(Record {
                        key: key.clone(),
                        primary_key: key.clone(),
                        value: js_to_value(&result)?,
                    });
                }
            }
            Selection::Index { index, key } => {
                let index = store.index(index)?;
                let lookup = key_to_js(key);
                let primary_key = idb::await_request(&index.get_key(&lookup)?).await?;
                if !primary_key.is_undefined() {
                    let value = idb::await_request(&index.get(&lookup)?).await?;
                    let _ = visit(Record {
                        key: key.clone(),
                        primary_key: js_to_key(&primary_key)?,
                        value: js_to_value(&value)?,
                    });
                }
            }
            Selection::Cursor { index, cursor } => {
                let req = open_cursor(&store, index.as_deref(), cursor)?;
                walk_cursor(&req, cursor, query.limit, &mut visit).await?;
            }
        }

        idb::await_transaction(&tx).await
    }

    /// Number of records in a store, optionally within a range.
    pub async fn count(&self, store_name: &str, range: Option<&KeyRange>) -> Result<usize> {
        let (tx, store) = self.begin(store_name, Mode::ReadOnly)?;
        let req = match range {
            Some(range) => store.count_with_key(&range_to_js(range)?.into())?,
            None => store.count()?,
        };
        let result = idb::await_request(&req).await?;
        idb::await_transaction(&tx).await?;

        Ok(result.as_f64().unwrap_or(0.0) as usize)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Apply an add/put in one transaction. All entries are written or none are.
    ///
    /// Returns the primary key of each written record.
    pub async fn write(&self, write: &Write) -> Result<Vec<Key>> {
        let (tx, store) = self.begin(&write.store, Mode::ReadWrite)?;

        let mut keys = Vec::with_capacity(write.entries.len());
        for entry in &write.entries {
            let value = value_to_js(&entry.value)?;
            let req = match (write.mode, &entry.key) {
                (WriteMode::Add, Some(key)) => store.add_with_key(&value, &key_to_js(key)),
                (WriteMode::Add, None) => store.add(&value),
                (WriteMode::Put, Some(key)) => store.put_with_key(&value, &key_to_js(key)),
                (WriteMode::Put, None) => store.put(&value),
            };
            let req = match req {
                Ok(req) => req,
                Err(e) => {
                    // Synchronous throws (DataError) leave the transaction alive
                    let _ = tx.abort();
                    return Err(e.into());
                }
            };
            let key = idb::await_request(&req).await?;
            keys.push(js_to_key(&key)?);
        }

        idb::await_transaction(&tx).await?;
        tracing::debug!(store = %write.store, written = keys.len(), "write committed");
        Ok(keys)
    }

    /// Delete one key or every key in a range. Returns how many records went.
    pub async fn delete(&self, delete: &Delete) -> Result<usize> {
        let (tx, store) = self.begin(&delete.store, Mode::ReadWrite)?;

        let target = match &delete.target {
            DeleteTarget::Key(key) => key_to_js(key),
            DeleteTarget::Range(range) => range_to_js(range)?.into(),
        };
        let counted = idb::await_request(&store.count_with_key(&target)?).await?;
        idb::await_request(&store.delete(&target)?).await?;
        idb::await_transaction(&tx).await?;

        Ok(counted.as_f64().unwrap_or(0.0) as usize)
    }

    /// Remove every record of a store.
    pub async fn clear(&self, store_name: &str) -> Result<()> {
        let (tx, store) = self.begin(store_name, Mode::ReadWrite)?;
        idb::await_request(&store.clear()?).await?;
        idb::await_transaction(&tx).await
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn begin(
        &self,
        store_name: &str,
        mode: Mode,
    ) -> Result<(web_sys::IdbTransaction, IdbObjectStore)> {
        if self.closed.get() {
            return Err(StoreError::Closed(self.schema.name().to_string()).into());
        }
        self.schema.store(store_name)?;
        idb::begin_transaction(&self.db, store_name, mode_to_idb(mode))
    }
}

impl Drop for IndexedDb {
    fn drop(&mut self) {
        self.db.set_onversionchange(None);
        // An open connection left for the GC blocks every later upgrade
        self.db.close();
    }
}

fn open_cursor(store: &IdbObjectStore, index: Option<&str>, cursor: &Cursor) -> Result<IdbRequest> {
    let range = range_or_undefined(cursor.range.as_ref())?;
    let direction = direction_to_idb(cursor.direction);
    let req = match index {
        Some(index) => store
            .index(index)?
            .open_cursor_with_range_and_direction(&range, direction)?,
        None => store.open_cursor_with_range_and_direction(&range, direction)?,
    };
    Ok(req)
}

/// Drive an open cursor request, re-awaiting it after every advance.
async fn walk_cursor<F>(
    req: &IdbRequest,
    cursor: &Cursor,
    limit: Option<u32>,
    visit: &mut F,
) -> Result<()>
where
    F: FnMut(Record) -> ControlFlow<()>,
{
    let mut delivered = 0u32;
    loop {
        let result = idb::await_request(req).await?;
        if result.is_null() || result.is_undefined() {
            break;
        }
        let position: IdbCursorWithValue = result
            .dyn_into()
            .map_err(|_| IndexedDbError::JsValue("cursor result is not a cursor".into()))?;

        let record = Record {
            key: js_to_key(&position.key()?)?,
            primary_key: js_to_key(&position.primary_key()?)?,
            value: js_to_value(&position.value()?)?,
        };
        delivered += 1;
        if visit(record).is_break() || limit.is_some_and(|l| delivered >= l) {
            break;
        }
        position.advance(cursor.advance.max(1))?;
    }
    Ok(())
}
