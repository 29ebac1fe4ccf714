//! The `IdbKit` class exposed to JavaScript.
//!
//! Every method takes a plain options object, verifies it against the schema
//! the database was opened with, and returns a Promise. Callbacks on the
//! options object (`onsuccess`, `onerror`, `oncomplete`) fire as well, so
//! callers may use either style.

use std::ops::ControlFlow;
use std::rc::Rc;

use idbkit_core::{
    CountConfig, DeleteConfig, QueryConfig, SchemaConfig, Selection, StoreError, WriteConfig,
    WriteMode,
};
use idbkit_indexeddb::convert::key_to_js;
use idbkit_indexeddb::{IndexedDb, IndexedDbError};
use js_sys::{Function, Promise};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::callbacks::Callbacks;

type Result<T> = std::result::Result<T, IndexedDbError>;

/// An opened database plus the configuration it was opened with.
#[wasm_bindgen]
pub struct IdbKit {
    db: Rc<IndexedDb>,
    /// `onerror` from the open config; used by calls that bring none
    onerror: Option<Function>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseInfo {
    name: String,
    version: u32,
    store_names: Vec<String>,
}

#[wasm_bindgen]
impl IdbKit {
    /// Open (creating or upgrading) the database a schema object describes.
    ///
    /// `config.onsuccess` receives `{ name, version, storeNames }`;
    /// `config.onerror` also becomes the default error callback of the
    /// returned instance.
    pub async fn open(config: JsValue) -> std::result::Result<IdbKit, JsValue> {
        let callbacks = Callbacks::from_options(&config);

        let db = open_database(&config)
            .await
            .map_err(|err| callbacks.fail(err))?;
        let kit = IdbKit {
            db: Rc::new(db),
            onerror: callbacks.onerror.clone(),
        };

        if let Err(err) = to_js(&kit.info()).and_then(|info| callbacks.success(&info)) {
            kit.close();
            return Err(callbacks.fail(err));
        }
        callbacks.complete();
        Ok(kit)
    }

    /// Delete a database by name. Resolves once the host has removed it.
    #[wasm_bindgen(js_name = deleteDatabase)]
    pub async fn delete_database(name: String) -> std::result::Result<(), JsValue> {
        tracing::info!(db = %name, "deleting database");
        IndexedDb::delete_database(&name)
            .await
            .map_err(JsValue::from)
    }

    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.db.name().to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn version(&self) -> u32 {
        self.db.version()
    }

    #[wasm_bindgen(js_name = storeNames)]
    pub fn store_names(&self) -> Vec<String> {
        self.db.store_names()
    }

    /// Read records.
    ///
    /// Key and index lookups resolve to the value, or `undefined` when
    /// nothing matches. Cursor reads call `onsuccess` once per record
    /// (`{ key, primaryKey, value }`) and resolve to the array of records
    /// delivered; `onsuccess` returning `false` stops the cursor.
    pub fn get(&self, options: JsValue) -> Promise {
        let db = self.db.clone();
        let callbacks = self.callbacks(&options);
        future_to_promise(async move {
            let result = run_get(&db, &options, &callbacks).await;
            callbacks.settle(result)
        })
    }

    /// Insert records; fails if any key already exists.
    ///
    /// Resolves to the new key, or to an array of keys when `values` was given.
    pub fn add(&self, options: JsValue) -> Promise {
        self.write(options, WriteMode::Add)
    }

    /// Insert or replace records.
    pub fn put(&self, options: JsValue) -> Promise {
        self.write(options, WriteMode::Put)
    }

    /// Delete by `key`, or every record in a `range`. Resolves to the number removed.
    pub fn delete(&self, options: JsValue) -> Promise {
        let db = self.db.clone();
        let callbacks = self.callbacks(&options);
        future_to_promise(async move {
            let result = run_delete(&db, &options, &callbacks).await;
            callbacks.settle(result)
        })
    }

    /// Remove every record of a store. Accepts a store name or `{ store }`.
    pub fn clear(&self, options: JsValue) -> Promise {
        let db = self.db.clone();
        let callbacks = self.callbacks(&options);
        future_to_promise(async move {
            let result = run_clear(&db, &options, &callbacks).await;
            callbacks.settle(result)
        })
    }

    /// Count records of a store, optionally within a `range`.
    pub fn count(&self, options: JsValue) -> Promise {
        let db = self.db.clone();
        let callbacks = self.callbacks(&options);
        future_to_promise(async move {
            let result = run_count(&db, &options, &callbacks).await;
            callbacks.settle(result)
        })
    }

    /// Close the connection. Later calls reject.
    pub fn close(&self) {
        tracing::debug!(db = self.db.name(), "closing");
        self.db.close();
    }
}

impl IdbKit {
    fn info(&self) -> DatabaseInfo {
        DatabaseInfo {
            name: self.db.name().to_string(),
            version: self.db.version(),
            store_names: self.db.store_names(),
        }
    }

    fn callbacks(&self, options: &JsValue) -> Callbacks {
        Callbacks::from_options(options).or_error(self.onerror.as_ref())
    }

    fn write(&self, options: JsValue, mode: WriteMode) -> Promise {
        let db = self.db.clone();
        let callbacks = self.callbacks(&options);
        future_to_promise(async move {
            let result = run_write(&db, &options, mode, &callbacks).await;
            callbacks.settle(result)
        })
    }
}

async fn open_database(config: &JsValue) -> Result<IndexedDb> {
    let config: SchemaConfig = serde_wasm_bindgen::from_value(config.clone())?;
    let schema = config.normalize()?;
    IndexedDb::open(schema).await
}

async fn run_get(db: &IndexedDb, options: &JsValue, callbacks: &Callbacks) -> Result<JsValue> {
    let config: QueryConfig = serde_wasm_bindgen::from_value(options.clone())?;
    let query = config.verify(db.schema())?;

    if !matches!(query.selection, Selection::Cursor { .. }) {
        let value = match db.query(&query).await?.into_iter().next() {
            Some(record) => to_js(&record.value)?,
            None => JsValue::UNDEFINED,
        };
        callbacks.success(&value)?;
        return Ok(value);
    }

    let delivered = js_sys::Array::new();
    let mut failure = None;
    db.for_each(&query, |record| {
        let step = to_js(&record).and_then(|record| {
            delivered.push(&record);
            callbacks.success(&record)
        });
        match step {
            Ok(true) => ControlFlow::Continue(()),
            Ok(false) => ControlFlow::Break(()),
            Err(err) => {
                failure = Some(err);
                ControlFlow::Break(())
            }
        }
    })
    .await?;

    match failure {
        Some(err) => Err(err),
        None => Ok(delivered.into()),
    }
}

async fn run_write(
    db: &IndexedDb,
    options: &JsValue,
    mode: WriteMode,
    callbacks: &Callbacks,
) -> Result<JsValue> {
    let config: WriteConfig = serde_wasm_bindgen::from_value(options.clone())?;
    let write = config.verify(db.schema(), mode)?;
    let keys = db.write(&write).await?;

    let result = if config.values.is_some() {
        to_js(&keys)?
    } else {
        keys.first().map(key_to_js).unwrap_or(JsValue::UNDEFINED)
    };
    callbacks.success(&result)?;
    Ok(result)
}

async fn run_delete(db: &IndexedDb, options: &JsValue, callbacks: &Callbacks) -> Result<JsValue> {
    let config: DeleteConfig = serde_wasm_bindgen::from_value(options.clone())?;
    let delete = config.verify(db.schema())?;
    let removed = db.delete(&delete).await?;

    let result = JsValue::from_f64(removed as f64);
    callbacks.success(&result)?;
    Ok(result)
}

async fn run_clear(db: &IndexedDb, options: &JsValue, callbacks: &Callbacks) -> Result<JsValue> {
    let store = match options.as_string() {
        Some(store) => Some(store),
        None if options.is_object() => {
            js_sys::Reflect::get(options, &"store".into())?.as_string()
        }
        None => None,
    }
    .ok_or(StoreError::MissingField("store"))?;
    db.schema().store(&store)?;
    db.clear(&store).await?;

    callbacks.success(&JsValue::UNDEFINED)?;
    Ok(JsValue::UNDEFINED)
}

async fn run_count(db: &IndexedDb, options: &JsValue, callbacks: &Callbacks) -> Result<JsValue> {
    let config: CountConfig = serde_wasm_bindgen::from_value(options.clone())?;
    let (store, range) = config.verify(db.schema())?;
    let count = db.count(&store, range.as_ref()).await?;

    let result = JsValue::from_f64(count as f64);
    callbacks.success(&result)?;
    Ok(result)
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue> {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    Ok(value.serialize(&serializer)?)
}
