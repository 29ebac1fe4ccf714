//! Low-level IndexedDB helpers using web-sys
//!
//! Wraps the callback-based IndexedDB API into Rust futures using
//! `wasm_bindgen_futures::JsFuture` and `js_sys::Promise`.

use std::cell::RefCell;
use std::rc::Rc;

use idbkit_core::{plan_upgrade, IndexDef, KeyStrategy, Schema, StoreSnapshot, UpgradeStep};
use js_sys::Promise;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    IdbDatabase, IdbFactory, IdbIndexParameters, IdbObjectStore, IdbObjectStoreParameters,
    IdbOpenDbRequest, IdbRequest, IdbTransaction, IdbTransactionMode, IdbVersionChangeEvent,
};

use crate::convert::{js_to_key_path, key_path_to_js};
use crate::error::{classify, describe, IndexedDbError, Result};

/// Type alias for event closures kept alive while a request is pending
type EventClosure<E> = Rc<RefCell<Option<Closure<dyn FnMut(E)>>>>;

/// Get the global IndexedDB factory.
pub fn idb_factory() -> Result<IdbFactory> {
    let global = js_sys::global();

    let idb: JsValue = js_sys::Reflect::get(&global, &"indexedDB".into())
        .map_err(|_| IndexedDbError::NotAvailable("no indexedDB on global".into()))?;

    if idb.is_undefined() || idb.is_null() {
        return Err(IndexedDbError::NotAvailable(
            "indexedDB is null/undefined".into(),
        ));
    }

    idb.dyn_into::<IdbFactory>()
        .map_err(|_| IndexedDbError::NotAvailable("indexedDB is not IdbFactory".into()))
}

/// Convert an IdbRequest into a JS Promise that resolves with the request's result.
///
/// Handlers are replaced on every call, so a cursor request can be awaited
/// again after each `continue`/`advance`. A failed request is left to abort
/// its transaction.
fn request_to_promise(req: &IdbRequest) -> Promise {
    let req_success = req.clone();
    let req_error = req.clone();

    Promise::new(&mut move |resolve, reject| {
        // Store closures in Rc<RefCell> to manage their lifetime without leaking
        type ClosurePair = (
            Closure<dyn FnMut(web_sys::Event)>,
            Closure<dyn FnMut(web_sys::Event)>,
        );
        let closures: Rc<RefCell<Option<ClosurePair>>> = Rc::new(RefCell::new(None));

        let req_s = req_success.clone();
        let closures_for_success = closures.clone();
        let on_success = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let result = req_s.result().unwrap_or(JsValue::UNDEFINED);
            let _ = resolve.call1(&JsValue::UNDEFINED, &result);
            *closures_for_success.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let req_e = req_error.clone();
        let closures_for_error = closures.clone();
        let on_error = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            // Reject with the DOMException itself so callers can classify it
            let err = req_e
                .error()
                .ok()
                .flatten()
                .map(JsValue::from)
                .unwrap_or_else(|| JsValue::from_str("unknown IDB error"));
            let _ = reject.call1(&JsValue::UNDEFINED, &err);
            *closures_for_error.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        req_success.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        req_error.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        *closures.borrow_mut() = Some((on_success, on_error));
    })
}

/// Convert an IdbTransaction completion into a JS Promise.
///
/// Rejects on `error` and on `abort`.
fn transaction_to_promise(tx: &IdbTransaction) -> Promise {
    let tx = tx.clone();

    Promise::new(&mut move |resolve, reject| {
        type ClosureTriple = (
            Closure<dyn FnMut(web_sys::Event)>,
            Closure<dyn FnMut(web_sys::Event)>,
            Closure<dyn FnMut(web_sys::Event)>,
        );
        let closures: Rc<RefCell<Option<ClosureTriple>>> = Rc::new(RefCell::new(None));

        let closures_for_complete = closures.clone();
        let on_complete = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = resolve.call0(&JsValue::UNDEFINED);
            *closures_for_complete.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let tx_e = tx.clone();
        let reject_e = reject.clone();
        let closures_for_error = closures.clone();
        let on_error = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let err = tx_e
                .error()
                .map(JsValue::from)
                .unwrap_or_else(|| JsValue::from_str("transaction error"));
            let _ = reject_e.call1(&JsValue::UNDEFINED, &err);
            *closures_for_error.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        let tx_a = tx.clone();
        let closures_for_abort = closures.clone();
        let on_abort = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let err = tx_a
                .error()
                .map(JsValue::from)
                .unwrap_or_else(|| JsValue::from_str("transaction aborted"));
            let _ = reject.call1(&JsValue::UNDEFINED, &err);
            *closures_for_abort.borrow_mut() = None;
        }) as Box<dyn FnMut(web_sys::Event)>);

        tx.set_oncomplete(Some(on_complete.as_ref().unchecked_ref()));
        tx.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        tx.set_onabort(Some(on_abort.as_ref().unchecked_ref()));

        *closures.borrow_mut() = Some((on_complete, on_error, on_abort));
    })
}

/// Open (or create) the database a schema describes.
///
/// When the stored version is older, the upgrade handler snapshots the
/// existing stores and applies the planned steps. Any failing step aborts
/// the version-change transaction; the open then fails with that step's
/// error and the database stays at its previous version.
pub async fn open_database(schema: &Schema) -> Result<IdbDatabase> {
    let factory = idb_factory()?;

    let open_req: IdbOpenDbRequest = factory
        .open_with_u32(schema.name(), schema.version())
        .map_err(|e| IndexedDbError::Open(describe(&e)))?;

    let failure: Rc<RefCell<Option<IndexedDbError>>> = Rc::new(RefCell::new(None));

    let upgrade_closure: EventClosure<IdbVersionChangeEvent> = Rc::new(RefCell::new(None));
    let blocked_closure: EventClosure<web_sys::Event> = Rc::new(RefCell::new(None));

    let upgrade_schema = schema.clone();
    let upgrade_failure = failure.clone();
    let on_upgrade = Closure::wrap(Box::new(move |event: IdbVersionChangeEvent| {
        tracing::info!(
            db = upgrade_schema.name(),
            old_version = event.old_version(),
            new_version = ?event.new_version(),
            "upgrade needed"
        );
        if let Err(err) = run_upgrade(&event, &upgrade_schema) {
            tracing::error!(db = upgrade_schema.name(), error = %err, "upgrade failed");
            if let Some(tx) = event
                .target()
                .and_then(|t| t.dyn_into::<IdbOpenDbRequest>().ok())
                .and_then(|req| req.transaction())
            {
                let _ = tx.abort();
            }
            *upgrade_failure.borrow_mut() = Some(err);
        }
    }) as Box<dyn FnMut(IdbVersionChangeEvent)>);

    let blocked_name = schema.name().to_string();
    let on_blocked = Closure::wrap(Box::new(move |_event: web_sys::Event| {
        tracing::warn!(
            db = %blocked_name,
            "open blocked: another connection still uses an older version"
        );
    }) as Box<dyn FnMut(web_sys::Event)>);

    open_req.set_onupgradeneeded(Some(on_upgrade.as_ref().unchecked_ref()));
    open_req.set_onblocked(Some(on_blocked.as_ref().unchecked_ref()));

    // Keep handlers alive for the duration of the open request
    *upgrade_closure.borrow_mut() = Some(on_upgrade);
    *blocked_closure.borrow_mut() = Some(on_blocked);

    let open_promise = request_to_promise(open_req.unchecked_ref());
    let result = wasm_bindgen_futures::JsFuture::from(open_promise).await;

    open_req.set_onupgradeneeded(None);
    open_req.set_onblocked(None);
    *upgrade_closure.borrow_mut() = None;
    *blocked_closure.borrow_mut() = None;

    if let Some(err) = failure.borrow_mut().take() {
        return Err(err);
    }
    let result = result.map_err(|e| classify(&e, IndexedDbError::Open))?;

    result
        .dyn_into::<IdbDatabase>()
        .map_err(|_| IndexedDbError::Open("result is not IdbDatabase".into()))
}

fn run_upgrade(event: &IdbVersionChangeEvent, schema: &Schema) -> Result<()> {
    let req: IdbOpenDbRequest = event
        .target()
        .ok_or_else(|| IndexedDbError::Open("upgrade event has no target".into()))?
        .dyn_into()
        .map_err(|_| IndexedDbError::Open("upgrade target is not an open request".into()))?;
    let db: IdbDatabase = req
        .result()?
        .dyn_into()
        .map_err(|_| IndexedDbError::Open("upgrade result is not IdbDatabase".into()))?;
    let tx = req
        .transaction()
        .ok_or_else(|| IndexedDbError::Open("no version-change transaction".into()))?;

    let existing = snapshot_stores(&db, &tx)?;
    for step in plan_upgrade(schema, &existing) {
        tracing::debug!(?step, "applying upgrade step");
        apply_step(&db, &tx, step)?;
    }
    Ok(())
}

/// Describe the stores that exist at upgrade time.
fn snapshot_stores(db: &IdbDatabase, tx: &IdbTransaction) -> Result<Vec<StoreSnapshot>> {
    let names = db.object_store_names();
    let mut snapshots = Vec::with_capacity(names.length() as usize);

    for i in 0..names.length() {
        let Some(name) = names.get(i) else { continue };
        let store = tx.object_store(&name)?;

        let key = match (js_to_key_path(&store.key_path()?), store.auto_increment()) {
            (Some(path), _) => KeyStrategy::KeyPath(path),
            (None, true) => KeyStrategy::AutoIncrement,
            (None, false) => KeyStrategy::OutOfLine,
        };

        let index_names = store.index_names();
        let mut indexes = Vec::with_capacity(index_names.length() as usize);
        for j in 0..index_names.length() {
            let Some(index_name) = index_names.get(j) else {
                continue;
            };
            let index = store.index(&index_name)?;
            let key_path = js_to_key_path(&index.key_path()?).ok_or_else(|| {
                IndexedDbError::JsValue(format!("index '{}' has no key path", index_name))
            })?;
            indexes.push(IndexDef {
                name: index_name,
                key_path,
                unique: index.unique(),
                multi_entry: index.multi_entry(),
            });
        }

        snapshots.push(StoreSnapshot { name, key, indexes });
    }
    Ok(snapshots)
}

fn apply_step(db: &IdbDatabase, tx: &IdbTransaction, step: UpgradeStep) -> Result<()> {
    match step {
        UpgradeStep::CreateStore(def) => {
            let params = IdbObjectStoreParameters::new();
            match &def.key {
                KeyStrategy::KeyPath(path) => {
                    js_sys::Reflect::set(&params, &"keyPath".into(), &key_path_to_js(path))?;
                }
                KeyStrategy::AutoIncrement => {
                    js_sys::Reflect::set(&params, &"autoIncrement".into(), &JsValue::TRUE)?;
                }
                KeyStrategy::OutOfLine => {}
            }
            let store = db
                .create_object_store_with_optional_parameters(&def.name, &params)
                .map_err(|e| {
                    IndexedDbError::Open(format!("create store '{}': {}", def.name, describe(&e)))
                })?;
            for index in &def.indexes {
                create_index(&store, index)?;
            }
        }
        UpgradeStep::DeleteStore(name) => {
            db.delete_object_store(&name).map_err(|e| {
                IndexedDbError::Open(format!("delete store '{}': {}", name, describe(&e)))
            })?;
        }
        UpgradeStep::CreateIndex { store, index } => {
            create_index(&tx.object_store(&store)?, &index)?;
        }
        UpgradeStep::DeleteIndex { store, index } => {
            tx.object_store(&store)?.delete_index(&index).map_err(|e| {
                IndexedDbError::Open(format!("delete index '{}': {}", index, describe(&e)))
            })?;
        }
    }
    Ok(())
}

fn create_index(store: &IdbObjectStore, index: &IndexDef) -> Result<()> {
    let params = IdbIndexParameters::new();
    js_sys::Reflect::set(&params, &"unique".into(), &JsValue::from_bool(index.unique))?;
    js_sys::Reflect::set(
        &params,
        &"multiEntry".into(),
        &JsValue::from_bool(index.multi_entry),
    )?;

    let created = match &index.key_path {
        idbkit_core::KeyPath::Single(path) => {
            store.create_index_with_str_and_optional_parameters(&index.name, path, &params)
        }
        compound => store.create_index_with_str_sequence_and_optional_parameters(
            &index.name,
            &key_path_to_js(compound),
            &params,
        ),
    };
    created.map_err(|e| {
        IndexedDbError::Open(format!("create index '{}': {}", index.name, describe(&e)))
    })?;
    Ok(())
}

/// Start a transaction on one store.
pub fn begin_transaction(
    db: &IdbDatabase,
    store_name: &str,
    mode: IdbTransactionMode,
) -> Result<(IdbTransaction, IdbObjectStore)> {
    let tx = db
        .transaction_with_str_and_mode(store_name, mode)
        .map_err(|e| IndexedDbError::Transaction(describe(&e)))?;
    let store = tx
        .object_store(store_name)
        .map_err(|e| IndexedDbError::Request(describe(&e)))?;
    Ok((tx, store))
}

/// Await an IdbRequest, resolving to its result JsValue.
pub async fn await_request(req: &IdbRequest) -> Result<JsValue> {
    let promise = request_to_promise(req);
    wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(|e| classify(&e, IndexedDbError::Request))
}

/// Await an IdbTransaction to complete.
pub async fn await_transaction(tx: &IdbTransaction) -> Result<()> {
    let promise = transaction_to_promise(tx);
    wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(|e| classify(&e, IndexedDbError::Transaction))?;
    Ok(())
}

/// Delete an IndexedDB database by name.
pub async fn delete_database(db_name: &str) -> Result<()> {
    let factory = idb_factory()?;
    let req = factory
        .delete_database(db_name)
        .map_err(|e| IndexedDbError::Open(format!("delete db: {}", describe(&e))))?;
    let promise = request_to_promise(req.unchecked_ref());
    wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(|e| IndexedDbError::Open(format!("delete db: {}", describe(&e))))?;
    Ok(())
}
