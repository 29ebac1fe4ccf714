//! Conversions between idbkit types and their JS counterparts
//!
//! Records cross the boundary as plain JS objects. Serialization uses the
//! JSON-compatible serializer so maps become objects rather than `Map`s,
//! which is what IndexedDB key paths can navigate.

use idbkit_core::{Direction, Key, KeyPath, KeyRange, Mode, StoreError};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{IdbCursorDirection, IdbKeyRange, IdbTransactionMode};

use crate::error::{IndexedDbError, Result};

/// Convert a key into the JS value IndexedDB expects.
pub fn key_to_js(key: &Key) -> JsValue {
    match key {
        Key::Number(n) => JsValue::from_f64(*n),
        Key::String(s) => JsValue::from_str(s),
        Key::Array(items) => items
            .iter()
            .map(key_to_js)
            .collect::<js_sys::Array>()
            .into(),
    }
}

/// Convert a key returned by IndexedDB.
pub fn js_to_key(val: &JsValue) -> Result<Key> {
    if let Some(n) = val.as_f64() {
        return Ok(Key::number(n)?);
    }
    if let Some(s) = val.as_string() {
        return Ok(Key::String(s));
    }
    if js_sys::Array::is_array(val) {
        let array: &js_sys::Array = val.unchecked_ref();
        return array
            .iter()
            .map(|item| js_to_key(&item))
            .collect::<Result<Vec<_>>>()
            .map(Key::Array);
    }
    Err(StoreError::InvalidKey(format!(
        "unsupported key type: {}",
        crate::error::describe(val)
    ))
    .into())
}

/// Serialize a record for storage.
pub fn value_to_js(value: &Value) -> Result<JsValue> {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    Ok(value.serialize(&serializer)?)
}

/// Deserialize a stored record.
pub fn js_to_value(val: &JsValue) -> Result<Value> {
    if val.is_undefined() {
        return Ok(Value::Null);
    }
    Ok(serde_wasm_bindgen::from_value(val.clone())?)
}

pub fn key_path_to_js(path: &KeyPath) -> JsValue {
    match path {
        KeyPath::Single(path) => JsValue::from_str(path),
        KeyPath::Compound(paths) => paths
            .iter()
            .map(|p| JsValue::from_str(p))
            .collect::<js_sys::Array>()
            .into(),
    }
}

/// Read a key path reported by a store or index; `null` means none.
pub fn js_to_key_path(val: &JsValue) -> Option<KeyPath> {
    if let Some(path) = val.as_string() {
        return Some(KeyPath::Single(path));
    }
    if js_sys::Array::is_array(val) {
        let array: &js_sys::Array = val.unchecked_ref();
        let paths: Option<Vec<String>> = array.iter().map(|p| p.as_string()).collect();
        return paths.map(KeyPath::Compound);
    }
    None
}

/// Build the host key range object.
pub fn range_to_js(range: &KeyRange) -> Result<IdbKeyRange> {
    let built = match range {
        KeyRange::Only(key) => IdbKeyRange::only(&key_to_js(key)),
        KeyRange::LowerBound { lower, open } => {
            IdbKeyRange::lower_bound_with_open(&key_to_js(lower), *open)
        }
        KeyRange::UpperBound { upper, open } => {
            IdbKeyRange::upper_bound_with_open(&key_to_js(upper), *open)
        }
        KeyRange::Bound {
            lower,
            upper,
            lower_open,
            upper_open,
        } => IdbKeyRange::bound_with_lower_open_and_upper_open(
            &key_to_js(lower),
            &key_to_js(upper),
            *lower_open,
            *upper_open,
        ),
    };
    built.map_err(|e| StoreError::InvalidRange(crate::error::describe(&e)).into())
}

/// A range argument for cursor/count calls; `undefined` means unbounded.
pub fn range_or_undefined(range: Option<&KeyRange>) -> Result<JsValue> {
    match range {
        Some(range) => Ok(range_to_js(range)?.into()),
        None => Ok(JsValue::UNDEFINED),
    }
}

pub fn direction_to_idb(direction: Direction) -> IdbCursorDirection {
    match direction {
        Direction::Next => IdbCursorDirection::Next,
        Direction::NextUnique => IdbCursorDirection::Nextunique,
        Direction::Prev => IdbCursorDirection::Prev,
        Direction::PrevUnique => IdbCursorDirection::Prevunique,
    }
}

pub fn mode_to_idb(mode: Mode) -> IdbTransactionMode {
    match mode {
        Mode::ReadOnly => IdbTransactionMode::Readonly,
        Mode::ReadWrite => IdbTransactionMode::Readwrite,
    }
}

impl From<IndexedDbError> for JsValue {
    fn from(err: IndexedDbError) -> Self {
        let error = js_sys::Error::new(&err.to_string());
        error.set_name("IndexedDbError");
        error.into()
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use serde_json::json;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_key_round_trip() {
        let key = Key::Array(vec![Key::from("a"), Key::from(2), Key::Array(vec![])]);
        let back = js_to_key(&key_to_js(&key)).unwrap();
        assert_eq!(back, key);
    }

    #[wasm_bindgen_test]
    fn test_non_key_rejected() {
        assert!(js_to_key(&JsValue::TRUE).is_err());
        assert!(js_to_key(&JsValue::NULL).is_err());
    }

    #[wasm_bindgen_test]
    fn test_value_becomes_plain_object() {
        let js = value_to_js(&json!({"nested": {"a": 1}})).unwrap();
        assert!(!js.is_instance_of::<js_sys::Map>());
        let nested = js_sys::Reflect::get(&js, &"nested".into()).unwrap();
        assert_eq!(
            js_sys::Reflect::get(&nested, &"a".into()).unwrap().as_f64(),
            Some(1.0)
        );
    }

    #[wasm_bindgen_test]
    fn test_range_includes() {
        let range = range_to_js(&KeyRange::bound(Key::from(1), Key::from(3), true, false).unwrap())
            .unwrap();
        assert!(!range.includes(&JsValue::from_f64(1.0)).unwrap());
        assert!(range.includes(&JsValue::from_f64(3.0)).unwrap());
    }

    #[wasm_bindgen_test]
    fn test_key_path_round_trip() {
        let path = KeyPath::Compound(vec!["a".into(), "b.c".into()]);
        assert_eq!(js_to_key_path(&key_path_to_js(&path)), Some(path));
        assert_eq!(js_to_key_path(&JsValue::NULL), None);
    }
}
