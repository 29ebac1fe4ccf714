//! Error types for the IndexedDB backend

use idbkit_core::StoreError;
use thiserror::Error;

/// Result type for IndexedDB operations
pub type Result<T> = std::result::Result<T, IndexedDbError>;

/// Errors that can occur while talking to IndexedDB
#[derive(Debug, Error)]
pub enum IndexedDbError {
    /// IndexedDB is not available in this environment
    #[error("IndexedDB not available: {0}")]
    NotAvailable(String),

    /// Database open/upgrade error
    #[error("IndexedDB open error: {0}")]
    Open(String),

    /// Transaction error or abort
    #[error("IndexedDB transaction error: {0}")]
    Transaction(String),

    /// Request error from an IDB operation
    #[error("IndexedDB request error: {0}")]
    Request(String),

    /// JavaScript value conversion error
    #[error("JS conversion error: {0}")]
    JsValue(String),

    /// Configuration, key or range rejected before reaching the engine
    #[error(transparent)]
    Config(#[from] StoreError),
}

impl From<wasm_bindgen::JsValue> for IndexedDbError {
    fn from(val: wasm_bindgen::JsValue) -> Self {
        classify(&val, IndexedDbError::Request)
    }
}

impl From<serde_wasm_bindgen::Error> for IndexedDbError {
    fn from(err: serde_wasm_bindgen::Error) -> Self {
        IndexedDbError::JsValue(err.to_string())
    }
}

/// Map a thrown JS value onto an error.
///
/// DOMExceptions the memory engine also raises become the matching
/// [`StoreError`], so both engines report a stale version or a broken
/// constraint the same way. Anything else is described and wrapped by
/// `fallback`.
pub(crate) fn classify(
    val: &wasm_bindgen::JsValue,
    fallback: fn(String) -> IndexedDbError,
) -> IndexedDbError {
    use wasm_bindgen::JsCast;

    if let Some(exception) = val.dyn_ref::<web_sys::DomException>() {
        match exception.name().as_str() {
            "VersionError" => return StoreError::Version(exception.message()).into(),
            "ConstraintError" => return StoreError::Constraint(exception.message()).into(),
            _ => {}
        }
    }
    fallback(describe(val))
}

/// Best-effort human readable text for a thrown JS value.
///
/// DOMExceptions carry their detail in `name`/`message`, which
/// `JSON.stringify` drops.
pub(crate) fn describe(val: &wasm_bindgen::JsValue) -> String {
    use wasm_bindgen::JsCast;

    if let Some(exception) = val.dyn_ref::<web_sys::DomException>() {
        return format!("{}: {}", exception.name(), exception.message());
    }
    if let Some(error) = val.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    if let Some(s) = val.as_string() {
        return s;
    }
    js_sys::JSON::stringify(val)
        .map(String::from)
        .unwrap_or_else(|_| format!("{:?}", val))
}
