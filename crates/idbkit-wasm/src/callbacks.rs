//! User callbacks attached to an options object.

use idbkit_indexeddb::IndexedDbError;
use js_sys::Function;
use wasm_bindgen::{JsCast, JsValue};

/// `onsuccess`/`onerror`/`oncomplete` read off a JS options object.
#[derive(Debug, Clone, Default)]
pub(crate) struct Callbacks {
    pub onsuccess: Option<Function>,
    pub onerror: Option<Function>,
    pub oncomplete: Option<Function>,
}

impl Callbacks {
    /// Read the callbacks present on `options`; non-function values are ignored.
    pub fn from_options(options: &JsValue) -> Self {
        Self {
            onsuccess: function(options, "onsuccess"),
            onerror: function(options, "onerror"),
            oncomplete: function(options, "oncomplete"),
        }
    }

    /// Fill a missing `onerror` from the instance default.
    pub fn or_error(mut self, fallback: Option<&Function>) -> Self {
        if self.onerror.is_none() {
            self.onerror = fallback.cloned();
        }
        self
    }

    /// Deliver one result to `onsuccess`.
    ///
    /// Returns `false` when the callback returned `false`, which stops a
    /// cursor. A throwing callback fails the whole call.
    pub fn success(&self, value: &JsValue) -> Result<bool, IndexedDbError> {
        let Some(onsuccess) = &self.onsuccess else {
            return Ok(true);
        };
        let returned = onsuccess.call1(&JsValue::UNDEFINED, value)?;
        Ok(returned != JsValue::FALSE)
    }

    /// Finish a call: `oncomplete()` on success, `onerror(message)` on failure.
    pub fn settle(&self, result: Result<JsValue, IndexedDbError>) -> Result<JsValue, JsValue> {
        match result {
            Ok(value) => {
                self.complete();
                Ok(value)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    pub fn complete(&self) {
        if let Some(oncomplete) = &self.oncomplete {
            if let Err(e) = oncomplete.call0(&JsValue::UNDEFINED) {
                tracing::warn!(error = ?e, "oncomplete threw");
            }
        }
    }

    /// Report a failure to `onerror` and hand back the value to reject with.
    ///
    /// Errors with no `onerror` to receive them are logged.
    pub fn fail(&self, err: IndexedDbError) -> JsValue {
        let message = err.to_string();
        match &self.onerror {
            Some(onerror) => {
                if let Err(e) = onerror.call1(&JsValue::UNDEFINED, &message.as_str().into()) {
                    tracing::warn!(error = ?e, "onerror threw");
                }
            }
            None => tracing::error!(error = %message, "request failed"),
        }
        err.into()
    }
}

fn function(options: &JsValue, name: &str) -> Option<Function> {
    if !options.is_object() {
        return None;
    }
    js_sys::Reflect::get(options, &name.into())
        .ok()
        .and_then(|value| value.dyn_into::<Function>().ok())
}
