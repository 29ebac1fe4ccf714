//! idbkit browser bindings
//!
//! Exposes the idbkit database wrapper to JavaScript through wasm-bindgen.
//! Configuration crosses the boundary as plain JS objects and is read with
//! `serde-wasm-bindgen`; records come back as plain objects.
//!
//! ```js
//! import init, { IdbKit, initLogging, LogLevel } from "idbkit-wasm";
//!
//! await init();
//! initLogging(LogLevel.Info);
//!
//! const kit = await IdbKit.open({
//!   name: "app",
//!   version: 1,
//!   stores: [{ name: "users", keyPath: "id", indexes: { email: true } }],
//!   onerror: (message) => console.error(message),
//! });
//!
//! await kit.add({ store: "users", value: { id: 1, email: "a@example.com" } });
//! const user = await kit.get({ store: "users", index: "email", key: "a@example.com" });
//! await kit.get({
//!   store: "users",
//!   cursor: { lower: 1, direction: "prev" },
//!   onsuccess: (record) => console.log(record.primaryKey, record.value),
//!   oncomplete: () => console.log("done"),
//! });
//! ```

mod callbacks;
mod init;
mod kit;

use wasm_bindgen::prelude::*;

pub use init::{init_logging, LogLevel};
pub use kit::IdbKit;

/// Get the idbkit version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
