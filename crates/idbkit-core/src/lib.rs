//! idbkit core
//!
//! Platform-independent half of idbkit: everything between a caller's
//! configuration objects and the calls made against the host storage engine.
//! It compiles for native targets and for `wasm32`, so the translation logic
//! is tested natively against the in-memory engine.
//!
//! - [`schema`]: declare and normalize a database schema
//! - [`upgrade`]: plan store/index changes for a version upgrade
//! - [`options`]: verify query, write, delete and count option objects
//! - [`query`]: the verified operations handed to an engine
//! - [`key`], [`range`]: keys, key paths and key ranges
//! - [`memory`]: an in-memory engine with the host's semantics
//!
//! # Example
//!
//! ```rust
//! use idbkit_core::{MemoryFactory, QueryConfig, Schema, WriteConfig, WriteMode};
//! use serde_json::json;
//!
//! let schema = Schema::from_json(
//!     r#"{"name":"notes","version":1,"stores":[{"name":"notes","keyPath":"id","indexes":{"tag":false}}]}"#,
//! )
//! .unwrap();
//!
//! let mut factory = MemoryFactory::new();
//! let db = factory.open(schema.clone()).unwrap();
//!
//! let write: WriteConfig =
//!     serde_json::from_value(json!({"store": "notes", "value": {"id": 1, "tag": "todo"}})).unwrap();
//! db.write(&write.verify(&schema, WriteMode::Add).unwrap()).unwrap();
//!
//! let query: QueryConfig =
//!     serde_json::from_value(json!({"store": "notes", "index": "tag", "key": "todo"})).unwrap();
//! let records = db.query(&query.verify(&schema).unwrap()).unwrap();
//! assert_eq!(records[0].value["id"], 1);
//! ```

pub mod error;
pub mod key;
pub mod memory;
pub mod options;
pub mod query;
pub mod range;
pub mod schema;
pub mod upgrade;

pub use error::{StoreError, StoreResult};
pub use key::{Key, KeyPath};
pub use memory::{MemoryDatabase, MemoryFactory};
pub use options::{CountConfig, CursorConfig, DeleteConfig, QueryConfig, WriteConfig};
pub use query::{
    Cursor, Delete, DeleteTarget, Direction, Entry, Mode, Query, Record, Selection, Write,
    WriteMode,
};
pub use range::KeyRange;
pub use schema::{IndexDef, KeyStrategy, Schema, SchemaBuilder, SchemaConfig, StoreDef};
pub use upgrade::{plan_upgrade, StoreSnapshot, UpgradeStep};
