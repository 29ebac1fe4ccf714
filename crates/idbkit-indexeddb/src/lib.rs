//! IndexedDB backend for idbkit (browser WASM)
//!
//! This crate runs verified idbkit operations against the browser's IndexedDB.
//! Because IndexedDB is inherently asynchronous, [`IndexedDb`] provides async
//! methods that mirror the synchronous `MemoryDatabase` from idbkit-core.
//! Same method names, same inputs, same outputs, same error semantics.
//!
//! Opening a database runs the upgrade planner inside `onupgradeneeded`, so
//! stores and indexes always match the schema once `open` resolves.
//!
//! # Example
//!
//! ```rust,ignore
//! use idbkit_core::{Query, Schema, StoreDef, IndexDef, Write, WriteMode, Entry};
//! use idbkit_indexeddb::IndexedDb;
//! use serde_json::json;
//!
//! let schema = Schema::builder("app", 1)
//!     .store(StoreDef::new("users").key_path("id").index(IndexDef::new("email").unique()))
//!     .build()?;
//! let db = IndexedDb::open(schema).await?;
//!
//! db.write(&Write {
//!     store: "users".into(),
//!     mode: WriteMode::Add,
//!     entries: vec![Entry { value: json!({"id": 1, "email": "a@example.com"}), key: None }],
//! })
//! .await?;
//!
//! let found = db.query(&Query::index("users", "email", "a@example.com")).await?;
//! assert_eq!(found.len(), 1);
//! ```

pub mod convert;
pub mod error;
pub mod idb;
pub mod store;

pub use error::{IndexedDbError, Result};
pub use store::IndexedDb;
