//! Version upgrade planning
//!
//! Stores and indexes may only change while the host engine runs a
//! version-change transaction. Both engines snapshot what already exists,
//! ask [`plan_upgrade`] for the steps, and apply them in order.

use crate::schema::{IndexDef, KeyStrategy, Schema, StoreDef};

/// What an existing object store looks like at upgrade time.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub name: String,
    pub key: KeyStrategy,
    pub indexes: Vec<IndexDef>,
}

/// One schema change to apply inside the version-change transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum UpgradeStep {
    /// Create the store together with all of its indexes
    CreateStore(StoreDef),
    DeleteStore(String),
    CreateIndex { store: String, index: IndexDef },
    DeleteIndex { store: String, index: String },
}

/// Compute the steps that bring `existing` in line with `schema`.
///
/// Deletions come first so that a changed index can be recreated under the
/// same name. A store whose key strategy differs from the declaration is
/// kept as is; key strategies never change after creation.
pub fn plan_upgrade(schema: &Schema, existing: &[StoreSnapshot]) -> Vec<UpgradeStep> {
    let mut steps = Vec::new();

    if schema.prune() {
        for snapshot in existing {
            if schema.store(&snapshot.name).is_err() {
                steps.push(UpgradeStep::DeleteStore(snapshot.name.clone()));
            }
        }
    }

    for store in schema.stores() {
        let Some(snapshot) = existing.iter().find(|s| s.name == store.name) else {
            steps.push(UpgradeStep::CreateStore(store.clone()));
            continue;
        };

        if snapshot.key != store.key {
            tracing::warn!(
                store = %store.name,
                declared = ?store.key,
                actual = ?snapshot.key,
                "key strategy differs from declaration; keeping existing store"
            );
        }

        for current in &snapshot.indexes {
            match store.indexes.iter().find(|i| i.name == current.name) {
                Some(declared) if declared != current => {
                    steps.push(UpgradeStep::DeleteIndex {
                        store: store.name.clone(),
                        index: current.name.clone(),
                    });
                }
                None if schema.prune() => {
                    steps.push(UpgradeStep::DeleteIndex {
                        store: store.name.clone(),
                        index: current.name.clone(),
                    });
                }
                _ => {}
            }
        }

        for declared in &store.indexes {
            let unchanged = snapshot.indexes.iter().any(|i| i == declared);
            if !unchanged {
                steps.push(UpgradeStep::CreateIndex {
                    store: store.name.clone(),
                    index: declared.clone(),
                });
            }
        }
    }

    steps
}
