//! Error types shared by every idbkit backend

use thiserror::Error;

/// Errors raised while validating configuration or executing an operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A required configuration field is absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Database version is zero or otherwise unusable
    #[error("invalid version {0}: must be a positive integer")]
    InvalidVersion(u64),

    /// Two stores in one schema share a name
    #[error("duplicate object store: {0}")]
    DuplicateStore(String),

    /// Two indexes on one store share a name
    #[error("duplicate index '{index}' on store '{store}'")]
    DuplicateIndex { store: String, index: String },

    /// A store declares both a key path and auto-increment
    #[error("store '{0}' declares both keyPath and autoIncrement")]
    ConflictingKeyStrategy(String),

    /// Store is not part of the schema or the database
    #[error("unknown object store: {0}")]
    UnknownStore(String),

    /// Index is not declared on the store
    #[error("unknown index '{index}' on store '{store}'")]
    UnknownIndex { store: String, index: String },

    /// Value cannot be used as a key
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Key range bounds are inconsistent
    #[error("invalid key range: {0}")]
    InvalidRange(String),

    /// Option object is malformed
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Write would break a uniqueness constraint
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Requested version is older than the stored one
    #[error("version error: {0}")]
    Version(String),

    /// Operation on a closed connection
    #[error("database connection is closed: {0}")]
    Closed(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for idbkit operations
pub type StoreResult<T> = Result<T, StoreError>;
