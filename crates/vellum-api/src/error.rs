use serde::{Deserialize, Serialize};

/// Structured error type shared by the storage engine and the repositories.
///
/// Absence is not an error in this crate: lookups return `Option` and deletes
/// return `bool`. These variants cover genuine failures such as constraint
/// violations and persistence problems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum StoreError {
    #[error("{table} record not found: {uuid}")]
    NotFound { table: String, uuid: String },

    #[error("Duplicate key {key} in table {table}")]
    UniquenessViolation { table: String, key: String },

    #[error("Referential violation: {message}")]
    ReferentialViolation { message: String },

    #[error("Database on disk has schema version {on_disk}, newer than supported version {supported}")]
    SchemaTooNew { on_disk: u32, supported: u32 },

    #[error("Schema error: {message}")]
    Schema { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Storage failure: {message}")]
    Storage { message: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization {
            message: err.to_string(),
        }
    }
}
