//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid collection name: {0}")]
    InvalidName(String),

    #[error("Collection '{name}' already exists with key schema {existing}")]
    SchemaMismatch { name: String, existing: String },

    #[error("Record is missing key field '{0}'")]
    MissingKey(String),

    #[error("Key does not match the collection's key schema: {0}")]
    InvalidKey(String),

    #[error("Malformed record body: {0}")]
    Corrupt(#[from] serde_json::Error),
}
