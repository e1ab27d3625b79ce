//! Cell error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CellError {
    #[error("Storage error: {0}")]
    Storage(#[from] jotter_storage::StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Default value is missing key field '{0}'")]
    MissingKeyField(String),
}
