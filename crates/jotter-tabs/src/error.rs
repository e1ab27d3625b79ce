//! Tab error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TabError {
    #[error("Tab not found: {0}")]
    NotFound(String),

    #[error("Cannot close the last remaining tab")]
    LastTab,

    #[error("Cell error: {0}")]
    Cell(#[from] jotter_cell::CellError),

    #[error("Storage error: {0}")]
    Storage(#[from] jotter_storage::StorageError),
}
