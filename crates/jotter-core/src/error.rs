//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] jotter_storage::StorageError),

    #[error("Cell error: {0}")]
    Cell(#[from] jotter_cell::CellError),

    #[error("Tab error: {0}")]
    Tab(#[from] jotter_tabs::TabError),
}
