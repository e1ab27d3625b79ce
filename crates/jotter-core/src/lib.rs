//! Jotter Core
//!
//! Top-level application context. Stores are constructed explicitly
//! and passed by reference from here; there is no global mutable state.

mod config;
mod error;
mod notebook;

pub use config::Config;
pub use error::CoreError;
pub use notebook::Notebook;

// Re-export core components
pub use jotter_cell::{
    CellError, CellOptions, CellWatcher, ChangeBus, KeyChange, KvStore, MemoryKv, PersistedCell,
    SharedCell,
};
pub use jotter_storage::{Collection, Database, KeySchema, RecordKey, StorageError};
pub use jotter_tabs::{NoteTab, TabError, TabStore};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
