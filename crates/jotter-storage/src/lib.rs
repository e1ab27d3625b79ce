//! Jotter Storage Layer
//!
//! SQLite-based durable key-value backend. Values live in dynamically
//! created collections keyed either by a field of the record itself or
//! by an auto-generated envelope id, plus a flat string table for
//! small shared entries.

mod collection;
mod database;
mod error;
mod schema;

pub use collection::{Collection, KeySchema, RecordKey};
pub use database::Database;
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
