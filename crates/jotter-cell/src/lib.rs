//! Jotter Reactive Cells
//!
//! A cell binds one in-memory value to a durable backing store and
//! keeps observers consistent through a monotonic version counter.
//! [`PersistedCell`] is backed by a storage collection with debounced
//! write-back; [`SharedCell`] is backed by the flat key-value surface
//! and replays changes published by other contexts over a [`ChangeBus`].

mod bus;
mod error;
mod kv;
mod persisted;
mod shared;

pub use bus::{ChangeBus, KeyChange};
pub use error::CellError;
pub use kv::{KvStore, MemoryKv};
pub use persisted::{CellOptions, PersistedCell};
pub use shared::{CellWatcher, SharedCell};

pub type Result<T> = std::result::Result<T, CellError>;
