//! Jotter Tab Management
//!
//! Note tabs are markdown documents with unsaved-change tracking. The
//! whole collection lives in one persisted cell; which tab is open is
//! deliberately ephemeral and resets on every launch.

mod content;
mod error;
mod store;
mod tab;

pub use content::{DEFAULT_TAB_CONTENT, DEFAULT_TAB_ID, WELCOME_CONTENT};
pub use error::TabError;
pub use store::TabStore;
pub use tab::NoteTab;

pub type Result<T> = std::result::Result<T, TabError>;
