//! The notebook context
//!
//! Owns the database and every store built on it. Embedders construct
//! one `Notebook` and pass it (or its stores) down by reference.

use std::sync::Arc;

use jotter_cell::{CellOptions, ChangeBus, SharedCell};
use jotter_storage::Database;
use jotter_tabs::TabStore;

use crate::config::Config;
use crate::Result;

/// Key of the shared markdown scratch note in the flat store.
const SCRATCH_KEY: &str = "scratch_note";

pub struct Notebook {
    db: Database,
    tabs: TabStore,
    bus: ChangeBus,
    scratch: SharedCell<String>,
}

impl Notebook {
    /// Open the notebook at the configured database path.
    ///
    /// When durable storage is unavailable this degrades to an
    /// in-memory database: everything keeps working, nothing survives
    /// a restart. Must be called from within a tokio runtime.
    pub fn open(config: Config) -> Result<Self> {
        let db = Database::open_or_memory(&config.database_path)?;
        Self::with_database(db, &config, ChangeBus::new())
    }

    /// Build a notebook over an existing database and invalidation bus.
    /// Contexts sharing a bus replay each other's shared-cell writes.
    pub fn with_database(db: Database, config: &Config, bus: ChangeBus) -> Result<Self> {
        let tabs = TabStore::open(&db, CellOptions::with_debounce(config.write_debounce))?;
        let scratch = SharedCell::new(
            Arc::new(db.clone()),
            bus.clone(),
            SCRATCH_KEY,
            String::new(),
        );

        tracing::info!(
            database = %config.database_path.display(),
            "Opened notebook"
        );

        Ok(Self {
            db,
            tabs,
            bus,
            scratch,
        })
    }

    pub fn tabs(&self) -> &TabStore {
        &self.tabs
    }

    /// The markdown draft shared across contexts.
    pub fn scratch(&self) -> &SharedCell<String> {
        &self.scratch
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Wait for the persisted stores to finish their initial load.
    pub async fn wait_ready(&self) {
        self.tabs.wait_ready().await;
    }

    /// Commit pending tab edits now. Intended for shutdown paths;
    /// anything still inside the debounce window would otherwise be
    /// lost with the process.
    pub fn flush(&self) -> Result<()> {
        self.tabs.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            database_path: PathBuf::from(":memory:"),
            write_debounce: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_open_notebook() {
        let db = Database::open_in_memory().unwrap();
        let notebook = Notebook::with_database(db, &test_config(), ChangeBus::new()).unwrap();
        notebook.wait_ready().await;

        let tabs = notebook.tabs().tabs();
        assert_eq!(tabs.len(), 1);
        assert_eq!(notebook.scratch().get(), "");
    }

    #[tokio::test]
    async fn test_degrades_when_storage_unavailable() {
        // A directory path cannot be opened as a database file
        let config = Config {
            database_path: PathBuf::from("/"),
            write_debounce: Duration::from_millis(20),
        };

        let notebook = Notebook::open(config).unwrap();
        notebook.wait_ready().await;

        notebook.tabs().add_tab();
        assert_eq!(notebook.tabs().tabs().len(), 2);
    }

    #[tokio::test]
    async fn test_scratch_note_is_shared_across_contexts() {
        let db = Database::open_in_memory().unwrap();
        let bus = ChangeBus::new();
        let config = test_config();

        let writer = Notebook::with_database(db.clone(), &config, bus.clone()).unwrap();
        let reader = Notebook::with_database(db, &config, bus).unwrap();
        writer.wait_ready().await;
        reader.wait_ready().await;

        let mut watcher = reader.scratch().watch();
        writer.scratch().set("# shared draft".to_string());

        tokio::time::timeout(Duration::from_secs(1), watcher.changed())
            .await
            .expect("invalidation was not delivered");
        assert_eq!(reader.scratch().get(), "# shared draft");
    }

    #[tokio::test]
    async fn test_flush_commits_pending_edits() {
        let db = Database::open_in_memory().unwrap();
        let config = test_config();

        let notebook =
            Notebook::with_database(db.clone(), &config, ChangeBus::new()).unwrap();
        notebook.wait_ready().await;
        notebook
            .tabs()
            .update_tab_content("tab-1", "about to shut down".to_string())
            .unwrap();
        notebook.flush().unwrap();

        let reopened = Notebook::with_database(db, &config, ChangeBus::new()).unwrap();
        reopened.wait_ready().await;
        assert_eq!(
            reopened.tabs().tabs()[0].content,
            "about to shut down"
        );
    }
}
