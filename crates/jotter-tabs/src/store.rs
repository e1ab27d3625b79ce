//! Tab session store
//!
//! All operations read-modify-write the whole collection through one
//! persisted cell; there are no partial backend updates. The active-tab
//! pointer is intentionally not persisted: which tab is open is not
//! durable user data, and every launch starts on the default tab.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

use jotter_cell::{CellOptions, PersistedCell};
use jotter_storage::{Database, KeySchema};

use crate::content::{DEFAULT_TAB_CONTENT, DEFAULT_TAB_ID};
use crate::error::TabError;
use crate::tab::NoteTab;
use crate::Result;

/// Collection holding the tab list. The list is an array without a
/// natural key, so it lives in an auto-id envelope.
const TABS_COLLECTION: &str = "note_tabs";

pub struct TabStore {
    cell: PersistedCell<Vec<NoteTab>>,
    active: Arc<RwLock<String>>,
}

impl TabStore {
    /// Open the store, loading persisted tabs in the background. A
    /// fresh database starts with the welcome tab.
    pub fn open(db: &Database, options: CellOptions) -> Result<Self> {
        let collection = db.collection(TABS_COLLECTION, KeySchema::AutoId)?;
        let cell = PersistedCell::spawn(collection, vec![NoteTab::welcome()], options)?;

        Ok(Self {
            cell,
            active: Arc::new(RwLock::new(DEFAULT_TAB_ID.to_string())),
        })
    }

    /// Wait until persisted tabs have been loaded.
    pub async fn wait_ready(&self) {
        self.cell.wait_ready().await;
    }

    /// Snapshot of all tabs in display order.
    pub fn tabs(&self) -> Vec<NoteTab> {
        self.cell.get()
    }

    pub fn active_tab_id(&self) -> String {
        self.active.read().clone()
    }

    /// Append a new tab and make it active. Ids derive from the current
    /// time in milliseconds, bumped on collision.
    pub fn add_tab(&self) -> NoteTab {
        let tab = self.cell.mutate(|tabs| {
            let tab = NoteTab::new(
                next_tab_id(tabs),
                format!("Tab {}", tabs.len() + 1),
                DEFAULT_TAB_CONTENT.to_string(),
            );
            tabs.push(tab.clone());
            tab
        });

        *self.active.write() = tab.id.clone();
        tracing::info!(tab_id = %tab.id, "Created new tab");

        tab
    }

    /// Remove a tab.
    ///
    /// The last remaining tab cannot be removed. When the target has
    /// unsaved changes, `confirm_discard` decides whether the removal
    /// proceeds; declining returns `Ok(false)` with nothing changed.
    /// Removing the active tab repoints activation to the first
    /// remaining tab.
    pub fn remove_tab<F>(&self, id: &str, confirm_discard: F) -> Result<bool>
    where
        F: FnOnce(&NoteTab) -> bool,
    {
        let tabs = self.cell.get();
        if tabs.len() <= 1 {
            return Err(TabError::LastTab);
        }

        let target = tabs
            .iter()
            .find(|tab| tab.id == id)
            .ok_or_else(|| TabError::NotFound(id.to_string()))?;

        if target.has_unsaved_changes && !confirm_discard(target) {
            tracing::debug!(tab_id = %id, "Tab removal declined");
            return Ok(false);
        }

        self.cell.mutate(|tabs| tabs.retain(|tab| tab.id != id));

        {
            let mut active = self.active.write();
            if *active == id {
                if let Some(first) = self.cell.get().first() {
                    *active = first.id.clone();
                }
            }
        }

        tracing::info!(tab_id = %id, "Closed tab");
        Ok(true)
    }

    /// Point activation at `id`.
    ///
    /// The id is not checked for existence: callers pass ids they
    /// obtained from this store, and [`get_active_tab`](Self::get_active_tab)
    /// repairs dangling ids on read.
    pub fn set_active_tab(&self, id: &str) {
        *self.active.write() = id.to_string();
    }

    /// Replace a tab's body, rederiving its unsaved-changes flag.
    pub fn update_tab_content(&self, id: &str, content: String) -> Result<()> {
        self.with_tab(id, |tab| tab.set_content(content))
    }

    pub fn update_tab_title(&self, id: &str, title: String) -> Result<()> {
        self.with_tab(id, |tab| tab.set_title(title))
    }

    /// Commit a tab's current body as its saved baseline.
    pub fn mark_tab_as_saved(&self, id: &str) -> Result<()> {
        self.with_tab(id, |tab| tab.mark_saved())
    }

    /// The active tab, falling back to the default tab id and then the
    /// first tab. `Some` whenever the collection is non-empty.
    pub fn get_active_tab(&self) -> Option<NoteTab> {
        let tabs = self.cell.get();
        let active = self.active.read().clone();

        tabs.iter()
            .find(|tab| tab.id == active)
            .or_else(|| tabs.iter().find(|tab| tab.id == DEFAULT_TAB_ID))
            .or_else(|| tabs.first())
            .cloned()
    }

    /// Version counter of the underlying cell; bumps on every mutation.
    pub fn version(&self) -> u64 {
        self.cell.version()
    }

    /// Observe mutations; re-read through the accessors on change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.cell.subscribe()
    }

    /// Commit the tab list immediately instead of waiting out the
    /// debounce interval.
    pub fn flush(&self) -> Result<()> {
        self.cell.flush()?;
        Ok(())
    }

    /// Re-fetch the tab list from the backend, discarding memory state.
    pub fn reload(&self) -> Result<()> {
        self.cell.reload()?;
        Ok(())
    }

    fn with_tab<F>(&self, id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut NoteTab),
    {
        if !self.cell.get().iter().any(|tab| tab.id == id) {
            return Err(TabError::NotFound(id.to_string()));
        }

        self.cell.mutate(|tabs| {
            if let Some(tab) = tabs.iter_mut().find(|tab| tab.id == id) {
                f(tab);
            }
        });
        Ok(())
    }
}

impl Clone for TabStore {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

fn next_tab_id(tabs: &[NoteTab]) -> String {
    let mut millis = Utc::now().timestamp_millis();
    loop {
        let id = format!("tab-{millis}");
        if !tabs.iter().any(|tab| tab.id == id) {
            return id;
        }
        millis += 1;
    }
}
