//! Note tab data structure

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{DEFAULT_TAB_ID, WELCOME_CONTENT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteTab {
    /// Unique, stable identifier; ends up in URL fragments
    pub id: String,
    /// Display title
    pub title: String,
    /// Current markdown body
    pub content: String,
    /// When the tab was created
    pub created_at: DateTime<Utc>,
    /// Whether `content` has diverged from the saved baseline
    pub has_unsaved_changes: bool,
    /// The saved baseline `content` is compared against
    pub original_content: String,
}

impl NoteTab {
    /// Create a tab with a clean baseline: the given content is what
    /// "saved" means until the next [`mark_saved`](Self::mark_saved).
    pub fn new(id: String, title: String, content: String) -> Self {
        Self {
            id,
            title,
            original_content: content.clone(),
            content,
            created_at: Utc::now(),
            has_unsaved_changes: false,
        }
    }

    /// The tab a fresh session starts with.
    pub fn welcome() -> Self {
        Self::new(
            DEFAULT_TAB_ID.to_string(),
            "Tab 1".to_string(),
            WELCOME_CONTENT.to_string(),
        )
    }

    /// Replace the body and rederive the unsaved-changes flag.
    pub fn set_content(&mut self, content: String) {
        self.has_unsaved_changes = content != self.original_content;
        self.content = content;
    }

    /// Retitling never touches the unsaved-changes flag.
    pub fn set_title(&mut self, title: String) {
        self.title = title;
    }

    /// Commit the current body as the new saved baseline. Idempotent.
    pub fn mark_saved(&mut self) {
        self.original_content = self.content.clone();
        self.has_unsaved_changes = false;
    }
}

/// Tab ids are shared as URL fragments, so they stay within unreserved
/// characters.
pub(crate) fn is_fragment_safe(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
}
