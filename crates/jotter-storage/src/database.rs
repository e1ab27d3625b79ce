//! Database connection and the flat key-value surface

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::collection::{Collection, KeySchema};
use crate::schema::{create_base_schema, ensure_collection};
use crate::{Result, StorageError};

/// Handle to the backing SQLite database, shared by all collections.
///
/// Cloning is cheap; all clones use the same connection.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file at `path`.
    ///
    /// Fails with [`StorageError::Unavailable`] when the platform cannot
    /// provide the file, so callers can degrade to an in-memory database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(&path)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        // WAL mode for better concurrent performance
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        create_base_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a volatile database. Nothing survives the process.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        create_base_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open `path`, degrading to an in-memory database when durable
    /// storage is unavailable. The rest of the system keeps functioning;
    /// nothing survives a restart in the degraded mode.
    pub fn open_or_memory<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::open(&path) {
            Ok(db) => Ok(db),
            Err(e) => {
                tracing::warn!(
                    path = %path.as_ref().display(),
                    error = %e,
                    "Durable storage unavailable, falling back to in-memory database"
                );
                Self::open_in_memory()
            }
        }
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Open a collection, creating its backing table on first use.
    ///
    /// Idempotent for a given `(name, schema)` pair. The key schema is
    /// fixed at creation time; reopening with a different schema fails
    /// with [`StorageError::SchemaMismatch`].
    pub fn collection(&self, name: &str, schema: KeySchema) -> Result<Collection> {
        self.transaction(|conn| ensure_collection(conn, name, &schema))?;
        Ok(Collection::new(self.clone(), name.to_string(), schema))
    }

    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        })
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key, value, updated_at],
            )?;
            Ok(())
        })
    }

    pub fn kv_delete(&self, key: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
            Ok(())
        })
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            let count: i32 =
                conn.query_row("SELECT COUNT(*) FROM collections", [], |row| row.get(0))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_kv_roundtrip() {
        let db = Database::open_in_memory().unwrap();

        assert_eq!(db.kv_get("missing").unwrap(), None);

        db.kv_set("scratch", "# notes").unwrap();
        assert_eq!(db.kv_get("scratch").unwrap().as_deref(), Some("# notes"));

        db.kv_set("scratch", "# more notes").unwrap();
        assert_eq!(
            db.kv_get("scratch").unwrap().as_deref(),
            Some("# more notes")
        );

        db.kv_delete("scratch").unwrap();
        assert_eq!(db.kv_get("scratch").unwrap(), None);

        // Deleting an absent key is a no-op
        db.kv_delete("scratch").unwrap();
    }

    #[test]
    fn test_open_or_memory_degrades() {
        // A directory path cannot be opened as a database file
        let db = Database::open_or_memory("/").unwrap();
        db.kv_set("k", "v").unwrap();
        assert_eq!(db.kv_get("k").unwrap().as_deref(), Some("v"));
    }
}
