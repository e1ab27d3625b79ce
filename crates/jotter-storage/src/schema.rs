//! Base schema and the collection registry
//!
//! Collections are created lazily, one table per collection, with the
//! chosen key schema recorded in a registry table. The key schema is
//! fixed once the collection exists.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::collection::KeySchema;
use crate::{Result, StorageError};

pub(crate) fn create_base_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            key_schema TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#,
    )?;

    Ok(())
}

/// Create the backing table for `name` if it does not exist yet and
/// record its key schema. Errors when the collection was created with a
/// different schema.
pub(crate) fn ensure_collection(
    conn: &Connection,
    name: &str,
    schema: &KeySchema,
) -> Result<()> {
    validate_name(name)?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT key_schema FROM collections WHERE name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(existing) = existing {
        if existing != schema.tag() {
            return Err(StorageError::SchemaMismatch {
                name: name.to_string(),
                existing,
            });
        }
        return Ok(());
    }

    match schema {
        KeySchema::Field(_) => {
            conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS "rec_{name}" (
                    key TEXT PRIMARY KEY,
                    body TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
            "#
            ))?;
        }
        KeySchema::AutoId => {
            conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS "rec_{name}" (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    body TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
            "#
            ))?;
        }
    }

    conn.execute(
        "INSERT INTO collections (name, key_schema, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![name, schema.tag(), Utc::now().to_rfc3339()],
    )?;

    tracing::debug!(collection = %name, key_schema = %schema.tag(), "Created collection");

    Ok(())
}

/// Collection names are interpolated into SQL, so only identifier
/// characters are allowed.
fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if head_ok && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}
