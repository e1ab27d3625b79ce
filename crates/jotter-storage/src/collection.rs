//! Record collections
//!
//! A collection stores JSON records under one of two key schemas,
//! chosen explicitly when the collection is created:
//!
//! - [`KeySchema::Field`]: the record is an object carrying its own
//!   string key under the named field.
//! - [`KeySchema::AutoId`]: the record has no natural identity and is
//!   stored in an `{id, value}` envelope with an auto-increment id.

use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::{json, Value};

use crate::database::Database;
use crate::{Result, StorageError};

/// How records in a collection are keyed. Fixed at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySchema {
    /// Records carry their own key in this field.
    Field(String),
    /// Records are wrapped in an auto-increment `{id, value}` envelope.
    AutoId,
}

impl KeySchema {
    /// Stable tag recorded in the collection registry.
    pub(crate) fn tag(&self) -> String {
        match self {
            KeySchema::Field(field) => format!("field:{field}"),
            KeySchema::AutoId => "auto".to_string(),
        }
    }
}

/// Key of a stored record, matching the collection's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Text(String),
    Auto(i64),
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::Text(key) => write!(f, "{key}"),
            RecordKey::Auto(id) => write!(f, "#{id}"),
        }
    }
}

/// Handle to one record collection.
#[derive(Clone)]
pub struct Collection {
    db: Database,
    name: String,
    schema: KeySchema,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish()
    }
}

impl Collection {
    pub(crate) fn new(db: Database, name: String, schema: KeySchema) -> Self {
        Self { db, name, schema }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &KeySchema {
        &self.schema
    }

    fn table(&self) -> String {
        format!("\"rec_{}\"", self.name)
    }

    /// Fetch a record by key. A miss is `Ok(None)`, never an error.
    pub fn get(&self, key: &RecordKey) -> Result<Option<Value>> {
        match (&self.schema, key) {
            (KeySchema::Field(_), RecordKey::Text(k)) => self.db.with_connection(|conn| {
                let body: Option<String> = conn
                    .query_row(
                        &format!("SELECT body FROM {} WHERE key = ?1", self.table()),
                        [k],
                        |row| row.get(0),
                    )
                    .optional()?;

                match body {
                    Some(body) => Ok(Some(serde_json::from_str(&body)?)),
                    None => Ok(None),
                }
            }),
            (KeySchema::AutoId, RecordKey::Auto(id)) => self.db.with_connection(|conn| {
                let body: Option<String> = conn
                    .query_row(
                        &format!("SELECT body FROM {} WHERE id = ?1", self.table()),
                        [id],
                        |row| row.get(0),
                    )
                    .optional()?;

                match body {
                    Some(body) => {
                        let value: Value = serde_json::from_str(&body)?;
                        Ok(Some(json!({ "id": id, "value": value })))
                    }
                    None => Ok(None),
                }
            }),
            _ => Err(StorageError::InvalidKey(key.to_string())),
        }
    }

    /// Upsert a record, overwriting any record sharing the same key.
    ///
    /// With a [`KeySchema::Field`] schema the key is taken from the
    /// record itself. With [`KeySchema::AutoId`] the record is an
    /// envelope: `{value}` inserts a fresh row and returns its generated
    /// id, `{id, value}` overwrites the row with that id.
    pub fn put(&self, record: &Value) -> Result<RecordKey> {
        let updated_at = Utc::now().to_rfc3339();

        match &self.schema {
            KeySchema::Field(field) => {
                let key = record
                    .get(field)
                    .and_then(Value::as_str)
                    .ok_or_else(|| StorageError::MissingKey(field.clone()))?
                    .to_string();
                let body = serde_json::to_string(record)?;

                self.db.with_connection(|conn| {
                    conn.execute(
                        &format!(
                            "INSERT OR REPLACE INTO {} (key, body, updated_at) VALUES (?1, ?2, ?3)",
                            self.table()
                        ),
                        rusqlite::params![key, body, updated_at],
                    )?;
                    Ok(())
                })?;

                Ok(RecordKey::Text(key))
            }
            KeySchema::AutoId => {
                let value = record
                    .get("value")
                    .ok_or_else(|| StorageError::MissingKey("value".to_string()))?;
                let body = serde_json::to_string(value)?;

                match record.get("id").and_then(Value::as_i64) {
                    Some(id) => {
                        self.db.with_connection(|conn| {
                            conn.execute(
                                &format!(
                                    "INSERT OR REPLACE INTO {} (id, body, updated_at) VALUES (?1, ?2, ?3)",
                                    self.table()
                                ),
                                rusqlite::params![id, body, updated_at],
                            )?;
                            Ok(())
                        })?;
                        Ok(RecordKey::Auto(id))
                    }
                    None => {
                        let id = self.db.with_connection(|conn| {
                            conn.execute(
                                &format!(
                                    "INSERT INTO {} (body, updated_at) VALUES (?1, ?2)",
                                    self.table()
                                ),
                                rusqlite::params![body, updated_at],
                            )?;
                            Ok(conn.last_insert_rowid())
                        })?;
                        Ok(RecordKey::Auto(id))
                    }
                }
            }
        }
    }

    /// Remove a record. A no-op when the key is absent.
    pub fn delete(&self, key: &RecordKey) -> Result<()> {
        match (&self.schema, key) {
            (KeySchema::Field(_), RecordKey::Text(k)) => self.db.with_connection(|conn| {
                conn.execute(
                    &format!("DELETE FROM {} WHERE key = ?1", self.table()),
                    [k],
                )?;
                Ok(())
            }),
            (KeySchema::AutoId, RecordKey::Auto(id)) => self.db.with_connection(|conn| {
                conn.execute(
                    &format!("DELETE FROM {} WHERE id = ?1", self.table()),
                    [id],
                )?;
                Ok(())
            }),
            _ => Err(StorageError::InvalidKey(key.to_string())),
        }
    }

    /// All records in key order. Auto-id records come back as their
    /// `{id, value}` envelopes.
    pub fn list_all(&self) -> Result<Vec<Value>> {
        match &self.schema {
            KeySchema::Field(_) => self.db.with_connection(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT body FROM {} ORDER BY key",
                    self.table()
                ))?;
                let bodies: Vec<String> = stmt
                    .query_map([], |row| row.get(0))?
                    .filter_map(|r| r.ok())
                    .collect();

                let mut records = Vec::with_capacity(bodies.len());
                for body in bodies {
                    records.push(serde_json::from_str(&body)?);
                }
                Ok(records)
            }),
            KeySchema::AutoId => self.db.with_connection(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, body FROM {} ORDER BY id",
                    self.table()
                ))?;
                let rows: Vec<(i64, String)> = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .filter_map(|r| r.ok())
                    .collect();

                let mut records = Vec::with_capacity(rows.len());
                for (id, body) in rows {
                    let value: Value = serde_json::from_str(&body)?;
                    records.push(json!({ "id": id, "value": value }));
                }
                Ok(records)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_collection(db: &Database) -> Collection {
        db.collection("notes", KeySchema::Field("id".to_string()))
            .unwrap()
    }

    #[test]
    fn test_collection_open_is_idempotent() {
        let db = Database::open_in_memory().unwrap();

        let a = field_collection(&db);
        a.put(&json!({"id": "n1", "body": "hello"})).unwrap();

        // Reopening with the same schema sees the same records
        let b = field_collection(&db);
        assert_eq!(b.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_schema_is_fixed_at_creation() {
        let db = Database::open_in_memory().unwrap();
        field_collection(&db);

        let err = db.collection("notes", KeySchema::AutoId).unwrap_err();
        assert!(matches!(err, StorageError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_field_schema_crud() {
        let db = Database::open_in_memory().unwrap();
        let notes = field_collection(&db);

        let key = notes
            .put(&json!({"id": "n1", "title": "first"}))
            .unwrap();
        assert_eq!(key, RecordKey::Text("n1".to_string()));

        let record = notes.get(&key).unwrap().unwrap();
        assert_eq!(record["title"], "first");

        // Upsert overwrites the record sharing the key
        notes.put(&json!({"id": "n1", "title": "second"})).unwrap();
        let record = notes.get(&key).unwrap().unwrap();
        assert_eq!(record["title"], "second");
        assert_eq!(notes.list_all().unwrap().len(), 1);

        notes.delete(&key).unwrap();
        assert_eq!(notes.get(&key).unwrap(), None);

        // Deleting again is a no-op
        notes.delete(&key).unwrap();
    }

    #[test]
    fn test_field_schema_requires_key_field() {
        let db = Database::open_in_memory().unwrap();
        let notes = field_collection(&db);

        let err = notes.put(&json!({"title": "keyless"})).unwrap_err();
        assert!(matches!(err, StorageError::MissingKey(_)));

        let err = notes.put(&json!({"id": 7, "title": "numeric"})).unwrap_err();
        assert!(matches!(err, StorageError::MissingKey(_)));
    }

    #[test]
    fn test_auto_id_envelope() {
        let db = Database::open_in_memory().unwrap();
        let cell = db.collection("session", KeySchema::AutoId).unwrap();

        let key = cell.put(&json!({"value": ["a", "b"]})).unwrap();
        let RecordKey::Auto(id) = key else {
            panic!("auto collection returned a text key");
        };

        let records = cell.list_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], id);
        assert_eq!(records[0]["value"], json!(["a", "b"]));

        // Writing through the envelope preserves the generated id
        cell.put(&json!({"id": id, "value": ["a", "b", "c"]}))
            .unwrap();
        let records = cell.list_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], id);
        assert_eq!(records[0]["value"], json!(["a", "b", "c"]));

        cell.delete(&RecordKey::Auto(id)).unwrap();
        assert!(cell.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_key_must_match_schema() {
        let db = Database::open_in_memory().unwrap();
        let cell = db.collection("session", KeySchema::AutoId).unwrap();

        let err = cell.get(&RecordKey::Text("n1".to_string())).unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
