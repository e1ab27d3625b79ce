//! Database-backed reactive cell with debounced write-back

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use jotter_storage::{Collection, KeySchema, RecordKey};

use crate::error::CellError;
use crate::Result;

/// Quiet period between the last mutation and the durable write.
pub const DEFAULT_WRITE_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct CellOptions {
    /// Debounce interval for scheduled writes.
    pub write_debounce: Duration,
}

impl Default for CellOptions {
    fn default() -> Self {
        Self {
            write_debounce: DEFAULT_WRITE_DEBOUNCE,
        }
    }
}

impl CellOptions {
    pub fn with_debounce(write_debounce: Duration) -> Self {
        Self { write_debounce }
    }
}

/// Single point of truth for one stored value.
///
/// The cell starts loading from its collection immediately on
/// construction and reports the constructor-supplied default until the
/// load completes. Mutations bump a monotonic version counter (the
/// reactivity trigger, never persisted) and schedule a debounced
/// durable write; bursts of rapid mutation collapse into a single
/// backend write carrying the newest value.
///
/// Exactly one cell should exist per collection key per process.
pub struct PersistedCell<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    collection: Collection,
    /// `Some` for field-keyed records; `None` for the single-envelope
    /// auto-id layout, which is located through `list_all`.
    key: Option<RecordKey>,
    value: RwLock<T>,
    version: watch::Sender<u64>,
    ready: watch::Sender<bool>,
    pending: Mutex<Option<JoinHandle<()>>>,
    debounce: Duration,
    runtime: Handle,
}

impl<T> PersistedCell<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create the cell and start its initial load.
    ///
    /// Must be called from within a tokio runtime. For a
    /// [`KeySchema::Field`] collection the record key is derived from
    /// the default value's key field.
    pub fn spawn(collection: Collection, default: T, options: CellOptions) -> Result<Self> {
        let key = match collection.schema() {
            KeySchema::Field(field) => {
                let record = serde_json::to_value(&default)?;
                let key = record
                    .get(field.as_str())
                    .and_then(Value::as_str)
                    .ok_or_else(|| CellError::MissingKeyField(field.clone()))?
                    .to_string();
                Some(RecordKey::Text(key))
            }
            KeySchema::AutoId => None,
        };

        let (version, _) = watch::channel(0u64);
        let (ready, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            collection,
            key,
            value: RwLock::new(default),
            version,
            ready,
            pending: Mutex::new(None),
            debounce: options.write_debounce,
            runtime: Handle::current(),
        });

        inner.runtime.spawn(Inner::initialize(Arc::clone(&inner)));

        Ok(Self { inner })
    }

    /// Clone of the live value; the default while still loading.
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Replace the value, bump the version counter, and schedule a
    /// durable write.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.write();
            *guard = value;
            self.inner.version.send_modify(|v| *v += 1);
        }
        self.schedule_write();
    }

    /// Mutate the value in place.
    ///
    /// This is the explicit dirty-marking path: any nested edit made
    /// through `f` triggers the same version bump and write scheduling
    /// as replacing the whole value.
    pub fn mutate<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let result = {
            let mut guard = self.inner.value.write();
            let result = f(&mut guard);
            self.inner.version.send_modify(|v| *v += 1);
            result
        };
        self.schedule_write();
        result
    }

    /// Current version counter value.
    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    /// Observe version bumps. Receivers re-read [`get`](Self::get) when
    /// the watched value changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    /// Whether the initial load has completed.
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Wait until the initial load has completed. A failed load still
    /// reaches readiness (holding the default), so this never hangs.
    pub async fn wait_ready(&self) {
        let mut rx = self.inner.ready.subscribe();
        // The sender lives as long as the cell, so this cannot fail.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Force a re-fetch from the backend, overwriting in-memory state.
    /// Used to recover after an external change.
    pub fn reload(&self) -> Result<()> {
        if let Some(fresh) = self.inner.load()? {
            let mut guard = self.inner.value.write();
            *guard = fresh;
            self.inner.version.send_modify(|v| *v += 1);
        }
        Ok(())
    }

    /// Remove the backend record. The in-memory value is untouched
    /// until the next reload.
    pub fn delete(&self) -> Result<()> {
        match &self.inner.key {
            Some(key) => self.inner.collection.delete(key)?,
            None => {
                let existing = self.inner.collection.list_all()?;
                if let Some(id) = existing
                    .first()
                    .and_then(|record| record.get("id"))
                    .and_then(Value::as_i64)
                {
                    self.inner.collection.delete(&RecordKey::Auto(id))?;
                }
            }
        }
        Ok(())
    }

    /// Commit the current value immediately, cancelling any pending
    /// debounced write. Intended for deliberate shutdown points.
    pub fn flush(&self) -> Result<()> {
        if let Some(task) = self.inner.pending.lock().take() {
            task.abort();
        }
        let snapshot = serde_json::to_value(&*self.inner.value.read())?;
        self.inner.commit(&snapshot)
    }

    /// Schedule a debounced write of a snapshot frozen now. A newer
    /// mutation cancels the pending timer and replaces the snapshot.
    fn schedule_write(&self) {
        let snapshot = match serde_json::to_value(&*self.inner.value.read()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(
                    collection = %self.inner.collection.name(),
                    error = %e,
                    "Failed to snapshot value for write-back"
                );
                return;
            }
        };

        let inner = Arc::clone(&self.inner);
        let mut pending = self.inner.pending.lock();
        if let Some(task) = pending.take() {
            task.abort();
        }
        *pending = Some(self.inner.runtime.spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            if let Err(e) = inner.commit(&snapshot) {
                tracing::error!(
                    collection = %inner.collection.name(),
                    error = %e,
                    "Debounced write failed; next mutation will retry"
                );
            }
        }));
    }
}

impl<T> Clone for PersistedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Inner<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn initialize(inner: Arc<Self>) {
        eprintln!("INIT start {}", inner.collection.name());
        match inner.load() {
            Ok(Some(loaded)) => {
                let mut value = inner.value.write();
                // A mutation that raced the load wins over stored state.
                if *inner.version.borrow() == 0 {
                    *value = loaded;
                    inner.version.send_modify(|v| *v += 1);
                }
            }
            Ok(None) => {
                if *inner.version.borrow() == 0 {
                    let snapshot = {
                        let value = inner.value.read();
                        serde_json::to_value(&*value)
                    };
                    let persisted = snapshot
                        .map_err(CellError::from)
                        .and_then(|snapshot| inner.commit(&snapshot));
                    if let Err(e) = persisted {
                        tracing::error!(
                            collection = %inner.collection.name(),
                            error = %e,
                            "Failed to persist initial value"
                        );
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    collection = %inner.collection.name(),
                    error = %e,
                    "Initial load failed, keeping default value"
                );
            }
        }

        // Mark ready even after a failed load so callers never hang.
        eprintln!("INIT ready {}", inner.collection.name());
        let _ = inner.ready.send(true);
        tracing::debug!(collection = %inner.collection.name(), "Cell ready");
    }

    fn load(&self) -> Result<Option<T>> {
        let record = match &self.key {
            Some(key) => self.collection.get(key)?,
            None => self.collection.list_all()?.into_iter().next(),
        };

        match record {
            Some(record) => {
                let value = match self.collection.schema() {
                    KeySchema::Field(_) => record,
                    KeySchema::AutoId => record.get("value").cloned().unwrap_or(Value::Null),
                };
                Ok(Some(serde_json::from_value(value)?))
            }
            None => Ok(None),
        }
    }

    fn commit(&self, snapshot: &Value) -> Result<()> {
        match self.collection.schema() {
            KeySchema::Field(_) => {
                self.collection.put(snapshot)?;
            }
            KeySchema::AutoId => {
                // The generated id is never held in memory; re-read it
                // immediately before writing so the envelope keeps its
                // identity.
                let existing = self.collection.list_all()?;
                let record = match existing.first().and_then(|record| record.get("id")) {
                    Some(id) => json!({ "id": id, "value": snapshot }),
                    None => json!({ "value": snapshot }),
                };
                self.collection.put(&record)?;
            }
        }
        Ok(())
    }
}
