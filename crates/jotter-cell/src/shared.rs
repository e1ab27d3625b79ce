//! Key-value-backed cell shared across contexts
//!
//! Unlike [`PersistedCell`](crate::PersistedCell), a `SharedCell` keeps
//! no in-memory copy that could drift: every read re-parses the backing
//! store. The version counter exists purely as a change signal for
//! watchers. Writes from other contexts arrive over the [`ChangeBus`];
//! a cell's own writes are never replayed to itself.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bus::{ChangeBus, KeyChange};
use crate::kv::KvStore;

pub struct SharedCell<T> {
    inner: Arc<SharedInner<T>>,
}

struct SharedInner<T> {
    store: Arc<dyn KvStore>,
    bus: ChangeBus,
    key: String,
    /// Identifies this cell's writes on the bus so they are not
    /// replayed to it.
    origin: Uuid,
    default: T,
    version: watch::Sender<u64>,
    watchers: Arc<Watchers>,
}

/// Reference-counted bus subscription, shared between the cell and its
/// watcher handles.
struct Watchers {
    runtime: Handle,
    state: Mutex<WatcherState>,
}

struct WatcherState {
    count: usize,
    listener: Option<JoinHandle<()>>,
}

impl<T> SharedCell<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a cell over `key` in the given store. Seeds the store
    /// with the default when the key is absent. Must be called from
    /// within a tokio runtime.
    pub fn new(store: Arc<dyn KvStore>, bus: ChangeBus, key: &str, default: T) -> Self {
        if store.get(key).is_none() {
            match serde_json::to_string(&default) {
                Ok(payload) => store.set(key, &payload),
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Failed to seed default value")
                }
            }
        }

        let (version, _) = watch::channel(0u64);

        Self {
            inner: Arc::new(SharedInner {
                store,
                bus,
                key: key.to_string(),
                origin: Uuid::new_v4(),
                default,
                version,
                watchers: Arc::new(Watchers {
                    runtime: Handle::current(),
                    state: Mutex::new(WatcherState {
                        count: 0,
                        listener: None,
                    }),
                }),
            }),
        }
    }

    /// Read the current value from the backing store. Missing or
    /// malformed payloads fall back to the default.
    pub fn get(&self) -> T {
        match self.inner.store.get(&self.inner.key) {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        key = %self.inner.key,
                        error = %e,
                        "Malformed stored value, using default"
                    );
                    self.inner.default.clone()
                }
            },
            None => self.inner.default.clone(),
        }
    }

    /// Write through to the backing store, bump the version, and
    /// publish the change for other contexts.
    pub fn set(&self, value: T) {
        let payload = match serde_json::to_string(&value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(key = %self.inner.key, error = %e, "Failed to serialize value");
                return;
            }
        };

        self.inner.store.set(&self.inner.key, &payload);
        self.inner.version.send_modify(|v| *v += 1);
        self.inner.bus.publish(&self.inner.key, self.inner.origin);
    }

    /// Copy-on-write mutation: read, edit, write back through
    /// [`set`](Self::set).
    pub fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let mut value = self.get();
        f(&mut value);
        self.set(value);
    }

    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    /// Start observing the cell.
    ///
    /// The first live watcher subscribes the cell to the bus; the last
    /// one to drop tears the subscription down, deferred by one
    /// scheduling tick so rapid watcher churn does not thrash the
    /// subscription.
    pub fn watch(&self) -> CellWatcher {
        let watchers = Arc::clone(&self.inner.watchers);
        let mut state = watchers.state.lock();
        state.count += 1;
        if state.listener.is_none() {
            // Subscribe before the task starts so nothing published in
            // between is missed.
            let rx = self.inner.bus.subscribe();
            state.listener = Some(
                watchers
                    .runtime
                    .spawn(SharedInner::listen(Arc::clone(&self.inner), rx)),
            );
        }
        drop(state);

        CellWatcher {
            watchers,
            version_rx: self.inner.version.subscribe(),
        }
    }
}

impl<T> Clone for SharedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedInner<T>
where
    T: Send + Sync + 'static,
{
    async fn listen(inner: Arc<Self>, mut rx: broadcast::Receiver<KeyChange>) {
        loop {
            match rx.recv().await {
                Ok(change) => {
                    if change.key == inner.key && change.origin != inner.origin {
                        inner.version.send_modify(|v| *v += 1);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Missed notifications; force watchers to re-read
                    tracing::debug!(key = %inner.key, skipped, "Invalidation bus lagged");
                    inner.version.send_modify(|v| *v += 1);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Handle held by an active consumer of a [`SharedCell`].
pub struct CellWatcher {
    watchers: Arc<Watchers>,
    version_rx: watch::Receiver<u64>,
}

impl CellWatcher {
    /// Version at the last observation point.
    pub fn version(&self) -> u64 {
        *self.version_rx.borrow()
    }

    /// Wait for the next version bump.
    pub async fn changed(&mut self) {
        // The sender lives inside the cell we observe, so this cannot
        // fail while the cell exists.
        let _ = self.version_rx.changed().await;
    }
}

impl Drop for CellWatcher {
    fn drop(&mut self) {
        {
            let mut state = self.watchers.state.lock();
            state.count -= 1;
        }

        let watchers = Arc::clone(&self.watchers);
        self.watchers.runtime.spawn(async move {
            // One tick of grace: a watcher arriving right after the last
            // one dropped keeps the subscription alive.
            tokio::task::yield_now().await;
            let mut state = watchers.state.lock();
            if state.count == 0 {
                if let Some(listener) = state.listener.take() {
                    listener.abort();
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use std::time::Duration;
    use tokio::time::timeout;

    fn setup() -> (Arc<MemoryKv>, ChangeBus) {
        (Arc::new(MemoryKv::new()), ChangeBus::new())
    }

    #[tokio::test]
    async fn test_seeds_default_once() {
        let (kv, bus) = setup();
        let cell = SharedCell::new(kv.clone(), bus.clone(), "draft", "hello".to_string());
        assert_eq!(cell.get(), "hello");
        assert_eq!(kv.write_count(), 1);

        // A second cell over the same key sees the seeded value
        let other = SharedCell::new(kv.clone(), bus, "draft", "ignored".to_string());
        assert_eq!(other.get(), "hello");
        assert_eq!(kv.write_count(), 1);
    }

    #[tokio::test]
    async fn test_set_writes_through() {
        let (kv, bus) = setup();
        let cell = SharedCell::new(kv.clone(), bus, "draft", String::new());

        cell.set("# heading".to_string());
        assert_eq!(cell.get(), "# heading");
        assert_eq!(cell.version(), 1);

        cell.mutate(|d| d.push_str("\nbody"));
        assert_eq!(cell.get(), "# heading\nbody");
        assert_eq!(cell.version(), 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_falls_back_to_default() {
        let (kv, bus) = setup();
        kv.set("flags", "{not json");
        let cell = SharedCell::new(kv.clone(), bus, "flags", vec!["safe".to_string()]);
        assert_eq!(cell.get(), vec!["safe".to_string()]);
    }

    #[tokio::test]
    async fn test_cross_origin_invalidation() {
        let (kv, bus) = setup();
        let writer = SharedCell::new(kv.clone(), bus.clone(), "draft", String::new());
        let reader = SharedCell::new(kv.clone(), bus, "draft", String::new());

        let mut watcher = reader.watch();
        writer.set("from the other context".to_string());

        timeout(Duration::from_secs(1), watcher.changed())
            .await
            .expect("invalidation was not delivered");
        assert_eq!(reader.get(), "from the other context");
    }

    #[tokio::test]
    async fn test_own_writes_are_not_replayed() {
        let (kv, bus) = setup();
        let cell = SharedCell::new(kv, bus, "draft", String::new());

        let _watcher = cell.watch();
        tokio::task::yield_now().await;

        cell.set("local".to_string());
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        // Exactly the local bump; the bus echo was filtered out
        assert_eq!(cell.version(), 1);
    }

    #[tokio::test]
    async fn test_listener_torn_down_after_last_watcher() {
        let (kv, bus) = setup();
        let writer = SharedCell::new(kv.clone(), bus.clone(), "draft", String::new());
        let reader = SharedCell::new(kv, bus, "draft", String::new());

        let first = reader.watch();
        let second = reader.watch();
        tokio::task::yield_now().await;

        drop(first);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        // One watcher remains, invalidation still flows
        writer.set("one".to_string());
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        let seen = reader.version();
        assert!(seen > 0);

        drop(second);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        // No watchers left: external writes no longer bump the version
        writer.set("two".to_string());
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert_eq!(reader.version(), seen);
        // The store itself is still fresh on direct read
        assert_eq!(reader.get(), "two");
    }

    #[tokio::test]
    async fn test_rapid_watcher_churn_keeps_subscription() {
        let (kv, bus) = setup();
        let writer = SharedCell::new(kv.clone(), bus.clone(), "draft", String::new());
        let reader = SharedCell::new(kv, bus, "draft", String::new());

        let first = reader.watch();
        tokio::task::yield_now().await;
        drop(first);
        // New watcher arrives within the teardown grace tick
        let mut second = reader.watch();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        writer.set("still delivered".to_string());
        timeout(Duration::from_secs(1), second.changed())
            .await
            .expect("subscription was torn down during churn");
        assert_eq!(reader.get(), "still delivered");
    }
}
