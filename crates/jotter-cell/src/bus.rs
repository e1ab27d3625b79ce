//! External invalidation channel
//!
//! Other contexts holding a cell on the same key publish here after
//! writing to the shared backing store. The channel carries only the
//! key and the writer's origin, never the value; receivers re-read
//! from the store.

use tokio::sync::broadcast;
use uuid::Uuid;

/// Allows for bursty mutation without dropping notifications.
const BUS_CAPACITY: usize = 64;

/// A change notification: some origin wrote the given key.
#[derive(Debug, Clone)]
pub struct KeyChange {
    pub key: String,
    pub origin: Uuid,
}

/// Broadcast channel for key-change notifications across contexts.
#[derive(Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<KeyChange>,
}

impl ChangeBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Best-effort publish; having no subscribers is not an error.
    pub fn publish(&self, key: &str, origin: Uuid) {
        let _ = self.tx.send(KeyChange {
            key: key.to_string(),
            origin,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeyChange> {
        self.tx.subscribe()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
