//! Known-peer registry
//!
//! Users the bot has seen at least once. Only known peers may be contacted
//! through direct messages. Membership only grows while the process runs.

use crate::event::UserId;
use crate::storage::{KeyValueStore, StorageError};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Storage key of the persisted peer list.
pub const KNOWN_PEERS_KEY: &str = "known_users";

/// Persisted allow-list of user IDs.
pub struct KnownPeers {
    peers: RwLock<HashSet<UserId>>,
    store: Arc<dyn KeyValueStore>,
    persist_lock: Mutex<()>,
}

impl KnownPeers {
    /// Empty registry backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            peers: RwLock::new(HashSet::new()),
            store,
            persist_lock: Mutex::new(()),
        }
    }

    /// Rebuild the registry from `store`.
    ///
    /// Missing state yields an empty registry. Entries of the list that are
    /// not user IDs are skipped.
    ///
    /// # Errors
    ///
    /// Returns the storage error when the persisted list cannot be read or is
    /// not a list. Starting empty then would let the next `persist` wipe it.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, StorageError> {
        let peers: HashSet<UserId> = match store.get(KNOWN_PEERS_KEY).await? {
            Some(value) => serde_json::from_value::<Vec<Value>>(value)?
                .iter()
                .filter_map(parse_peer)
                .collect(),
            None => HashSet::new(),
        };

        info!(count = peers.len(), "Known peers loaded");
        Ok(Self {
            peers: RwLock::new(peers),
            store,
            persist_lock: Mutex::new(()),
        })
    }

    /// Whether `id` has been seen before.
    pub async fn has(&self, id: UserId) -> bool {
        self.peers.read().await.contains(&id)
    }

    /// Record `id`. Returns `true` if it was not known yet.
    pub async fn add(&self, id: UserId) -> bool {
        let added = self.peers.write().await.insert(id);
        if added {
            debug!(user_id = %id, "New known peer");
        }
        added
    }

    /// Overwrite the persisted list with the current set.
    ///
    /// Concurrent calls are serialized and each one snapshots the set after
    /// taking the lock, so a stale snapshot never lands after a newer one.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write fails.
    pub async fn persist(&self) -> Result<(), StorageError> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.snapshot().await;
        let value = serde_json::to_value(&snapshot)?;
        self.store.put(KNOWN_PEERS_KEY, value).await
    }

    /// Sorted copy of every known ID.
    pub async fn snapshot(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.peers.read().await.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of known peers.
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Whether nobody is known yet.
    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}

// Older deployments stored the IDs as strings.
fn parse_peer(value: &Value) -> Option<UserId> {
    match value {
        Value::Number(n) => n.as_i64().map(UserId),
        Value::String(s) => s.trim().parse().ok().map(UserId),
        _ => None,
    }
}
