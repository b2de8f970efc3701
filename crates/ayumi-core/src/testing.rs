//! Testing helpers and fakes.
//!
//! Provides a recording reply sink and an in-memory key-value store.

use crate::event::{ChannelId, UserId};
use crate::reply::{MessageRef, Reply, ReplySink, SinkError};
use crate::storage::{rank_rows, KeyValueStore, StorageError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

/// Reply sink that records every call instead of talking to a platform.
///
/// Sent messages get increasing IDs and can be edited until
/// [`RecordingSink::forget_messages`] simulates their deletion.
#[derive(Default)]
pub struct RecordingSink {
    next_id: AtomicI32,
    sent: Mutex<Vec<(ChannelId, Reply)>>,
    edits: Mutex<Vec<(MessageRef, Reply)>>,
    directs: Mutex<Vec<(UserId, String)>>,
    purges: Mutex<Vec<(ChannelId, Option<i32>, u32)>>,
    live: Mutex<HashSet<MessageRef>>,
    unreachable: Mutex<HashSet<UserId>>,
}

impl RecordingSink {
    /// Every reply sent so far.
    pub fn sent(&self) -> Vec<(ChannelId, Reply)> {
        lock(&self.sent).clone()
    }

    /// Text of the most recent reply.
    pub fn last_text(&self) -> Option<String> {
        lock(&self.sent).last().map(|(_, reply)| reply.text.clone())
    }

    /// Every edit applied so far.
    pub fn edits(&self) -> Vec<(MessageRef, Reply)> {
        lock(&self.edits).clone()
    }

    /// Every direct message sent so far.
    pub fn directs(&self) -> Vec<(UserId, String)> {
        lock(&self.directs).clone()
    }

    /// Every purge request so far.
    pub fn purges(&self) -> Vec<(ChannelId, Option<i32>, u32)> {
        lock(&self.purges).clone()
    }

    /// Pretend every sent message was deleted.
    pub fn forget_messages(&self) {
        lock(&self.live).clear();
    }

    /// Make direct messages to `user` fail as if the user blocked the bot.
    pub fn block_direct(&self, user: UserId) {
        lock(&self.unreachable).insert(user);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn send(&self, channel: ChannelId, reply: Reply) -> Result<MessageRef, SinkError> {
        let message = MessageRef {
            channel,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        };
        lock(&self.sent).push((channel, reply));
        lock(&self.live).insert(message);
        Ok(message)
    }

    async fn edit(&self, message: &MessageRef, reply: Reply) -> Result<(), SinkError> {
        if !lock(&self.live).contains(message) {
            return Err(SinkError::NotFound);
        }
        lock(&self.edits).push((*message, reply));
        Ok(())
    }

    async fn send_direct(&self, user: UserId, text: String) -> Result<MessageRef, SinkError> {
        if lock(&self.unreachable).contains(&user) {
            return Err(SinkError::Forbidden("bot was blocked by the user".to_string()));
        }
        lock(&self.directs).push((user, text));
        Ok(MessageRef {
            channel: ChannelId(user.0),
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    async fn purge(
        &self,
        channel: ChannelId,
        before: Option<i32>,
        count: u32,
    ) -> Result<u32, SinkError> {
        lock(&self.purges).push((channel, before, count));
        Ok(count)
    }
}

/// Key-value store kept in a `HashMap`.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Raw value stored under `key`.
    pub fn raw(&self, key: &str) -> Option<Value> {
        lock(&self.values).get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(lock(&self.values).get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StorageError> {
        lock(&self.values).insert(key.to_string(), value);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        order_by: &str,
        limit: usize,
    ) -> Result<Vec<Value>, StorageError> {
        let value = lock(&self.values).get(collection).cloned();
        Ok(rank_rows(value, order_by, limit))
    }

    async fn check_connection(&self) -> Result<(), String> {
        Ok(())
    }
}
