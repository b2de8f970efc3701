//! Per-user activity stats backing the leaderboard.

use crate::event::{Actor, UserId};
use crate::storage::{KeyValueStore, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Storage key of the stats collection.
pub const STATS_COLLECTION: &str = "stats";

/// One user's stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRow {
    /// Who the row belongs to.
    pub user_id: UserId,
    /// Display name at the last recorded command.
    pub name: String,
    /// Leaderboard score.
    pub points: u64,
    /// Number of commands handled.
    pub commands: u64,
    /// Time of the last recorded command.
    pub last_active: DateTime<Utc>,
}

/// Stats kept as one JSON object keyed by user ID.
pub struct StatsLedger {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl StatsLedger {
    /// Ledger persisted in `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Count one command by `actor` and award `points`.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the collection cannot be read or written.
    pub async fn record(&self, actor: &Actor, points: u64) -> Result<StatsRow, StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut rows = match self.store.get(STATS_COLLECTION).await? {
            Some(Value::Object(rows)) => rows,
            Some(_) => {
                warn!("Stats collection is not an object, starting over");
                Map::new()
            }
            None => Map::new(),
        };

        let key = actor.id.to_string();
        let previous = rows
            .get(&key)
            .and_then(|row| serde_json::from_value::<StatsRow>(row.clone()).ok());

        let row = StatsRow {
            user_id: actor.id,
            name: actor.name.clone(),
            points: previous.as_ref().map_or(0, |r| r.points) + points,
            commands: previous.as_ref().map_or(0, |r| r.commands) + 1,
            last_active: Utc::now(),
        };

        rows.insert(key, serde_json::to_value(&row)?);
        self.store.put(STATS_COLLECTION, Value::Object(rows)).await?;
        Ok(row)
    }

    /// The `limit` users with the most points, best first.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the query fails.
    pub async fn top(&self, limit: usize) -> Result<Vec<StatsRow>, StorageError> {
        let rows = self.store.query(STATS_COLLECTION, "points", limit).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect())
    }
}
