use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use crate::error::QueueError;
use crate::models::job::JobId;
use crate::services::keyspace::Keyspace;

/// Ordered index of job ids waiting for a worker, oldest first.
///
/// Entries are candidates only: a worker must win a claim before acting on one.
#[async_trait]
pub trait QueueIndex: Send + Sync {
    /// Insert `id`, or move it to the position for `enqueued_at` if present.
    async fn push(&self, id: JobId, enqueued_at: DateTime<Utc>) -> Result<(), QueueError>;

    /// Oldest id that is not in `skip`.
    async fn peek_oldest(&self, skip: &HashSet<JobId>) -> Result<Option<JobId>, QueueError>;

    /// Returns whether the id was present.
    async fn remove(&self, id: JobId) -> Result<bool, QueueError>;

    async fn len(&self) -> Result<u64, QueueError>;
}

// ─── In-memory ──────────────────────────────────────────────────────────────

/// Position key: enqueue time, then insertion order to break ties.
type Position = (i64, u64);

#[derive(Default)]
struct IndexState {
    order: BTreeMap<Position, JobId>,
    positions: HashMap<JobId, Position>,
    seq: u64,
}

#[derive(Default)]
pub struct InMemoryQueueIndex {
    state: Mutex<IndexState>,
}

impl InMemoryQueueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl QueueIndex for InMemoryQueueIndex {
    async fn push(&self, id: JobId, enqueued_at: DateTime<Utc>) -> Result<(), QueueError> {
        let mut state = self.lock();
        if let Some(old) = state.positions.remove(&id) {
            state.order.remove(&old);
        }
        state.seq += 1;
        let position = (enqueued_at.timestamp_millis(), state.seq);
        state.order.insert(position, id);
        state.positions.insert(id, position);
        Ok(())
    }

    async fn peek_oldest(&self, skip: &HashSet<JobId>) -> Result<Option<JobId>, QueueError> {
        let state = self.lock();
        Ok(state.order.values().find(|id| !skip.contains(*id)).copied())
    }

    async fn remove(&self, id: JobId) -> Result<bool, QueueError> {
        let mut state = self.lock();
        match state.positions.remove(&id) {
            Some(position) => {
                state.order.remove(&position);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn len(&self) -> Result<u64, QueueError> {
        Ok(self.lock().order.len() as u64)
    }
}

// ─── Redis ──────────────────────────────────────────────────────────────────

/// Sorted set of job ids scored by enqueue time in milliseconds.
pub struct RedisQueueIndex {
    client: redis::Client,
    keys: Keyspace,
}

impl RedisQueueIndex {
    pub fn new(client: redis::Client, keys: Keyspace) -> Self {
        Self { client, keys }
    }
}

#[async_trait]
impl QueueIndex for RedisQueueIndex {
    async fn push(&self, id: JobId, enqueued_at: DateTime<Utc>) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn
            .zadd(self.keys.queue(), id.to_string(), enqueued_at.timestamp_millis())
            .await?;
        Ok(())
    }

    async fn peek_oldest(&self, skip: &HashSet<JobId>) -> Result<Option<JobId>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        // Skipped ids may or may not still be indexed, so one extra entry is
        // enough to find the first eligible candidate.
        let stop = skip.len() as isize;
        let members: Vec<String> = conn.zrange(self.keys.queue(), 0, stop).await?;

        for member in members {
            let id: JobId = member
                .parse()
                .map_err(|_| QueueError::Corrupt(format!("queue member {member}")))?;
            if !skip.contains(&id) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    async fn remove(&self, id: JobId) -> Result<bool, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let removed: i64 = conn.zrem(self.keys.queue(), id.to_string()).await?;
        Ok(removed > 0)
    }

    async fn len(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let depth: u64 = conn.zcard(self.keys.queue()).await?;
        Ok(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn peek_returns_oldest_first() {
        let index = InMemoryQueueIndex::new();
        let now = Utc::now();
        let (a, b, c) = (JobId::new(), JobId::new(), JobId::new());

        index.push(b, now + Duration::seconds(1)).await.unwrap();
        index.push(c, now + Duration::seconds(2)).await.unwrap();
        index.push(a, now).await.unwrap();

        assert_eq!(index.peek_oldest(&HashSet::new()).await.unwrap(), Some(a));
        assert_eq!(index.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn equal_timestamps_keep_insertion_order() {
        let index = InMemoryQueueIndex::new();
        let now = Utc::now();
        let (a, b) = (JobId::new(), JobId::new());
        index.push(a, now).await.unwrap();
        index.push(b, now).await.unwrap();
        assert_eq!(index.peek_oldest(&HashSet::new()).await.unwrap(), Some(a));
    }

    #[tokio::test]
    async fn peek_skips_excluded_ids() {
        let index = InMemoryQueueIndex::new();
        let now = Utc::now();
        let (a, b) = (JobId::new(), JobId::new());
        index.push(a, now).await.unwrap();
        index.push(b, now + Duration::seconds(1)).await.unwrap();

        let skip = HashSet::from([a]);
        assert_eq!(index.peek_oldest(&skip).await.unwrap(), Some(b));

        let skip = HashSet::from([a, b]);
        assert_eq!(index.peek_oldest(&skip).await.unwrap(), None);
    }

    #[tokio::test]
    async fn re_push_moves_job_to_the_back() {
        let index = InMemoryQueueIndex::new();
        let now = Utc::now();
        let (a, b) = (JobId::new(), JobId::new());
        index.push(a, now).await.unwrap();
        index.push(b, now + Duration::seconds(1)).await.unwrap();
        index.push(a, now + Duration::seconds(5)).await.unwrap();

        assert_eq!(index.len().await.unwrap(), 2);
        assert_eq!(index.peek_oldest(&HashSet::new()).await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let index = InMemoryQueueIndex::new();
        let id = JobId::new();
        index.push(id, Utc::now()).await.unwrap();
        assert!(index.remove(id).await.unwrap());
        assert!(!index.remove(id).await.unwrap());
        assert_eq!(index.peek_oldest(&HashSet::new()).await.unwrap(), None);
    }
}
