use chrono::Duration;
use std::sync::Arc;

use crate::services::claims::{ClaimRegistry, InMemoryClaimRegistry, RedisClaimRegistry};
use crate::services::clock::Clock;
use crate::services::job_store::{InMemoryJobStore, JobStore, RedisJobStore};
use crate::services::keyspace::Keyspace;
use crate::services::queue::{InMemoryQueueIndex, QueueIndex, RedisQueueIndex};

/// The three shared structures of the queue, injected together into the
/// producer, status reader and batch worker.
#[derive(Clone)]
pub struct QueueBackend {
    pub jobs: Arc<dyn JobStore>,
    pub queue: Arc<dyn QueueIndex>,
    pub claims: Arc<dyn ClaimRegistry>,
    pub clock: Arc<dyn Clock>,
}

impl QueueBackend {
    /// Redis-backed trio sharing one client and key prefix.
    pub fn redis(client: redis::Client, keys: Keyspace, clock: Arc<dyn Clock>, job_ttl: Duration) -> Self {
        Self {
            jobs: Arc::new(RedisJobStore::new(
                client.clone(),
                keys.clone(),
                clock.clone(),
                job_ttl,
            )),
            queue: Arc::new(RedisQueueIndex::new(client.clone(), keys.clone())),
            claims: Arc::new(RedisClaimRegistry::new(client, keys, clock.clone())),
            clock,
        }
    }

    /// Process-local trio for tests and single-node runs.
    pub fn in_memory(clock: Arc<dyn Clock>, job_ttl: Duration) -> Self {
        Self {
            jobs: Arc::new(InMemoryJobStore::new(clock.clone(), job_ttl)),
            queue: Arc::new(InMemoryQueueIndex::new()),
            claims: Arc::new(InMemoryClaimRegistry::new(clock.clone())),
            clock,
        }
    }
}
