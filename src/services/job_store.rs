use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::QueueError;
use crate::models::job::{Job, JobId, OwnerRef};
use crate::models::params::GenerationParams;
use crate::services::clock::Clock;
use crate::services::keyspace::Keyspace;

/// Durable keyed record of every job, with a retention horizon.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Validate `params` and persist a new pending job.
    async fn create(&self, params: GenerationParams, owner: OwnerRef) -> Result<Job, QueueError>;

    /// Fetch a job; expired records are reported as `NotFound`.
    async fn get(&self, id: JobId) -> Result<Job, QueueError>;

    /// Apply `mutate` and write the job back, refreshing `updated_at` and the TTL.
    ///
    /// Only the current claim holder calls this, so there is no compare-and-set.
    async fn update(
        &self,
        id: JobId,
        mutate: &mut (dyn for<'j> FnMut(&'j mut Job) + Send),
    ) -> Result<Job, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

// ─── In-memory ──────────────────────────────────────────────────────────────

pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl InMemoryJobStore {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            clock,
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, Job>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, params: GenerationParams, owner: OwnerRef) -> Result<Job, QueueError> {
        let job = Job::new(params, owner, self.clock.now(), self.ttl)?;
        self.lock().insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Job, QueueError> {
        let now = self.clock.now();
        let mut jobs = self.lock();
        match jobs.get(&id) {
            Some(job) if !job.is_expired(now) => Ok(job.clone()),
            Some(_) => {
                jobs.remove(&id);
                Err(QueueError::NotFound(id))
            }
            None => Err(QueueError::NotFound(id)),
        }
    }

    async fn update(
        &self,
        id: JobId,
        mutate: &mut (dyn for<'j> FnMut(&'j mut Job) + Send),
    ) -> Result<Job, QueueError> {
        let now = self.clock.now();
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(&id)
            .filter(|job| !job.is_expired(now))
            .ok_or(QueueError::NotFound(id))?;
        mutate(job);
        job.touch(now, self.ttl);
        Ok(job.clone())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

// ─── Redis ──────────────────────────────────────────────────────────────────

/// One JSON document per job, written with `SET ... EX ttl`.
pub struct RedisJobStore {
    client: redis::Client,
    keys: Keyspace,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl RedisJobStore {
    pub fn new(client: redis::Client, keys: Keyspace, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            client,
            keys,
            clock,
            ttl,
        }
    }

    async fn write(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job: &Job,
    ) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        let ttl_secs = self.ttl.num_seconds().max(1);
        let _: () = redis::cmd("SET")
            .arg(self.keys.job(job.id))
            .arg(payload)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(conn)
            .await?;
        Ok(())
    }

    async fn read(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        id: JobId,
    ) -> Result<Job, QueueError> {
        let payload: Option<String> = redis::cmd("GET")
            .arg(self.keys.job(id))
            .query_async(conn)
            .await?;
        let payload = payload.ok_or(QueueError::NotFound(id))?;
        let job: Job = serde_json::from_str(&payload)?;
        if job.is_expired(self.clock.now()) {
            return Err(QueueError::NotFound(id));
        }
        Ok(job)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, params: GenerationParams, owner: OwnerRef) -> Result<Job, QueueError> {
        let job = Job::new(params, owner, self.clock.now(), self.ttl)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.write(&mut conn, &job).await?;
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Job, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.read(&mut conn, id).await
    }

    async fn update(
        &self,
        id: JobId,
        mutate: &mut (dyn for<'j> FnMut(&'j mut Job) + Send),
    ) -> Result<Job, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut job = self.read(&mut conn, id).await?;
        mutate(&mut job);
        job.touch(self.clock.now(), self.ttl);
        self.write(&mut conn, &job).await?;
        Ok(job)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
