use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::job::JobId;
use crate::services::clock::{to_chrono, Clock};
use crate::services::keyspace::Keyspace;

/// Proof that the holder owns a job until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub job_id: JobId,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Granted(Lease),
    AlreadyHeld,
}

/// Lease-based mutual exclusion over job ids.
///
/// `try_claim` is the only point where two workers race; everything else
/// in the queue trusts a granted lease.
#[async_trait]
pub trait ClaimRegistry: Send + Sync {
    /// Atomically take the claim if nobody holds a live one.
    async fn try_claim(&self, id: JobId, lease_for: Duration) -> Result<ClaimOutcome, QueueError>;

    /// Push the deadline out. Fails with `LeaseLost` if the claim expired or
    /// now belongs to someone else.
    async fn renew(&self, lease: &mut Lease, lease_for: Duration) -> Result<(), QueueError>;

    /// Drop the claim if the token still matches. Returns whether it did.
    async fn release(&self, lease: &Lease) -> Result<bool, QueueError>;

    /// Ids whose lease ran out without a release. Each expiry is reported once.
    async fn reap_expired(&self) -> Result<Vec<JobId>, QueueError>;
}

// ─── In-memory ──────────────────────────────────────────────────────────────

pub struct InMemoryClaimRegistry {
    leases: Mutex<HashMap<JobId, Lease>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryClaimRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, Lease>> {
        self.leases.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ClaimRegistry for InMemoryClaimRegistry {
    async fn try_claim(&self, id: JobId, lease_for: Duration) -> Result<ClaimOutcome, QueueError> {
        let now = self.clock.now();
        let mut leases = self.lock();
        if leases.get(&id).is_some_and(|held| held.expires_at > now) {
            return Ok(ClaimOutcome::AlreadyHeld);
        }

        let lease = Lease {
            job_id: id,
            token: Uuid::new_v4(),
            expires_at: now + to_chrono(lease_for),
        };
        leases.insert(id, lease.clone());
        Ok(ClaimOutcome::Granted(lease))
    }

    async fn renew(&self, lease: &mut Lease, lease_for: Duration) -> Result<(), QueueError> {
        let now = self.clock.now();
        let mut leases = self.lock();
        match leases.get_mut(&lease.job_id) {
            Some(held) if held.token == lease.token && held.expires_at > now => {
                held.expires_at = now + to_chrono(lease_for);
                lease.expires_at = held.expires_at;
                Ok(())
            }
            _ => Err(QueueError::LeaseLost(lease.job_id)),
        }
    }

    async fn release(&self, lease: &Lease) -> Result<bool, QueueError> {
        let mut leases = self.lock();
        if leases
            .get(&lease.job_id)
            .is_some_and(|held| held.token == lease.token)
        {
            leases.remove(&lease.job_id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn reap_expired(&self) -> Result<Vec<JobId>, QueueError> {
        let now = self.clock.now();
        let mut leases = self.lock();
        let expired: Vec<JobId> = leases
            .values()
            .filter(|lease| lease.expires_at <= now)
            .map(|lease| lease.job_id)
            .collect();
        for id in &expired {
            leases.remove(id);
        }
        Ok(expired)
    }
}

// ─── Redis ──────────────────────────────────────────────────────────────────

/// SET NX PX on the claim key and record the deadline in the in-flight set.
const CLAIM_SCRIPT: &str = r#"
if redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2]) then
    redis.call('ZADD', KEYS[2], ARGV[3], ARGV[4])
    return 1
end
return 0
"#;

const RENEW_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    redis.call('ZADD', KEYS[2], ARGV[3], ARGV[4])
    return 1
end
return 0
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('DEL', KEYS[1])
    redis.call('ZREM', KEYS[2], ARGV[2])
    return 1
end
return 0
"#;

/// Drop an in-flight entry only if its claim key is gone and the recorded
/// deadline has not been pushed past `now` by a newer holder.
const REAP_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
local deadline = redis.call('ZSCORE', KEYS[2], ARGV[1])
if deadline and tonumber(deadline) <= tonumber(ARGV[2]) then
    redis.call('ZREM', KEYS[2], ARGV[1])
    return 1
end
return 0
"#;

/// Claims live in `{prefix}:claim:{id}` with a native expiry; the in-flight
/// sorted set remembers which ids were claimed so expired ones can be found.
pub struct RedisClaimRegistry {
    client: redis::Client,
    keys: Keyspace,
    clock: Arc<dyn Clock>,
    claim: redis::Script,
    renew: redis::Script,
    release: redis::Script,
    reap: redis::Script,
}

impl RedisClaimRegistry {
    pub fn new(client: redis::Client, keys: Keyspace, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            keys,
            clock,
            claim: redis::Script::new(CLAIM_SCRIPT),
            renew: redis::Script::new(RENEW_SCRIPT),
            release: redis::Script::new(RELEASE_SCRIPT),
            reap: redis::Script::new(REAP_SCRIPT),
        }
    }
}

fn lease_millis(lease_for: Duration) -> u64 {
    (lease_for.as_millis() as u64).max(1)
}

#[async_trait]
impl ClaimRegistry for RedisClaimRegistry {
    async fn try_claim(&self, id: JobId, lease_for: Duration) -> Result<ClaimOutcome, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let token = Uuid::new_v4();
        let expires_at = self.clock.now() + to_chrono(lease_for);

        let granted: i64 = self
            .claim
            .key(self.keys.claim(id))
            .key(self.keys.inflight())
            .arg(token.to_string())
            .arg(lease_millis(lease_for))
            .arg(expires_at.timestamp_millis())
            .arg(id.to_string())
            .invoke_async(&mut conn)
            .await?;

        if granted == 1 {
            Ok(ClaimOutcome::Granted(Lease {
                job_id: id,
                token,
                expires_at,
            }))
        } else {
            Ok(ClaimOutcome::AlreadyHeld)
        }
    }

    async fn renew(&self, lease: &mut Lease, lease_for: Duration) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let expires_at = self.clock.now() + to_chrono(lease_for);

        let renewed: i64 = self
            .renew
            .key(self.keys.claim(lease.job_id))
            .key(self.keys.inflight())
            .arg(lease.token.to_string())
            .arg(lease_millis(lease_for))
            .arg(expires_at.timestamp_millis())
            .arg(lease.job_id.to_string())
            .invoke_async(&mut conn)
            .await?;

        if renewed == 1 {
            lease.expires_at = expires_at;
            Ok(())
        } else {
            Err(QueueError::LeaseLost(lease.job_id))
        }
    }

    async fn release(&self, lease: &Lease) -> Result<bool, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let released: i64 = self
            .release
            .key(self.keys.claim(lease.job_id))
            .key(self.keys.inflight())
            .arg(lease.token.to_string())
            .arg(lease.job_id.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(released == 1)
    }

    async fn reap_expired(&self) -> Result<Vec<JobId>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let now_ms = self.clock.now().timestamp_millis();
        let candidates: Vec<String> = conn
            .zrangebyscore(self.keys.inflight(), "-inf", now_ms)
            .await?;

        let mut reaped = Vec::new();
        for member in candidates {
            let Ok(id) = member.parse::<JobId>() else {
                tracing::warn!(member = %member, "Dropping unparseable in-flight entry");
                let _: i64 = conn.zrem(self.keys.inflight(), &member).await?;
                continue;
            };

            // Claim check and removal happen in one script, so a holder that
            // claims in between keeps its entry. Exactly one reaper gets 1.
            let reaped_now: i64 = self
                .reap
                .key(self.keys.claim(id))
                .key(self.keys.inflight())
                .arg(&member)
                .arg(now_ms)
                .invoke_async(&mut conn)
                .await?;
            if reaped_now == 1 {
                reaped.push(id);
            }
        }
        Ok(reaped)
    }
}
