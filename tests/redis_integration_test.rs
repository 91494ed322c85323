//! Queue structures against a live Redis.
//!
//! Requires REDIS_URL. Run with:
//! cargo test --test redis_integration_test -- --ignored

mod fixtures;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use collectible_queue::error::QueueError;
use collectible_queue::models::job::{Job, JobStatus, OwnerRef};
use collectible_queue::services::backend::QueueBackend;
use collectible_queue::services::claims::ClaimOutcome;
use collectible_queue::services::clock::SystemClock;
use collectible_queue::services::keyspace::Keyspace;

use fixtures::king_of_hearts;

fn backend() -> QueueBackend {
    dotenvy::dotenv().ok();
    let url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");
    let client = redis::Client::open(url).expect("Invalid REDIS_URL");
    // Fresh prefix so runs never see each other's keys.
    let keys = Keyspace::new(format!("cq-test-{}", uuid::Uuid::new_v4()));
    QueueBackend::redis(client, keys, Arc::new(SystemClock), chrono::Duration::minutes(10))
}

#[tokio::test]
#[ignore]
async fn test_job_store_round_trip() {
    let backend = backend();
    backend.jobs.health_check().await.expect("Redis unreachable");

    let job = backend
        .jobs
        .create(king_of_hearts(), OwnerRef::new("alice"))
        .await
        .expect("create failed");

    let loaded = backend.jobs.get(job.id).await.expect("get failed");
    assert_eq!(loaded.status, JobStatus::Pending);
    assert_eq!(loaded.owner_ref, OwnerRef::new("alice"));

    let updated = backend
        .jobs
        .update(job.id, &mut |job: &mut Job| {
            job.begin_attempt();
            job.record_progress(25);
        })
        .await
        .expect("update failed");
    assert_eq!(updated.attempt, 1);
    assert_eq!(backend.jobs.get(job.id).await.unwrap().progress, 25);

    let missing = collectible_queue::models::job::JobId::new();
    assert!(matches!(
        backend.jobs.get(missing).await,
        Err(QueueError::NotFound(_))
    ));
}

#[tokio::test]
#[ignore]
async fn test_queue_index_order_and_removal() {
    let backend = backend();
    let now = chrono::Utc::now();
    let first = collectible_queue::models::job::JobId::new();
    let second = collectible_queue::models::job::JobId::new();

    backend.queue.push(second, now + chrono::Duration::milliseconds(10)).await.unwrap();
    backend.queue.push(first, now).await.unwrap();
    assert_eq!(backend.queue.len().await.unwrap(), 2);

    let none = HashSet::new();
    assert_eq!(backend.queue.peek_oldest(&none).await.unwrap(), Some(first));

    let skip: HashSet<_> = [first].into_iter().collect();
    assert_eq!(backend.queue.peek_oldest(&skip).await.unwrap(), Some(second));

    assert!(backend.queue.remove(first).await.unwrap());
    assert!(!backend.queue.remove(first).await.unwrap());
    assert_eq!(backend.queue.len().await.unwrap(), 1);
}

#[tokio::test]
#[ignore]
async fn test_claims_expire_and_are_reaped_once() {
    let backend = backend();
    let id = collectible_queue::models::job::JobId::new();
    let lease_for = Duration::from_millis(300);

    let ClaimOutcome::Granted(mut lease) = backend.claims.try_claim(id, lease_for).await.unwrap()
    else {
        panic!("first claim should be granted");
    };
    assert_eq!(
        backend.claims.try_claim(id, lease_for).await.unwrap(),
        ClaimOutcome::AlreadyHeld
    );
    backend.claims.renew(&mut lease, lease_for).await.unwrap();
    assert!(backend.claims.reap_expired().await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(matches!(
        backend.claims.renew(&mut lease, lease_for).await,
        Err(QueueError::LeaseLost(_))
    ));

    let (a, b) = tokio::join!(backend.claims.reap_expired(), backend.claims.reap_expired());
    let reaped: Vec<_> = a.unwrap().into_iter().chain(b.unwrap()).collect();
    assert_eq!(reaped, vec![id]);

    assert!(!backend.claims.release(&lease).await.unwrap());
    assert!(matches!(
        backend.claims.try_claim(id, lease_for).await.unwrap(),
        ClaimOutcome::Granted(_)
    ));
}

#[tokio::test]
#[ignore]
async fn test_reaper_leaves_entries_of_a_newer_holder() {
    dotenvy::dotenv().ok();
    let url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");
    let client = redis::Client::open(url).expect("Invalid REDIS_URL");
    let keys = Keyspace::new(format!("cq-test-{}", uuid::Uuid::new_v4()));
    let backend = QueueBackend::redis(
        client.clone(),
        keys.clone(),
        Arc::new(SystemClock),
        chrono::Duration::minutes(10),
    );
    let id = collectible_queue::models::job::JobId::new();

    let short = Duration::from_millis(200);
    assert!(matches!(
        backend.claims.try_claim(id, short).await.unwrap(),
        ClaimOutcome::Granted(_)
    ));
    tokio::time::sleep(Duration::from_millis(400)).await;

    // A newer holder claims before anyone reaps; its deadline is in the future.
    assert!(matches!(
        backend.claims.try_claim(id, Duration::from_secs(60)).await.unwrap(),
        ClaimOutcome::Granted(_)
    ));
    assert!(backend.claims.reap_expired().await.unwrap().is_empty());

    // Even with the claim key gone, a deadline still ahead keeps the entry.
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let _: i64 = redis::cmd("DEL")
        .arg(keys.claim(id))
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(backend.claims.reap_expired().await.unwrap().is_empty());
    let score: Option<f64> = redis::cmd("ZSCORE")
        .arg(keys.inflight())
        .arg(id.to_string())
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(score.is_some());
}
