use std::sync::Arc;

use crate::error::QueueError;
use crate::models::job::{JobId, JobSnapshot, OwnerRef};
use crate::models::params::GenerationParams;
use crate::services::backend::QueueBackend;
use crate::services::job_store::JobStore;

/// Accepts generation requests. Never does generation work itself.
pub struct Producer {
    backend: QueueBackend,
}

impl Producer {
    pub fn new(backend: QueueBackend) -> Self {
        Self { backend }
    }

    /// Validate, record and queue a request.
    pub async fn enqueue(
        &self,
        params: GenerationParams,
        owner: OwnerRef,
    ) -> Result<JobId, QueueError> {
        let job = self.backend.jobs.create(params, owner).await?;
        self.backend.queue.push(job.id, job.created_at).await?;

        metrics::counter!("collectible_jobs_enqueued_total", "variant" => job.params.variant_name())
            .increment(1);
        tracing::info!(
            job_id = %job.id,
            owner = %job.owner_ref,
            variant = job.params.variant_name(),
            "Generation job enqueued"
        );

        Ok(job.id)
    }
}

/// Read-only access for polling clients.
pub struct StatusReader {
    jobs: Arc<dyn JobStore>,
}

impl StatusReader {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    pub async fn get_status(
        &self,
        id: JobId,
        requester: &OwnerRef,
    ) -> Result<JobSnapshot, QueueError> {
        let job = self.jobs.get(id).await?;
        if &job.owner_ref != requester {
            return Err(QueueError::Unauthorized(id));
        }
        Ok(job.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobStatus;
    use crate::models::params::{CustomParams, Rank, RandomParams, Rarity, Suit};
    use crate::services::clock::ManualClock;
    use chrono::Duration;
    use std::collections::HashSet;

    fn setup() -> (QueueBackend, Producer, StatusReader) {
        let backend = QueueBackend::in_memory(Arc::new(ManualClock::default()), Duration::hours(1));
        let producer = Producer::new(backend.clone());
        let status = StatusReader::new(backend.jobs.clone());
        (backend, producer, status)
    }

    fn king_of_hearts() -> GenerationParams {
        GenerationParams::Random(RandomParams {
            rank: Rank::King,
            suit: Suit::Hearts,
            rarity: Rarity::Rare,
        })
    }

    #[tokio::test]
    async fn enqueue_then_status_is_pending_and_untouched() {
        let (backend, producer, status) = setup();
        let owner = OwnerRef::new("alice");
        let id = producer.enqueue(king_of_hearts(), owner.clone()).await.unwrap();

        let snapshot = status.get_status(id, &owner).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(snapshot.progress, 0);
        assert_eq!(snapshot.attempt, 0);
        assert!(snapshot.result.is_none());

        assert_eq!(backend.queue.peek_oldest(&HashSet::new()).await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn invalid_request_is_neither_stored_nor_queued() {
        let (backend, producer, _) = setup();
        let params = GenerationParams::Custom(CustomParams {
            rank: Rank::Ace,
            suit: Suit::Spades,
            rarity: Rarity::Legendary,
            style_prompt: "   ".repeat(200),
            style_image: None,
        });

        let err = producer.enqueue(params, OwnerRef::new("alice")).await.unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
        assert_eq!(backend.queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let (_, _, status) = setup();
        let err = status
            .get_status(JobId::new(), &OwnerRef::new("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn only_the_owner_may_poll() {
        let (_, producer, status) = setup();
        let id = producer
            .enqueue(king_of_hearts(), OwnerRef::new("alice"))
            .await
            .unwrap();

        let err = status.get_status(id, &OwnerRef::new("mallory")).await.unwrap_err();
        assert!(matches!(err, QueueError::Unauthorized(_)));
    }
}
