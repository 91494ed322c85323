use std::collections::HashSet;
use std::time::{Duration, Instant};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::error::{PipelineError, QueueError};
use crate::models::api::BatchSummary;
use crate::models::job::{FailureCode, FailureReason, Job, JobId, JobResult};
use crate::services::backend::QueueBackend;
use crate::services::claims::{ClaimOutcome, Lease};
use crate::services::pipeline::{GenerationPipeline, PipelineRun, Stage};

/// Limits applied to every batch invocation.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Most candidates considered per invocation.
    pub batch_size: u32,
    /// Visibility timeout of a claim.
    pub lease: Duration,
    pub max_attempts: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            lease: Duration::from_secs(120),
            max_attempts: 3,
        }
    }
}

/// What happened to one claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Completed,
    Failed,
    Retried,
    /// Record gone or already terminal; nothing to do.
    Skipped,
    /// Stopped without releasing; lease expiry hands the job to a later batch.
    Abandoned,
}

impl JobOutcome {
    fn counts_as_processed(self) -> bool {
        matches!(
            self,
            JobOutcome::Completed | JobOutcome::Failed | JobOutcome::Retried
        )
    }
}

#[derive(Debug, thiserror::Error)]
enum ExecError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Drains a bounded number of jobs per invocation.
///
/// Holds no state between invocations; overlapping invocations are kept
/// apart solely by the claim registry.
pub struct BatchWorker {
    backend: QueueBackend,
    pipeline: GenerationPipeline,
    settings: WorkerSettings,
}

impl BatchWorker {
    pub fn new(backend: QueueBackend, pipeline: GenerationPipeline, settings: WorkerSettings) -> Self {
        Self {
            backend,
            pipeline,
            settings,
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Run one batch. Never fails: per-job problems are recorded on the job
    /// and infrastructure problems are logged.
    pub async fn process_batch(&self) -> BatchSummary {
        let invocation = Uuid::new_v4();
        let started = Instant::now();

        self.requeue_expired(invocation).await;

        let mut skip: HashSet<JobId> = HashSet::new();
        let mut processed = 0u32;

        for _ in 0..self.settings.batch_size {
            let id = match self.backend.queue.peek_oldest(&skip).await {
                Ok(Some(id)) => id,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(invocation = %invocation, error = %e, "Failed to read queue index");
                    break;
                }
            };

            let lease = match self.backend.claims.try_claim(id, self.settings.lease).await {
                Ok(ClaimOutcome::Granted(lease)) => lease,
                Ok(ClaimOutcome::AlreadyHeld) => {
                    tracing::debug!(invocation = %invocation, job_id = %id, "Job held by another worker, skipping");
                    skip.insert(id);
                    continue;
                }
                Err(e) => {
                    tracing::error!(invocation = %invocation, job_id = %id, error = %e, "Claim attempt failed");
                    skip.insert(id);
                    continue;
                }
            };

            // A retried job goes back on the index; it waits for the next batch.
            skip.insert(id);
            let outcome = self.run_claimed(invocation, lease).await;
            if outcome.counts_as_processed() {
                processed += 1;
            }
        }

        let remaining_in_queue = match self.backend.queue.len().await {
            Ok(depth) => depth,
            Err(e) => {
                tracing::error!(invocation = %invocation, error = %e, "Failed to read queue depth");
                0
            }
        };
        metrics::gauge!("collectible_queue_depth").set(remaining_in_queue as f64);

        tracing::info!(
            invocation = %invocation,
            processed,
            remaining_in_queue,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch finished"
        );

        BatchSummary {
            processed,
            remaining_in_queue,
        }
    }

    /// Put jobs whose worker vanished back into the queue index.
    async fn requeue_expired(&self, invocation: Uuid) {
        let expired = match self.backend.claims.reap_expired().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(invocation = %invocation, error = %e, "Failed to reap expired leases");
                return;
            }
        };

        for id in expired {
            match self.backend.jobs.get(id).await {
                Ok(job) if job.is_terminal() => continue,
                Err(QueueError::NotFound(_)) => continue,
                _ => {}
            }

            match self.backend.queue.push(id, self.backend.clock.now()).await {
                Ok(()) => {
                    metrics::counter!("collectible_jobs_reclaimed_total").increment(1);
                    tracing::warn!(invocation = %invocation, job_id = %id, "Lease expired, job re-queued");
                }
                Err(e) => {
                    tracing::error!(invocation = %invocation, job_id = %id, error = %e, "Failed to re-queue expired job");
                }
            }
        }
    }

    async fn run_claimed(&self, invocation: Uuid, mut lease: Lease) -> JobOutcome {
        let id = lease.job_id;

        if let Err(e) = self.backend.queue.remove(id).await {
            tracing::warn!(invocation = %invocation, job_id = %id, error = %e, "Failed to remove claimed job from index");
        }

        let job = match self.backend.jobs.get(id).await {
            Ok(job) => job,
            Err(QueueError::NotFound(_)) => {
                tracing::warn!(invocation = %invocation, job_id = %id, "Queued job has no record, dropping");
                self.release(&lease).await;
                return JobOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(invocation = %invocation, job_id = %id, error = %e, "Failed to load claimed job");
                return JobOutcome::Abandoned;
            }
        };

        if job.is_terminal() {
            self.release(&lease).await;
            return JobOutcome::Skipped;
        }

        if job.attempt + 1 > self.settings.max_attempts {
            let detail = job
                .last_error
                .clone()
                .unwrap_or_else(|| "worker lease expired on final attempt".to_string());
            return self
                .terminate(invocation, &mut lease, FailureReason::new(FailureCode::AttemptsExhausted, detail))
                .await;
        }

        let job = match self
            .backend
            .jobs
            .update(id, &mut |job: &mut Job| job.begin_attempt())
            .await
        {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(invocation = %invocation, job_id = %id, error = %e, "Failed to start attempt");
                return JobOutcome::Abandoned;
            }
        };

        tracing::info!(
            invocation = %invocation,
            job_id = %id,
            attempt = job.attempt,
            variant = job.params.variant_name(),
            "Processing generation job"
        );

        let started = Instant::now();
        let result = self.execute(&job, &mut lease).await;
        metrics::histogram!("collectible_job_processing_seconds")
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(result) => self.complete(invocation, &mut lease, &job, result).await,
            Err(ExecError::Pipeline(err)) if err.is_retryable() => {
                if job.attempt < self.settings.max_attempts {
                    self.retry(invocation, &mut lease, &job, err).await
                } else {
                    let reason = FailureReason::new(FailureCode::AttemptsExhausted, err.message());
                    self.terminate(invocation, &mut lease, reason).await
                }
            }
            Err(ExecError::Pipeline(err)) => {
                let reason = FailureReason::new(FailureCode::PermanentPipelineError, err.message());
                self.terminate(invocation, &mut lease, reason).await
            }
            Err(ExecError::Queue(QueueError::LeaseLost(_))) => {
                tracing::warn!(invocation = %invocation, job_id = %id, attempt = job.attempt, "Lease lost mid-pipeline, abandoning job");
                JobOutcome::Abandoned
            }
            Err(ExecError::Queue(e)) => {
                tracing::error!(invocation = %invocation, job_id = %id, attempt = job.attempt, error = %e, "Store failure mid-pipeline, abandoning job");
                JobOutcome::Abandoned
            }
        }
    }

    /// Run every stage, checkpointing progress after each.
    async fn execute(&self, job: &Job, lease: &mut Lease) -> Result<JobResult, ExecError> {
        let mut run = PipelineRun::default();

        for stage in Stage::iter() {
            if stage.renews_lease() {
                self.backend.claims.renew(lease, self.settings.lease).await?;
            }

            self.pipeline.run_stage(stage, job, &mut run).await?;

            // The stage may have outlived the lease; only the holder checkpoints.
            self.backend.claims.renew(lease, self.settings.lease).await?;
            let progress = stage.progress();
            self.backend
                .jobs
                .update(job.id, &mut |job: &mut Job| job.record_progress(progress))
                .await?;

            tracing::debug!(job_id = %job.id, stage = %stage, progress, "Stage complete");
        }

        Ok(run.into_result()?)
    }

    async fn complete(
        &self,
        invocation: Uuid,
        lease: &mut Lease,
        job: &Job,
        result: JobResult,
    ) -> JobOutcome {
        if !self.still_held(invocation, lease).await {
            return JobOutcome::Abandoned;
        }

        let mut result = Some(result);
        let written = self
            .backend
            .jobs
            .update(job.id, &mut |job: &mut Job| {
                if let Some(result) = result.take() {
                    job.complete(result);
                }
            })
            .await;

        match written {
            Ok(job) => {
                self.release(lease).await;
                metrics::counter!("collectible_jobs_completed_total").increment(1);
                tracing::info!(
                    invocation = %invocation,
                    job_id = %job.id,
                    attempt = job.attempt,
                    "Job completed successfully"
                );
                JobOutcome::Completed
            }
            Err(e) => {
                tracing::error!(invocation = %invocation, job_id = %job.id, error = %e, "Failed to record job result");
                JobOutcome::Abandoned
            }
        }
    }

    /// Give the job another slot: re-queue first, then release, so the id
    /// is never outside both the index and the claim registry.
    async fn retry(
        &self,
        invocation: Uuid,
        lease: &mut Lease,
        job: &Job,
        err: PipelineError,
    ) -> JobOutcome {
        if !self.still_held(invocation, lease).await {
            return JobOutcome::Abandoned;
        }

        let message = err.message().to_string();
        if let Err(e) = self
            .backend
            .jobs
            .update(job.id, &mut |job: &mut Job| job.last_error = Some(message.clone()))
            .await
        {
            tracing::error!(invocation = %invocation, job_id = %job.id, error = %e, "Failed to record retryable error");
            return JobOutcome::Abandoned;
        }

        if let Err(e) = self.backend.queue.push(job.id, self.backend.clock.now()).await {
            tracing::error!(invocation = %invocation, job_id = %job.id, error = %e, "Failed to re-queue job");
            return JobOutcome::Abandoned;
        }

        self.release(lease).await;
        metrics::counter!("collectible_jobs_retried_total").increment(1);
        tracing::warn!(
            invocation = %invocation,
            job_id = %job.id,
            attempt = job.attempt,
            max_attempts = self.settings.max_attempts,
            error = %err,
            "Job re-queued for retry"
        );
        JobOutcome::Retried
    }

    async fn terminate(&self, invocation: Uuid, lease: &mut Lease, reason: FailureReason) -> JobOutcome {
        if !self.still_held(invocation, lease).await {
            return JobOutcome::Abandoned;
        }

        let id = lease.job_id;
        let code = reason.code;
        let mut reason = Some(reason);
        let written = self
            .backend
            .jobs
            .update(id, &mut |job: &mut Job| {
                if let Some(reason) = reason.take() {
                    job.fail(reason);
                }
            })
            .await;

        match written {
            Ok(job) => {
                self.release(lease).await;
                metrics::counter!("collectible_jobs_failed_total", "reason" => code.to_string())
                    .increment(1);
                tracing::warn!(
                    invocation = %invocation,
                    job_id = %id,
                    attempt = job.attempt,
                    reason = %code,
                    "Job failed"
                );
                JobOutcome::Failed
            }
            Err(e) => {
                tracing::error!(invocation = %invocation, job_id = %id, error = %e, "Failed to record job failure");
                JobOutcome::Abandoned
            }
        }
    }

    /// Confirm the lease before writing an outcome. A worker that lost it
    /// leaves the job to whoever holds it now.
    async fn still_held(&self, invocation: Uuid, lease: &mut Lease) -> bool {
        match self.backend.claims.renew(lease, self.settings.lease).await {
            Ok(()) => true,
            Err(QueueError::LeaseLost(id)) => {
                tracing::warn!(invocation = %invocation, job_id = %id, "Lease lost before writing outcome, abandoning job");
                false
            }
            Err(e) => {
                tracing::error!(invocation = %invocation, job_id = %lease.job_id, error = %e, "Could not confirm lease, abandoning job");
                false
            }
        }
    }

    async fn release(&self, lease: &Lease) {
        match self.backend.claims.release(lease).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(job_id = %lease.job_id, "Claim was no longer ours at release");
            }
            Err(e) => {
                tracing::error!(job_id = %lease.job_id, error = %e, "Failed to release claim");
            }
        }
    }
}
