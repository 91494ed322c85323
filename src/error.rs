use crate::models::job::JobId;

/// Errors raised by the job store, queue index, claim registry and the
/// producer / status contracts built on them.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Requester is not the owner of job {0}")]
    Unauthorized(JobId),

    #[error("Lease on job {0} is no longer held")]
    LeaseLost(JobId),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Corrupt queue entry: {0}")]
    Corrupt(String),
}

/// Failure of one generation stage, classified for the retry decision.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// A dependency hiccup; the job is re-queued while attempts remain.
    #[error("Transient pipeline error: {0}")]
    Transient(String),

    /// The job can never succeed as submitted.
    #[error("Permanent pipeline error: {0}")]
    Permanent(String),
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            PipelineError::Transient(msg) | PipelineError::Permanent(msg) => msg,
        }
    }
}
