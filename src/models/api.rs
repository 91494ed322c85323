use serde::{Deserialize, Serialize};

use crate::models::job::JobId;

/// Response after enqueueing a generation request.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub id: JobId,
}

/// Query string for a status poll.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub id: String,
}

/// Outcome of one batch worker invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Jobs this invocation claimed and drove to a decision.
    pub processed: u32,
    pub remaining_in_queue: u64,
}
