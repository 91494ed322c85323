use crate::models::job::JobId;

/// Redis key layout shared by the job store, queue index and claim registry.
#[derive(Debug, Clone)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn job(&self, id: JobId) -> String {
        format!("{}:job:{}", self.prefix, id)
    }

    /// Sorted set of pending ids scored by enqueue time (ms).
    pub fn queue(&self) -> String {
        format!("{}:queue", self.prefix)
    }

    pub fn claim(&self, id: JobId) -> String {
        format!("{}:claim:{}", self.prefix, id)
    }

    /// Sorted set of claimed ids scored by lease deadline (ms).
    pub fn inflight(&self) -> String {
        format!("{}:inflight", self.prefix)
    }
}
