pub mod backend;
pub mod claims;
pub mod clock;
pub mod job_store;
pub mod keyspace;
pub mod metadata;
pub mod pipeline;
pub mod producer;
pub mod queue;
pub mod renderer;
pub mod storage;
pub mod worker;
