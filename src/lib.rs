//! Collectible generation job queue
//!
//! Decouples requests to generate a collectible card (image plus metadata)
//! from the generation work itself. A producer records and queues jobs, a
//! periodically triggered batch worker claims them under time-bounded leases
//! and drives them through the rendering pipeline, and callers poll a status
//! endpoint until the job completes or fails.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
