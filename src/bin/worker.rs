//! Fixed-interval batch trigger for deployments without an external cron.
//!
//! Each tick spawns an independent batch invocation, so a slow batch can
//! overlap the next one exactly as with any other trigger.

use collectible_queue::{app_state::AppState, config::AppConfig};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting collectible batch worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let state = AppState::connect(&config)
        .await
        .expect("Failed to initialize worker state");

    let period = Duration::from_secs(config.batch_interval_secs.max(1));
    let settings = state.worker.settings();
    tracing::info!(
        interval_secs = period.as_secs(),
        batch_size = settings.batch_size,
        lease_secs = settings.lease.as_secs(),
        max_attempts = settings.max_attempts,
        "Worker ready, triggering batches"
    );

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let worker = state.worker.clone();
                tokio::spawn(async move {
                    let summary = worker.process_batch().await;
                    tracing::debug!(
                        processed = summary.processed,
                        remaining_in_queue = summary.remaining_in_queue,
                        "Triggered batch returned"
                    );
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, stopping trigger");
                break;
            }
        }
    }
}
