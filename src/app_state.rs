use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::db::{self, queries::PgOwnershipLedger};
use crate::services::{
    backend::QueueBackend,
    clock::SystemClock,
    keyspace::Keyspace,
    pipeline::{GenerationPipeline, OwnershipLedger},
    producer::{Producer, StatusReader},
    renderer::HttpRenderer,
    storage::{R2Client, StorageError},
    worker::{BatchWorker, WorkerSettings},
};

/// Secrets checked at the HTTP edge.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub worker_secret: String,
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub backend: QueueBackend,
    pub producer: Arc<Producer>,
    pub status: Arc<StatusReader>,
    pub worker: Arc<BatchWorker>,
    pub ledger: Arc<dyn OwnershipLedger>,
    pub auth: Arc<AuthConfig>,
    /// Present when this process installed the Prometheus recorder.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        backend: QueueBackend,
        pipeline: GenerationPipeline,
        settings: WorkerSettings,
        auth: AuthConfig,
    ) -> Self {
        let ledger = pipeline.ledger().clone();
        Self {
            producer: Arc::new(Producer::new(backend.clone())),
            status: Arc::new(StatusReader::new(backend.jobs.clone())),
            worker: Arc::new(BatchWorker::new(backend.clone(), pipeline, settings)),
            ledger,
            auth: Arc::new(auth),
            metrics: None,
            backend,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Connect every production collaborator described by `config`.
    pub async fn connect(config: &AppConfig) -> Result<Self, BootstrapError> {
        tracing::info!("Connecting to Redis");
        let redis = redis::Client::open(config.redis_url.as_str())?;
        let backend = QueueBackend::redis(
            redis,
            Keyspace::new(config.key_prefix.clone()),
            Arc::new(SystemClock),
            config.job_ttl(),
        );

        tracing::info!("Connecting to PostgreSQL database");
        let db_pool = db::init_pool(&config.database_url).await?;

        tracing::info!("Running database migrations");
        db::run_migrations(&db_pool).await?;

        tracing::info!("Initializing R2 storage client");
        let artifacts = R2Client::new(
            &config.r2_bucket,
            &config.r2_endpoint,
            &config.r2_access_key,
            &config.r2_secret_key,
            &config.asset_base_url,
        )?;

        tracing::info!("Initializing renderer client");
        let renderer = HttpRenderer::new(
            &config.renderer_url,
            &config.renderer_token,
            Duration::from_secs(config.renderer_timeout_secs),
        )?;

        let pipeline = GenerationPipeline::new(
            Arc::new(renderer),
            Arc::new(artifacts),
            Arc::new(PgOwnershipLedger::new(db_pool)),
        );

        Ok(Self::new(
            backend,
            pipeline,
            config.worker_settings(),
            AuthConfig {
                jwt_secret: config.jwt_secret.clone(),
                worker_secret: config.worker_secret.clone(),
            },
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Renderer client error: {0}")]
    Renderer(#[from] reqwest::Error),
}
