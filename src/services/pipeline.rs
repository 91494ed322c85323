use async_trait::async_trait;
use std::sync::Arc;
use strum::{Display, EnumIter};

use crate::error::PipelineError;
use crate::models::job::{Job, JobId, JobResult, OwnerRef};
use crate::models::params::GenerationParams;
use crate::services::metadata;

/// Image bytes produced by the renderer.
#[derive(Debug, Clone)]
pub struct RenderedAsset {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl RenderedAsset {
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

/// Produces the card image for a set of parameters.
#[async_trait]
pub trait AssetRenderer: Send + Sync {
    async fn render(
        &self,
        job_id: JobId,
        params: &GenerationParams,
    ) -> Result<RenderedAsset, PipelineError>;
}

/// Persists generated artifacts and returns their public locator.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, PipelineError>;
}

/// Ownership bookkeeping for a finished collectible.
#[derive(Debug, Clone)]
pub struct OwnershipEntry {
    pub job_id: JobId,
    pub owner_ref: OwnerRef,
    pub variant: &'static str,
    pub asset_url: String,
    pub metadata_url: String,
}

/// Records who owns a generated collectible. Must be idempotent per job,
/// since a job can run more than once.
#[async_trait]
pub trait OwnershipLedger: Send + Sync {
    async fn record(&self, entry: &OwnershipEntry) -> Result<String, PipelineError>;

    async fn health_check(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Checkpointed stages of a generation run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    RenderAsset,
    StoreAsset,
    BuildMetadata,
    StoreMetadata,
    RecordOwnership,
}

impl Stage {
    /// Progress written once the stage finishes.
    pub fn progress(self) -> u8 {
        match self {
            Stage::RenderAsset => 25,
            Stage::StoreAsset => 50,
            Stage::BuildMetadata => 60,
            Stage::StoreMetadata => 75,
            Stage::RecordOwnership => 90,
        }
    }

    /// Stages that can run close to the lease duration; the worker renews
    /// its lease before starting them.
    pub fn renews_lease(self) -> bool {
        matches!(self, Stage::RenderAsset | Stage::StoreAsset)
    }
}

/// Intermediate outputs of one attempt.
#[derive(Debug, Default)]
pub struct PipelineRun {
    asset: Option<RenderedAsset>,
    asset_url: Option<String>,
    metadata: Option<serde_json::Value>,
    metadata_url: Option<String>,
    record_id: Option<String>,
}

impl PipelineRun {
    pub fn into_result(self) -> Result<JobResult, PipelineError> {
        match (self.asset_url, self.metadata_url, self.record_id) {
            (Some(asset_url), Some(metadata_url), Some(record_id)) => Ok(JobResult {
                asset_url,
                metadata_url,
                record_id,
            }),
            _ => Err(PipelineError::Permanent(
                "pipeline finished without all artifacts".to_string(),
            )),
        }
    }
}

fn missing(what: &str) -> PipelineError {
    PipelineError::Permanent(format!("{what} missing from earlier stage"))
}

/// The external collaborators a job is run through.
#[derive(Clone)]
pub struct GenerationPipeline {
    renderer: Arc<dyn AssetRenderer>,
    artifacts: Arc<dyn ArtifactStore>,
    ledger: Arc<dyn OwnershipLedger>,
}

impl GenerationPipeline {
    pub fn new(
        renderer: Arc<dyn AssetRenderer>,
        artifacts: Arc<dyn ArtifactStore>,
        ledger: Arc<dyn OwnershipLedger>,
    ) -> Self {
        Self {
            renderer,
            artifacts,
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn OwnershipLedger> {
        &self.ledger
    }

    /// Execute one stage, filling in `run`.
    pub async fn run_stage(
        &self,
        stage: Stage,
        job: &Job,
        run: &mut PipelineRun,
    ) -> Result<(), PipelineError> {
        match stage {
            Stage::RenderAsset => {
                run.asset = Some(self.renderer.render(job.id, &job.params).await?);
            }
            Stage::StoreAsset => {
                let asset = run.asset.take().ok_or_else(|| missing("rendered asset"))?;
                let key = format!("collectibles/{}/asset.{}", job.id, asset.extension());
                let url = self
                    .artifacts
                    .put(&key, asset.bytes, &asset.content_type)
                    .await?;
                run.asset_url = Some(url);
            }
            Stage::BuildMetadata => {
                let asset_url = run.asset_url.as_deref().ok_or_else(|| missing("asset url"))?;
                run.metadata = Some(metadata::build_metadata(job, asset_url));
            }
            Stage::StoreMetadata => {
                let document = run.metadata.take().ok_or_else(|| missing("metadata"))?;
                let bytes = serde_json::to_vec_pretty(&document)
                    .map_err(|e| PipelineError::Permanent(format!("metadata encoding: {e}")))?;
                let key = format!("collectibles/{}/metadata.json", job.id);
                let url = self.artifacts.put(&key, bytes, "application/json").await?;
                run.metadata_url = Some(url);
            }
            Stage::RecordOwnership => {
                let entry = OwnershipEntry {
                    job_id: job.id,
                    owner_ref: job.owner_ref.clone(),
                    variant: job.params.variant_name(),
                    asset_url: run.asset_url.clone().ok_or_else(|| missing("asset url"))?,
                    metadata_url: run
                        .metadata_url
                        .clone()
                        .ok_or_else(|| missing("metadata url"))?,
                };
                run.record_id = Some(self.ledger.record(&entry).await?);
            }
        }
        Ok(())
    }
}
