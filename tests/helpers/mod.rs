//! In-process collaborators and a harness for driving the batch worker

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use collectible_queue::error::{PipelineError, QueueError};
use collectible_queue::models::job::{Job, JobId, JobStatus, OwnerRef};
use collectible_queue::models::params::GenerationParams;
use collectible_queue::services::backend::QueueBackend;
use collectible_queue::services::claims::InMemoryClaimRegistry;
use collectible_queue::services::clock::{Clock, ManualClock};
use collectible_queue::services::job_store::{InMemoryJobStore, JobStore};
use collectible_queue::services::pipeline::{
    ArtifactStore, AssetRenderer, GenerationPipeline, OwnershipEntry, OwnershipLedger,
    RenderedAsset,
};
use collectible_queue::services::producer::Producer;
use collectible_queue::services::queue::InMemoryQueueIndex;
use collectible_queue::services::worker::{BatchWorker, WorkerSettings};

/// Smallest valid PNG signature; the fakes never decode it.
const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn png() -> RenderedAsset {
    RenderedAsset {
        bytes: PNG_BYTES.to_vec(),
        content_type: "image/png".to_string(),
    }
}

/// Fails with the queued errors in order, then renders successfully.
#[derive(Default)]
pub struct ScriptedRenderer {
    failures: Mutex<VecDeque<PipelineError>>,
    calls: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_with(failures: Vec<PipelineError>) -> Arc<Self> {
        Arc::new(Self {
            failures: Mutex::new(failures.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetRenderer for ScriptedRenderer {
    async fn render(
        &self,
        _job_id: JobId,
        _params: &GenerationParams,
    ) -> Result<RenderedAsset, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(png()),
        }
    }
}

/// Never finishes rendering, standing in for a worker that died mid-job.
pub struct StalledRenderer;

#[async_trait]
impl AssetRenderer for StalledRenderer {
    async fn render(
        &self,
        _job_id: JobId,
        _params: &GenerationParams,
    ) -> Result<RenderedAsset, PipelineError> {
        std::future::pending().await
    }
}

/// Blocks every render until the gate is opened.
#[derive(Default)]
pub struct GatedRenderer {
    pub gate: Notify,
    calls: AtomicUsize,
}

impl GatedRenderer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetRenderer for GatedRenderer {
    async fn render(
        &self,
        _job_id: JobId,
        _params: &GenerationParams,
    ) -> Result<RenderedAsset, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(png())
    }
}

#[derive(Default)]
pub struct MemoryArtifacts {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifacts {
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifacts {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, PipelineError> {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(format!("memory://{key}"))
    }
}

/// One record per job; a repeated job gets its existing record back.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<JobId, (OwnerRef, String)>>,
}

impl MemoryLedger {
    pub fn owner_of(&self, id: JobId) -> Option<OwnerRef> {
        self.records.lock().unwrap().get(&id).map(|(owner, _)| owner.clone())
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl OwnershipLedger for MemoryLedger {
    async fn record(&self, entry: &OwnershipEntry) -> Result<String, PipelineError> {
        let mut records = self.records.lock().unwrap();
        let (_, record_id) = records
            .entry(entry.job_id)
            .or_insert_with(|| (entry.owner_ref.clone(), format!("record-{}", entry.job_id)));
        Ok(record_id.clone())
    }
}

/// Ledger that blocks every record until the gate is opened.
#[derive(Default)]
pub struct GatedLedger {
    pub gate: Notify,
    inner: MemoryLedger,
}

#[async_trait]
impl OwnershipLedger for GatedLedger {
    async fn record(&self, entry: &OwnershipEntry) -> Result<String, PipelineError> {
        self.gate.notified().await;
        self.inner.record(entry).await
    }
}

/// Job store that remembers the (status, progress) written by every update.
pub struct RecordingJobStore {
    inner: InMemoryJobStore,
    history: Mutex<HashMap<JobId, Vec<(JobStatus, u8)>>>,
}

impl RecordingJobStore {
    pub fn new(clock: Arc<dyn Clock>, ttl: ChronoDuration) -> Self {
        Self {
            inner: InMemoryJobStore::new(clock, ttl),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn history(&self, id: JobId) -> Vec<(JobStatus, u8)> {
        self.history
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobStore for RecordingJobStore {
    async fn create(&self, params: GenerationParams, owner: OwnerRef) -> Result<Job, QueueError> {
        self.inner.create(params, owner).await
    }

    async fn get(&self, id: JobId) -> Result<Job, QueueError> {
        self.inner.get(id).await
    }

    async fn update(
        &self,
        id: JobId,
        mutate: &mut (dyn for<'j> FnMut(&'j mut Job) + Send),
    ) -> Result<Job, QueueError> {
        let job = self.inner.update(id, mutate).await?;
        self.history
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push((job.status, job.progress));
        Ok(job)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.inner.health_check().await
    }
}

pub const LEASE: Duration = Duration::from_secs(60);

pub fn settings(batch_size: u32, max_attempts: u32) -> WorkerSettings {
    WorkerSettings {
        batch_size,
        lease: LEASE,
        max_attempts,
    }
}

/// An in-memory queue on a manual clock, with recording collaborators.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<RecordingJobStore>,
    pub backend: QueueBackend,
    pub artifacts: Arc<MemoryArtifacts>,
    pub ledger: Arc<MemoryLedger>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let shared_clock: Arc<dyn Clock> = clock.clone();
        let store = Arc::new(RecordingJobStore::new(
            shared_clock.clone(),
            ChronoDuration::hours(24),
        ));

        let backend = QueueBackend {
            jobs: store.clone(),
            queue: Arc::new(InMemoryQueueIndex::new()),
            claims: Arc::new(InMemoryClaimRegistry::new(shared_clock.clone())),
            clock: shared_clock,
        };

        Self {
            clock,
            store,
            backend,
            artifacts: Arc::new(MemoryArtifacts::default()),
            ledger: Arc::new(MemoryLedger::default()),
        }
    }

    pub fn pipeline(&self, renderer: Arc<dyn AssetRenderer>) -> GenerationPipeline {
        GenerationPipeline::new(renderer, self.artifacts.clone(), self.ledger.clone())
    }

    pub fn worker_with_ledger(
        &self,
        renderer: Arc<dyn AssetRenderer>,
        ledger: Arc<dyn OwnershipLedger>,
        settings: WorkerSettings,
    ) -> BatchWorker {
        let pipeline = GenerationPipeline::new(renderer, self.artifacts.clone(), ledger);
        BatchWorker::new(self.backend.clone(), pipeline, settings)
    }

    pub fn worker(&self, renderer: Arc<dyn AssetRenderer>, settings: WorkerSettings) -> BatchWorker {
        BatchWorker::new(self.backend.clone(), self.pipeline(renderer), settings)
    }

    pub fn producer(&self) -> Producer {
        Producer::new(self.backend.clone())
    }

    pub async fn enqueue(&self, params: GenerationParams, owner: &str) -> JobId {
        self.producer()
            .enqueue(params, OwnerRef::new(owner))
            .await
            .expect("Failed to enqueue job")
    }

    pub async fn job(&self, id: JobId) -> Job {
        self.backend.jobs.get(id).await.expect("Job record missing")
    }

    /// Move time past any lease granted so far.
    pub fn expire_leases(&self) {
        self.clock
            .advance(ChronoDuration::from_std(LEASE).unwrap() + ChronoDuration::seconds(1));
    }
}
