//! Pipeline persistence collaborator

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use trellis_core::domain::job::Job;
use trellis_core::domain::pipeline::Pipeline;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Write/read access to pipeline and job records.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Persists a pipeline and its seeded jobs atomically.
    async fn persist_pipeline(&self, pipeline: &Pipeline, jobs: &[Job]) -> Result<()>;

    /// Number of alive jobs currently charged against the project.
    async fn alive_jobs_count(&self, project_id: Uuid) -> Result<u64>;

    async fn find_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>>;
}

/// In-memory pipeline store for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryPipelineStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    pipelines: Vec<Pipeline>,
    jobs: Vec<Job>,
}

impl MemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an existing job, e.g. to exercise activity limits.
    pub fn seed_job(&self, job: Job) {
        self.inner.lock().expect("store lock poisoned").jobs.push(job);
    }

    pub fn pipeline_count(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").pipelines.len()
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").jobs.len()
    }
}

#[async_trait]
impl PipelineStore for MemoryPipelineStore {
    async fn persist_pipeline(&self, pipeline: &Pipeline, jobs: &[Job]) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.pipelines.push(pipeline.clone());
        inner.jobs.extend(jobs.iter().cloned());
        Ok(())
    }

    async fn alive_jobs_count(&self, project_id: Uuid) -> Result<u64> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .jobs
            .iter()
            .filter(|j| j.project_id == project_id && j.status.alive())
            .count() as u64)
    }

    async fn find_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.pipelines.iter().find(|p| p.id == id).cloned())
    }
}
