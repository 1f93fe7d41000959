//! Pipeline Repository
//!
//! Handles all database operations related to pipelines and their jobs.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use trellis_core::domain::artifact::ArtifactLockState;
use trellis_core::domain::job::{Job, JobStatus};
use trellis_core::domain::pipeline::{Pipeline, PipelineSource, PipelineStatus};

use crate::store::{PipelineStore, Result, StoreError};

/// Persist a pipeline and its seeded jobs in one transaction
pub async fn create(pool: &PgPool, pipeline: &Pipeline, jobs: &[Job]) -> Result<()> {
    let mut tx = pool.begin().await.map_err(StoreError::from)?;

    sqlx::query(
        r#"
        INSERT INTO pipelines
            (id, project_id, ref_name, sha, tag, source, status, locked, size, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(pipeline.id)
    .bind(pipeline.project_id)
    .bind(&pipeline.ref_name)
    .bind(&pipeline.sha)
    .bind(pipeline.tag)
    .bind(pipeline.source.as_str())
    .bind(status_to_string(pipeline.status))
    .bind(lock_to_string(pipeline.locked))
    .bind(pipeline.size as i32)
    .bind(pipeline.created_at)
    .execute(&mut *tx)
    .await
    .map_err(StoreError::from)?;

    for job in jobs {
        sqlx::query(
            r#"
            INSERT INTO jobs
                (id, pipeline_id, project_id, name, stage, status, ref_name, tag,
                 tags, needs, allow_failure, owner_id, outdated_deployment,
                 debug_mode, has_artifacts, artifacts_public)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(job.id)
        .bind(job.pipeline_id)
        .bind(job.project_id)
        .bind(&job.name)
        .bind(&job.stage)
        .bind(job_status_to_string(job.status))
        .bind(&job.ref_name)
        .bind(job.tag)
        .bind(&job.tags)
        .bind(&job.needs)
        .bind(job.allow_failure)
        .bind(job.owner_id)
        .bind(job.outdated_deployment)
        .bind(job.debug_mode)
        .bind(job.has_artifacts)
        .bind(job.artifacts_public)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;
    }

    tx.commit().await.map_err(StoreError::from)?;
    Ok(())
}

/// Find a pipeline by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Pipeline>> {
    let row = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT id, project_id, ref_name, sha, tag, source, status, locked,
               size, failure_reason, created_at, finished_at
        FROM pipelines
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::from)?;

    Ok(row.map(Into::into))
}

/// Count alive jobs charged against a project
pub async fn count_alive_jobs(pool: &PgPool, project_id: Uuid) -> Result<u64> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS alive
        FROM jobs
        WHERE project_id = $1 AND status IN ('created', 'pending', 'running')
        "#,
    )
    .bind(project_id)
    .fetch_one(pool)
    .await
    .map_err(StoreError::from)?;

    let alive: i64 = row.try_get("alive").map_err(StoreError::from)?;
    Ok(alive as u64)
}

/// Postgres-backed [`PipelineStore`]
pub struct PgPipelineStore {
    pool: PgPool,
}

impl PgPipelineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineStore for PgPipelineStore {
    async fn persist_pipeline(&self, pipeline: &Pipeline, jobs: &[Job]) -> Result<()> {
        create(&self.pool, pipeline, jobs).await
    }

    async fn alive_jobs_count(&self, project_id: Uuid) -> Result<u64> {
        count_alive_jobs(&self.pool, project_id).await
    }

    async fn find_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>> {
        find_by_id(&self.pool, id).await
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: PipelineStatus) -> &'static str {
    match status {
        PipelineStatus::Created => "created",
        PipelineStatus::Pending => "pending",
        PipelineStatus::Running => "running",
        PipelineStatus::Success => "success",
        PipelineStatus::Failed => "failed",
        PipelineStatus::Canceled => "canceled",
    }
}

fn string_to_status(s: &str) -> PipelineStatus {
    match s {
        "pending" => PipelineStatus::Pending,
        "running" => PipelineStatus::Running,
        "success" => PipelineStatus::Success,
        "failed" => PipelineStatus::Failed,
        "canceled" => PipelineStatus::Canceled,
        _ => PipelineStatus::Created,
    }
}

fn job_status_to_string(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Created => "created",
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Success => "success",
        JobStatus::Failed => "failed",
        JobStatus::Canceled => "canceled",
    }
}

pub(crate) fn lock_to_string(state: ArtifactLockState) -> &'static str {
    match state {
        ArtifactLockState::Unknown => "unknown",
        ArtifactLockState::ArtifactsLocked => "artifacts_locked",
        ArtifactLockState::Unlocked => "unlocked",
    }
}

pub(crate) fn string_to_lock(s: &str) -> ArtifactLockState {
    match s {
        "artifacts_locked" => ArtifactLockState::ArtifactsLocked,
        "unlocked" => ArtifactLockState::Unlocked,
        _ => ArtifactLockState::Unknown,
    }
}

fn string_to_source(s: &str) -> PipelineSource {
    match s {
        "web" => PipelineSource::Web,
        "schedule" => PipelineSource::Schedule,
        "api" => PipelineSource::Api,
        "trigger" => PipelineSource::Trigger,
        "parent_pipeline" => PipelineSource::ParentPipeline,
        _ => PipelineSource::Push,
    }
}

fn string_to_failure_reason(
    s: &str,
) -> Option<trellis_core::domain::pipeline::FailureReason> {
    use trellis_core::domain::pipeline::FailureReason::*;

    match s {
        "config_error" => Some(ConfigError),
        "size_limit_exceeded" => Some(SizeLimitExceeded),
        "job_activity_limit_exceeded" => Some(JobActivityLimitExceeded),
        "user_not_verified" => Some(UserNotVerified),
        "external_validation_failure" => Some(ExternalValidationFailure),
        "project_deleted" => Some(ProjectDeleted),
        "filtered_by_rules" => Some(FilteredByRules),
        "filtered_by_workflow_rules" => Some(FilteredByWorkflowRules),
        "unknown_failure" => Some(UnknownFailure),
        _ => None,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: Uuid,
    project_id: Uuid,
    ref_name: String,
    sha: String,
    tag: bool,
    source: String,
    status: String,
    locked: String,
    size: i32,
    failure_reason: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        Pipeline {
            id: row.id,
            project_id: row.project_id,
            ref_name: row.ref_name,
            sha: row.sha,
            tag: row.tag,
            source: string_to_source(&row.source),
            status: string_to_status(&row.status),
            locked: string_to_lock(&row.locked),
            size: row.size as u32,
            failure_reason: row
                .failure_reason
                .as_deref()
                .and_then(string_to_failure_reason),
            created_at: row.created_at,
            finished_at: row.finished_at,
        }
    }
}
