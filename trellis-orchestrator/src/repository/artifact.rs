//! Artifact Repository
//!
//! Handles all database operations related to job artifacts, including the
//! batch queries the expiry sweeper runs on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use trellis_core::domain::artifact::{Artifact, ArtifactLockState};

use crate::store::{Result, StoreError};
use crate::sweeper::store::{ArtifactStore, ExpiryCursor};

use super::pipeline::{lock_to_string, string_to_lock};

const SELECT_COLUMNS: &str =
    "id, job_id, project_id, file_path, size_bytes, expire_at, locked, created_at";

/// Postgres-backed [`ArtifactStore`]
pub struct PgArtifactStore {
    pool: PgPool,
}

impl PgArtifactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    async fn expired_unlocked_batch(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Artifact>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM artifacts
            WHERE expire_at IS NOT NULL AND expire_at < $1 AND locked = 'unlocked'
            LIMIT $2
            "#
        ))
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn destroy_batch(&self, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM artifacts WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(result.rows_affected())
    }

    async fn unknown_lock_job_ids(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT job_id
            FROM artifacts
            WHERE expire_at IS NOT NULL AND expire_at < $1 AND locked = 'unknown'
            LIMIT $2
            "#,
        )
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.into_iter()
            .map(|row| row.try_get("job_id").map_err(StoreError::from))
            .collect()
    }

    async fn jobs_with_locked_pipelines(&self, job_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT jobs.id
            FROM jobs
            JOIN pipelines ON pipelines.id = jobs.pipeline_id
            WHERE jobs.id = ANY($1) AND pipelines.locked = 'artifacts_locked'
            "#,
        )
        .bind(job_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.into_iter()
            .map(|row| row.try_get("id").map_err(StoreError::from))
            .collect()
    }

    async fn update_lock_state(&self, job_ids: &[Uuid], state: ArtifactLockState) -> Result<u64> {
        if job_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("UPDATE artifacts SET locked = $1 WHERE job_id = ANY($2)")
            .bind(lock_to_string(state))
            .bind(job_ids.to_vec())
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(result.rows_affected())
    }

    async fn next_expired_batch(
        &self,
        before: DateTime<Utc>,
        cursor: Option<ExpiryCursor>,
        limit: usize,
    ) -> Result<(Vec<Artifact>, Option<ExpiryCursor>)> {
        let rows = match cursor {
            Some(cursor) => {
                sqlx::query_as::<_, ArtifactRow>(&format!(
                    r#"
                    SELECT {SELECT_COLUMNS}
                    FROM artifacts
                    WHERE expire_at IS NOT NULL AND expire_at < $1
                      AND (expire_at, id) < ($2, $3)
                    ORDER BY expire_at DESC, id DESC
                    LIMIT $4
                    "#
                ))
                .bind(before)
                .bind(cursor.expire_at)
                .bind(cursor.id)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, ArtifactRow>(&format!(
                    r#"
                    SELECT {SELECT_COLUMNS}
                    FROM artifacts
                    WHERE expire_at IS NOT NULL AND expire_at < $1
                    ORDER BY expire_at DESC, id DESC
                    LIMIT $2
                    "#
                ))
                .bind(before)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StoreError::from)?;

        let artifacts: Vec<Artifact> = rows.into_iter().map(Into::into).collect();

        // A short page means the iteration is complete.
        let next = if artifacts.len() == limit {
            artifacts.last().and_then(|a| {
                a.expire_at.map(|expire_at| ExpiryCursor {
                    expire_at,
                    id: a.id,
                })
            })
        } else {
            None
        };

        Ok((artifacts, next))
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    id: Uuid,
    job_id: Uuid,
    project_id: Uuid,
    file_path: String,
    size_bytes: i64,
    expire_at: Option<chrono::DateTime<chrono::Utc>>,
    locked: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ArtifactRow> for Artifact {
    fn from(row: ArtifactRow) -> Self {
        Artifact {
            id: row.id,
            job_id: row.job_id,
            project_id: row.project_id,
            file_path: row.file_path,
            size_bytes: row.size_bytes,
            expire_at: row.expire_at,
            locked: string_to_lock(&row.locked),
            created_at: row.created_at,
        }
    }
}
