//! Artifact storage collaborator for the sweeper
//!
//! The sweeper's control flow is storage-agnostic: everything it needs is
//! expressed as bounded batch fetches and a keyset cursor, owned by the
//! storage implementation.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use trellis_core::domain::artifact::{Artifact, ArtifactLockState};

use crate::store::{Result, StoreError};

/// Keyset cursor over expired artifacts, ordered by expiry descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryCursor {
    pub expire_at: DateTime<Utc>,
    pub id: Uuid,
}

/// Batch access to artifact rows.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// A bounded batch of expired, unlocked artifacts in arbitrary order.
    async fn expired_unlocked_batch(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Artifact>>;

    /// Destroys the given artifacts, returning how many went away.
    async fn destroy_batch(&self, ids: &[Uuid]) -> Result<u64>;

    /// Job ids owning expired artifacts whose lock state is unknown.
    async fn unknown_lock_job_ids(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Uuid>>;

    /// The subset of `job_ids` whose owning pipeline holds an artifact lock.
    async fn jobs_with_locked_pipelines(&self, job_ids: &[Uuid]) -> Result<Vec<Uuid>>;

    /// Writes a lock classification back onto the jobs' artifacts so later
    /// sweeps skip the pipeline join. Returns affected rows.
    async fn update_lock_state(&self, job_ids: &[Uuid], state: ArtifactLockState) -> Result<u64>;

    /// The next ordered batch of expired artifacts, locked or not, for the
    /// legacy iteration strategy.
    async fn next_expired_batch(
        &self,
        before: DateTime<Utc>,
        cursor: Option<ExpiryCursor>,
        limit: usize,
    ) -> Result<(Vec<Artifact>, Option<ExpiryCursor>)>;
}

/// In-memory artifact store for tests.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    artifacts: Vec<Artifact>,
    /// job id -> owning pipeline id
    job_pipelines: std::collections::HashMap<Uuid, Uuid>,
    /// pipeline id -> pipeline lock flag
    pipeline_locks: std::collections::HashMap<Uuid, ArtifactLockState>,
    fail_destroys: bool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_artifact(&self, artifact: Artifact) {
        self.lock().artifacts.push(artifact);
    }

    /// Links a job to its owning pipeline and records the pipeline's lock
    /// flag, for unknown-backlog reclassification.
    pub fn link_pipeline(&self, job_id: Uuid, pipeline_id: Uuid, locked: ArtifactLockState) {
        let mut inner = self.lock();
        inner.job_pipelines.insert(job_id, pipeline_id);
        inner.pipeline_locks.insert(pipeline_id, locked);
    }

    /// Makes every destroy call fail, to exercise batch-failure tolerance.
    pub fn fail_destroys(&self) {
        self.lock().fail_destroys = true;
    }

    pub fn remaining(&self) -> usize {
        self.lock().artifacts.len()
    }

    pub fn lock_state_of(&self, artifact_id: Uuid) -> Option<ArtifactLockState> {
        self.lock()
            .artifacts
            .iter()
            .find(|a| a.id == artifact_id)
            .map(|a| a.locked)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().expect("artifact store lock poisoned")
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn expired_unlocked_batch(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Artifact>> {
        Ok(self
            .lock()
            .artifacts
            .iter()
            .filter(|a| a.expired(before) && a.locked == ArtifactLockState::Unlocked)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn destroy_batch(&self, ids: &[Uuid]) -> Result<u64> {
        let mut inner = self.lock();

        if inner.fail_destroys {
            return Err(StoreError::Backend("destroy failed".to_string()));
        }

        let targets: HashSet<&Uuid> = ids.iter().collect();
        let before = inner.artifacts.len();
        inner.artifacts.retain(|a| !targets.contains(&a.id));
        Ok((before - inner.artifacts.len()) as u64)
    }

    async fn unknown_lock_job_ids(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Uuid>> {
        let inner = self.lock();
        let mut job_ids: Vec<Uuid> = inner
            .artifacts
            .iter()
            .filter(|a| a.expired(before) && a.locked == ArtifactLockState::Unknown)
            .map(|a| a.job_id)
            .collect();
        job_ids.dedup();
        job_ids.truncate(limit);
        Ok(job_ids)
    }

    async fn jobs_with_locked_pipelines(&self, job_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let inner = self.lock();
        Ok(job_ids
            .iter()
            .filter(|job_id| {
                inner
                    .job_pipelines
                    .get(job_id)
                    .and_then(|p| inner.pipeline_locks.get(p))
                    .is_some_and(|state| *state == ArtifactLockState::ArtifactsLocked)
            })
            .copied()
            .collect())
    }

    async fn update_lock_state(&self, job_ids: &[Uuid], state: ArtifactLockState) -> Result<u64> {
        let targets: HashSet<&Uuid> = job_ids.iter().collect();
        let mut updated = 0;

        for artifact in &mut self.lock().artifacts {
            if targets.contains(&artifact.job_id) {
                artifact.locked = state;
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn next_expired_batch(
        &self,
        before: DateTime<Utc>,
        cursor: Option<ExpiryCursor>,
        limit: usize,
    ) -> Result<(Vec<Artifact>, Option<ExpiryCursor>)> {
        let inner = self.lock();

        let mut expired: Vec<Artifact> = inner
            .artifacts
            .iter()
            .filter(|a| a.expired(before))
            .cloned()
            .collect();
        // Expiry descending, id as tiebreaker, matching the keyset order.
        expired.sort_by(|a, b| {
            b.expire_at
                .cmp(&a.expire_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let start = match cursor {
            Some(cursor) => expired
                .iter()
                .position(|a| (a.expire_at, a.id) < (Some(cursor.expire_at), cursor.id))
                .unwrap_or(expired.len()),
            None => 0,
        };

        let batch: Vec<Artifact> = expired.iter().skip(start).take(limit).cloned().collect();

        let next = if start + batch.len() < expired.len() {
            batch.last().and_then(|a| {
                a.expire_at.map(|expire_at| ExpiryCursor {
                    expire_at,
                    id: a.id,
                })
            })
        } else {
            None
        };

        Ok((batch, next))
    }
}
