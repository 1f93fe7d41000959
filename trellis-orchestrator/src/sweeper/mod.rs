//! Artifact expiry and retention sweeper
//!
//! A batched, lease-guarded background sweep destroying expired, unlocked
//! job artifacts within a wall-clock and iteration budget. The whole run is
//! serialized by a cluster-wide lease so a periodic scheduler never
//! overlaps itself.

pub mod store;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use trellis_core::domain::artifact::ArtifactLockState;
use trellis_core::dto::sweep::SweepOutcome;

use crate::lease::SweepLease;
use crate::metrics;

pub use store::{ArtifactStore, ExpiryCursor, MemoryArtifactStore};

/// Artifacts destroyed per batch.
pub const BATCH_SIZE: usize = 100;
/// Wall-clock budget for one run.
pub const LOOP_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Iteration ceiling for one run.
pub const LOOP_LIMIT: u32 = 1000;
/// Cluster-wide lease key guarding the sweep.
pub const LOCK_KEY: &str = "trellis:artifacts:expire:lock";
/// Lease TTL; longer than the loop timeout so a live run never loses its
/// lease mid-flight.
pub const LOCK_TTL: Duration = Duration::from_secs(6 * 60);
/// Lease acquisition retries.
pub const LOCK_RETRIES: u32 = 1;

const RETRY_SLEEP: Duration = Duration::from_millis(100);

/// Which sweep algorithm a run uses. Selected once at process start;
/// running both concurrently is not expressible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepStrategy {
    /// Destroy expired+unlocked batches first; reclassify the unknown-lock
    /// backlog when a pass finds nothing to destroy.
    #[default]
    UnlockedFirst,
    /// Ordered iteration over all expired artifacts, skipping locked ones.
    LegacyIteration,
}

impl SweepStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unlocked_first" => Some(Self::UnlockedFirst),
            "legacy" => Some(Self::LegacyIteration),
            _ => None,
        }
    }
}

/// The sweep service.
pub struct Sweeper {
    store: Arc<dyn ArtifactStore>,
    lease: Arc<dyn SweepLease>,
    strategy: SweepStrategy,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        lease: Arc<dyn SweepLease>,
        strategy: SweepStrategy,
    ) -> Self {
        Self {
            store,
            lease,
            strategy,
        }
    }

    /// Runs one sweep.
    ///
    /// If the lease is held elsewhere the run reports `skipped` with zero
    /// work done. Batch failures are counted and do not abort the run; the
    /// removed-count accumulated before a timeout or failure is always
    /// returned.
    pub async fn execute(&self) -> SweepOutcome {
        if !self.acquire_lease().await {
            info!("sweep lease held elsewhere, skipping run");
            return SweepOutcome {
                skipped: true,
                ..SweepOutcome::default()
            };
        }

        let started_at = chrono::Utc::now();
        let outcome = match self.strategy {
            SweepStrategy::UnlockedFirst => self.sweep_unlocked_first(started_at).await,
            SweepStrategy::LegacyIteration => self.sweep_legacy(started_at).await,
        };

        if let Err(e) = self.lease.release(LOCK_KEY).await {
            warn!(error = %e, "failed to release sweep lease");
        }

        metrics::add_removed_artifacts(outcome.removed_count);
        info!(
            removed = outcome.removed_count,
            reclassified = outcome.reclassified_count,
            batches = outcome.batches,
            "sweep finished"
        );

        outcome
    }

    async fn acquire_lease(&self) -> bool {
        for attempt in 0..=LOCK_RETRIES {
            match self.lease.try_acquire(LOCK_KEY, LOCK_TTL).await {
                Ok(true) => return true,
                Ok(false) => {
                    if attempt < LOCK_RETRIES {
                        tokio::time::sleep(RETRY_SLEEP).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "sweep lease acquisition failed");
                    return false;
                }
            }
        }

        false
    }

    async fn sweep_unlocked_first(&self, started_at: chrono::DateTime<chrono::Utc>) -> SweepOutcome {
        let clock = Instant::now();
        let mut outcome = SweepOutcome::default();

        for _ in 0..LOOP_LIMIT {
            if clock.elapsed() > LOOP_TIMEOUT {
                break;
            }

            let artifacts = match self.store.expired_unlocked_batch(started_at, BATCH_SIZE).await {
                Ok(artifacts) => artifacts,
                Err(e) => {
                    warn!(error = %e, "failed to fetch expired artifacts, ending run");
                    break;
                }
            };

            outcome.batches += 1;
            let destroyed = self.destroy(&artifacts).await;
            outcome.removed_count += destroyed;

            if destroyed > 0 {
                continue;
            }

            // Nothing destroyable: spend the iteration reclassifying the
            // unknown-lock backlog so future passes skip the pipeline join.
            match self.reclassify_unknown_backlog(started_at).await {
                Ok(0) => break,
                Ok(reclassified) => outcome.reclassified_count += reclassified,
                Err(e) => {
                    warn!(error = %e, "backlog reclassification failed, ending run");
                    break;
                }
            }
        }

        outcome
    }

    async fn sweep_legacy(&self, started_at: chrono::DateTime<chrono::Utc>) -> SweepOutcome {
        let clock = Instant::now();
        let mut outcome = SweepOutcome::default();
        let mut cursor: Option<ExpiryCursor> = None;

        for _ in 0..LOOP_LIMIT {
            if clock.elapsed() > LOOP_TIMEOUT {
                break;
            }

            let (artifacts, next) = match self
                .store
                .next_expired_batch(started_at, cursor, BATCH_SIZE)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "failed to iterate expired artifacts, ending run");
                    break;
                }
            };

            if artifacts.is_empty() {
                break;
            }

            outcome.batches += 1;

            // The lock is consulted after the batch is queried: the
            // artifact's own flag first, the owning pipeline for rows that
            // were never classified.
            let unknown_jobs: Vec<Uuid> = artifacts
                .iter()
                .filter(|a| a.locked == ArtifactLockState::Unknown)
                .map(|a| a.job_id)
                .collect();
            let locked_jobs = match self.store.jobs_with_locked_pipelines(&unknown_jobs).await {
                Ok(locked) => locked,
                Err(e) => {
                    warn!(error = %e, "failed to classify batch, skipping it");
                    cursor = next;
                    continue;
                }
            };

            let destroyable: Vec<_> = artifacts
                .iter()
                .filter(|a| match a.locked {
                    ArtifactLockState::ArtifactsLocked => false,
                    ArtifactLockState::Unlocked => true,
                    ArtifactLockState::Unknown => !locked_jobs.contains(&a.job_id),
                })
                .cloned()
                .collect();

            outcome.removed_count += self.destroy(&destroyable).await;

            match next {
                Some(next_cursor) => cursor = Some(next_cursor),
                None => break,
            }
        }

        outcome
    }

    /// Destroys one batch; a failure is counted, not propagated.
    async fn destroy(&self, artifacts: &[trellis_core::domain::artifact::Artifact]) -> u64 {
        if artifacts.is_empty() {
            return 0;
        }

        let ids: Vec<Uuid> = artifacts.iter().map(|a| a.id).collect();

        match self.store.destroy_batch(&ids).await {
            Ok(destroyed) => {
                debug!(destroyed, "destroyed artifact batch");
                destroyed
            }
            Err(e) => {
                warn!(error = %e, "artifact batch destroy failed");
                metrics::increment_sweep_batch_failure();
                0
            }
        }
    }

    async fn reclassify_unknown_backlog(
        &self,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64, crate::store::StoreError> {
        let job_ids = self
            .store
            .unknown_lock_job_ids(started_at, BATCH_SIZE)
            .await?;

        if job_ids.is_empty() {
            return Ok(0);
        }

        let locked: Vec<Uuid> = self.store.jobs_with_locked_pipelines(&job_ids).await?;
        let unlocked: Vec<Uuid> = job_ids
            .iter()
            .filter(|id| !locked.contains(id))
            .copied()
            .collect();

        let mut updated = 0;
        if !locked.is_empty() {
            updated += self
                .store
                .update_lock_state(&locked, ArtifactLockState::ArtifactsLocked)
                .await?;
        }
        if !unlocked.is_empty() {
            updated += self
                .store
                .update_lock_state(&unlocked, ArtifactLockState::Unlocked)
                .await?;
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::MemoryLease;
    use chrono::{Duration as ChronoDuration, Utc};
    use trellis_core::domain::artifact::Artifact;

    fn artifact(locked: ArtifactLockState, hours_expired: i64) -> Artifact {
        Artifact {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            file_path: "artifacts.zip".to_string(),
            size_bytes: 1024,
            expire_at: Some(Utc::now() - ChronoDuration::hours(hours_expired)),
            locked,
            created_at: Utc::now() - ChronoDuration::days(7),
        }
    }

    fn sweeper(store: Arc<MemoryArtifactStore>, strategy: SweepStrategy) -> Sweeper {
        Sweeper::new(store, Arc::new(MemoryLease::new()), strategy)
    }

    #[tokio::test]
    async fn test_unlocked_first_destroys_in_batches() {
        let store = Arc::new(MemoryArtifactStore::new());
        for n in 0..250 {
            store.add_artifact(artifact(ArtifactLockState::Unlocked, (n % 24) + 1));
        }

        let outcome = sweeper(Arc::clone(&store), SweepStrategy::UnlockedFirst)
            .execute()
            .await;

        assert_eq!(outcome.removed_count, 250);
        assert!(!outcome.skipped);
        // 100 + 100 + 50, plus the final empty pass that ends the run.
        assert_eq!(outcome.batches, 4);
        assert_eq!(store.remaining(), 0);
    }

    #[tokio::test]
    async fn test_locked_artifacts_survive_both_strategies() {
        for strategy in [SweepStrategy::UnlockedFirst, SweepStrategy::LegacyIteration] {
            let store = Arc::new(MemoryArtifactStore::new());
            store.add_artifact(artifact(ArtifactLockState::ArtifactsLocked, 48));

            let outcome = sweeper(Arc::clone(&store), strategy).execute().await;

            assert_eq!(outcome.removed_count, 0, "{strategy:?}");
            assert_eq!(store.remaining(), 1, "{strategy:?}");
        }
    }

    #[tokio::test]
    async fn test_unexpired_artifacts_survive() {
        let store = Arc::new(MemoryArtifactStore::new());
        store.add_artifact(Artifact {
            expire_at: Some(Utc::now() + ChronoDuration::hours(1)),
            ..artifact(ArtifactLockState::Unlocked, 1)
        });
        store.add_artifact(Artifact {
            expire_at: None,
            ..artifact(ArtifactLockState::Unlocked, 1)
        });

        let outcome = sweeper(Arc::clone(&store), SweepStrategy::UnlockedFirst)
            .execute()
            .await;

        assert_eq!(outcome.removed_count, 0);
        assert_eq!(store.remaining(), 2);
    }

    #[tokio::test]
    async fn test_unknown_backlog_reclassified_then_swept() {
        let store = Arc::new(MemoryArtifactStore::new());

        let locked = artifact(ArtifactLockState::Unknown, 10);
        let unlocked = artifact(ArtifactLockState::Unknown, 10);
        store.link_pipeline(locked.job_id, Uuid::new_v4(), ArtifactLockState::ArtifactsLocked);
        store.link_pipeline(unlocked.job_id, Uuid::new_v4(), ArtifactLockState::Unlocked);
        let locked_id = locked.id;
        store.add_artifact(locked);
        store.add_artifact(unlocked);

        let outcome = sweeper(Arc::clone(&store), SweepStrategy::UnlockedFirst)
            .execute()
            .await;

        // First pass destroys nothing, reclassifies both; the next pass
        // destroys the one that turned out unlocked.
        assert_eq!(outcome.reclassified_count, 2);
        assert_eq!(outcome.removed_count, 1);
        assert_eq!(store.remaining(), 1);
        assert_eq!(
            store.lock_state_of(locked_id),
            Some(ArtifactLockState::ArtifactsLocked)
        );
    }

    #[tokio::test]
    async fn test_legacy_iteration_consults_pipeline_for_unknown_rows() {
        let store = Arc::new(MemoryArtifactStore::new());

        let from_locked_pipeline = artifact(ArtifactLockState::Unknown, 5);
        let from_unlocked_pipeline = artifact(ArtifactLockState::Unknown, 5);
        store.link_pipeline(
            from_locked_pipeline.job_id,
            Uuid::new_v4(),
            ArtifactLockState::ArtifactsLocked,
        );
        store.link_pipeline(
            from_unlocked_pipeline.job_id,
            Uuid::new_v4(),
            ArtifactLockState::Unlocked,
        );
        store.add_artifact(from_locked_pipeline);
        store.add_artifact(from_unlocked_pipeline);

        let outcome = sweeper(Arc::clone(&store), SweepStrategy::LegacyIteration)
            .execute()
            .await;

        assert_eq!(outcome.removed_count, 1);
        assert_eq!(store.remaining(), 1);
    }

    #[tokio::test]
    async fn test_destroy_failure_does_not_abort_run() {
        let store = Arc::new(MemoryArtifactStore::new());
        store.add_artifact(artifact(ArtifactLockState::Unlocked, 1));
        store.fail_destroys();

        let outcome = sweeper(Arc::clone(&store), SweepStrategy::UnlockedFirst)
            .execute()
            .await;

        // The failed batch counts zero destroyed; with no backlog either,
        // the run ends cleanly instead of erroring.
        assert_eq!(outcome.removed_count, 0);
        assert!(!outcome.skipped);
        assert_eq!(store.remaining(), 1);
    }

    #[tokio::test]
    async fn test_held_lease_skips_run_with_zero_work() {
        let store = Arc::new(MemoryArtifactStore::new());
        store.add_artifact(artifact(ArtifactLockState::Unlocked, 1));

        let lease = Arc::new(MemoryLease::new());
        assert!(lease.try_acquire(LOCK_KEY, LOCK_TTL).await.unwrap());

        let sweeper = Sweeper::new(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            Arc::clone(&lease) as Arc<dyn SweepLease>,
            SweepStrategy::UnlockedFirst,
        );
        let outcome = sweeper.execute().await;

        assert!(outcome.skipped);
        assert_eq!(outcome.removed_count, 0);
        assert_eq!(outcome.batches, 0);
        assert_eq!(store.remaining(), 1);

        // Once the holder releases, the next run proceeds.
        lease.release(LOCK_KEY).await.unwrap();
        let outcome = sweeper.execute().await;
        assert!(!outcome.skipped);
        assert_eq!(outcome.removed_count, 1);
    }

    #[tokio::test]
    async fn test_lease_released_after_run() {
        let store = Arc::new(MemoryArtifactStore::new());
        let lease = Arc::new(MemoryLease::new());

        let sweeper = Sweeper::new(
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
            Arc::clone(&lease) as Arc<dyn SweepLease>,
            SweepStrategy::UnlockedFirst,
        );

        assert!(!sweeper.execute().await.skipped);
        assert!(!sweeper.execute().await.skipped);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            SweepStrategy::parse("unlocked_first"),
            Some(SweepStrategy::UnlockedFirst)
        );
        assert_eq!(
            SweepStrategy::parse("legacy"),
            Some(SweepStrategy::LegacyIteration)
        );
        assert_eq!(SweepStrategy::parse("both"), None);
    }
}
