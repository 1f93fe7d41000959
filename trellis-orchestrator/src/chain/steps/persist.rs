//! Pipeline materialization and persistence handoff

use async_trait::async_trait;
use tracing::error;
use uuid::Uuid;

use trellis_core::domain::artifact::ArtifactLockState;
use trellis_core::domain::job::{Job, JobStatus};
use trellis_core::domain::pipeline::{FailureReason, Pipeline, PipelineStatus};

use trellis_config::rules::When;

use crate::chain::{ChainDeps, Command, Step, StepOutcome};

pub struct Persist;

#[async_trait]
impl Step for Persist {
    fn name(&self) -> &'static str {
        "persist"
    }

    async fn perform(&self, command: &mut Command, deps: &ChainDeps) -> StepOutcome {
        let sha = match command.sha(deps.repo.as_ref()).await {
            Ok(Some(sha)) => sha,
            _ => {
                command.fail(FailureReason::UnknownFailure, "commit sha unavailable");
                return StepOutcome::Halt;
            }
        };

        let tag = match command.tag_exists(deps.repo.as_ref()).await {
            Ok(tag) => tag,
            Err(e) => {
                command.fail(FailureReason::UnknownFailure, e.to_string());
                return StepOutcome::Halt;
            }
        };

        let Some(seed) = &command.seed else {
            command.fail(FailureReason::UnknownFailure, "no pipeline seed");
            return StepOutcome::Halt;
        };

        let now = chrono::Utc::now();
        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            project_id: command.project.id,
            ref_name: command.origin_ref.short_name().to_string(),
            sha,
            tag,
            source: command.source,
            status: PipelineStatus::Created,
            locked: ArtifactLockState::Unlocked,
            size: seed.total_size() as u32,
            failure_reason: None,
            created_at: now,
            finished_at: None,
        };

        let jobs: Vec<Job> = seed
            .jobs()
            .map(|j| Job {
                id: Uuid::new_v4(),
                pipeline_id: pipeline.id,
                project_id: command.project.id,
                name: j.name.clone(),
                stage: j.stage.clone(),
                status: match j.when {
                    When::Manual => JobStatus::Created,
                    _ => JobStatus::Pending,
                },
                ref_name: pipeline.ref_name.clone(),
                tag,
                tags: j.tags.clone(),
                needs: j.needs.clone(),
                allow_failure: j.allow_failure,
                owner_id: Some(command.actor.id),
                outdated_deployment: false,
                debug_mode: false,
                has_artifacts: j.artifacts.is_some(),
                artifacts_public: command.project.public_builds,
                erased_at: None,
            })
            .collect();

        if !command.dry_run {
            if let Err(e) = deps.store.persist_pipeline(&pipeline, &jobs).await {
                error!(error = %e, "failed to persist pipeline");
                command.fail(FailureReason::UnknownFailure, "Failed to persist the pipeline");
                return StepOutcome::Halt;
            }
        }

        command.pipeline = Some(pipeline);
        StepOutcome::Continue
    }
}
