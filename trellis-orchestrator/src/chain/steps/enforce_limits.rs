//! Quota enforcement step

use async_trait::async_trait;

use trellis_core::domain::pipeline::FailureReason;

use crate::chain::{ChainDeps, Command, Step, StepOutcome};

pub struct EnforceLimits;

#[async_trait]
impl Step for EnforceLimits {
    fn name(&self) -> &'static str {
        "enforce_limits"
    }

    async fn perform(&self, command: &mut Command, deps: &ChainDeps) -> StepOutcome {
        let Some(seed) = &command.seed else {
            command.fail(FailureReason::UnknownFailure, "no pipeline seed");
            return StepOutcome::Halt;
        };

        let size = seed.total_size();

        if size > deps.limits.max_pipeline_size {
            command.fail(
                FailureReason::SizeLimitExceeded,
                format!(
                    "Pipeline has {size} jobs, exceeding the limit of {}",
                    deps.limits.max_pipeline_size
                ),
            );
            return StepOutcome::Halt;
        }

        let alive = match deps.store.alive_jobs_count(command.project.id).await {
            Ok(alive) => alive,
            Err(e) => {
                command.fail(FailureReason::UnknownFailure, e.to_string());
                return StepOutcome::Halt;
            }
        };

        if alive + size as u64 > deps.limits.max_active_jobs as u64 {
            command.fail(
                FailureReason::JobActivityLimitExceeded,
                format!(
                    "Project has {alive} alive jobs; adding {size} would exceed the limit of {}",
                    deps.limits.max_active_jobs
                ),
            );
            return StepOutcome::Halt;
        }

        StepOutcome::Continue
    }
}
