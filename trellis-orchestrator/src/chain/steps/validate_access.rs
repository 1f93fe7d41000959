//! Project and actor admission checks

use async_trait::async_trait;

use trellis_core::domain::actor::Capability;
use trellis_core::domain::pipeline::FailureReason;

use crate::chain::{ChainDeps, Command, Step, StepOutcome};

pub struct ValidateAccess;

#[async_trait]
impl Step for ValidateAccess {
    fn name(&self) -> &'static str {
        "validate_access"
    }

    async fn perform(&self, command: &mut Command, _deps: &ChainDeps) -> StepOutcome {
        if command.project.pending_delete {
            command.fail(
                FailureReason::ProjectDeleted,
                FailureReason::ProjectDeleted.message(),
            );
            return StepOutcome::Halt;
        }

        if !command.actor.verified {
            command.fail(
                FailureReason::UserNotVerified,
                FailureReason::UserNotVerified.message(),
            );
            return StepOutcome::Halt;
        }

        if command.project.archived {
            command.fail(
                FailureReason::ConfigError,
                "Pipelines are disabled for archived projects",
            );
            return StepOutcome::Halt;
        }

        if !command.actor.can(Capability::CreatePipeline) {
            command.fail(
                FailureReason::ConfigError,
                "Insufficient permissions to create a pipeline on this ref",
            );
            return StepOutcome::Halt;
        }

        StepOutcome::Continue
    }
}
