//! Ref existence and ambiguity checks

use async_trait::async_trait;

use trellis_core::domain::pipeline::FailureReason;

use crate::chain::{ChainDeps, Command, Step, StepOutcome};

pub struct ValidateRef;

#[async_trait]
impl Step for ValidateRef {
    fn name(&self) -> &'static str {
        "validate_ref"
    }

    async fn perform(&self, command: &mut Command, deps: &ChainDeps) -> StepOutcome {
        let ambiguous = match command.ambiguous_ref(deps.repo.as_ref()).await {
            Ok(ambiguous) => ambiguous,
            Err(e) => {
                command.fail(FailureReason::UnknownFailure, e.to_string());
                return StepOutcome::Halt;
            }
        };

        if ambiguous {
            command.fail(
                FailureReason::ConfigError,
                "Ref is ambiguous; use a fully qualified reference",
            );
            return StepOutcome::Halt;
        }

        let branch = command.branch_exists(deps.repo.as_ref()).await;
        let tag = command.tag_exists(deps.repo.as_ref()).await;

        match (branch, tag) {
            (Ok(false), Ok(false)) => {
                command.fail(FailureReason::ConfigError, "Reference not found");
                return StepOutcome::Halt;
            }
            (Err(e), _) | (_, Err(e)) => {
                command.fail(FailureReason::UnknownFailure, e.to_string());
                return StepOutcome::Halt;
            }
            _ => {}
        }

        match command.sha(deps.repo.as_ref()).await {
            Ok(Some(_)) => StepOutcome::Continue,
            Ok(None) => {
                command.fail(FailureReason::ConfigError, "Commit not found");
                StepOutcome::Halt
            }
            Err(e) => {
                command.fail(FailureReason::UnknownFailure, e.to_string());
                StepOutcome::Halt
            }
        }
    }
}
