//! Injected external validation step

use async_trait::async_trait;

use trellis_core::domain::pipeline::FailureReason;

use crate::chain::{ChainDeps, Command, Step, StepOutcome};

pub struct ExternalValidation;

#[async_trait]
impl Step for ExternalValidation {
    fn name(&self) -> &'static str {
        "external_validation"
    }

    async fn perform(&self, command: &mut Command, deps: &ChainDeps) -> StepOutcome {
        match deps.validator.validate(command).await {
            Ok(()) => StepOutcome::Continue,
            Err(message) => {
                command.fail(
                    FailureReason::ExternalValidationFailure,
                    command.variables.mask(&message),
                );
                StepOutcome::Halt
            }
        }
    }
}
