//! Workflow rule step

use async_trait::async_trait;

use trellis_core::domain::pipeline::FailureReason;

use trellis_config::workflow::{self, WorkflowDecision};

use crate::chain::{ChainDeps, Command, Step, StepOutcome};

pub struct EvaluateWorkflow;

#[async_trait]
impl Step for EvaluateWorkflow {
    fn name(&self) -> &'static str {
        "evaluate_workflow"
    }

    async fn perform(&self, command: &mut Command, _deps: &ChainDeps) -> StepOutcome {
        let Some(resolved) = &command.resolved_config else {
            command.fail(FailureReason::UnknownFailure, "no resolved configuration");
            return StepOutcome::Halt;
        };

        match workflow::evaluate(&resolved.config, &command.variables) {
            Ok(WorkflowDecision::Run) => {
                command.workflow_decision = Some(WorkflowDecision::Run);
                StepOutcome::Continue
            }
            Ok(WorkflowDecision::Filtered) => {
                command.workflow_decision = Some(WorkflowDecision::Filtered);
                command.fail(
                    FailureReason::FilteredByWorkflowRules,
                    FailureReason::FilteredByWorkflowRules.message(),
                );
                StepOutcome::Halt
            }
            Err(e) => {
                command.fail(
                    FailureReason::ConfigError,
                    command.variables.mask(&e.to_string()),
                );
                StepOutcome::Halt
            }
        }
    }
}
