//! YAML to job-DAG expansion step

use async_trait::async_trait;

use trellis_core::domain::pipeline::FailureReason;

use trellis_config::processor::{self, ProcessError};

use crate::chain::{ChainDeps, Command, Step, StepOutcome};

pub struct ExpandSeed;

#[async_trait]
impl Step for ExpandSeed {
    fn name(&self) -> &'static str {
        "expand_seed"
    }

    async fn perform(&self, command: &mut Command, _deps: &ChainDeps) -> StepOutcome {
        let Some(resolved) = &command.resolved_config else {
            command.fail(FailureReason::UnknownFailure, "no resolved configuration");
            return StepOutcome::Halt;
        };

        match processor::process(&resolved.config, &command.variables) {
            Ok(seed) if seed.total_size() == 0 => {
                // Jobs were defined but every one was filtered by rules.
                command.fail(
                    FailureReason::FilteredByRules,
                    FailureReason::FilteredByRules.message(),
                );
                StepOutcome::Halt
            }
            Ok(seed) => {
                command.seed = Some(seed);
                StepOutcome::Continue
            }
            Err(ProcessError::NoJobs) => {
                command.fail(FailureReason::ConfigError, "No jobs defined in configuration");
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
