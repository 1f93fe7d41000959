//! Pipeline creation chain
//!
//! An ordered sequence of steps transforms a [`Command`] into either a
//! persisted pipeline or a structured rejection. Steps run strictly in
//! declared order; the first recorded failure short-circuits the rest, and
//! the chain always terminates in exactly one of the two outcomes.

pub mod command;
pub mod steps;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use trellis_core::dto::pipeline::{JobSummary, PipelineOutcome};
use trellis_core::domain::pipeline::FailureReason;

use trellis_config::context::ExpandPolicy;
use trellis_config::fetcher::ConfigFetcher;

pub use command::{Command, CommandBuildError, CommandBuilder};

use crate::metrics;
use crate::repo::RepoIndex;
use crate::store::PipelineStore;

/// Wall-clock budget for one configuration resolution run.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Quota ceilings enforced by the chain.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum jobs in one pipeline.
    pub max_pipeline_size: usize,
    /// Maximum alive jobs per project, counting the new pipeline.
    pub max_active_jobs: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_pipeline_size: 500,
            max_active_jobs: 2000,
        }
    }
}

/// Pluggable final validation, injected at construction time.
///
/// The default accepts everything; deployments with an external compliance
/// service supply their own implementation.
#[async_trait]
pub trait PipelineValidator: Send + Sync {
    /// `Err` carries the denial message shown to the user.
    async fn validate(&self, command: &Command) -> Result<(), String>;
}

/// Default validator: no external validation configured.
pub struct AcceptAll;

#[async_trait]
impl PipelineValidator for AcceptAll {
    async fn validate(&self, _command: &Command) -> Result<(), String> {
        Ok(())
    }
}

/// Collaborators shared by every step.
pub struct ChainDeps {
    pub repo: Arc<dyn RepoIndex>,
    pub fetcher: Arc<dyn ConfigFetcher>,
    pub store: Arc<dyn PipelineStore>,
    pub validator: Arc<dyn PipelineValidator>,
    pub limits: Limits,
    pub expand_policy: ExpandPolicy,
}

/// Control flow after one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Halt,
}

/// One stage of the pipeline creation chain.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    /// Mutates the command and decides whether the chain continues. A step
    /// records failures on the command itself; nothing is raised past the
    /// chain boundary.
    async fn perform(&self, command: &mut Command, deps: &ChainDeps) -> StepOutcome;
}

/// The ordered chain.
pub struct Chain {
    steps: Vec<Box<dyn Step>>,
}

impl Chain {
    /// The standard creation chain in its declared order.
    pub fn standard() -> Self {
        Self {
            steps: vec![
                Box::new(steps::validate_access::ValidateAccess),
                Box::new(steps::validate_ref::ValidateRef),
                Box::new(steps::resolve_config::ResolveConfig),
                Box::new(steps::evaluate_workflow::EvaluateWorkflow),
                Box::new(steps::expand_seed::ExpandSeed),
                Box::new(steps::enforce_limits::EnforceLimits),
                Box::new(steps::external_validation::ExternalValidation),
                Box::new(steps::persist::Persist),
            ],
        }
    }

    /// Runs the chain to completion and renders the outcome.
    pub async fn run(&self, mut command: Command, deps: &ChainDeps) -> PipelineOutcome {
        let run_started = Instant::now();

        for step in &self.steps {
            if command.failed() {
                break;
            }

            let step_started = Instant::now();
            let outcome = step.perform(&mut command, deps).await;
            metrics::observe_step_duration(step.name(), step_started.elapsed().as_secs_f64());

            let halted = outcome == StepOutcome::Halt;
            debug!(step = step.name(), halted, "chain step done");

            if halted {
                break;
            }
        }

        metrics::observe_creation_duration(run_started.elapsed().as_secs_f64());

        if let Some((reason, message)) = command.failure() {
            metrics::increment_failure_reason(reason);
            info!(reason = reason.as_str(), "pipeline rejected");
            return PipelineOutcome::Rejected {
                reason,
                message: message.to_string(),
            };
        }

        match (&command.pipeline, &command.seed) {
            (Some(pipeline), Some(seed)) => {
                metrics::observe_pipeline_size(seed.total_size());
                info!(pipeline = %pipeline.id, size = seed.total_size(), "pipeline created");

                PipelineOutcome::Created {
                    id: pipeline.id,
                    size: seed.total_size() as u32,
                    jobs: seed
                        .jobs()
                        .map(|j| JobSummary {
                            name: j.name.clone(),
                            stage: j.stage.clone(),
                        })
                        .collect(),
                }
            }
            _ => {
                // A chain that neither failed nor produced a pipeline is a
                // bug in the step list; surface it as unknown.
                warn!("chain terminated without pipeline or failure");
                metrics::increment_failure_reason(FailureReason::UnknownFailure);
                PipelineOutcome::Rejected {
                    reason: FailureReason::UnknownFailure,
                    message: FailureReason::UnknownFailure.message().to_string(),
                }
            }
        }
    }
}
