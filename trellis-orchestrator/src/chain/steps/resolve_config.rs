//! Configuration resolution step

use async_trait::async_trait;

use trellis_core::domain::pipeline::FailureReason;
use trellis_core::variables::{Variable, Variables};

use trellis_config::context::ResolveContext;
use trellis_config::resolver::Resolver;

use crate::chain::{ChainDeps, Command, Step, StepOutcome, RESOLVE_TIMEOUT};

pub struct ResolveConfig;

#[async_trait]
impl Step for ResolveConfig {
    fn name(&self) -> &'static str {
        "resolve_config"
    }

    async fn perform(&self, command: &mut Command, deps: &ChainDeps) -> StepOutcome {
        let sha = match command.sha(deps.repo.as_ref()).await {
            Ok(Some(sha)) => sha,
            _ => {
                command.fail(FailureReason::UnknownFailure, "commit sha unavailable");
                return StepOutcome::Halt;
            }
        };

        let content = match &command.content {
            Some(content) => content.clone(),
            None => match deps.repo.default_config(&command.project.path, &sha).await {
                Ok(Some(content)) => content,
                Ok(None) => {
                    command.fail(
                        FailureReason::ConfigError,
                        "Missing pipeline configuration file",
                    );
                    return StepOutcome::Halt;
                }
                Err(e) => {
                    command.fail(FailureReason::UnknownFailure, e.to_string());
                    return StepOutcome::Halt;
                }
            },
        };

        // Predefined variables sit below the request's own, which keep the
        // final word in rule evaluation.
        let mut variables: Variables = [
            Variable::new("CI_COMMIT_REF_NAME", command.origin_ref.short_name()),
            Variable::new("CI_COMMIT_SHA", sha.as_str()),
            Variable::new("CI_PIPELINE_SOURCE", command.source.as_str()),
            Variable::new("CI_PROJECT_PATH", command.project.path.as_str()),
        ]
        .into_iter()
        .collect();
        variables.merge(&command.variables);
        command.variables = variables;

        let mut ctx = ResolveContext::new(
            command.project.path.clone(),
            sha,
            command.variables.clone(),
            deps.expand_policy,
        )
        .with_actor(command.actor.id);
        if let Some(parent) = command.parent_pipeline {
            ctx = ctx.with_parent_pipeline(parent);
        }
        ctx.set_deadline(RESOLVE_TIMEOUT);

        let resolver = Resolver::new(deps.fetcher.clone());

        match resolver.resolve(&ctx, &content).await {
            Ok(resolved) => {
                command.resolved_config = Some(resolved);
                StepOutcome::Continue
            }
            Err(e) => {
                // Resolver messages carry masked locations already; masking
                // the whole rendering once more costs nothing.
                command.fail(FailureReason::ConfigError, ctx.mask(&e.to_string()));
                StepOutcome::Halt
            }
        }
    }
}
