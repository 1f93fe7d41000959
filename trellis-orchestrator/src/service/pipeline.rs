//! Pipeline Service
//!
//! Builds the creation command from a request and drives the chain.

use uuid::Uuid;

use trellis_core::domain::actor::Actor;
use trellis_core::domain::pipeline::Pipeline;
use trellis_core::domain::project::Project;
use trellis_core::dto::pipeline::{CreatePipeline, PipelineOutcome};
use trellis_core::variables::Variables;

use crate::chain::{Chain, ChainDeps, Command, CommandBuildError};
use crate::store::{PipelineStore, StoreError};

/// Run one pipeline-creation attempt.
///
/// The chain owns all rejection semantics; the only error here is a
/// malformed command, which is the host's bug rather than a pipeline
/// outcome.
pub async fn create_pipeline(
    deps: &ChainDeps,
    project: Project,
    actor: Actor,
    req: CreatePipeline,
) -> Result<PipelineOutcome, CommandBuildError> {
    let variables: Variables = req.variables.into_iter().collect();

    let command = Command::builder()
        .project(project)
        .actor(actor)
        .origin_ref(req.origin_ref.as_str())
        .source(req.source)
        .checkout_sha(req.checkout_sha)
        .after_sha(req.after_sha)
        .before_sha(req.before_sha)
        .source_sha(req.source_sha)
        .target_sha(req.target_sha)
        .parent_pipeline(req.parent_pipeline)
        .variables(variables)
        .content(req.content)
        .dry_run(req.dry_run)
        .build()?;

    Ok(Chain::standard().run(command, deps).await)
}

/// Get a pipeline by ID
pub async fn get_pipeline(
    store: &dyn PipelineStore,
    id: Uuid,
) -> Result<Option<Pipeline>, StoreError> {
    store.find_pipeline(id).await
}
