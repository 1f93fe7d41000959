//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline creation and lookup.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use trellis_core::domain::actor::Actor;
use trellis_core::domain::pipeline::Pipeline;
use trellis_core::domain::project::Project;
use trellis_core::dto::pipeline::{CreatePipeline, PipelineOutcome};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::pipeline_service;

/// Creation payload: the host supplies the project and actor snapshots
/// alongside the request itself.
#[derive(Debug, Deserialize)]
pub struct CreatePipelinePayload {
    pub project: Project,
    pub actor: Actor,
    #[serde(flatten)]
    pub request: CreatePipeline,
}

/// POST /pipeline/create
/// Run the creation chain; a rejection is a structured outcome, not an error
pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(payload): Json<CreatePipelinePayload>,
) -> ApiResult<(StatusCode, Json<PipelineOutcome>)> {
    tracing::info!(
        project = %payload.project.path,
        origin_ref = %payload.request.origin_ref,
        "creating pipeline"
    );

    let outcome = pipeline_service::create_pipeline(
        &state.deps,
        payload.project,
        payload.actor,
        payload.request,
    )
    .await
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let status = if outcome.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    Ok((status, Json(outcome)))
}

/// GET /pipeline/{id}
/// Get pipeline by ID
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Getting pipeline: {}", id);

    let pipeline = pipeline_service::get_pipeline(state.deps.store.as_ref(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Pipeline {id} not found")))?;

    Ok(Json(pipeline))
}
