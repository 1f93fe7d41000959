//! Policy API Handlers
//!
//! Policy decisions are pure functions of the snapshots the host supplies;
//! nothing is looked up or cached server-side.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use trellis_core::domain::actor::Actor;
use trellis_core::domain::job::Job;
use trellis_core::domain::project::Project;

use crate::api::AppState;
use crate::policy::{self, Ability};

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub actor: Actor,
    pub job: Job,
    pub project: Project,
    pub ability: Ability,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub allowed: bool,
}

/// POST /policy/evaluate
/// Evaluate one (actor, job, ability) decision
pub async fn evaluate(
    State(_state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Json<EvaluateResponse> {
    let allowed = policy::allowed(&req.actor, &req.job, &req.project, req.ability);

    // A denial is an ordinary outcome; it is never logged as a failure.
    tracing::debug!(ability = ?req.ability, allowed, "policy evaluated");

    Json(EvaluateResponse { allowed })
}
