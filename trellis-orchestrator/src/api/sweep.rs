//! Sweep API Handlers

use axum::{Json, extract::State};

use trellis_core::dto::sweep::SweepOutcome;

use crate::api::AppState;

/// POST /sweep/run
/// Trigger one sweep outside the schedule. A run skipped because the lease
/// is held elsewhere still answers 200 with `skipped: true`.
pub async fn run_sweep(State(state): State<AppState>) -> Json<SweepOutcome> {
    Json(state.sweeper.execute().await)
}
