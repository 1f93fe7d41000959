//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod pipeline;
pub mod policy;
pub mod sweep;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::chain::ChainDeps;
use crate::sweeper::Sweeper;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ChainDeps>,
    pub sweeper: Arc<Sweeper>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/pipeline/create", post(pipeline::create_pipeline))
        .route("/pipeline/{id}", get(pipeline::get_pipeline))
        // Policy evaluation
        .route("/policy/evaluate", post(policy::evaluate))
        // Manual sweep trigger
        .route("/sweep/run", post(sweep::run_sweep))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
