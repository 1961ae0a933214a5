//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - Detection ingestion
//! - Vehicle / archive / camera / event queries
//! - Request validation and response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let active_vehicles = state
        .tracker
        .list_active()
        .await
        .map(|v| v.len())
        .unwrap_or(0);

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_backend: state.config.store_backend.as_str().to_string(),
        active_vehicles,
    };

    Json(response)
}
