//! API Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::camera_registry::CameraMetadata;
use crate::error::Error;
use crate::models::ApiResponse;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Detection ingestion
        .route("/api/detections", post(ingest_detection))
        // Vehicles
        .route("/api/vehicles", get(list_vehicles))
        .route("/api/vehicles/:plate", get(get_vehicle))
        .route("/api/vehicles/:plate/history", get(vehicle_history))
        // Events
        .route("/api/events", get(list_events))
        // Cameras
        .route("/api/cameras", get(list_cameras))
        .route("/api/cameras/:id", get(get_camera))
        .route("/api/cameras/:id", put(update_camera))
        .with_state(state)
}

// ========================================
// Detection Handlers
// ========================================

/// Detection ingestion request
#[derive(Debug, Deserialize)]
struct DetectionRequest {
    camera_id: String,
    plate: String,
    /// ISO-8601; defaults to receipt time
    timestamp: Option<String>,
}

/// A 200 response means the transition is durably committed; rejected
/// detections carry the reason and commit nothing.
async fn ingest_detection(
    State(state): State<AppState>,
    Json(req): Json<DetectionRequest>,
) -> impl IntoResponse {
    let ts = match &req.timestamp {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                return Error::Validation(format!("Invalid timestamp '{}': {}", raw, e))
                    .into_response()
            }
        },
        None => Utc::now(),
    };

    match state.tracker.on_detect(&req.plate, &req.camera_id, ts).await {
        Ok(outcome) => Json(ApiResponse::success(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Vehicle Handlers
// ========================================

async fn list_vehicles(State(state): State<AppState>) -> impl IntoResponse {
    match state.tracker.list_active().await {
        Ok(vehicles) => Json(ApiResponse::success(vehicles)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_vehicle(
    State(state): State<AppState>,
    Path(plate): Path<String>,
) -> impl IntoResponse {
    match state.tracker.get_vehicle(&plate).await {
        Ok(Some(vehicle)) => Json(ApiResponse::success(vehicle)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Not found"})),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn vehicle_history(
    State(state): State<AppState>,
    Path(plate): Path<String>,
) -> impl IntoResponse {
    match state.tracker.history(&plate).await {
        Ok(episodes) => Json(ApiResponse::success(episodes)).into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Event Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct EventsQuery {
    count: Option<usize>,
    plate: Option<String>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let count = query.count.unwrap_or(50);
    let events = match query.plate {
        Some(plate) => state.event_log.get_by_plate(&plate, count).await,
        None => state.event_log.get_latest(count).await,
    };
    Json(ApiResponse::success(events))
}

// ========================================
// Camera Handlers
// ========================================

/// Camera metadata update request
#[derive(Debug, Deserialize)]
struct UpdateCameraRequest {
    name: String,
    latitude: f64,
    longitude: f64,
}

async fn list_cameras(State(state): State<AppState>) -> impl IntoResponse {
    match state.cameras.list().await {
        Ok(cameras) => Json(ApiResponse::success(cameras)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_camera(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.cameras.get_metadata(&id).await {
        Ok(Some(camera)) => Json(ApiResponse::success(camera)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Not found"})),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn update_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCameraRequest>,
) -> impl IntoResponse {
    let meta = CameraMetadata {
        camera_id: id,
        name: req.name,
        latitude: req.latitude,
        longitude: req.longitude,
    };
    match state.cameras.set_metadata(meta).await {
        Ok(camera) => Json(ApiResponse::success(camera)).into_response(),
        Err(e) => e.into_response(),
    }
}
