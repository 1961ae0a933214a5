//! End-to-end tracking flow tests over the REST surface
//!
//! Exercises the router with the in-memory store: ingestion, queries,
//! camera admin, and full episodes from entry to archive.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use anpr_trackserver::camera_registry::CameraRegistry;
use anpr_trackserver::event_log::EventLogService;
use anpr_trackserver::notifier::{Notifier, NotifierConfig};
use anpr_trackserver::state::{AppConfig, AppState};
use anpr_trackserver::store::{MemoryStore, StoreBackend, TrackerStore};
use anpr_trackserver::timer_reaper::TimerReaper;
use anpr_trackserver::tracker::{TrackerConfig, VehicleTracker};
use anpr_trackserver::web_api;

fn test_config(window: Duration) -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        store_backend: StoreBackend::Memory,
        database_url: None,
        tracking_window: window,
        entry_camera: "camera1".to_string(),
        reaper_poll_interval: Duration::from_millis(50),
        archive_retention: Duration::from_secs(3600),
    }
}

fn build_app(window: Duration) -> (Router, Arc<VehicleTracker>, Arc<dyn TrackerStore>) {
    let config = test_config(window);
    let store: Arc<dyn TrackerStore> = Arc::new(MemoryStore::new());
    let cameras = Arc::new(CameraRegistry::new(store.clone()));
    let event_log = Arc::new(EventLogService::new(100));
    let notifier = Arc::new(Notifier::new(NotifierConfig::default()));
    let tracker = Arc::new(VehicleTracker::new(
        store.clone(),
        cameras.clone(),
        event_log.clone(),
        notifier,
        TrackerConfig {
            window: config.tracking_window,
            entry_camera: config.entry_camera.clone(),
            archive_retention: config.archive_retention,
            ..TrackerConfig::default()
        },
    ));

    let state = AppState {
        config,
        store: store.clone(),
        tracker: tracker.clone(),
        cameras,
        event_log,
    };
    (web_api::create_router(state), tracker, store)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Request::post(uri), Some(body)).await
}

async fn put_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Request::put(uri), Some(body)).await
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri), None).await
}

async fn send(
    app: &Router,
    builder: axum::http::request::Builder,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_detection_roundtrip() {
    let (app, _, _) = build_app(Duration::from_secs(30));

    let (status, body) = post_json(
        &app,
        "/api/detections",
        json!({"camera_id": "camera1", "plate": "mh 20 ee 7598"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["data"]["action"], json!("ENTRY"));
    assert_eq!(body["data"]["plate"], json!("MH20EE7598"));

    let (status, body) = get_json(&app, "/api/vehicles/MH20EE7598").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("ENTERED"));
    assert_eq!(body["data"]["detection_count"], json!(1));
    assert!(body["data"]["timer_remaining_seconds"].as_u64().unwrap() > 0);

    let (status, body) = get_json(&app, "/api/vehicles").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_detection_commits_nothing() {
    let (app, _, store) = build_app(Duration::from_secs(30));

    let (status, _) = post_json(
        &app,
        "/api/detections",
        json!({"camera_id": "camera1", "plate": "   "}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_json(
        &app,
        "/api/detections",
        json!({"camera_id": "camera1", "plate": "KA01AB1234", "timestamp": "yesterday"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(store.list_records().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_explicit_timestamps_drive_dedup() {
    let (app, _, _) = build_app(Duration::from_secs(30));

    let (_, body) = post_json(
        &app,
        "/api/detections",
        json!({"camera_id": "camera2", "plate": "KA01AB1234",
               "timestamp": "2026-08-07T10:00:00Z"}),
    )
    .await;
    assert_eq!(body["data"]["action"], json!("ENTRY"));

    let (_, body) = post_json(
        &app,
        "/api/detections",
        json!({"camera_id": "camera2", "plate": "KA01AB1234",
               "timestamp": "2026-08-07T10:00:00.300Z"}),
    )
    .await;
    assert_eq!(body["data"]["action"], json!("DUPLICATE"));

    let (_, body) = post_json(
        &app,
        "/api/detections",
        json!({"camera_id": "camera2", "plate": "KA01AB1234",
               "timestamp": "2026-08-07T10:00:05Z"}),
    )
    .await;
    assert_eq!(body["data"]["action"], json!("UPDATE_SAME_CAMERA"));
}

#[tokio::test]
async fn test_exit_episode_over_api() {
    let (app, _, _) = build_app(Duration::from_secs(30));

    post_json(
        &app,
        "/api/detections",
        json!({"camera_id": "camera1", "plate": "KA01AB1234",
               "timestamp": "2026-08-07T10:00:00Z"}),
    )
    .await;
    let (_, body) = post_json(
        &app,
        "/api/detections",
        json!({"camera_id": "camera1", "plate": "KA01AB1234",
               "timestamp": "2026-08-07T10:00:03Z"}),
    )
    .await;
    assert_eq!(body["data"]["action"], json!("EXIT"));

    // Active tracking cleared, history holds the exited episode
    let (status, _) = get_json(&app, "/api/vehicles/KA01AB1234").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = get_json(&app, "/api/vehicles/KA01AB1234/history").await;
    let episodes = body["data"].as_array().unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0]["record"]["status"], json!("EXITED"));

    // Events recorded: entry then exit
    let (_, body) = get_json(&app, "/api/events?plate=KA01AB1234").await;
    let kinds: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event"]["type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["exit", "entry"]);
}

#[tokio::test]
async fn test_movement_then_reaper_parks_vehicle() {
    let (app, tracker, store) = build_app(Duration::from_millis(200));

    post_json(
        &app,
        "/api/detections",
        json!({"camera_id": "camera1", "plate": "KA01AB1234",
               "timestamp": "2026-08-07T10:00:00Z"}),
    )
    .await;
    let (_, body) = post_json(
        &app,
        "/api/detections",
        json!({"camera_id": "camera2", "plate": "KA01AB1234",
               "timestamp": "2026-08-07T10:00:05Z"}),
    )
    .await;
    assert_eq!(body["data"]["action"], json!("MOVED"));
    assert_eq!(body["data"]["path"], json!(["camera1", "camera2"]));

    tokio::time::sleep(Duration::from_millis(300)).await;
    TimerReaper::run_once(&tracker, &store).await;

    let (status, _) = get_json(&app, "/api/vehicles/KA01AB1234").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = get_json(&app, "/api/vehicles/KA01AB1234/history").await;
    let episodes = body["data"].as_array().unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0]["record"]["status"], json!("PARKED"));
    assert_eq!(episodes[0]["record"]["last_seen_camera"], json!("camera2"));
}

#[tokio::test]
async fn test_camera_admin_surface() {
    let (app, _, _) = build_app(Duration::from_secs(30));

    let (status, body) = put_json(
        &app,
        "/api/cameras/camera1",
        json!({"name": "Main Gate", "latitude": 12.968194, "longitude": 79.155917}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["camera_id"], json!("camera1"));

    let (status, body) = get_json(&app, "/api/cameras/camera1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], json!("Main Gate"));

    let (status, _) = get_json(&app, "/api/cameras/camera9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = get_json(&app, "/api/cameras").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_fresh_episode_after_parked() {
    let (app, tracker, store) = build_app(Duration::from_millis(100));

    post_json(
        &app,
        "/api/detections",
        json!({"camera_id": "camera2", "plate": "KA01AB1234"}),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    TimerReaper::run_once(&tracker, &store).await;

    // Same plate re-enters afresh
    let (_, body) = post_json(
        &app,
        "/api/detections",
        json!({"camera_id": "camera3", "plate": "KA01AB1234"}),
    )
    .await;
    assert_eq!(body["data"]["action"], json!("ENTRY"));

    let (_, body) = get_json(&app, "/api/vehicles/KA01AB1234").await;
    assert_eq!(body["data"]["status"], json!("ENTERED"));
    assert_eq!(body["data"]["last_seen_camera"], json!("camera3"));
}
