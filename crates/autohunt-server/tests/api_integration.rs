//! HTTP API integration tests: drive every endpoint against a manually
//! ticked controller, a scripted game and an in-memory store.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use autohunt_config::{HuntConfig, schema::ServerConfig};
use autohunt_core::{PerceptionSnapshot, Position, RunState, Vital, Waypoint};
use autohunt_runtime::{Controller, LoopMode, RecordingActuator, ScriptedSource};
use autohunt_server::{
    ConfigView, PauseResponse, PositionResponse, StartResponse, StatisticsResponse, StopResponse,
    WaypointAdded, WaypointRemoved, build_router, record_sessions,
};
use autohunt_store::SessionStore;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    app: axum::Router,
    controller: Controller,
    store: SessionStore,
}

fn quiet_hunt() -> HuntConfig {
    let mut config = HuntConfig::default();
    config.name = "test profile".into();
    config.chances.food = 0.0;
    config.chances.anti_idle = 0.0;
    config.chances.kill = 0.0;
    config
}

fn snapshot() -> PerceptionSnapshot {
    PerceptionSnapshot::new(Vital::from_percent(90.0), Vital::from_percent(80.0))
        .with_player(Position::new(1032, 1017))
}

/// Build a router over a manual-mode controller with an optional preloaded profile.
fn setup(config: Option<HuntConfig>) -> Harness {
    let source = ScriptedSource::repeating(snapshot());
    let actuator = RecordingActuator::default();
    let mut builder = Controller::builder(Arc::new(source), Arc::new(actuator))
        .mode(LoopMode::Manual)
        .seed(3);
    if let Some(config) = config {
        builder = builder.config(config);
    }
    let controller = builder.build();
    let store = SessionStore::open_in_memory().unwrap();
    record_sessions(&controller, store.clone());

    let app = build_router(ServerConfig::default(), controller.clone(), Some(store.clone()));
    Harness {
        app,
        controller,
        store,
    }
}

/// Helper to read the full body bytes from a response.
async fn body_string(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, String) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    (status, body_string(resp).await)
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, String) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &axum::Router, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, String) {
    let req = match body {
        Some(json) => Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::post(uri).body(Body::empty()).unwrap(),
    };
    send(app, req).await
}

// ── Health ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_endpoint() {
    let h = setup(None);
    let (status, body) = get(&h.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

// ── Lifecycle ──────────────────────────────────────────────────

#[tokio::test]
async fn test_start_without_config_is_bad_request() {
    let h = setup(None);
    let (status, body) = post(&h.app, "/api/v1/bot/start", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("no configuration"));
    assert_eq!(h.controller.run_state(), RunState::Stopped);
}

#[tokio::test]
async fn test_start_twice_reports_same_session() {
    let h = setup(Some(quiet_hunt()));
    let (status, body) = post(&h.app, "/api/v1/bot/start", None).await;
    assert_eq!(status, StatusCode::OK);
    let first: StartResponse = serde_json::from_str(&body).unwrap();
    assert!(!first.already_running);
    assert_eq!(first.run_state, RunState::Running);

    let (_, body) = post(&h.app, "/api/v1/bot/start", None).await;
    let second: StartResponse = serde_json::from_str(&body).unwrap();
    assert!(second.already_running);
    assert_eq!(second.session_id, first.session_id);
}

#[tokio::test]
async fn test_start_falls_back_to_saved_profile() {
    let h = setup(None);
    h.store.save_profile(&quiet_hunt()).unwrap();

    let (status, _) = post(&h.app, "/api/v1/bot/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.controller.run_state(), RunState::Running);
    assert_eq!(h.controller.configuration().unwrap().name, "test profile");
}

#[tokio::test]
async fn test_pause_requires_running_loop() {
    let h = setup(Some(quiet_hunt()));
    let (status, _) = post(&h.app, "/api/v1/bot/pause", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    post(&h.app, "/api/v1/bot/start", None).await;
    let (status, body) = post(&h.app, "/api/v1/bot/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    let paused: PauseResponse = serde_json::from_str(&body).unwrap();
    assert!(paused.paused);
    assert_eq!(paused.run_state, RunState::Paused);

    let (_, body) = post(&h.app, "/api/v1/bot/pause", None).await;
    let resumed: PauseResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(resumed.run_state, RunState::Running);
}

#[tokio::test]
async fn test_stop_records_session() {
    let h = setup(Some(quiet_hunt()));
    post(&h.app, "/api/v1/bot/start", None).await;
    h.controller.tick().await;

    let (status, body) = post(&h.app, "/api/v1/bot/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    let stopped: StopResponse = serde_json::from_str(&body).unwrap();
    assert!(stopped.stopped);
    let session = stopped.session.unwrap();
    assert!(session.is_finalized());

    let (_, body) = get(&h.app, "/api/v1/bot/sessions").await;
    let sessions: Vec<autohunt_core::SessionStats> = serde_json::from_str(&body).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, session.session_id);

    // A second stop is a no-op.
    let (status, body) = post(&h.app, "/api/v1/bot/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    let again: StopResponse = serde_json::from_str(&body).unwrap();
    assert!(!again.stopped);
    assert!(again.session.is_none());
}

#[tokio::test]
async fn test_status_reflects_run() {
    let h = setup(Some(quiet_hunt()));
    let (_, body) = get(&h.app, "/api/v1/bot/status").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["run_state"], "stopped");
    assert_eq!(json["config_loaded"], true);

    post(&h.app, "/api/v1/bot/start", None).await;
    h.controller.tick().await;
    let (status, body) = get(&h.app, "/api/v1/bot/status").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["run_state"], "running");
    assert_eq!(json["game"]["hp_percent"], 90.0);
}

// ── Configuration & waypoints ──────────────────────────────────

#[tokio::test]
async fn test_config_roundtrip_saves_profile() {
    let h = setup(None);
    let (_, body) = get(&h.app, "/api/v1/bot/config").await;
    let view: ConfigView = serde_json::from_str(&body).unwrap();
    assert!(!view.loaded);

    let config = serde_json::to_value(quiet_hunt()).unwrap();
    let (status, body) = post(&h.app, "/api/v1/bot/config", Some(config)).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(json["profile_id"].is_i64());

    let (_, body) = get(&h.app, "/api/v1/bot/config").await;
    let view: ConfigView = serde_json::from_str(&body).unwrap();
    assert!(view.loaded);
    assert_eq!(view.config.unwrap().name, "test profile");
    assert_eq!(h.store.latest_profile().unwrap().unwrap().name, "test profile");
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let h = setup(None);
    let mut config = quiet_hunt();
    config.thresholds.heal_at_hp = 150.0;
    let (status, body) = post(
        &h.app,
        "/api/v1/bot/config",
        Some(serde_json::to_value(config).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("heal_at_hp"));
    assert!(h.controller.configuration().is_none());
}

#[tokio::test]
async fn test_waypoint_add_and_remove() {
    let h = setup(Some(quiet_hunt()));
    let (status, body) = post(
        &h.app,
        "/api/v1/bot/waypoints",
        Some(serde_json::json!({ "name": "Cave entrance", "x": 120, "y": 340 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let added: WaypointAdded = serde_json::from_str(&body).unwrap();
    assert_eq!(added.total_waypoints, 1);
    assert_eq!(added.waypoint.name, "Cave entrance");

    // Edits are persisted as the newest profile.
    let saved = h.store.latest_profile().unwrap().unwrap();
    assert_eq!(saved.config.waypoints(), &[added.waypoint.clone()]);

    let uri = format!("/api/v1/bot/waypoints/{}", added.waypoint.id);
    let (status, body) = send(&h.app, Request::delete(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let removed: WaypointRemoved = serde_json::from_str(&body).unwrap();
    assert_eq!(removed.waypoint.id, added.waypoint.id);
    assert_eq!(removed.remaining_waypoints, 0);

    let (status, _) = send(&h.app, Request::delete(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_waypoint_without_config_is_bad_request() {
    let h = setup(None);
    let (status, _) = post(
        &h.app,
        "/api/v1/bot/waypoints",
        Some(serde_json::json!({ "name": "Depot", "x": 1, "y": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_waypoint_added_while_running_is_visible() {
    let mut config = quiet_hunt();
    config.add_waypoint(Waypoint::new("Start", 0, 0));
    let h = setup(Some(config));
    post(&h.app, "/api/v1/bot/start", None).await;

    let (_, body) = post(
        &h.app,
        "/api/v1/bot/waypoints",
        Some(serde_json::json!({ "name": "Second", "x": 5, "y": 5, "description": "ramp" })),
    )
    .await;
    let added: WaypointAdded = serde_json::from_str(&body).unwrap();
    assert_eq!(added.total_waypoints, 2);
    assert_eq!(added.waypoint.description.as_deref(), Some("ramp"));
}

// ── Position, statistics & commands ────────────────────────────

#[tokio::test]
async fn test_position_after_tick() {
    let h = setup(Some(quiet_hunt()));
    let (_, body) = get(&h.app, "/api/v1/bot/position").await;
    let before: PositionResponse = serde_json::from_str(&body).unwrap();
    assert!(before.position.is_none());

    post(&h.app, "/api/v1/bot/start", None).await;
    h.controller.tick().await;
    let (_, body) = get(&h.app, "/api/v1/bot/position").await;
    let after: PositionResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(after.position, Some(Position::new(1032, 1017)));
}

#[tokio::test]
async fn test_statistics_combine_current_and_history() {
    let h = setup(Some(quiet_hunt()));
    post(&h.app, "/api/v1/bot/start", None).await;
    post(&h.app, "/api/v1/bot/stop", None).await;
    post(&h.app, "/api/v1/bot/start", None).await;

    let (status, body) = get(&h.app, "/api/v1/bot/statistics").await;
    assert_eq!(status, StatusCode::OK);
    let stats: StatisticsResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(stats.historical.sessions, 1);
    let current = stats.current_session.unwrap();
    assert!(!current.is_finalized());
}

#[tokio::test]
async fn test_emergency_stop_command() {
    let h = setup(Some(quiet_hunt()));
    post(&h.app, "/api/v1/bot/start", None).await;
    let (status, body) = post(
        &h.app,
        "/api/v1/bot/command",
        Some(serde_json::json!({ "command": "emergency_stop" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["command"], "emergency_stop");
    assert!(json["session"].is_object());
    assert_eq!(h.controller.run_state(), RunState::Stopped);
}

#[tokio::test]
async fn test_get_position_command_and_unknown_command() {
    let h = setup(Some(quiet_hunt()));
    post(&h.app, "/api/v1/bot/start", None).await;
    h.controller.tick().await;

    let (status, body) = post(
        &h.app,
        "/api/v1/bot/command",
        Some(serde_json::json!({ "command": "get_position" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["position"]["x"], 1032);

    let (status, body) = post(
        &h.app,
        "/api/v1/bot/command",
        Some(serde_json::json!({ "command": "reset_stats" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("unknown command"));
}

// ── Status stream ──────────────────────────────────────────────

#[tokio::test]
async fn test_events_stream_delivers_and_releases_subscription() {
    let h = setup(Some(quiet_hunt()));
    let resp = h
        .app
        .clone()
        .oneshot(Request::get("/api/v1/bot/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );
    assert_eq!(h.controller.broadcaster().subscriber_count(), 1);

    h.controller.start().unwrap();

    let mut body = resp.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("no event within timeout")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("event: started"));
    assert!(text.contains("\"run_state\":\"running\""));

    drop(body);
    assert_eq!(h.controller.broadcaster().subscriber_count(), 0);
}
