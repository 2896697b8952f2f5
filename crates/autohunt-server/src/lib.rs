//! # autohunt-server
//!
//! HTTP API for driving the decision loop from a dashboard or script:
//!
//! - lifecycle: start, stop, pause/resume
//! - configuration and waypoint edits (persisted as hunt profiles)
//! - status, position, session history and aggregate statistics
//! - `GET /api/v1/bot/events`, a Server-Sent Events stream of status updates

use autohunt_config::{ConfigWarning, HuntConfig, schema::ServerConfig};
use autohunt_core::{HuntError, Position, RunState, SessionId, SessionStats, Waypoint, WaypointId};
use autohunt_runtime::{Controller, StatusReport};
use autohunt_store::{HistoryTotals, SessionStore};
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Json, Response, Sse,
        sse::{Event as SseEvent, KeepAlive},
    },
    routing::{delete, get, post},
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Sessions returned by `GET /sessions`.
const RECENT_SESSIONS: usize = 20;

/// Shared server state.
pub struct AppState {
    pub config: ServerConfig,
    pub controller: Controller,
    /// Session history and saved profiles. Without a store the history
    /// endpoints answer with empty results and nothing is persisted.
    pub store: Option<SessionStore>,
    pub started_at: Instant,
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A failed request: status code plus a `{ "error": ... }` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<HuntError> for ApiError {
    fn from(e: HuntError) -> Self {
        let status = match &e {
            HuntError::ConfigurationMissing
            | HuntError::Config(_)
            | HuntError::ConfigValidation { .. }
            | HuntError::UnknownCounter(_) => StatusCode::BAD_REQUEST,
            HuntError::NotRunning => StatusCode::CONFLICT,
            HuntError::WaypointNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "request failed");
        } else {
            debug!(status = %self.status, error = %self.message, "request rejected");
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Request / response bodies ──────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub session_id: SessionId,
    pub already_running: bool,
    pub run_state: RunState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    /// False when nothing was running.
    pub stopped: bool,
    pub session: Option<SessionStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PauseResponse {
    pub run_state: RunState,
    pub paused: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigView {
    pub loaded: bool,
    pub config: Option<HuntConfig>,
}

#[derive(Debug, Serialize)]
pub struct ConfigSaved {
    pub warnings: Vec<ConfigWarning>,
    /// Id of the stored profile; `None` without a store or when saving failed.
    pub profile_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct NewWaypoint {
    name: String,
    x: i32,
    y: i32,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WaypointAdded {
    pub waypoint: Waypoint,
    pub total_waypoints: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WaypointRemoved {
    pub waypoint: Waypoint,
    pub remaining_waypoints: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PositionResponse {
    pub position: Option<Position>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatisticsResponse {
    pub current_session: Option<SessionStats>,
    pub historical: HistoryTotals,
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    command: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

// ── Router ─────────────────────────────────────────────────────

/// Build the Axum router.
pub fn build_router(
    config: ServerConfig,
    controller: Controller,
    store: Option<SessionStore>,
) -> Router {
    let cors = config.cors;
    let state = Arc::new(AppState {
        config,
        controller,
        store,
        started_at: Instant::now(),
    });

    let api_routes = Router::new()
        .route("/api/v1/bot/start", post(start_handler))
        .route("/api/v1/bot/stop", post(stop_handler))
        .route("/api/v1/bot/pause", post(pause_handler))
        .route("/api/v1/bot/status", get(status_handler))
        .route(
            "/api/v1/bot/config",
            get(get_config_handler).post(save_config_handler),
        )
        .route("/api/v1/bot/waypoints", post(add_waypoint_handler))
        .route("/api/v1/bot/waypoints/{id}", delete(remove_waypoint_handler))
        .route("/api/v1/bot/position", get(position_handler))
        .route("/api/v1/bot/sessions", get(sessions_handler))
        .route("/api/v1/bot/statistics", get(statistics_handler))
        .route("/api/v1/bot/command", post(command_handler))
        .route("/api/v1/bot/events", get(events_handler));

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .merge(api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

/// Write every finished session to the store. Failures are logged; the
/// session has already ended either way.
pub fn record_sessions(controller: &Controller, store: SessionStore) {
    controller.on_session_end(move |record| {
        if let Err(e) = store.save_session(record) {
            warn!(session_id = %record.session_id, error = %e, "failed to save session record");
        }
    });
}

// ── Handlers ───────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn start_handler(State(state): State<Arc<AppState>>) -> ApiResult<StartResponse> {
    // Nothing loaded yet: fall back to the last profile saved through the API.
    if state.controller.configuration().is_none() {
        if let Some(store) = &state.store {
            if let Some(profile) = store.latest_profile()? {
                info!(profile = %profile.name, id = profile.id, "loading last saved hunt profile");
                state.controller.load_configuration(profile.config)?;
            }
        }
    }

    let outcome = state.controller.start()?;
    Ok(Json(StartResponse {
        session_id: outcome.session_id,
        already_running: outcome.already_running,
        run_state: state.controller.run_state(),
    }))
}

async fn stop_handler(State(state): State<Arc<AppState>>) -> Json<StopResponse> {
    let session = state.controller.stop();
    Json(StopResponse {
        stopped: session.is_some(),
        session,
    })
}

async fn pause_handler(State(state): State<Arc<AppState>>) -> ApiResult<PauseResponse> {
    let run_state = state.controller.toggle_pause()?;
    Ok(Json(PauseResponse {
        run_state,
        paused: run_state == RunState::Paused,
    }))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusReport> {
    Json(state.controller.status())
}

async fn get_config_handler(State(state): State<Arc<AppState>>) -> Json<ConfigView> {
    let config = state.controller.configuration();
    Json(ConfigView {
        loaded: config.is_some(),
        config,
    })
}

async fn save_config_handler(
    State(state): State<Arc<AppState>>,
    Json(config): Json<HuntConfig>,
) -> ApiResult<ConfigSaved> {
    let warnings = state.controller.load_configuration(config)?;
    info!(warnings = warnings.len(), "hunt configuration loaded");
    Ok(Json(ConfigSaved {
        warnings,
        profile_id: save_profile(&state),
    }))
}

async fn add_waypoint_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewWaypoint>,
) -> ApiResult<WaypointAdded> {
    let mut waypoint = Waypoint::new(req.name, req.x, req.y);
    waypoint.description = req.description;

    let waypoint = state.controller.add_waypoint(waypoint)?;
    save_profile(&state);
    Ok(Json(WaypointAdded {
        waypoint,
        total_waypoints: waypoint_count(&state),
    }))
}

async fn remove_waypoint_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<WaypointId>,
) -> ApiResult<WaypointRemoved> {
    let waypoint = state.controller.remove_waypoint(id)?;
    save_profile(&state);
    Ok(Json(WaypointRemoved {
        waypoint,
        remaining_waypoints: waypoint_count(&state),
    }))
}

async fn position_handler(State(state): State<Arc<AppState>>) -> Json<PositionResponse> {
    Json(PositionResponse {
        position: state.controller.current_position(),
    })
}

async fn sessions_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<SessionStats>> {
    let sessions = match &state.store {
        Some(store) => store.recent_sessions(RECENT_SESSIONS)?,
        None => Vec::new(),
    };
    Ok(Json(sessions))
}

async fn statistics_handler(State(state): State<Arc<AppState>>) -> ApiResult<StatisticsResponse> {
    let historical = match &state.store {
        Some(store) => store.totals()?,
        None => HistoryTotals::default(),
    };
    Ok(Json(StatisticsResponse {
        current_session: state.controller.status().stats,
        historical,
    }))
}

async fn command_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<CommandResponse> {
    match req.command.as_str() {
        "emergency_stop" => {
            warn!("emergency stop requested");
            Ok(Json(CommandResponse {
                session: state.controller.stop(),
                command: req.command,
                ..Default::default()
            }))
        }
        "get_position" => Ok(Json(CommandResponse {
            position: state.controller.current_position(),
            command: req.command,
            ..Default::default()
        })),
        other => Err(ApiError::bad_request(format!("unknown command: {other}"))),
    }
}

/// Status stream. Each connection holds its own subscription, released when
/// the client disconnects and the stream is dropped.
async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let mut subscription = state.controller.subscribe_status();
    debug!(subscription = subscription.id(), "status stream opened");

    let stream = async_stream::stream! {
        while let Some(event) = subscription.recv().await {
            let data = serde_json::to_string(&*event).unwrap_or_default();
            yield Ok(SseEvent::default().event(event.kind.as_str()).data(data));
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

// ── Helpers ────────────────────────────────────────────────────

fn waypoint_count(state: &AppState) -> usize {
    state
        .controller
        .configuration()
        .map(|c| c.waypoints().len())
        .unwrap_or(0)
}

/// Persist the controller's latest configuration as a profile.
fn save_profile(state: &AppState) -> Option<i64> {
    let store = state.store.as_ref()?;
    let config = state.controller.configuration()?;
    match store.save_profile(&config) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(error = %e, "failed to save hunt profile");
            None
        }
    }
}

/// Start the HTTP server and serve until `shutdown` resolves.
pub async fn start_server(
    config: ServerConfig,
    controller: Controller,
    store: Option<SessionStore>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> autohunt_core::Result<()> {
    let listen = config.listen.clone();
    let router = build_router(config, controller, store);

    info!(listen = %listen, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .map_err(|e| HuntError::Config(format!("failed to bind {}: {}", listen, e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
