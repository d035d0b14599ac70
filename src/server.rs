//! HTTP server for receiving proximity events and manual check-ins.
//!
//! This module provides an HTTP server that:
//! - Accepts region enter/exit events from the device via POST /events
//! - Accepts manual check-in/check-out via POST /checkin and POST /checkout
//! - Serves the open session, history and weekly stats
//! - Lists the geofences the device should register via GET /regions
//!
//! # Architecture
//!
//! ```text
//! Mobile app ──→ POST /events ──→ RegionMonitor ──→ router queue ──→ SessionTracker
//!                                                                        ↓
//! Dashboard  ←── GET /stats  ←────────── StateStore (read snapshot) ←────┘
//! ```

use crate::core::aggregate::{weekly_stats, WeeklyAggregate};
use crate::core::lifecycle::{TrackerError, Transition};
use crate::core::session::Session;
use crate::router::RouterError;
use crate::source::{DeliveryError, ProximityEvent, RegionMonitor, RegionRegistration};
use crate::store::StateStore;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};

/// How long a handler waits for the tracker to apply a manual command.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct ServerState {
    /// Monitor that filters and forwards events
    monitor: Arc<RegionMonitor>,
    /// Read access to history
    store: StateStore,
}

impl ServerState {
    /// Create new server state
    pub fn new(monitor: Arc<RegionMonitor>, store: StateStore) -> Self {
        Self { monitor, store }
    }
}

/// Manual check-in request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinRequest {
    pub region_id: String,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

/// Manual check-out request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

/// Response from the check-out endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    pub duration_secs: i64,
}

/// Response from the events endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
    pub status: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub monitoring: bool,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

fn router_error(e: RouterError) -> ApiError {
    match e {
        RouterError::QueueFull => api_error(StatusCode::SERVICE_UNAVAILABLE, "QUEUE_FULL", e),
        RouterError::Disconnected | RouterError::NoReply => {
            api_error(StatusCode::SERVICE_UNAVAILABLE, "TRACKER_UNAVAILABLE", e)
        }
    }
}

fn tracker_error(e: TrackerError) -> ApiError {
    match e {
        TrackerError::AlreadyActive { .. } => api_error(StatusCode::CONFLICT, "ALREADY_ACTIVE", e),
        TrackerError::NoActiveSession => api_error(StatusCode::CONFLICT, "NO_ACTIVE_SESSION", e),
        TrackerError::UnknownRegion(_) => api_error(StatusCode::NOT_FOUND, "UNKNOWN_REGION", e),
        TrackerError::Store(_) => api_error(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e),
    }
}

async fn await_reply<T>(rx: oneshot::Receiver<T>) -> Result<T, ApiError> {
    match tokio::time::timeout(REPLY_TIMEOUT, rx).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(router_error(RouterError::NoReply)),
        Err(_) => Err(api_error(
            StatusCode::GATEWAY_TIMEOUT,
            "TRACKER_TIMEOUT",
            "Tracker did not respond in time",
        )),
    }
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        monitoring: state.monitor.is_running(),
    })
}

/// POST /events
async fn events(
    State(state): State<Arc<ServerState>>,
    Json(event): Json<ProximityEvent>,
) -> Result<(StatusCode, Json<EventResponse>), ApiError> {
    state.monitor.deliver(event).map_err(|e| match e {
        DeliveryError::NotMonitoring => api_error(StatusCode::CONFLICT, "NOT_MONITORING", e),
        DeliveryError::UnmonitoredRegion(_) => {
            api_error(StatusCode::UNPROCESSABLE_ENTITY, "UNMONITORED_REGION", e)
        }
        DeliveryError::Router(e) => router_error(e),
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EventResponse {
            status: "queued".to_string(),
        }),
    ))
}

/// POST /checkin
async fn checkin(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CheckinRequest>,
) -> Result<Json<Session>, ApiError> {
    let at = request.at.unwrap_or_else(Utc::now);
    let rx = state
        .monitor
        .handle()
        .start_manual(request.region_id, at)
        .map_err(router_error)?;

    let session = await_reply(rx).await?.map_err(tracker_error)?;
    Ok(Json(session))
}

/// POST /checkout
async fn checkout(
    State(state): State<Arc<ServerState>>,
    request: Option<Json<CheckoutRequest>>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let at = request.and_then(|Json(r)| r.at).unwrap_or_else(Utc::now);
    let rx = state.monitor.handle().end_manual(at).map_err(router_error)?;

    let response = match await_reply(rx).await?.map_err(tracker_error)? {
        Transition::Finalized(session) => CheckoutResponse {
            status: "recorded".to_string(),
            duration_secs: session.duration().num_seconds(),
            session: Some(session),
        },
        Transition::Discarded { duration, .. } => CheckoutResponse {
            status: "discarded".to_string(),
            session: None,
            duration_secs: duration.num_seconds(),
        },
        other => {
            return Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "UNEXPECTED_TRANSITION",
                format!("{other:?}"),
            ))
        }
    };

    Ok(Json(response))
}

/// GET /session
async fn active_session(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Option<Session>>, ApiError> {
    let rx = state.monitor.handle().active_session().map_err(router_error)?;
    Ok(Json(await_reply(rx).await?))
}

/// GET /regions
async fn regions(State(state): State<Arc<ServerState>>) -> Json<Vec<RegionRegistration>> {
    Json(state.monitor.registrations())
}

/// GET /history
async fn history(State(state): State<Arc<ServerState>>) -> Result<Json<Vec<Session>>, ApiError> {
    state
        .store
        .history()
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e))
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Result<Json<WeeklyAggregate>, ApiError> {
    let history = state
        .store
        .history()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e))?;
    Ok(Json(weekly_stats(&history, Utc::now())))
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: ServerState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(state);

    let app = Router::new()
        .route("/health", get(health))
        .route("/events", post(events))
        .route("/checkin", post(checkin))
        .route("/checkout", post(checkout))
        .route("/session", get(active_session))
        .route("/regions", get(regions))
        .route("/history", get(history))
        .route("/stats", get(stats))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Session agent server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
