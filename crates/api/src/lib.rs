//! Driver Watch API Server
//!
//! REST and WebSocket surface over the monitoring sessions, plus health and
//! Prometheus metrics.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use monitor::{MonitorError, MonitorSession, ReplaySummary, SessionRegistry};
use notify::NotifyError;
use pose_capture::JsonLinesSource;
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tower_governor::GovernorLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

mod error;
pub mod rate_limit;
mod routes;
pub mod settings;
pub mod telemetry;

pub use error::ApiError;
pub use settings::Settings;
pub use telemetry::init_logging;

use rate_limit::{create_governor_config, RateLimitConfig};
use routes::{alerts, sessions, ws};

/// Startup failures
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Metrics setup failed: {0}")]
    Metrics(String),

    #[error(transparent)]
    Notifier(#[from] NotifyError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state shared across handlers
pub struct AppState {
    pub registry: SessionRegistry,
    pub metrics: PrometheusHandle,
    pub version: String,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(registry: SessionRegistry, metrics: PrometheusHandle) -> Self {
        Self {
            registry,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: usize,
    pub notifier: String,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>, notify_limit: &RateLimitConfig) -> Router {
    let mut notify_test = Router::new().route(
        "/api/v1/sessions/:id/notify/test",
        post(alerts::send_test),
    );
    match create_governor_config(notify_limit) {
        Some(config) => notify_test = notify_test.layer(GovernorLayer { config }),
        None => warn!("Test notification rate limit disabled"),
    }

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(
            "/api/v1/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/api/v1/sessions/:id",
            get(sessions::get_session).delete(sessions::close_session),
        )
        .route("/api/v1/sessions/:id/frames", post(sessions::process_frame))
        .route("/api/v1/sessions/:id/events", get(sessions::get_events))
        .route("/api/v1/sessions/:id/reset", post(sessions::reset_classifier))
        .route(
            "/api/v1/sessions/:id/alert/triggered",
            post(alerts::alarm_triggered),
        )
        .route(
            "/api/v1/sessions/:id/alert/responded",
            post(alerts::driver_responded),
        )
        .route("/api/v1/sessions/:id/alert/status", get(alerts::alert_status))
        .route("/api/v1/sessions/:id/alert/history", get(alerts::alert_history))
        .route(
            "/api/v1/sessions/:id/alert/check-timeout",
            post(alerts::check_timeout),
        )
        .route("/ws/monitor", get(ws::monitor_socket))
        .merge(notify_test)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_sessions: state.registry.len().await,
        notifier: state.registry.sink_name().to_string(),
    })
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Run the server until Ctrl-C, then close every session
pub async fn run_server(settings: Settings) -> Result<(), StartupError> {
    let sink = notify::build_sink(&settings.notifier)?;
    let registry = SessionRegistry::new(settings.monitor_config(), sink)?;
    let metrics = telemetry::init_metrics()?;

    let state = Arc::new(AppState::new(registry, metrics));
    let app = create_router(Arc::clone(&state), &settings.server.notify_test_rate_limit);

    info!("Starting API server on {}", settings.server.bind_addr);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    state.registry.shutdown().await;
    Ok(())
}

/// Replay a JSON-lines landmark recording through one session, without the server
pub async fn run_replay(settings: &Settings, path: &Path) -> Result<ReplaySummary, StartupError> {
    let sink = notify::build_sink(&settings.notifier)?;
    let session = MonitorSession::new(&settings.monitor_config(), sink)?;

    info!(path = %path.display(), session_id = %session.id(), "Replaying landmark recording");
    let file = File::open(path)?;
    let result = session.replay(&mut JsonLinesSource::new(BufReader::new(file)));
    session.close().await;

    let summary = result?;
    info!(
        frames = summary.frames,
        alarms = summary.alarms_triggered,
        notifications = summary.notifications_dispatched,
        "Replay complete"
    );
    Ok(summary)
}
