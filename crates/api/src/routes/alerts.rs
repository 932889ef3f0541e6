//! Alert Routes

use alerting::{
    AlertDetails, EpisodeTransition, EscalationStatus, NotificationRecord, SinkResult,
    TimeoutCheck,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use dms::AlertLevel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{ApiError, AppState};

/// Alarm raised by the client
#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub activity: String,
    #[serde(default)]
    pub confidence: f32,
    /// Danger duration at trigger time (seconds)
    #[serde(default)]
    pub duration: f64,
    #[serde(default = "default_level")]
    pub alert_level: AlertLevel,
    pub reason: Option<String>,
}

fn default_level() -> AlertLevel {
    AlertLevel::Critical
}

/// Query parameters for the history endpoint
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct AlertAck {
    pub result: &'static str,
    pub episode_id: Option<u64>,
    pub status: EscalationStatus,
}

impl AlertAck {
    pub fn new(transition: EpisodeTransition, status: EscalationStatus) -> Self {
        let (result, episode_id) = match transition {
            EpisodeTransition::Started(id) => ("alarm_started", Some(id)),
            EpisodeTransition::AlreadyActive(id) => ("alarm_already_active", Some(id)),
            EpisodeTransition::Reset { episode_id, .. } => ("alarm_reset", Some(episode_id)),
            EpisodeTransition::Unchanged => ("no_active_alarm", None),
        };
        Self {
            result,
            episode_id,
            status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub data: Vec<NotificationRecord>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

impl From<&TimeoutCheck> for CheckResponse {
    fn from(check: &TimeoutCheck) -> Self {
        let (outcome, seconds_remaining, request_id) = match check {
            TimeoutCheck::Idle => ("idle", None, None),
            TimeoutCheck::AlreadyNotified => ("already_notified", None, None),
            TimeoutCheck::InFlight => ("in_flight", None, None),
            TimeoutCheck::Waiting { remaining_secs } => ("waiting", Some(*remaining_secs), None),
            TimeoutCheck::Backoff { retry_in_secs } => ("backoff", Some(*retry_in_secs), None),
            TimeoutCheck::RateLimited { retry_in_secs } => {
                ("rate_limited", Some(*retry_in_secs), None)
            }
            TimeoutCheck::Dispatch(request) => ("dispatched", None, Some(request.request_id)),
        };
        Self {
            outcome,
            seconds_remaining,
            request_id,
        }
    }
}

pub async fn alarm_triggered(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<AlertAck>, ApiError> {
    if request.activity.trim().is_empty() {
        return Err(ApiError::BadRequest("activity must not be empty".to_string()));
    }
    let session = state.registry.get(id).await?;
    let reason = request
        .reason
        .unwrap_or_else(|| format!("{} for {:.1}s", request.activity, request.duration));
    let details = AlertDetails::new(
        request.activity,
        request.confidence,
        request.alert_level,
        request.duration,
        reason,
    );
    let transition = session.alarm_triggered(details);
    Ok(Json(AlertAck::new(transition, session.escalation_status())))
}

pub async fn driver_responded(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AlertAck>, ApiError> {
    let session = state.registry.get(id).await?;
    let transition = session.driver_responded();
    Ok(Json(AlertAck::new(transition, session.escalation_status())))
}

pub async fn alert_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<EscalationStatus>, ApiError> {
    let session = state.registry.get(id).await?;
    Ok(Json(session.escalation_status()))
}

/// Notification attempts, oldest first
pub async fn alert_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session = state.registry.get(id).await?;
    let data = session.notification_history(params.limit);
    Ok(Json(HistoryResponse {
        count: data.len(),
        data,
    }))
}

pub async fn check_timeout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CheckResponse>, ApiError> {
    let session = state.registry.get(id).await?;
    let check = session.check_timeout();
    Ok(Json(CheckResponse::from(&check)))
}

/// Send a test notification through the configured sink
pub async fn send_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SinkResult>), ApiError> {
    let session = state.registry.get(id).await?;
    let result = session.send_test_notification().await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(result)))
}
