//! Session Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use dms::AlertLevel;
use monitor::{FrameReport, SessionInfo};
use pose_capture::PoseFrame;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{ActivityRecord, ActivitySummary};
use uuid::Uuid;

use crate::{ApiError, AppState};

/// Query parameters for the events endpoint
#[derive(Debug, Deserialize)]
pub struct EventQuery {
    /// Maximum number of records to return
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Only events at or above this level
    pub min_level: Option<AlertLevel>,
    /// Only events with a frame timestamp at or after this (returned oldest first)
    pub since_ns: Option<u64>,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub data: Vec<SessionInfo>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub info: SessionInfo,
    pub summary: ActivitySummary,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub data: Vec<ActivityRecord>,
    pub count: usize,
    pub limit: usize,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<SessionInfo>), ApiError> {
    let session = state.registry.create().await?;
    Ok((StatusCode::CREATED, Json(session.info())))
}

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionList> {
    let data = state.registry.list().await;
    Json(SessionList {
        count: data.len(),
        data,
    })
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDetail>, ApiError> {
    let session = state.registry.get(id).await?;
    Ok(Json(SessionDetail {
        info: session.info(),
        summary: session.activity_summary()?,
    }))
}

pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionInfo>, ApiError> {
    Ok(Json(state.registry.close(id).await?))
}

/// Classify one frame of landmarks
pub async fn process_frame(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(frame): Json<PoseFrame>,
) -> Result<Json<FrameReport>, ApiError> {
    let session = state.registry.get(id).await?;
    Ok(Json(session.process_frame(&frame)?))
}

/// Recent activity, newest first, or a window from `since_ns` onward
pub async fn get_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<EventQuery>,
) -> Result<Json<EventResponse>, ApiError> {
    let session = state.registry.get(id).await?;
    let data = match params.since_ns {
        Some(since_ns) => {
            let mut events = session.events_since(since_ns, usize::MAX)?;
            if let Some(level) = params.min_level {
                events.retain(|r| r.event.alert_level >= level);
            }
            events.truncate(params.limit);
            events
        }
        None => session.recent_events(params.min_level, params.limit)?,
    };
    Ok(Json(EventResponse {
        count: data.len(),
        limit: params.limit,
        data,
    }))
}

/// Clear the classifier's duration timers (driver change)
pub async fn reset_classifier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionInfo>, ApiError> {
    let session = state.registry.get(id).await?;
    session.reset_classifier();
    Ok(Json(session.info()))
}
