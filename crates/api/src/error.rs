//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use monitor::MonitorError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Monitor(MonitorError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Monitor(MonitorError::Dms(_) | MonitorError::Alert(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Monitor(MonitorError::Source(_)) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Monitor(MonitorError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
