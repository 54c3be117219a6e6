//! HTTP response types and error mapping

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, ProbeError};
use crate::services::{EngineStats, LogEntry};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let status = if self.success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub enabled: bool,
    pub stats: EngineStats,
    pub recent: Vec<LogEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

/// Status code for an error surfaced over HTTP
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Probe(ProbeError::InvalidUrl { .. }) => StatusCode::BAD_REQUEST,
        AppError::Probe(_) | AppError::Token(_) | AppError::Http(_) => StatusCode::BAD_GATEWAY,
        AppError::Configuration { .. }
        | AppError::Rewrite(_)
        | AppError::Io(_)
        | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn handle_error(error: AppError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::warn!("Request failed: {}", error);
    }
    (status, Json(ApiResponse::<()>::error(error.to_string()))).into_response()
}
