//! Status API
//!
//! HTTP view of the connection manager plus the runtime log-level switch.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use errors::{ErrorInfo, LinkError};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::core::manager::{ConnectionManager, ConnectionStatus};
use crate::error::LinkSrvError;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
    pub service: String,
    pub device_id: String,
}

impl AppState {
    pub fn new(
        manager: Arc<ConnectionManager>,
        service: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            service: service.into(),
            device_id: device_id.into(),
        }
    }
}

// ============================================================================
// Response models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: String,
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLogLevelRequest {
    /// Level ("debug") or full filter directive ("info,linksrv=debug")
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLevelResponse {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// HTTP error carrying an [`ErrorInfo`] body
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: ErrorInfo,
}

impl From<LinkError> for AppError {
    fn from(err: LinkError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            error: err.to_error_info(),
        }
    }
}

impl From<LinkSrvError> for AppError {
    fn from(err: LinkSrvError) -> Self {
        LinkError::from(err).into()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                success: false,
                error: self.error,
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Liveness
///
/// @route GET /health
/// @status 200 - {status, service, version, device_id}
pub async fn health_check(State(state): State<AppState>) -> Json<SuccessResponse<HealthStatus>> {
    Json(SuccessResponse::new(HealthStatus {
        status: "healthy".to_string(),
        service: state.service.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        device_id: state.device_id.clone(),
    }))
}

/// @route GET /api/connections
/// @status 200 - status rows in registration order
pub async fn list_connections(
    State(state): State<AppState>,
) -> Json<SuccessResponse<Vec<ConnectionStatus>>> {
    Json(SuccessResponse::new(state.manager.snapshot()))
}

/// @route GET /api/connections/{name}
/// @status 200 - single status row
/// @status 404 - unknown connection
pub async fn get_connection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SuccessResponse<ConnectionStatus>>, AppError> {
    let status = state
        .manager
        .status(&name)
        .ok_or_else(|| LinkSrvError::connection_not_found(&name))?;
    Ok(Json(SuccessResponse::new(status)))
}

/// @route GET /api/admin/logs/level
/// @status 200 - {level}
pub async fn get_log_level() -> Json<LogLevelResponse> {
    Json(LogLevelResponse {
        level: common::logging::get_log_level(),
        status: None,
        error: None,
    })
}

/// Swap the active log filter without a restart
///
/// @route POST /api/admin/logs/level
/// @input {level}
/// @status 200 - {level, status}
/// @status 400 - {level, error} when the filter does not parse
pub async fn set_log_level(
    Json(request): Json<SetLogLevelRequest>,
) -> (StatusCode, Json<LogLevelResponse>) {
    match common::logging::set_log_level(&request.level) {
        Ok(()) => (
            StatusCode::OK,
            Json(LogLevelResponse {
                level: request.level,
                status: Some("updated".to_string()),
                error: None,
            }),
        ),
        Err(e) => {
            warn!(level = %request.level, error = %e, "Log level change rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(LogLevelResponse {
                    level: common::logging::get_log_level(),
                    status: None,
                    error: Some(e),
                }),
            )
        },
    }
}

/// Build the API router
pub fn create_api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/connections", get(list_connections))
        .route("/api/connections/{name}", get(get_connection))
        .route("/api/admin/logs/level", get(get_log_level).post(set_log_level))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
