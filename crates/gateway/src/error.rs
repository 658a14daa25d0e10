//! Error types for the gateway layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use curalink_database::{AuthError, DatabaseError};
use curalink_realtime::RealtimeError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

/// Gateway error types
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Service unavailable")]
    ServiceUnavailable,
}

/// JSON body of every error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            GatewayError::AuthorizationFailed(_) => StatusCode::FORBIDDEN,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::InternalError(_) | GatewayError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: status.as_str().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<RealtimeError> for GatewayError {
    fn from(error: RealtimeError) -> Self {
        match error {
            RealtimeError::NotFound { .. } => GatewayError::NotFound(error.to_string()),
            RealtimeError::Forbidden { reason } => GatewayError::AuthorizationFailed(reason),
            RealtimeError::Conflict { reason } => GatewayError::Conflict(reason),
            RealtimeError::InvalidInput { reason } => GatewayError::InvalidRequest(reason),
            RealtimeError::Unauthenticated { reason } => GatewayError::AuthenticationFailed(reason),
            RealtimeError::ShuttingDown => GatewayError::ServiceUnavailable,
            RealtimeError::Storage { message } => GatewayError::DatabaseError(message),
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidToken | AuthError::SessionExpired => {
                GatewayError::AuthenticationFailed(error.to_string())
            }
            AuthError::DatabaseError(message) => GatewayError::DatabaseError(message),
        }
    }
}

impl From<DatabaseError> for GatewayError {
    fn from(error: DatabaseError) -> Self {
        GatewayError::DatabaseError(error.to_string())
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(error: sqlx::Error) -> Self {
        GatewayError::DatabaseError(error.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(error: serde_json::Error) -> Self {
        GatewayError::InvalidRequest(format!("JSON serialization error: {}", error))
    }
}
