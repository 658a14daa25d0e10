//! Error types for realtime delivery and the notification lifecycles.

use curalink_database::{AuthError, MeetingError, NotificationError, UserError};
use thiserror::Error;

/// Result type alias for realtime operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Errors surfaced to callers of the registry, dispatcher and services.
///
/// A missing live channel is never an error; it shows up as a routing outcome.
/// Transport failures stay inside the registry.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Conflict: {reason}")]
    Conflict { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    #[error("Connection registry is shutting down")]
    ShuttingDown,

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl RealtimeError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// True for the errors a client caused (404/403/409/400 at the HTTP edge).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Forbidden { .. }
                | Self::Conflict { .. }
                | Self::InvalidInput { .. }
                | Self::Unauthenticated { .. }
        )
    }
}

impl From<NotificationError> for RealtimeError {
    fn from(error: NotificationError) -> Self {
        match error {
            NotificationError::NotificationNotFound => Self::not_found("notification", "unknown"),
            NotificationError::AccessDenied => {
                Self::forbidden("notification belongs to another user")
            }
            NotificationError::CallAlreadyAnswered(status) => {
                Self::conflict(format!("call invite already {status}"))
            }
            NotificationError::InvalidNotificationType(kind) => {
                Self::storage(format!("stored notification has unknown type {kind}"))
            }
            NotificationError::DatabaseError(message) => Self::storage(message),
        }
    }
}

impl From<sqlx::Error> for RealtimeError {
    fn from(error: sqlx::Error) -> Self {
        Self::storage(error.to_string())
    }
}

impl From<MeetingError> for RealtimeError {
    fn from(error: MeetingError) -> Self {
        match error {
            MeetingError::MeetingRequestNotFound => Self::not_found("meeting request", "unknown"),
            MeetingError::AccessDenied => Self::forbidden("not a party allowed to do this"),
            MeetingError::AlreadyPending => {
                Self::conflict("a meeting request for this expert is already pending")
            }
            MeetingError::NotPending(status) => {
                Self::conflict(format!("meeting request is already {status}"))
            }
            MeetingError::InvalidStatus(status) => {
                Self::invalid_input(format!("invalid meeting status {status}"))
            }
            MeetingError::DatabaseError(message) => Self::storage(message),
        }
    }
}

impl From<UserError> for RealtimeError {
    fn from(error: UserError) -> Self {
        match error {
            UserError::UserNotFound => Self::not_found("user", "unknown"),
            UserError::EmailAlreadyExists => Self::conflict("email already exists"),
            UserError::DatabaseError(message) => Self::storage(message),
        }
    }
}

impl From<AuthError> for RealtimeError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidToken => Self::Unauthenticated {
                reason: "invalid token".to_string(),
            },
            AuthError::SessionExpired => Self::Unauthenticated {
                reason: "session expired".to_string(),
            },
            AuthError::DatabaseError(message) => Self::storage(message),
        }
    }
}
