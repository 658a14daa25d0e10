//! Error types for the database layer

use thiserror::Error;

/// General database error
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Database query error: {0}")]
    QueryError(String),

    #[error("Database migration error: {0}")]
    MigrationError(String),
}

/// User-specific database errors
#[derive(Debug, Error)]
pub enum UserError {
    #[error("User not found")]
    UserNotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Notification-specific database errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification not found")]
    NotificationNotFound,

    #[error("Access denied")]
    AccessDenied,

    #[error("Invalid notification type: {0}")]
    InvalidNotificationType(String),

    #[error("Call invite already answered (status: {0})")]
    CallAlreadyAnswered(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Meeting-request-specific database errors
#[derive(Debug, Error)]
pub enum MeetingError {
    #[error("Meeting request not found")]
    MeetingRequestNotFound,

    #[error("Access denied")]
    AccessDenied,

    #[error("Meeting request already pending")]
    AlreadyPending,

    #[error("Meeting request is no longer pending (status: {0})")]
    NotPending(String),

    #[error("Invalid meeting status: {0}")]
    InvalidStatus(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Auth-specific database errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Session expired")]
    SessionExpired,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for NotificationError {
    fn from(error: sqlx::Error) -> Self {
        NotificationError::DatabaseError(error.to_string())
    }
}

impl From<sqlx::Error> for MeetingError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &error {
            if db.is_unique_violation() {
                return MeetingError::AlreadyPending;
            }
        }
        MeetingError::DatabaseError(error.to_string())
    }
}

impl From<sqlx::Error> for UserError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &error {
            if db.is_unique_violation() {
                return UserError::EmailAlreadyExists;
            }
        }
        UserError::DatabaseError(error.to_string())
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(error: sqlx::Error) -> Self {
        AuthError::DatabaseError(error.to_string())
    }
}
