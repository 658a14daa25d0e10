//! Curalink Database Crate
//!
//! Connection management, migrations and repositories for notifications,
//! meeting requests, users and sessions.

use curalink_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::prepare_database;
pub use migrations::run_migrations;

pub use repos::{MeetingRequestRepository, NotificationRepository, SessionRepository, UserRepository};

pub use entities::{
    CallStatus, CreateMeetingRequest, CreateNotificationRequest, CreateUserRequest, ListOrder,
    MeetingRequest, MeetingStatus, Notification, NotificationType, ScheduledMeeting, Session, User,
};

pub use types::{
    errors::{AuthError, DatabaseError, MeetingError, NotificationError, UserError},
    timestamp_now, AuthResult, DatabaseResult, MeetingResult, NotificationResult, UserResult,
};

pub use sqlx::SqlitePool as Pool;

/// Connect and bring the schema up to date
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    pub async fn migrated_pool() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 4,
        };

        let pool = initialize_database(&config).await.unwrap();
        (pool, temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initialize_database_reports_bad_urls() {
        let config = DatabaseConfig {
            url: "postgres://nowhere/db".to_string(),
            max_connections: 1,
        };

        let error = initialize_database(&config).await.unwrap_err();
        assert!(matches!(error, DatabaseError::ConnectionError(_)));
    }
}
