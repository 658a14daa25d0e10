//! Shared application state for the gateway

use std::sync::Arc;

use curalink_config::{DatabaseConfig, RealtimeConfig};
use curalink_database::{MeetingRequestRepository, SessionRepository, UserRepository};
use curalink_realtime::{CallService, ConnectionRegistry, Dispatcher, MeetingService, NotificationStore};
use sqlx::SqlitePool;

use crate::error::{GatewayError, GatewayResult};

/// Shared application state containing all services
#[derive(Clone)]
pub struct GatewayState {
    /// Database connection pool
    pub pool: SqlitePool,
    /// Realtime tuning (queue sizes, timeouts, heartbeat)
    pub realtime: RealtimeConfig,
    /// Live connections, one per user
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub notifications: NotificationStore,
    pub meetings: MeetingService,
    pub calls: Arc<CallService>,
    pub users: UserRepository,
    pub sessions: SessionRepository,
}

impl GatewayState {
    /// Wire every service around an existing pool and registry
    pub fn new(pool: SqlitePool, registry: Arc<ConnectionRegistry>, realtime: RealtimeConfig) -> Self {
        let users = UserRepository::new(pool.clone());
        let sessions = SessionRepository::new(pool.clone());
        let notifications = NotificationStore::from_pool(pool.clone());

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            notifications.clone(),
            users.clone(),
            realtime.preview_length,
        ));
        let meetings = MeetingService::new(
            MeetingRequestRepository::new(pool.clone()),
            users.clone(),
            Arc::clone(&dispatcher),
        );
        let calls = Arc::new(CallService::new(Arc::clone(&dispatcher)));

        Self {
            pool,
            realtime,
            registry,
            dispatcher,
            notifications,
            meetings,
            calls,
            users,
            sessions,
        }
    }

    /// Create gateway state from database configuration
    pub async fn from_config(database: &DatabaseConfig, realtime: RealtimeConfig) -> GatewayResult<Self> {
        let pool = curalink_database::initialize_database(database)
            .await
            .map_err(|e| GatewayError::DatabaseError(format!("Failed to initialize database: {}", e)))?;
        let registry = Arc::new(ConnectionRegistry::from_config(&realtime));

        Ok(Self::new(pool, registry, realtime))
    }
}
