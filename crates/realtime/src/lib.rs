//! # Curalink Realtime Crate
//!
//! Live delivery and durable notifications for Curalink users.
//!
//! - **Registry**: one outbound channel per connected user
//! - **Dispatcher**: routes events live and records them as notifications
//! - **Services**: notification store, meeting requests and video call invites
//! - **Types**: the event union and error type shared with the gateway

pub mod dispatcher;
pub mod registry;
pub mod services;
pub mod types;

pub use curalink_database::CallStatus;
pub use dispatcher::{preview, Dispatcher, RouteOutcome, Routed, Staged};
pub use registry::{ConnectionRegistry, OutboundReceiver, OutboundSender, Registration};
pub use services::{
    CallAction, CallInvite, CallResponse, CallService, CallSession, MeetingDecision,
    MeetingOverview, MeetingService, MeetingTransition, NotificationStore,
};
pub use types::{
    ConnectionId, ControlFrame, Event, EventKind, NotificationLevel, Outbound, RealtimeError,
    RealtimeResult, Target, UserId,
};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use curalink_config::DatabaseConfig;
    use curalink_database::{CreateUserRequest, MeetingRequestRepository, UserRepository};
    use tempfile::TempDir;

    use super::*;

    pub struct Harness {
        pub registry: Arc<ConnectionRegistry>,
        pub store: NotificationStore,
        pub users: UserRepository,
        pub dispatcher: Arc<Dispatcher>,
        pub pool: sqlx::SqlitePool,
        _dir: TempDir,
    }

    impl Harness {
        pub async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = DatabaseConfig {
                url: format!("sqlite://{}", dir.path().join("realtime.db").display()),
                max_connections: 4,
            };
            let pool = curalink_database::initialize_database(&config).await.unwrap();

            let registry = Arc::new(ConnectionRegistry::new(Duration::from_millis(100)));
            let store = NotificationStore::from_pool(pool.clone());
            let users = UserRepository::new(pool.clone());
            let dispatcher = Arc::new(Dispatcher::new(
                Arc::clone(&registry),
                store.clone(),
                users.clone(),
                100,
            ));

            Self {
                registry,
                store,
                users,
                dispatcher,
                pool,
                _dir: dir,
            }
        }

        pub async fn user(&self, name: &str) -> UserId {
            self.users
                .create(&CreateUserRequest {
                    full_name: name.to_string(),
                    email: None,
                    role: None,
                })
                .await
                .unwrap()
                .id
        }

        pub fn meetings(&self) -> MeetingService {
            MeetingService::new(
                MeetingRequestRepository::new(self.pool.clone()),
                self.users.clone(),
                Arc::clone(&self.dispatcher),
            )
        }

        pub fn calls(&self) -> CallService {
            CallService::new(Arc::clone(&self.dispatcher))
        }
    }
}
