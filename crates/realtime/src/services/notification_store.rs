//! Durable per-user notifications with ownership-checked mutations.

use curalink_database::{
    CallStatus, CreateNotificationRequest, ListOrder, Notification, NotificationError,
    NotificationRepository,
};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::types::{RealtimeError, RealtimeResult, UserId};

#[derive(Clone)]
pub struct NotificationStore {
    repo: NotificationRepository,
}

impl NotificationStore {
    pub fn new(repo: NotificationRepository) -> Self {
        Self { repo }
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self::new(NotificationRepository::new(pool))
    }

    pub async fn create(&self, request: CreateNotificationRequest) -> RealtimeResult<Notification> {
        let notification = self.repo.create(&request).await?;
        stored(&notification);
        Ok(notification)
    }

    pub async fn begin(&self) -> RealtimeResult<Transaction<'static, Sqlite>> {
        Ok(self.repo.begin().await?)
    }

    /// Store a notification as part of the caller's transaction.
    pub async fn create_in(
        &self,
        tx: &mut SqliteConnection,
        request: &CreateNotificationRequest,
    ) -> RealtimeResult<Notification> {
        let notification = NotificationRepository::insert(tx, request).await?;
        stored(&notification);
        Ok(notification)
    }

    /// Record the callee's answer on a `video_call` invite. Only the first answer wins.
    pub async fn answer_call(
        &self,
        tx: &mut SqliteConnection,
        invite_id: i64,
        callee_id: UserId,
        status: CallStatus,
    ) -> RealtimeResult<Notification> {
        NotificationRepository::answer_call(tx, invite_id, callee_id, status)
            .await
            .map_err(|e| match e {
                NotificationError::NotificationNotFound => {
                    RealtimeError::not_found("call invite", invite_id)
                }
                other => other.into(),
            })
    }

    /// Look up a notification without an ownership check.
    pub async fn find(&self, id: i64) -> RealtimeResult<Option<Notification>> {
        Ok(self.repo.find_by_id(id).await?)
    }

    /// Lazily list a user's notifications. Dropping the stream early is fine.
    pub fn list_for_user(
        &self,
        user_id: UserId,
        order: ListOrder,
    ) -> BoxStream<'_, RealtimeResult<Notification>> {
        self.repo
            .stream_for_user(user_id, order)
            .map_err(RealtimeError::from)
            .boxed()
    }

    pub async fn collect_for_user(
        &self,
        user_id: UserId,
        order: ListOrder,
    ) -> RealtimeResult<Vec<Notification>> {
        self.list_for_user(user_id, order).try_collect().await
    }

    /// Fetch a single notification the caller owns.
    pub async fn get(&self, id: i64, user_id: UserId) -> RealtimeResult<Notification> {
        let notification = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| RealtimeError::not_found("notification", id))?;

        if notification.user_id != user_id {
            return Err(RealtimeError::forbidden("notification belongs to another user"));
        }
        Ok(notification)
    }

    /// Idempotent for the owner; `Forbidden` for anyone else.
    pub async fn mark_read(&self, id: i64, user_id: UserId) -> RealtimeResult<()> {
        self.repo
            .mark_as_read(id, user_id)
            .await
            .map_err(|e| scoped(e, id))
    }

    pub async fn mark_all_read(&self, user_id: UserId) -> RealtimeResult<u64> {
        let updated = self.repo.mark_all_as_read(user_id).await?;
        info!(user_id, updated, "marked all notifications read");
        Ok(updated)
    }

    pub async fn delete(&self, id: i64, user_id: UserId) -> RealtimeResult<()> {
        self.repo.delete(id, user_id).await.map_err(|e| scoped(e, id))?;
        debug!(notification_id = id, user_id, "notification deleted");
        Ok(())
    }

    pub async fn unread_count(&self, user_id: UserId) -> RealtimeResult<i64> {
        Ok(self.repo.unread_count(user_id).await?)
    }
}

fn stored(notification: &Notification) {
    debug!(
        notification_id = notification.id,
        user_id = notification.user_id,
        kind = %notification.notification_type,
        "notification stored"
    );
}

fn scoped(error: NotificationError, id: i64) -> RealtimeError {
    match error {
        NotificationError::NotificationNotFound => RealtimeError::not_found("notification", id),
        other => other.into(),
    }
}
