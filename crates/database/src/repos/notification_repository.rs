//! Notification repository for database operations.

use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::entities::{CallStatus, CreateNotificationRequest, ListOrder, Notification};
use crate::types::errors::NotificationError;
use crate::types::{timestamp_now, NotificationResult};

const FIND_BY_ID: &str = "SELECT id, user_id, type, title, message, sender_id, meeting_id, call_room, call_status, message_preview, action_url, is_read, created_at
     FROM notifications WHERE id = ?";

const LIST_NEWEST_FIRST: &str = "SELECT id, user_id, type, title, message, sender_id, meeting_id, call_room, call_status, message_preview, action_url, is_read, created_at
     FROM notifications WHERE user_id = ? ORDER BY created_at DESC, id DESC";

const LIST_OLDEST_FIRST: &str = "SELECT id, user_id, type, title, message, sender_id, meeting_id, call_room, call_status, message_preview, action_url, is_read, created_at
     FROM notifications WHERE user_id = ? ORDER BY created_at ASC, id ASC";

/// Repository for notification database operations
#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

enum Miss {
    Read,
    Delete,
}

impl NotificationRepository {
    /// Create a new notification repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a transaction on the notification pool for multi-table writes.
    pub async fn begin(&self) -> NotificationResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    fn map_row(row: &SqliteRow) -> NotificationResult<Notification> {
        let type_str: String = row.try_get("type")?;
        let call_status: Option<String> = row.try_get("call_status")?;

        Ok(Notification {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            notification_type: type_str
                .parse()
                .map_err(NotificationError::InvalidNotificationType)?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            sender_id: row.try_get("sender_id")?,
            meeting_id: row.try_get("meeting_id")?,
            call_room: row.try_get("call_room")?,
            call_status: call_status
                .map(|status| status.parse::<CallStatus>())
                .transpose()
                .map_err(|status| {
                    NotificationError::DatabaseError(format!("unknown call status {status}"))
                })?,
            message_preview: row.try_get("message_preview")?,
            action_url: row.try_get("action_url")?,
            is_read: row.try_get("is_read")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Create a new notification
    pub async fn create(
        &self,
        request: &CreateNotificationRequest,
    ) -> NotificationResult<Notification> {
        let mut conn = self.pool.acquire().await?;
        Self::insert(&mut conn, request).await
    }

    /// Insert on an existing connection, usually the caller's open transaction.
    pub async fn insert(
        conn: &mut SqliteConnection,
        request: &CreateNotificationRequest,
    ) -> NotificationResult<Notification> {
        let created_at = request.created_at.clone().unwrap_or_else(timestamp_now);

        let result = sqlx::query(
            "INSERT INTO notifications (user_id, type, title, message, sender_id, meeting_id, call_room, call_status, message_preview, action_url, is_read, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(request.user_id)
        .bind(request.notification_type.as_str())
        .bind(&request.title)
        .bind(&request.message)
        .bind(request.sender_id)
        .bind(request.meeting_id)
        .bind(&request.call_room)
        .bind(request.call_status.map(|status| status.as_str()))
        .bind(&request.message_preview)
        .bind(&request.action_url)
        .bind(&created_at)
        .execute(&mut *conn)
        .await?;

        let row = sqlx::query(FIND_BY_ID)
            .bind(result.last_insert_rowid())
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(Self::map_row).transpose()?.ok_or_else(|| {
            NotificationError::DatabaseError("Failed to retrieve created notification".to_string())
        })
    }

    /// Find notification by ID
    pub async fn find_by_id(&self, id: i64) -> NotificationResult<Option<Notification>> {
        let row = sqlx::query(FIND_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::map_row).transpose()
    }

    /// Lazily stream a user's notifications. Each call starts a fresh query.
    pub fn stream_for_user(
        &self,
        user_id: i64,
        order: ListOrder,
    ) -> BoxStream<'_, NotificationResult<Notification>> {
        let sql = match order {
            ListOrder::NewestFirst => LIST_NEWEST_FIRST,
            ListOrder::OldestFirst => LIST_OLDEST_FIRST,
        };

        sqlx::query(sql)
            .bind(user_id)
            .fetch(&self.pool)
            .map(|row| {
                row.map_err(NotificationError::from)
                    .and_then(|row| Self::map_row(&row))
            })
            .boxed()
    }

    /// Mark notification as read. Marking an already read notification succeeds.
    pub async fn mark_as_read(&self, id: i64, user_id: i64) -> NotificationResult<()> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }
        self.classify_miss(id, user_id, Miss::Read).await
    }

    /// Mark all notifications as read for user
    pub async fn mark_all_as_read(&self, user_id: i64) -> NotificationResult<u64> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete notification owned by `user_id`
    pub async fn delete(&self, id: i64, user_id: i64) -> NotificationResult<()> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }
        self.classify_miss(id, user_id, Miss::Delete).await
    }

    /// Get unread notification count for user
    pub async fn unread_count(&self, user_id: i64) -> NotificationResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Move a call invite owned by `callee_id` out of `invited` and mark it read.
    ///
    /// Only one answer can ever win; later answers see `CallAlreadyAnswered`.
    pub async fn answer_call(
        conn: &mut SqliteConnection,
        id: i64,
        callee_id: i64,
        status: CallStatus,
    ) -> NotificationResult<Notification> {
        let result = sqlx::query(
            "UPDATE notifications SET call_status = ?, is_read = 1
             WHERE id = ? AND user_id = ? AND call_status = 'invited'",
        )
        .bind(status.as_str())
        .bind(id)
        .bind(callee_id)
        .execute(&mut *conn)
        .await?;

        let row = sqlx::query(FIND_BY_ID)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(invite) = row.as_ref().map(Self::map_row).transpose()? else {
            return Err(NotificationError::NotificationNotFound);
        };
        if result.rows_affected() > 0 {
            return Ok(invite);
        }

        match invite.call_status {
            None => Err(NotificationError::NotificationNotFound),
            Some(_) if invite.user_id != callee_id => Err(NotificationError::AccessDenied),
            Some(answered) => Err(NotificationError::CallAlreadyAnswered(
                answered.as_str().to_string(),
            )),
        }
    }

    // The guarded statement touched nothing: work out whether the row is gone or foreign.
    async fn classify_miss(&self, id: i64, user_id: i64, miss: Miss) -> NotificationResult<()> {
        let owner: Option<i64> = sqlx::query_scalar("SELECT user_id FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match (owner, miss) {
            (None, _) => Err(NotificationError::NotificationNotFound),
            (Some(owner), Miss::Read) if owner == user_id => Ok(()),
            (Some(owner), Miss::Delete) if owner == user_id => {
                Err(NotificationError::NotificationNotFound)
            }
            (Some(_), _) => Err(NotificationError::AccessDenied),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::NotificationType;
    use crate::test_support::migrated_pool;
    use futures::TryStreamExt;

    fn info(user_id: i64, title: &str) -> CreateNotificationRequest {
        CreateNotificationRequest::new(user_id, NotificationType::Info, title, "body")
    }

    #[tokio::test]
    async fn create_assigns_id_and_timestamp() {
        let (pool, _dir) = migrated_pool().await;
        let repo = NotificationRepository::new(pool);

        let created = repo
            .create(&info(7, "hello").with_sender(3).with_call_room("room-1"))
            .await
            .unwrap();

        assert!(created.id > 0);
        assert!(!created.created_at.is_empty());
        assert_eq!(created.user_id, 7);
        assert_eq!(created.sender_id, Some(3));
        assert_eq!(created.call_room.as_deref(), Some("room-1"));
        assert!(!created.is_read);
    }

    #[tokio::test]
    async fn create_keeps_caller_supplied_timestamp() {
        let (pool, _dir) = migrated_pool().await;
        let repo = NotificationRepository::new(pool);

        let mut request = info(1, "backdated");
        request.created_at = Some("2024-01-01T00:00:00.000000Z".to_string());
        let created = repo.create(&request).await.unwrap();

        assert_eq!(created.created_at, "2024-01-01T00:00:00.000000Z");
    }

    #[tokio::test]
    async fn stream_orders_by_creation_and_restarts() {
        let (pool, _dir) = migrated_pool().await;
        let repo = NotificationRepository::new(pool);

        for title in ["first", "second", "third"] {
            repo.create(&info(5, title)).await.unwrap();
        }
        repo.create(&info(6, "someone else")).await.unwrap();

        let newest: Vec<String> = repo
            .stream_for_user(5, ListOrder::NewestFirst)
            .map_ok(|n| n.title)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(newest, vec!["third", "second", "first"]);

        let oldest: Vec<String> = repo
            .stream_for_user(5, ListOrder::OldestFirst)
            .map_ok(|n| n.title)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(oldest, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn mark_as_read_enforces_ownership() {
        let (pool, _dir) = migrated_pool().await;
        let repo = NotificationRepository::new(pool);
        let created = repo.create(&info(1, "mine")).await.unwrap();

        assert!(matches!(
            repo.mark_as_read(created.id, 2).await,
            Err(NotificationError::AccessDenied)
        ));
        assert!(matches!(
            repo.mark_as_read(created.id + 100, 1).await,
            Err(NotificationError::NotificationNotFound)
        ));

        repo.mark_as_read(created.id, 1).await.unwrap();
        repo.mark_as_read(created.id, 1).await.unwrap();
        let stored = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert!(stored.is_read);
    }

    #[tokio::test]
    async fn mark_all_and_unread_count() {
        let (pool, _dir) = migrated_pool().await;
        let repo = NotificationRepository::new(pool);

        for title in ["a", "b", "c"] {
            repo.create(&info(4, title)).await.unwrap();
        }
        assert_eq!(repo.unread_count(4).await.unwrap(), 3);

        assert_eq!(repo.mark_all_as_read(4).await.unwrap(), 3);
        assert_eq!(repo.mark_all_as_read(4).await.unwrap(), 0);
        assert_eq!(repo.unread_count(4).await.unwrap(), 0);
    }

    fn invite(callee: i64, caller: i64) -> CreateNotificationRequest {
        CreateNotificationRequest::new(callee, NotificationType::VideoCall, "Incoming Call", "call")
            .with_sender(caller)
            .with_call_room("room-7")
            .with_call_status(CallStatus::Invited)
    }

    #[tokio::test]
    async fn call_invite_is_answered_once() {
        let (pool, _dir) = migrated_pool().await;
        let repo = NotificationRepository::new(pool.clone());
        let created = repo.create(&invite(2, 1)).await.unwrap();
        assert_eq!(created.call_status, Some(CallStatus::Invited));

        let mut conn = pool.acquire().await.unwrap();
        let answered =
            NotificationRepository::answer_call(&mut conn, created.id, 2, CallStatus::Accepted)
                .await
                .unwrap();
        assert_eq!(answered.call_status, Some(CallStatus::Accepted));
        assert!(answered.is_read);

        let again =
            NotificationRepository::answer_call(&mut conn, created.id, 2, CallStatus::Declined).await;
        match again {
            Err(NotificationError::CallAlreadyAnswered(status)) => assert_eq!(status, "accepted"),
            other => panic!("expected CallAlreadyAnswered, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn answer_call_classifies_misses() {
        let (pool, _dir) = migrated_pool().await;
        let repo = NotificationRepository::new(pool.clone());
        let call = repo.create(&invite(2, 1)).await.unwrap();
        let plain = repo.create(&info(2, "not a call")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        assert!(matches!(
            NotificationRepository::answer_call(&mut conn, call.id, 3, CallStatus::Accepted).await,
            Err(NotificationError::AccessDenied)
        ));
        assert!(matches!(
            NotificationRepository::answer_call(&mut conn, plain.id, 2, CallStatus::Accepted).await,
            Err(NotificationError::NotificationNotFound)
        ));
        assert!(matches!(
            NotificationRepository::answer_call(&mut conn, call.id + 100, 2, CallStatus::Accepted).await,
            Err(NotificationError::NotificationNotFound)
        ));

        let stored = repo.find_by_id(call.id).await.unwrap().unwrap();
        assert_eq!(stored.call_status, Some(CallStatus::Invited));
        assert!(!stored.is_read);
    }

    #[tokio::test]
    async fn insert_rolls_back_with_its_transaction() {
        let (pool, _dir) = migrated_pool().await;
        let repo = NotificationRepository::new(pool);

        let mut tx = repo.begin().await.unwrap();
        NotificationRepository::insert(&mut tx, &info(3, "uncommitted"))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(repo.unread_count(3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_checks_owner() {
        let (pool, _dir) = migrated_pool().await;
        let repo = NotificationRepository::new(pool);
        let created = repo.create(&info(9, "to delete")).await.unwrap();

        assert!(matches!(
            repo.delete(created.id, 10).await,
            Err(NotificationError::AccessDenied)
        ));
        repo.delete(created.id, 9).await.unwrap();
        assert!(matches!(
            repo.delete(created.id, 9).await,
            Err(NotificationError::NotificationNotFound)
        ));
    }
}
