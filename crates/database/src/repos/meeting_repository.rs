//! Meeting request repository for database operations.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::entities::{CreateMeetingRequest, MeetingRequest, MeetingStatus, ScheduledMeeting};
use crate::types::errors::MeetingError;
use crate::types::{timestamp_now, MeetingResult};

const REQUEST_COLUMNS: &str =
    "id, requester_id, expert_id, message, preferred_time, status, created_at, updated_at";

#[derive(Clone, Copy)]
enum Party {
    Requester,
    Expert,
}

/// Repository for meeting request database operations
#[derive(Clone)]
pub struct MeetingRequestRepository {
    pool: SqlitePool,
}

impl MeetingRequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a transaction so a transition can commit together with its notification.
    pub async fn begin(&self) -> MeetingResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    fn map_row(row: &SqliteRow) -> MeetingResult<MeetingRequest> {
        let status: String = row.try_get("status")?;

        Ok(MeetingRequest {
            id: row.try_get("id")?,
            requester_id: row.try_get("requester_id")?,
            expert_id: row.try_get("expert_id")?,
            message: row.try_get("message")?,
            preferred_time: row.try_get("preferred_time")?,
            status: status.parse().map_err(MeetingError::InvalidStatus)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn map_meeting(row: &SqliteRow) -> MeetingResult<ScheduledMeeting> {
        Ok(ScheduledMeeting {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            organizer_id: row.try_get("organizer_id")?,
            participant_id: row.try_get("participant_id")?,
            scheduled_for: row.try_get("scheduled_for")?,
            duration_minutes: row.try_get("duration_minutes")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Insert a pending request. A second pending request for the same pair is rejected
    /// by the partial unique index and surfaces as [`MeetingError::AlreadyPending`].
    pub async fn create(&self, request: &CreateMeetingRequest) -> MeetingResult<MeetingRequest> {
        let mut conn = self.pool.acquire().await?;
        Self::insert(&mut conn, request).await
    }

    /// [`create`](Self::create) on the caller's connection or transaction.
    pub async fn insert(
        conn: &mut SqliteConnection,
        request: &CreateMeetingRequest,
    ) -> MeetingResult<MeetingRequest> {
        let now = timestamp_now();

        let result = sqlx::query(
            "INSERT INTO meeting_requests (requester_id, expert_id, message, preferred_time, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(request.requester_id)
        .bind(request.expert_id)
        .bind(&request.message)
        .bind(&request.preferred_time)
        .bind(&now)
        .bind(&now)
        .execute(&mut *conn)
        .await?;

        Self::load(conn, result.last_insert_rowid())
            .await?
            .ok_or_else(|| {
                MeetingError::DatabaseError("Failed to retrieve created meeting request".to_string())
            })
    }

    pub async fn find_by_id(&self, id: i64) -> MeetingResult<Option<MeetingRequest>> {
        let mut conn = self.pool.acquire().await?;
        Self::load(&mut conn, id).await
    }

    async fn load(conn: &mut SqliteConnection, id: i64) -> MeetingResult<Option<MeetingRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM meeting_requests WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(Self::map_row).transpose()
    }

    /// Requests the user has sent, newest first
    pub async fn find_sent(&self, requester_id: i64) -> MeetingResult<Vec<MeetingRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM meeting_requests WHERE requester_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(requester_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::map_row).collect()
    }

    /// Requests addressed to the user, newest first
    pub async fn find_received(&self, expert_id: i64) -> MeetingResult<Vec<MeetingRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM meeting_requests WHERE expert_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(expert_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::map_row).collect()
    }

    pub async fn find_meeting_for_request(
        &self,
        request_id: i64,
    ) -> MeetingResult<Option<ScheduledMeeting>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_meeting(&mut conn, request_id).await
    }

    async fn load_meeting(
        conn: &mut SqliteConnection,
        request_id: i64,
    ) -> MeetingResult<Option<ScheduledMeeting>> {
        let row = sqlx::query(
            "SELECT id, request_id, organizer_id, participant_id, scheduled_for, duration_minutes, created_at
             FROM meetings WHERE request_id = ?",
        )
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(Self::map_meeting).transpose()
    }

    /// Move a pending request to `accepted` or `rejected` on behalf of its expert.
    ///
    /// The status change and, for acceptance, the scheduling record are written in one
    /// transaction. Only one caller can win the `status = 'pending'` guard.
    pub async fn resolve(
        &self,
        id: i64,
        expert_id: i64,
        status: MeetingStatus,
    ) -> MeetingResult<(MeetingRequest, Option<ScheduledMeeting>)> {
        let mut tx = self.pool.begin().await?;
        let resolved = Self::resolve_in(&mut tx, id, expert_id, status).await?;
        tx.commit().await?;
        Ok(resolved)
    }

    /// [`resolve`](Self::resolve) inside a transaction the caller commits.
    ///
    /// On error nothing has been written; dropping the transaction is enough.
    pub async fn resolve_in(
        tx: &mut SqliteConnection,
        id: i64,
        expert_id: i64,
        status: MeetingStatus,
    ) -> MeetingResult<(MeetingRequest, Option<ScheduledMeeting>)> {
        if !matches!(status, MeetingStatus::Accepted | MeetingStatus::Rejected) {
            return Err(MeetingError::InvalidStatus(status.to_string()));
        }

        let now = timestamp_now();

        let updated = sqlx::query(
            "UPDATE meeting_requests SET status = ?, updated_at = ?
             WHERE id = ? AND expert_id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(&now)
        .bind(id)
        .bind(expert_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Self::classify_miss(tx, id, expert_id, Party::Expert).await);
        }

        let request = Self::load(tx, id)
            .await?
            .ok_or(MeetingError::MeetingRequestNotFound)?;

        if status != MeetingStatus::Accepted {
            return Ok((request, None));
        }

        sqlx::query(
            "INSERT INTO meetings (request_id, organizer_id, participant_id, scheduled_for, duration_minutes, created_at)
             VALUES (?, ?, ?, ?, 60, ?)",
        )
        .bind(id)
        .bind(expert_id)
        .bind(request.requester_id)
        .bind(request.preferred_time.clone().unwrap_or_else(|| now.clone()))
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let meeting = Self::load_meeting(tx, id).await?;
        Ok((request, meeting))
    }

    /// Requester withdraws a pending request; the row is kept as `cancelled`.
    pub async fn cancel(&self, id: i64, requester_id: i64) -> MeetingResult<MeetingRequest> {
        let mut conn = self.pool.acquire().await?;
        let updated = sqlx::query(
            "UPDATE meeting_requests SET status = 'cancelled', updated_at = ?
             WHERE id = ? AND requester_id = ? AND status = 'pending'",
        )
        .bind(timestamp_now())
        .bind(id)
        .bind(requester_id)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Self::classify_miss(&mut conn, id, requester_id, Party::Requester).await);
        }

        Self::load(&mut conn, id)
            .await?
            .ok_or(MeetingError::MeetingRequestNotFound)
    }

    /// Requester removes a pending request entirely.
    pub async fn delete(&self, id: i64, requester_id: i64) -> MeetingResult<()> {
        let mut conn = self.pool.acquire().await?;
        let deleted = sqlx::query(
            "DELETE FROM meeting_requests WHERE id = ? AND requester_id = ? AND status = 'pending'",
        )
        .bind(id)
        .bind(requester_id)
        .execute(&mut *conn)
        .await?;

        if deleted.rows_affected() == 0 {
            return Err(Self::classify_miss(&mut conn, id, requester_id, Party::Requester).await);
        }
        Ok(())
    }

    async fn classify_miss(
        conn: &mut SqliteConnection,
        id: i64,
        actor: i64,
        party: Party,
    ) -> MeetingError {
        let request = match Self::load(conn, id).await {
            Ok(Some(request)) => request,
            Ok(None) => return MeetingError::MeetingRequestNotFound,
            Err(error) => return error,
        };

        let owner = match party {
            Party::Requester => request.requester_id,
            Party::Expert => request.expert_id,
        };

        if owner != actor {
            MeetingError::AccessDenied
        } else {
            MeetingError::NotPending(request.status.to_string())
        }
    }
}
