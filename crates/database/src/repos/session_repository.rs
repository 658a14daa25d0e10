//! Session repository: maps opaque bearer tokens to user ids.

use chrono::{Duration, Utc};
use sqlx::{Row, SqlitePool};

use crate::entities::Session;
use crate::types::errors::AuthError;
use crate::types::{timestamp_now, AuthResult};

// roughly a century; longer lifetimes are clamped
const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Repository for session database operations
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Issue a fresh session token for `user_id` valid for `ttl_seconds`.
    pub async fn create(&self, user_id: i64, ttl_seconds: u64) -> AuthResult<Session> {
        let token = format!("{}{}", cuid2::cuid(), cuid2::cuid());
        let created_at = timestamp_now();
        let ttl = Duration::seconds(ttl_seconds.min(MAX_TTL_SECONDS) as i64);
        let expires_at = (Utc::now() + ttl).to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

        sqlx::query("INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
            .bind(&token)
            .bind(user_id)
            .bind(&created_at)
            .bind(&expires_at)
            .execute(&self.pool)
            .await?;

        Ok(Session {
            token,
            user_id,
            created_at,
            expires_at,
        })
    }

    /// Resolve a token to its user. Unknown tokens fail with `InvalidToken`,
    /// expired ones with `SessionExpired`.
    pub async fn find_user_id(&self, token: &str) -> AuthResult<i64> {
        let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let user_id: i64 = row.try_get("user_id")?;
        let expires_at: String = row.try_get("expires_at")?;

        if expires_at <= timestamp_now() {
            return Err(AuthError::SessionExpired);
        }
        Ok(user_id)
    }

    pub async fn delete(&self, token: &str) -> AuthResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
