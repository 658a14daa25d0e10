//! User repository: lookups used to enrich outbound events.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::entities::{CreateUserRequest, User};
use crate::types::errors::UserError;
use crate::types::{timestamp_now, UserResult};

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &SqliteRow) -> UserResult<User> {
        Ok(User {
            id: row.try_get("id")?,
            public_id: row.try_get("public_id")?,
            email: row.try_get("email")?,
            full_name: row.try_get("full_name")?,
            role: row.try_get("role")?,
            created_at: row.try_get("created_at")?,
        })
    }

    pub async fn create(&self, request: &CreateUserRequest) -> UserResult<User> {
        let result = sqlx::query(
            "INSERT INTO users (public_id, email, full_name, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(cuid2::cuid())
        .bind(&request.email)
        .bind(&request.full_name)
        .bind(request.role.as_deref().unwrap_or("patient"))
        .bind(timestamp_now())
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_rowid())
            .await?
            .ok_or(UserError::UserNotFound)
    }

    pub async fn find_by_id(&self, id: i64) -> UserResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, public_id, email, full_name, role, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::map_row).transpose()
    }

    pub async fn find_by_name(&self, full_name: &str) -> UserResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, public_id, email, full_name, role, created_at FROM users WHERE full_name = ? ORDER BY id LIMIT 1",
        )
        .bind(full_name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::map_row).transpose()
    }

    /// Display name for a user id, `None` when the user is unknown.
    pub async fn display_name(&self, id: i64) -> UserResult<Option<String>> {
        let name: Option<String> = sqlx::query_scalar("SELECT full_name FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }

    pub async fn exists(&self, id: i64) -> UserResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::migrated_pool;

    #[tokio::test]
    async fn create_and_resolve_display_name() {
        let (pool, _dir) = migrated_pool().await;
        let repo = UserRepository::new(pool);

        let user = repo
            .create(&CreateUserRequest {
                full_name: "Dr. Ada Byron".to_string(),
                email: Some("ada@example.org".to_string()),
                role: Some("researcher".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(repo.display_name(user.id).await.unwrap().as_deref(), Some("Dr. Ada Byron"));
        assert_eq!(repo.display_name(user.id + 1).await.unwrap(), None);
        assert!(repo.exists(user.id).await.unwrap());
        assert_eq!(user.role, "researcher");
    }

    #[tokio::test]
    async fn duplicate_email_is_reported() {
        let (pool, _dir) = migrated_pool().await;
        let repo = UserRepository::new(pool);
        let request = CreateUserRequest {
            full_name: "Sam".to_string(),
            email: Some("sam@example.org".to_string()),
            role: None,
        };

        repo.create(&request).await.unwrap();
        assert!(matches!(
            repo.create(&request).await,
            Err(UserError::EmailAlreadyExists)
        ));
    }
}
