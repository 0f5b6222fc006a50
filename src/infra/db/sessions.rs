use async_trait::async_trait;

use crate::application::repos::{RepoError, SessionsRepo};
use crate::domain::entities::{SessionRecord, UserRecord};

use super::PostgresRepositories;
use super::map_sqlx_error;
use super::types::UserRow;

#[async_trait]
impl SessionsRepo for PostgresRepositories {
    async fn insert_session(&self, session: SessionRecord) -> Result<(), RepoError> {
        sqlx::query("INSERT INTO sessions (token, user_id, created_at) VALUES ($1, $2, $3)")
            .bind(&session.token)
            .bind(session.user_id)
            .bind(session.created_at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_session_user(&self, token: &str) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.username, u.created_at \
             FROM sessions s INNER JOIN users u ON u.id = s.user_id \
             WHERE s.token = $1",
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn delete_session(&self, token: &str) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
