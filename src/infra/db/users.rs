use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{CreateUserParams, RepoError, StoredCredentials, UsersRepo};
use crate::domain::entities::UserRecord;

use super::PostgresRepositories;
use super::map_sqlx_error;
use super::types::{CredentialsRow, UserRow};

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_credentials(
        &self,
        username: &str,
    ) -> Result<Option<StoredCredentials>, RepoError> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            "SELECT id, username, created_at, password_salt, password_digest \
             FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|row| StoredCredentials {
            user: UserRecord {
                id: row.id,
                username: row.username,
                created_at: row.created_at,
            },
            password_salt: row.password_salt,
            password_digest: row.password_digest,
        }))
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, username, password_salt, password_digest) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, username, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&params.username)
        .bind(&params.password_salt)
        .bind(&params.password_digest)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(UserRecord::from(row))
    }
}
