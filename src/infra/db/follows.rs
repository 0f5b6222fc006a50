use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{FollowsRepo, RepoError};
use crate::domain::entities::FollowRecord;

use super::PostgresRepositories;
use super::map_sqlx_error;
use super::types::FollowRow;

#[async_trait]
impl FollowsRepo for PostgresRepositories {
    async fn follows(&self, user_id: Uuid, author_id: Uuid) -> Result<bool, RepoError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
        )
        .bind(user_id)
        .bind(author_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(exists)
    }

    async fn followed_author_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT author_id FROM follows WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(ids)
    }

    async fn create_follow(
        &self,
        user_id: Uuid,
        author_id: Uuid,
    ) -> Result<FollowRecord, RepoError> {
        let row = sqlx::query_as::<_, FollowRow>(
            "INSERT INTO follows (id, user_id, author_id) \
             VALUES ($1, $2, $3) \
             RETURNING id, user_id, author_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(author_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(FollowRecord::from(row))
    }

    async fn delete_follow(&self, user_id: Uuid, author_id: Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(user_id)
            .bind(author_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
