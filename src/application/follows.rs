//! Follow graph mutations.
//!
//! Storage does not enforce uniqueness on the (user, author) pair, so the
//! service pre-checks before inserting: following an already-followed author
//! and following yourself are both silent no-ops.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown user")]
    UnknownUser,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    SelfFollow,
    AlreadyFollowing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowOutcome {
    Removed,
    NotFollowing,
}

#[derive(Clone)]
pub struct FollowService {
    follows: Arc<dyn FollowsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl FollowService {
    pub fn new(follows: Arc<dyn FollowsRepo>, users: Arc<dyn UsersRepo>) -> Self {
        Self { follows, users }
    }

    pub async fn follow(
        &self,
        user_id: Uuid,
        author_username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self
            .users
            .find_by_username(author_username)
            .await?
            .ok_or(FollowError::UnknownUser)?;

        if author.id == user_id {
            return Ok(FollowOutcome::SelfFollow);
        }

        if self.follows.follows(user_id, author.id).await? {
            return Ok(FollowOutcome::AlreadyFollowing);
        }

        self.follows.create_follow(user_id, author.id).await?;
        Ok(FollowOutcome::Created)
    }

    pub async fn unfollow(
        &self,
        user_id: Uuid,
        author_username: &str,
    ) -> Result<UnfollowOutcome, FollowError> {
        let author = self
            .users
            .find_by_username(author_username)
            .await?
            .ok_or(FollowError::UnknownUser)?;

        if !self.follows.follows(user_id, author.id).await? {
            return Ok(UnfollowOutcome::NotFollowing);
        }

        self.follows.delete_follow(user_id, author.id).await?;
        Ok(UnfollowOutcome::Removed)
    }
}
