//! Comment submission on post detail pages.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{CommentsRepo, CreateCommentParams, PostsRepo, RepoError};
use crate::domain::entities::CommentRecord;

#[derive(Debug, Clone, Default)]
pub struct CommentForm {
    pub text: String,
}

#[derive(Debug, Error)]
pub enum CommentActionError {
    /// Blank submission. The caller redirects back to the detail page
    /// without persisting anything.
    #[error("comment text is empty")]
    Empty,
    #[error("post not found")]
    UnknownPost,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentsRepo>,
    posts: Arc<dyn PostsRepo>,
}

impl CommentService {
    pub fn new(comments: Arc<dyn CommentsRepo>, posts: Arc<dyn PostsRepo>) -> Self {
        Self { comments, posts }
    }

    pub async fn add(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        form: &CommentForm,
    ) -> Result<CommentRecord, CommentActionError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(CommentActionError::UnknownPost)?;

        let text = form.text.trim();
        if text.is_empty() {
            return Err(CommentActionError::Empty);
        }

        let record = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id,
                text: text.to_string(),
            })
            .await?;

        Ok(record)
    }
}
