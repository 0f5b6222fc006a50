//! Post submission handling: validation, creation, and author-only edits.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{
    CommentsRepo, CreatePostParams, GroupsRepo, PostsRepo, PostsWriteRepo, RepoError,
    UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, PostRecord};

/// Raw post form fields as submitted. `group` carries the selected group id
/// as a string; empty means no group.
#[derive(Debug, Clone, Default)]
pub struct PostForm {
    pub text: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Validation messages collected per form field, re-rendered into the form
/// template on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    errors: Vec<FieldError>,
}

impl FormErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn for_field(&self, field: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|entry| entry.field == field)
            .map(|entry| entry.message.as_str())
            .collect()
    }

    pub fn messages(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }
}

#[derive(Debug, Error)]
pub enum PostActionError {
    #[error("form validation failed")]
    Invalid(FormErrors),
    #[error("post not found")]
    UnknownPost,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Result of an edit attempt. A non-author is not an error; the caller
/// redirects to the detail page without reporting anything.
#[derive(Debug)]
pub enum EditOutcome {
    Updated(PostRecord),
    NotAuthor(PostRecord),
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    posts_write: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

struct ValidatedPost {
    text: String,
    group_id: Option<Uuid>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        posts_write: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            posts,
            posts_write,
            groups,
            comments,
        }
    }

    pub async fn create(
        &self,
        author_id: Uuid,
        form: &PostForm,
        image_path: Option<String>,
    ) -> Result<PostRecord, PostActionError> {
        let validated = self.validate(form).await?;

        let record = self
            .posts_write
            .create_post(CreatePostParams {
                author_id,
                text: validated.text,
                group_id: validated.group_id,
                image_path,
            })
            .await?;

        Ok(record)
    }

    pub async fn edit(
        &self,
        post_id: Uuid,
        editor_id: Uuid,
        form: &PostForm,
        new_image_path: Option<String>,
    ) -> Result<EditOutcome, PostActionError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(PostActionError::UnknownPost)?;

        if post.author_id != editor_id {
            return Ok(EditOutcome::NotAuthor(post));
        }

        let validated = self.validate(form).await?;

        let record = self
            .posts_write
            .update_post(UpdatePostParams {
                id: post_id,
                text: validated.text,
                group_id: validated.group_id,
                new_image_path,
            })
            .await?;

        Ok(EditOutcome::Updated(record))
    }

    pub async fn find(&self, post_id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        self.posts.find_by_id(post_id).await
    }

    /// Groups offered in the post form's select box.
    pub async fn group_choices(&self) -> Result<Vec<crate::domain::entities::GroupRecord>, RepoError> {
        self.groups.list_all().await
    }

    /// Post plus its comments in conversation order.
    pub async fn detail(
        &self,
        post_id: Uuid,
    ) -> Result<Option<(PostRecord, Vec<CommentRecord>)>, RepoError> {
        let Some(post) = self.posts.find_by_id(post_id).await? else {
            return Ok(None);
        };
        let comments = self.comments.list_for_post(post_id).await?;
        Ok(Some((post, comments)))
    }

    async fn validate(&self, form: &PostForm) -> Result<ValidatedPost, PostActionError> {
        let mut errors = FormErrors::default();

        let text = form.text.trim();
        if text.is_empty() {
            errors.push("text", "This field is required.");
        }

        let group_raw = form.group.trim();
        let group_id = if group_raw.is_empty() {
            None
        } else {
            match Uuid::parse_str(group_raw) {
                Ok(id) => match self.groups.find_by_id(id).await? {
                    Some(group) => Some(group.id),
                    None => {
                        errors.push("group", "Select a valid group.");
                        None
                    }
                },
                Err(_) => {
                    errors.push("group", "Select a valid group.");
                    None
                }
            }
        };

        if errors.is_empty() {
            Ok(ValidatedPost {
                text: text.to_string(),
                group_id,
            })
        } else {
            Err(PostActionError::Invalid(errors))
        }
    }
}
