//! Askama view models and rendering helpers.

use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::Page;
use crate::application::posts::FormErrors;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};

const DISPLAY_DATE: &[BorrowedFormatItem<'_>] =
    format_description!("[day] [month repr:short] [year] [hour]:[minute]");

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(source, StatusCode::INTERNAL_SERVER_ERROR, public_message, &error)
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(viewer: Option<ViewerView>) -> Response {
    let template = ErrorTemplate {
        viewer,
        status: 404,
        title: "Page not found".to_string(),
        message: "The page you asked for does not exist.".to_string(),
    };
    let mut response = render_template_response(template, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

pub fn render_forbidden_response(viewer: Option<ViewerView>) -> Response {
    let template = ErrorTemplate {
        viewer,
        status: 403,
        title: "Request rejected".to_string(),
        message: "The form submission could not be verified. Go back and try again.".to_string(),
    };
    let mut response = render_template_response(template, StatusCode::FORBIDDEN);
    ErrorReport::from_message(
        "presentation::views::render_forbidden_response",
        StatusCode::FORBIDDEN,
        "CSRF verification failed",
    )
    .attach(&mut response);
    response
}

pub fn render_server_error_response(viewer: Option<ViewerView>, detail: impl Into<String>) -> Response {
    let template = ErrorTemplate {
        viewer,
        status: 500,
        title: "Server error".to_string(),
        message: "Something went wrong on our side.".to_string(),
    };
    let mut response = render_template_response(template, StatusCode::INTERNAL_SERVER_ERROR);
    ErrorReport::from_message(
        "presentation::views::render_server_error_response",
        StatusCode::INTERNAL_SERVER_ERROR,
        detail,
    )
    .attach(&mut response);
    response
}

/// Signed-in user shown in the page chrome.
#[derive(Debug, Clone)]
pub struct ViewerView {
    pub username: String,
    pub csrf_token: String,
}

impl ViewerView {
    pub fn new(user: &UserRecord, csrf_token: String) -> Self {
        Self {
            username: user.username.clone(),
            csrf_token,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostCard {
    pub id: String,
    pub text: String,
    pub author_username: String,
    pub group_slug: Option<String>,
    pub group_title: Option<String>,
    pub image_path: Option<String>,
    pub published: String,
}

impl From<&PostRecord> for PostCard {
    fn from(record: &PostRecord) -> Self {
        Self {
            id: record.id.to_string(),
            text: record.text.clone(),
            author_username: record.author_username.clone(),
            group_slug: record.group_slug.clone(),
            group_title: record.group_title.clone(),
            image_path: record.image_path.clone(),
            published: format_timestamp(record.created_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommentView {
    pub author_username: String,
    pub text: String,
    pub published: String,
}

impl From<&CommentRecord> for CommentView {
    fn from(record: &CommentRecord) -> Self {
        Self {
            author_username: record.author_username.clone(),
            text: record.text.clone(),
            published: format_timestamp(record.created_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaginatorView {
    pub number: u32,
    pub total_pages: u32,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_number: u32,
    pub next_number: u32,
}

impl PaginatorView {
    pub fn from_page<T>(page: &Page<T>) -> Self {
        Self {
            number: page.number,
            total_pages: page.total_pages,
            has_previous: page.has_previous(),
            has_next: page.has_next(),
            previous_number: page.previous_number(),
            next_number: page.next_number(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupOptionView {
    pub id: String,
    pub title: String,
    pub selected: bool,
}

pub fn group_options(groups: &[GroupRecord], selected: Option<&str>) -> Vec<GroupOptionView> {
    groups
        .iter()
        .map(|group| {
            let id = group.id.to_string();
            GroupOptionView {
                selected: selected == Some(id.as_str()),
                id,
                title: group.title.clone(),
            }
        })
        .collect()
}

pub fn post_cards(records: &[PostRecord]) -> Vec<PostCard> {
    records.iter().map(PostCard::from).collect()
}

fn format_timestamp(moment: OffsetDateTime) -> String {
    moment
        .format(DISPLAY_DATE)
        .unwrap_or_else(|_| moment.to_string())
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub viewer: Option<ViewerView>,
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub viewer: Option<ViewerView>,
    pub group_title: String,
    pub group_description: String,
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub viewer: Option<ViewerView>,
    pub author_username: String,
    pub post_count: u64,
    pub following: bool,
    /// Offered only to signed-in viewers looking at someone else's profile.
    pub can_follow: bool,
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub viewer: Option<ViewerView>,
    pub post: PostCard,
    pub is_author: bool,
    pub comments: Vec<CommentView>,
    pub can_comment: bool,
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub viewer: Option<ViewerView>,
    pub is_edit: bool,
    pub post_id: Option<String>,
    pub text: String,
    pub groups: Vec<GroupOptionView>,
    pub text_errors: Vec<String>,
    pub group_errors: Vec<String>,
    pub image_errors: Vec<String>,
}

impl PostFormTemplate {
    pub fn apply_errors(&mut self, errors: &FormErrors) {
        self.text_errors = errors
            .for_field("text")
            .into_iter()
            .map(str::to_string)
            .collect();
        self.group_errors = errors
            .for_field("group")
            .into_iter()
            .map(str::to_string)
            .collect();
    }
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub viewer: Option<ViewerView>,
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub viewer: Option<ViewerView>,
    pub next: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "about_author.html")]
pub struct AboutAuthorTemplate {
    pub viewer: Option<ViewerView>,
}

#[derive(Template)]
#[template(path = "about_tech.html")]
pub struct AboutTechTemplate {
    pub viewer: Option<ViewerView>,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub viewer: Option<ViewerView>,
    pub status: u16,
    pub title: String,
    pub message: String,
}
