//! Router assembly and the read-only page handlers.

use std::{io::ErrorKind, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use bytes::Bytes;
use tracing::error;
use uuid::Uuid;

use crate::{
    application::{
        auth::AuthService,
        comments::CommentService,
        error::HttpError,
        feed::{FeedError, FeedService},
        follows::FollowService,
        pagination::PageQuery,
        posts::PostService,
    },
    infra::media::{MediaStorage, MediaStorageError},
    presentation::views::{
        AboutAuthorTemplate, AboutTechTemplate, CommentView, GroupTemplate, IndexTemplate,
        PaginatorView, PostCard, PostDetailTemplate, ProfileTemplate, ViewerView, post_cards,
        render_not_found_response, render_server_error_response, render_template_response,
    },
};

use super::{
    actions,
    auth::{self, current_viewer},
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub follows: Arc<FollowService>,
    pub auth: Arc<AuthService>,
    pub media: Arc<MediaStorage>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/group/{slug}", get(group_posts))
        .route("/profile/{username}", get(profile))
        .route("/profile/{username}/follow", post(actions::profile_follow))
        .route(
            "/profile/{username}/unfollow",
            post(actions::profile_unfollow),
        )
        .route("/posts/{id}", get(post_detail))
        .route("/posts/{id}/edit", get(actions::post_edit_form).post(actions::post_edit_submit))
        .route("/posts/{id}/comment", post(actions::add_comment))
        .route("/create", get(actions::post_create_form).post(actions::post_create_submit))
        .route("/follow", get(actions::follow_index))
        .route("/auth/login", get(auth::login_form).post(auth::login_submit))
        .route("/auth/logout", post(auth::logout))
        .route("/about/author", get(about_author))
        .route("/about/tech", get(about_tech))
        .route("/media/{*path}", get(serve_media))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

pub(crate) fn viewer_view(viewer: &Option<auth::Viewer>) -> Option<ViewerView> {
    viewer.as_ref().map(auth::Viewer::view)
}

pub(crate) fn feed_error_to_response(err: FeedError, viewer: Option<ViewerView>) -> Response {
    match err {
        FeedError::UnknownGroup | FeedError::UnknownUser => render_not_found_response(viewer),
        FeedError::Repo(repo) => super::repo_error_response("infra::http::public::feed", repo),
    }
}

async fn index(
    State(state): State<HttpState>,
    jar: CookieJar,
    Query(query): Query<PageQuery>,
) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };

    match state.feed.global_page(query.requested()).await {
        Ok(page) => render_template_response(
            IndexTemplate {
                viewer: viewer_view(&viewer),
                posts: post_cards(&page.items),
                paginator: PaginatorView::from_page(&page),
            },
            StatusCode::OK,
        ),
        Err(err) => feed_error_to_response(err, viewer_view(&viewer)),
    }
}

async fn group_posts(
    State(state): State<HttpState>,
    jar: CookieJar,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };

    match state.feed.group_page(&slug, query.requested()).await {
        Ok(feed) => render_template_response(
            GroupTemplate {
                viewer: viewer_view(&viewer),
                group_title: feed.group.title,
                group_description: feed.group.description,
                posts: post_cards(&feed.page.items),
                paginator: PaginatorView::from_page(&feed.page),
            },
            StatusCode::OK,
        ),
        Err(err) => feed_error_to_response(err, viewer_view(&viewer)),
    }
}

async fn profile(
    State(state): State<HttpState>,
    jar: CookieJar,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    let viewer_id = viewer.as_ref().map(|v| v.user.id);

    match state
        .feed
        .profile_page(&username, query.requested(), viewer_id)
        .await
    {
        Ok(feed) => {
            let can_follow = viewer_id.is_some_and(|id| id != feed.author.id);
            render_template_response(
                ProfileTemplate {
                    viewer: viewer_view(&viewer),
                    author_username: feed.author.username,
                    post_count: feed.page.total_items,
                    following: feed.following,
                    can_follow,
                    posts: post_cards(&feed.page.items),
                    paginator: PaginatorView::from_page(&feed.page),
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response(err, viewer_view(&viewer)),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };

    let Ok(post_id) = Uuid::parse_str(&id) else {
        return render_not_found_response(viewer_view(&viewer));
    };

    match state.posts.detail(post_id).await {
        Ok(Some((post, comments))) => {
            let is_author = viewer.as_ref().is_some_and(|v| v.user.id == post.author_id);
            render_template_response(
                PostDetailTemplate {
                    viewer: viewer_view(&viewer),
                    post: PostCard::from(&post),
                    is_author,
                    comments: comments.iter().map(CommentView::from).collect(),
                    can_comment: viewer.is_some(),
                },
                StatusCode::OK,
            )
        }
        Ok(None) => render_not_found_response(viewer_view(&viewer)),
        Err(err) => render_server_error_response(viewer_view(&viewer), err.to_string()),
    }
}

async fn about_author(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    render_template_response(
        AboutAuthorTemplate {
            viewer: viewer_view(&viewer),
        },
        StatusCode::OK,
    )
}

async fn about_tech(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    render_template_response(
        AboutTechTemplate {
            viewer: viewer_view(&viewer),
        },
        StatusCode::OK,
    )
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.media.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(MediaStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            "The requested file is not available",
        )
        .into_response(),
        Err(MediaStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            "The requested file is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored file"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read stored file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(bytes.clone()));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&bytes.len().to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

async fn not_found(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };
    render_not_found_response(viewer_view(&viewer))
}
