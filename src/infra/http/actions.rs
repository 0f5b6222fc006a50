//! Authenticated routes: post submission, comments, and the follow graph.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::{
        comments::{CommentActionError, CommentForm},
        error::HttpError,
        pagination::PageQuery,
        posts::{EditOutcome, PostActionError, PostForm},
    },
    infra::media::MediaStorageError,
    presentation::views::{
        FollowTemplate, PaginatorView, PostFormTemplate, group_options, post_cards,
        render_forbidden_response, render_not_found_response, render_server_error_response,
        render_template_response,
    },
};

use super::{
    auth::{Viewer, current_viewer, login_redirect},
    public::{HttpState, feed_error_to_response},
};

/// Everything a post form submission carries. The image is optional; an
/// empty file input is treated as no upload.
struct PostSubmission {
    csrf_token: String,
    form: PostForm,
    image: Option<(String, Bytes)>,
}

async fn read_post_submission(multipart: &mut Multipart) -> Result<PostSubmission, Response> {
    const SOURCE: &str = "infra::http::actions::read_post_submission";

    let mut submission = PostSubmission {
        csrf_token: String::new(),
        form: PostForm::default(),
        image: None,
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return Err(HttpError::new(
                    SOURCE,
                    StatusCode::BAD_REQUEST,
                    "Malformed form submission",
                    err.to_string(),
                )
                .into_response());
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "csrf_token" => match field.text().await {
                Ok(value) => submission.csrf_token = value,
                Err(err) => return Err(bad_field(SOURCE, err)),
            },
            "text" => match field.text().await {
                Ok(value) => submission.form.text = value,
                Err(err) => return Err(bad_field(SOURCE, err)),
            },
            "group" => match field.text().await {
                Ok(value) => submission.form.group = value,
                Err(err) => return Err(bad_field(SOURCE, err)),
            },
            "image" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        if !filename.is_empty() && !bytes.is_empty() {
                            submission.image = Some((filename, bytes));
                        }
                    }
                    Err(err) => return Err(bad_field(SOURCE, err)),
                }
            }
            _ => {}
        }
    }

    Ok(submission)
}

fn bad_field(source: &'static str, err: impl std::fmt::Display) -> Response {
    HttpError::new(
        source,
        StatusCode::BAD_REQUEST,
        "Malformed form submission",
        err.to_string(),
    )
    .into_response()
}

async fn blank_form(
    state: &HttpState,
    viewer: &Viewer,
    is_edit: bool,
    post_id: Option<String>,
    text: String,
    selected_group: Option<String>,
) -> Result<PostFormTemplate, Response> {
    let groups = state
        .posts
        .group_choices()
        .await
        .map_err(|err| render_server_error_response(Some(viewer.view()), err.to_string()))?;

    Ok(PostFormTemplate {
        viewer: Some(viewer.view()),
        is_edit,
        post_id,
        text,
        groups: group_options(&groups, selected_group.as_deref()),
        text_errors: Vec::new(),
        group_errors: Vec::new(),
        image_errors: Vec::new(),
    })
}

pub(crate) async fn post_create_form(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(Some(viewer)) => viewer,
        Ok(None) => return login_redirect("/create"),
        Err(response) => return response,
    };

    match blank_form(&state, &viewer, false, None, String::new(), None).await {
        Ok(template) => render_template_response(template, StatusCode::OK),
        Err(response) => response,
    }
}

pub(crate) async fn post_create_submit(
    State(state): State<HttpState>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(Some(viewer)) => viewer,
        Ok(None) => return login_redirect("/create"),
        Err(response) => return response,
    };

    let submission = match read_post_submission(&mut multipart).await {
        Ok(submission) => submission,
        Err(response) => return response,
    };

    if !viewer.csrf_matches(&submission.csrf_token) {
        return render_forbidden_response(Some(viewer.view()));
    }

    let selected = (!submission.form.group.is_empty()).then(|| submission.form.group.clone());

    let image_path = match store_submitted_image(&state, &submission).await {
        Ok(path) => path,
        Err(message) => {
            let mut template = match blank_form(
                &state,
                &viewer,
                false,
                None,
                submission.form.text.clone(),
                selected,
            )
            .await
            {
                Ok(template) => template,
                Err(response) => return response,
            };
            template.image_errors = vec![message];
            return render_template_response(template, StatusCode::OK);
        }
    };

    match state
        .posts
        .create(viewer.user.id, &submission.form, image_path.clone())
        .await
    {
        Ok(post) => {
            info!(
                target = "scribo::http::actions",
                post_id = %post.id,
                author = %viewer.user.username,
                "post created"
            );
            Redirect::to(&format!("/profile/{}", viewer.user.username)).into_response()
        }
        Err(PostActionError::Invalid(errors)) => {
            discard_stored_image(&state, image_path.as_deref()).await;
            let mut template = match blank_form(
                &state,
                &viewer,
                false,
                None,
                submission.form.text.clone(),
                selected,
            )
            .await
            {
                Ok(template) => template,
                Err(response) => return response,
            };
            template.apply_errors(&errors);
            render_template_response(template, StatusCode::OK)
        }
        Err(PostActionError::UnknownPost) => {
            discard_stored_image(&state, image_path.as_deref()).await;
            render_not_found_response(Some(viewer.view()))
        }
        Err(PostActionError::Repo(err)) => {
            discard_stored_image(&state, image_path.as_deref()).await;
            render_server_error_response(Some(viewer.view()), err.to_string())
        }
    }
}

pub(crate) async fn post_edit_form(
    State(state): State<HttpState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let Ok(post_id) = Uuid::parse_str(&id) else {
        return render_not_found_response(None);
    };

    let viewer = match current_viewer(&state, &jar).await {
        Ok(Some(viewer)) => viewer,
        Ok(None) => return login_redirect(&format!("/posts/{id}/edit")),
        Err(response) => return response,
    };

    let post = match state.posts.find(post_id).await {
        Ok(Some(post)) => post,
        Ok(None) => return render_not_found_response(Some(viewer.view())),
        Err(err) => return render_server_error_response(Some(viewer.view()), err.to_string()),
    };

    // Only the author may edit; everyone else lands back on the detail page.
    if post.author_id != viewer.user.id {
        return Redirect::to(&format!("/posts/{post_id}")).into_response();
    }

    let selected = post.group_id.map(|group_id| group_id.to_string());
    match blank_form(
        &state,
        &viewer,
        true,
        Some(post_id.to_string()),
        post.text,
        selected,
    )
    .await
    {
        Ok(template) => render_template_response(template, StatusCode::OK),
        Err(response) => response,
    }
}

pub(crate) async fn post_edit_submit(
    State(state): State<HttpState>,
    jar: CookieJar,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let Ok(post_id) = Uuid::parse_str(&id) else {
        return render_not_found_response(None);
    };

    let viewer = match current_viewer(&state, &jar).await {
        Ok(Some(viewer)) => viewer,
        Ok(None) => return login_redirect(&format!("/posts/{id}/edit")),
        Err(response) => return response,
    };

    let submission = match read_post_submission(&mut multipart).await {
        Ok(submission) => submission,
        Err(response) => return response,
    };

    if !viewer.csrf_matches(&submission.csrf_token) {
        return render_forbidden_response(Some(viewer.view()));
    }

    let selected = (!submission.form.group.is_empty()).then(|| submission.form.group.clone());

    let new_image_path = match store_submitted_image(&state, &submission).await {
        Ok(path) => path,
        Err(message) => {
            let mut template = match blank_form(
                &state,
                &viewer,
                true,
                Some(post_id.to_string()),
                submission.form.text.clone(),
                selected,
            )
            .await
            {
                Ok(template) => template,
                Err(response) => return response,
            };
            template.image_errors = vec![message];
            return render_template_response(template, StatusCode::OK);
        }
    };

    match state
        .posts
        .edit(post_id, viewer.user.id, &submission.form, new_image_path.clone())
        .await
    {
        Ok(EditOutcome::Updated(post)) => {
            Redirect::to(&format!("/posts/{}", post.id)).into_response()
        }
        Ok(EditOutcome::NotAuthor(post)) => {
            discard_stored_image(&state, new_image_path.as_deref()).await;
            Redirect::to(&format!("/posts/{}", post.id)).into_response()
        }
        Err(PostActionError::Invalid(errors)) => {
            discard_stored_image(&state, new_image_path.as_deref()).await;
            let mut template = match blank_form(
                &state,
                &viewer,
                true,
                Some(post_id.to_string()),
                submission.form.text.clone(),
                selected,
            )
            .await
            {
                Ok(template) => template,
                Err(response) => return response,
            };
            template.apply_errors(&errors);
            render_template_response(template, StatusCode::OK)
        }
        Err(PostActionError::UnknownPost) => {
            discard_stored_image(&state, new_image_path.as_deref()).await;
            render_not_found_response(Some(viewer.view()))
        }
        Err(PostActionError::Repo(err)) => {
            discard_stored_image(&state, new_image_path.as_deref()).await;
            render_server_error_response(Some(viewer.view()), err.to_string())
        }
    }
}

/// Remove an upload that ended up without a post referencing it, so rejected
/// submissions do not grow the media root.
async fn discard_stored_image(state: &HttpState, stored_path: Option<&str>) {
    let Some(path) = stored_path else {
        return;
    };
    if let Err(err) = state.media.delete(path).await {
        warn!(
            target = "scribo::http::actions",
            path = %path,
            error = %err,
            "failed to remove unreferenced upload"
        );
    }
}

async fn store_submitted_image(
    state: &HttpState,
    submission: &PostSubmission,
) -> Result<Option<String>, String> {
    let Some((filename, bytes)) = submission.image.as_ref() else {
        return Ok(None);
    };

    match state.media.store_image(filename, bytes.clone()).await {
        Ok(stored) => Ok(Some(stored.stored_path)),
        Err(MediaStorageError::NotAnImage) => Err("Upload a valid image file.".to_string()),
        Err(MediaStorageError::PayloadTooLarge) => Err("The image is too large.".to_string()),
        Err(MediaStorageError::EmptyPayload) => Ok(None),
        Err(err) => Err(format!("Could not store the image: {err}")),
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub(crate) struct CommentSubmission {
    csrf_token: String,
    text: String,
}

pub(crate) async fn add_comment(
    State(state): State<HttpState>,
    jar: CookieJar,
    Path(id): Path<String>,
    axum::Form(form): axum::Form<CommentSubmission>,
) -> Response {
    let Ok(post_id) = Uuid::parse_str(&id) else {
        return render_not_found_response(None);
    };

    let viewer = match current_viewer(&state, &jar).await {
        Ok(Some(viewer)) => viewer,
        Ok(None) => return login_redirect(&format!("/posts/{id}")),
        Err(response) => return response,
    };

    if !viewer.csrf_matches(&form.csrf_token) {
        return render_forbidden_response(Some(viewer.view()));
    }

    let comment_form = CommentForm { text: form.text };
    match state.comments.add(post_id, viewer.user.id, &comment_form).await {
        // A blank comment is dropped silently, matching the redirect-always
        // contract of the detail page form.
        Ok(_) | Err(CommentActionError::Empty) => {
            Redirect::to(&format!("/posts/{post_id}")).into_response()
        }
        Err(CommentActionError::UnknownPost) => render_not_found_response(Some(viewer.view())),
        Err(CommentActionError::Repo(err)) => {
            render_server_error_response(Some(viewer.view()), err.to_string())
        }
    }
}

pub(crate) async fn follow_index(
    State(state): State<HttpState>,
    jar: CookieJar,
    Query(query): Query<PageQuery>,
) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(Some(viewer)) => viewer,
        Ok(None) => return login_redirect("/follow"),
        Err(response) => return response,
    };

    match state.feed.follow_page(viewer.user.id, query.requested()).await {
        Ok(page) => render_template_response(
            FollowTemplate {
                viewer: Some(viewer.view()),
                posts: post_cards(&page.items),
                paginator: PaginatorView::from_page(&page),
            },
            StatusCode::OK,
        ),
        Err(err) => feed_error_to_response(err, Some(viewer.view())),
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub(crate) struct FollowForm {
    csrf_token: String,
}

pub(crate) async fn profile_follow(
    State(state): State<HttpState>,
    jar: CookieJar,
    Path(username): Path<String>,
    axum::Form(form): axum::Form<FollowForm>,
) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(Some(viewer)) => viewer,
        Ok(None) => return login_redirect(&format!("/profile/{username}")),
        Err(response) => return response,
    };

    if !viewer.csrf_matches(&form.csrf_token) {
        return render_forbidden_response(Some(viewer.view()));
    }

    match state.follows.follow(viewer.user.id, &username).await {
        // Self-follow and double-follow are silent no-ops.
        Ok(_) => Redirect::to(&format!("/profile/{username}")).into_response(),
        Err(crate::application::follows::FollowError::UnknownUser) => {
            render_not_found_response(Some(viewer.view()))
        }
        Err(crate::application::follows::FollowError::Repo(err)) => {
            render_server_error_response(Some(viewer.view()), err.to_string())
        }
    }
}

pub(crate) async fn profile_unfollow(
    State(state): State<HttpState>,
    jar: CookieJar,
    Path(username): Path<String>,
    axum::Form(form): axum::Form<FollowForm>,
) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(Some(viewer)) => viewer,
        Ok(None) => return login_redirect(&format!("/profile/{username}")),
        Err(response) => return response,
    };

    if !viewer.csrf_matches(&form.csrf_token) {
        return render_forbidden_response(Some(viewer.view()));
    }

    match state.follows.unfollow(viewer.user.id, &username).await {
        Ok(_) => Redirect::to(&format!("/profile/{username}")).into_response(),
        Err(crate::application::follows::FollowError::UnknownUser) => {
            render_not_found_response(Some(viewer.view()))
        }
        Err(crate::application::follows::FollowError::Repo(err)) => {
            render_server_error_response(Some(viewer.view()), err.to_string())
        }
    }
}
