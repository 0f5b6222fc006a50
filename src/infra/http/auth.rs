//! Session cookie handling and the login/logout routes.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use tracing::info;

use crate::application::auth::{AuthError, csrf_token_for, verify_csrf};
use crate::domain::entities::UserRecord;
use crate::presentation::views::{
    LoginTemplate, ViewerView, render_server_error_response, render_template_response,
};

use super::public::HttpState;

pub const SESSION_COOKIE: &str = "scribo_session";

/// Resolved session: the signed-in user plus the raw session token the CSRF
/// token is derived from.
pub(crate) struct Viewer {
    pub user: UserRecord,
    pub session_token: String,
}

impl Viewer {
    pub fn view(&self) -> ViewerView {
        ViewerView::new(&self.user, csrf_token_for(&self.session_token))
    }

    pub fn csrf_matches(&self, provided: &str) -> bool {
        verify_csrf(&self.session_token, provided)
    }
}

/// Look up the session cookie. An unknown or missing token is an anonymous
/// viewer, not an error.
pub(crate) async fn current_viewer(
    state: &HttpState,
    jar: &CookieJar,
) -> Result<Option<Viewer>, Response> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };
    let token = cookie.value().to_string();

    match state.auth.current_user(&token).await {
        Ok(Some(user)) => Ok(Some(Viewer {
            user,
            session_token: token,
        })),
        Ok(None) => Ok(None),
        Err(err) => Err(render_server_error_response(None, err.to_string())),
    }
}

pub(crate) fn login_redirect(next: &str) -> Response {
    Redirect::to(&format!("/auth/login?next={next}")).into_response()
}

/// Restrict post-login redirects to local paths.
fn safe_next(raw: &str) -> &str {
    if raw.starts_with('/') && !raw.starts_with("//") {
        raw
    } else {
        "/"
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct NextQuery {
    next: Option<String>,
}

pub(crate) async fn login_form(
    State(state): State<HttpState>,
    jar: CookieJar,
    Query(query): Query<NextQuery>,
) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };

    if viewer.is_some() {
        return Redirect::to(safe_next(query.next.as_deref().unwrap_or("/"))).into_response();
    }

    render_template_response(
        LoginTemplate {
            viewer: None,
            next: query.next.unwrap_or_default(),
            error: None,
        },
        StatusCode::OK,
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LoginForm {
    username: String,
    password: String,
    next: String,
}

pub(crate) async fn login_submit(
    State(state): State<HttpState>,
    jar: CookieJar,
    axum::Form(form): axum::Form<LoginForm>,
) -> Response {
    match state.auth.login(&form.username, &form.password).await {
        Ok(session) => {
            info!(
                target = "scribo::http::auth",
                username = %form.username,
                "login succeeded"
            );
            let cookie = Cookie::build((SESSION_COOKIE, session.token))
                .path("/")
                .http_only(true)
                .build();
            let jar = jar.add(cookie);
            (jar, Redirect::to(safe_next(&form.next))).into_response()
        }
        Err(AuthError::InvalidCredentials) => render_template_response(
            LoginTemplate {
                viewer: None,
                next: form.next,
                error: Some("Invalid username or password.".to_string()),
            },
            StatusCode::OK,
        ),
        Err(err) => render_server_error_response(None, err.to_string()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LogoutForm {
    csrf_token: String,
}

pub(crate) async fn logout(
    State(state): State<HttpState>,
    jar: CookieJar,
    axum::Form(form): axum::Form<LogoutForm>,
) -> Response {
    let viewer = match current_viewer(&state, &jar).await {
        Ok(viewer) => viewer,
        Err(response) => return response,
    };

    let Some(viewer) = viewer else {
        return Redirect::to("/").into_response();
    };

    if !viewer.csrf_matches(&form.csrf_token) {
        return crate::presentation::views::render_forbidden_response(Some(viewer.view()));
    }

    if let Err(err) = state.auth.logout(&viewer.session_token).await {
        return render_server_error_response(Some(viewer.view()), err.to_string());
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    (jar, Redirect::to("/")).into_response()
}
