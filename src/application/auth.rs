//! Session authentication.
//!
//! Passwords are stored as salted SHA-256 digests and compared in constant
//! time. Session tokens are opaque strings persisted server-side and carried
//! in a cookie; CSRF tokens for authenticated form posts are derived from the
//! session token so they need no extra storage.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CreateUserParams, RepoError, SessionsRepo, UsersRepo};
use crate::domain::entities::{SessionRecord, UserRecord};
use crate::domain::error::DomainError;

const TOKEN_PREFIX: &str = "ss";
const CSRF_CONTEXT: &str = "scribo-csrf";
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UsersRepo>, sessions: Arc<dyn SessionsRepo>) -> Self {
        Self { users, sessions }
    }

    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserRecord, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DomainError::validation("username must not be empty").into());
        }
        if !username
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
        {
            return Err(DomainError::validation(
                "username may contain only letters, digits, `_`, `-`, and `.`",
            )
            .into());
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            ))
            .into());
        }

        let salt = generate_salt();
        let digest = hash_password(&salt, password);
        let record = self
            .users
            .create_user(CreateUserParams {
                username: username.to_string(),
                password_salt: salt,
                password_digest: digest,
            })
            .await?;

        Ok(record)
    }

    /// Verify credentials and open a new session on success.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionRecord, AuthError> {
        let stored = self
            .users
            .find_credentials(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&stored.password_salt, password, &stored.password_digest) {
            return Err(AuthError::InvalidCredentials);
        }

        let session = SessionRecord {
            token: generate_session_token(),
            user_id: stored.user.id,
            created_at: OffsetDateTime::now_utc(),
        };
        self.sessions.insert_session(session.clone()).await?;
        Ok(session)
    }

    pub async fn logout(&self, token: &str) -> Result<(), RepoError> {
        self.sessions.delete_session(token).await
    }

    pub async fn current_user(&self, token: &str) -> Result<Option<UserRecord>, RepoError> {
        self.sessions.find_session_user(token).await
    }
}

fn generate_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

fn generate_session_token() -> String {
    format!(
        "{TOKEN_PREFIX}_{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

pub fn hash_password(salt: &str, password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

pub fn verify_password(salt: &str, password: &str, stored_digest: &[u8]) -> bool {
    let candidate = hash_password(salt, password);
    stored_digest.ct_eq(&candidate).unwrap_u8() == 1
}

/// CSRF token bound to a session: hex SHA-256 over a fixed context string
/// and the session token.
pub fn csrf_token_for(session_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(CSRF_CONTEXT.as_bytes());
    hasher.update(session_token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_csrf(session_token: &str, provided: &str) -> bool {
    let expected = csrf_token_for(session_token);
    expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip_verifies() {
        let salt = generate_salt();
        let digest = hash_password(&salt, "correct horse battery");
        assert!(verify_password(&salt, "correct horse battery", &digest));
        assert!(!verify_password(&salt, "wrong password", &digest));
    }

    #[test]
    fn same_password_different_salt_differs() {
        let first = hash_password("salt-a", "password123");
        let second = hash_password("salt-b", "password123");
        assert_ne!(first, second);
    }

    #[test]
    fn csrf_token_matches_only_its_session() {
        let token = generate_session_token();
        let csrf = csrf_token_for(&token);
        assert!(verify_csrf(&token, &csrf));
        assert!(!verify_csrf(&token, "forged"));
        assert!(!verify_csrf(&generate_session_token(), &csrf));
    }

    #[test]
    fn session_tokens_are_prefixed_and_unique() {
        let first = generate_session_token();
        let second = generate_session_token();
        assert!(first.starts_with("ss_"));
        assert_ne!(first, second);
    }
}
