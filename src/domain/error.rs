use thiserror::Error;

/// Domain-level rejection of user-supplied values (usernames, passwords,
/// group titles). Storage and transport failures live in the infra layer.
#[derive(Debug, Error)]
#[error("validation failed: {message}")]
pub struct DomainError {
    message: String,
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
