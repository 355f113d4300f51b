use domain::{DomainError, MessageId, RepositoryError, UserId};
use thiserror::Error;

use crate::auth::AuthError;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthError),
    #[error("Validation failed: {0}")]
    Validation(#[from] DomainError),
    #[error("Storage error: {0}")]
    Repository(RepositoryError),
    #[error("Message {message_id} not found")]
    NotFound { message_id: MessageId },
    #[error("join identity {claimed} does not match the authenticated identity {authenticated}")]
    IdentityMismatch {
        claimed: UserId,
        authenticated: UserId,
    },
    #[error("{0}")]
    Registry(#[from] RegistryError),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl ApplicationError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest(message.into())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
