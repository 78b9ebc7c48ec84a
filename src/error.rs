//! Error types for the RBAC client

use std::time::Duration;
use thiserror::Error;

/// Client error types
///
/// "Not logged in" and "wrong role" are not errors here: the role gate reports
/// them as [`AccessDecision`](crate::role_gate::AccessDecision) redirects.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Token refresh timed out after {0:?}")]
    RefreshTimeout(Duration),

    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Request to {path} was rejected again after a token refresh")]
    RetryExhausted { path: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// True for the terminal failures that end the session.
    pub fn is_session_terminated(&self) -> bool {
        matches!(
            self,
            ClientError::RefreshFailed(_)
                | ClientError::RefreshTimeout(_)
                | ClientError::MissingRefreshToken
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
