//! Auth API contract and its error type
//!
//! The session core talks to the backend only through [`AuthApi`]. The HTTP
//! implementation lives in `client`; tests substitute mocks.

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::auth::CredentialError;
use crate::security::Token;
use crate::session::{Profile, Session};

/// Errors returned by the auth API
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure (connection, TLS, timeout)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend rejected the credential (expired or invalid)
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The response body did not have the expected shape
    #[error("Unexpected payload: {0}")]
    Parse(String),

    /// Any other non-success status
    #[error("HTTP {0}")]
    Http(StatusCode),

    /// The caller cancelled the request before it settled
    #[error("Request cancelled")]
    Cancelled,

    /// The configured base URL or endpoint is not a valid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Persisted credential could not be read or written
    #[error("Credential storage error: {0}")]
    Storage(#[from] CredentialError),
}

impl ApiError {
    /// True when retrying with a fresh access token may help
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::AuthFailed(_))
    }
}

/// Tokens issued by a successful login
#[derive(Debug, Clone, PartialEq)]
pub struct AccessGrant {
    pub access_token: Token,
    pub csrf_token: Option<Token>,
}

/// Backend operations the session lifecycle depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchanges credentials for an access token (and CSRF token)
    async fn login(
        &self,
        email: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<AccessGrant, ApiError>;

    /// Exchanges the persisted credential for a fresh access token
    ///
    /// Returns [`ApiError::Cancelled`] once `cancel` fires; the request is
    /// dropped rather than left running.
    async fn refresh(&self, cancel: &CancellationToken) -> Result<Token, ApiError>;

    /// Fetches the profile of the token's owner
    async fn current_user(
        &self,
        access_token: &Token,
        cancel: &CancellationToken,
    ) -> Result<Profile, ApiError>;

    /// Ends the session on the backend and forgets the persisted credential
    async fn logout(&self, session: &Session) -> Result<(), ApiError>;
}
