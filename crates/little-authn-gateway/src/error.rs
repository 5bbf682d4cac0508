//! API error types and responses.
//!
//! Every error renders as a `{"message": ...}` body. Internal errors keep
//! their detail in the log and send a generic message.

use axum::http::StatusCode;
use thiserror::Error;

use little_authn_oidc::AuthError;

use crate::event::ResponseEvent;

/// A result type using `ApiError`.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors returned by the auth routes.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request parameters.
    #[error("{0}")]
    BadRequest(String),

    /// The requested redirect target is not whitelisted.
    #[error("redirect_uri not in white list")]
    RedirectNotWhitelisted,

    /// Neither the `Authorization` header nor the session cookie is set.
    #[error("auth token not provided")]
    TokenNotProvided,

    /// The presented token was rejected.
    #[error("failed to validate auth token")]
    InvalidToken,

    /// No route matches the path.
    #[error("unknown path {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_)
            | Self::RedirectNotWhitelisted
            | Self::TokenNotProvided
            | Self::InvalidToken => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the error as a response.
    #[must_use]
    pub fn into_event(self) -> ResponseEvent {
        let status = self.status_code().as_u16();
        match self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                ResponseEvent::message(status, "internal error")
            }
            other => ResponseEvent::message(status, &other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_token_rejection() {
            tracing::debug!(error = %err, "Token rejected");
            Self::InvalidToken
        } else {
            Self::Internal(err.to_string())
        }
    }
}
