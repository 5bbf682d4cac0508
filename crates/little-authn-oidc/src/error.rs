//! Configuration and authentication error types.

use little_authn_core::{CoreError, NetError};
use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors raised while loading the client configuration or IdP metadata.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The load rule could not be parsed or names an unknown source type.
    #[error("invalid load rule: {0}")]
    InvalidRule(String),

    /// The configuration source could not be read.
    #[error("failed to read config from {location}: {message}")]
    SourceUnreadable {
        /// File path or secret identifier.
        location: String,
        /// Underlying error detail.
        message: String,
    },

    /// The client configuration is not valid JSON or fails validation.
    #[error("malformed client config: {0}")]
    Malformed(String),

    /// The IdP discovery document could not be fetched or parsed.
    #[error("IdP discovery failed: {0}")]
    Discovery(String),

    /// The cache refresh machinery failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Errors that can occur while verifying tokens or completing a login.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The token names a key ID that the IdP does not publish.
    #[error("invalid kid: {0}")]
    InvalidKid(String),

    /// The token cannot be decoded.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The token signature does not verify against the published key.
    #[error("invalid signature: {0}")]
    SignatureInvalid(String),

    /// The session is older than the configured session TTL.
    #[error("session expired")]
    SessionExpired,

    /// The token was issued before the configured revocation floor.
    #[error("token revoked")]
    TokenRevoked,

    /// The IdP token endpoint failed or returned no `id_token`.
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The JWKS document could not be fetched or parsed.
    #[error("JWKS fetch failed: {0}")]
    JwksFetchFailed(String),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The cache refresh machinery failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AuthError {
    /// Returns `true` if the token presented by the client was rejected, as
    /// opposed to the gateway failing to do its own work.
    #[must_use]
    pub const fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidKid(_)
                | Self::MalformedToken(_)
                | Self::SignatureInvalid(_)
                | Self::SessionExpired
                | Self::TokenRevoked
                | Self::TokenExchangeFailed(_)
        )
    }
}

impl From<NetError> for ConfigError {
    fn from(err: NetError) -> Self {
        Self::Discovery(err.to_string())
    }
}
