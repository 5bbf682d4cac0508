//! OIDC relying-party client for little-authn.
//!
//! This crate provides everything between the gateway's routes and the
//! identity provider:
//!
//! - Client configuration loading from a file or secret, composed with the
//!   IdP discovery document and refreshed on a TTL
//! - JWKS fetching and key caching with a refresh grace window
//! - Identity token verification and session policy (`iat` based; `exp` is
//!   never consulted)
//! - Authorization-code exchange
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│   OidcClient     │
//! │   (AuthRouter)   │     │                  │
//! └──────────────────┘     └───┬──────────┬───┘
//!                              │          │
//!                 ┌────────────▼───┐  ┌───▼────────────┐
//!                 │ config cache   │  │ key cache      │
//!                 │ (Blocking)     │  │ (StaleWhile-   │
//!                 │                │  │  Refresh)      │
//!                 └────────┬───────┘  └───────┬────────┘
//!                          │ file / secret    │ HTTPS
//!                          │ + discovery      │ jwks_uri
//!                 ┌────────▼──────────────────▼────────┐
//!                 │         Identity provider          │
//!                 └────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use little_authn_core::HttpNetClient;
//! use little_authn_oidc::{
//!     ConfigProvider, EnvOverrides, LoadRule, OidcClient, OidcOptions, SourceLoader,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let net = Arc::new(HttpNetClient::default());
//! let provider = ConfigProvider::new(
//!     Arc::new(SourceLoader::default()),
//!     net.clone(),
//!     EnvOverrides::from_env(),
//! );
//! let config = provider.load_full_config(LoadRule::from_env()?);
//! let client = OidcClient::new(config, net, OidcOptions::default()).await?;
//!
//! let token = "eyJhbGciOiJSUzI1NiIsImtpZCI6Ii4uLiJ9...";
//! let info = client.get_auth_info(token, None).await?;
//! println!("{} in {:?}", info.email, info.groups);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::time::Duration;

pub mod client;
pub mod config;
pub mod error;
pub mod jwks;
pub mod jwt;
pub mod provider;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{LoginResult, OidcClient};
pub use config::{ClientConfig, FullConfig, IdpConfig, LoadRule, SourceKind};
pub use error::{AuthError, ConfigError, Result};
pub use jwks::{Jwk, KeyMap};
pub use jwt::AuthInfo;
pub use provider::{
    ConfigLoader, ConfigProvider, EnvOverrides, EnvSecretStore, SecretStore, SourceLoader,
};

/// Tuning for the [`OidcClient`] key cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OidcOptions {
    /// How long a fetched key set is served before a background refresh.
    pub key_cache_ttl: Duration,
    /// After a refresh, unknown key IDs are rejected without re-fetching
    /// for this long.
    pub key_refresh_grace: Duration,
}

impl Default for OidcOptions {
    fn default() -> Self {
        Self {
            key_cache_ttl: Duration::from_secs(3600),
            key_refresh_grace: Duration::from_secs(300),
        }
    }
}
