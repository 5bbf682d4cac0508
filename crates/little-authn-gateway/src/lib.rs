//! OIDC relying-party gateway for little-authn.
//!
//! This crate provides the public-facing auth endpoints. It handles:
//!
//! - Login: redirect to the IdP, exchange the authorization code, issue the
//!   session cookie
//! - Logout: redirect to the IdP logout endpoint, clear the session
//! - Session checks: verify the session token and report its claims
//! - Redirect-target whitelisting and CORS for trusted origins
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Browsers / apps                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   little-authn-gateway                      │
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────────┐   │
//! │  │ axum        │──▶│ RequestEvent │──▶│   AuthRouter    │   │
//! │  │ adapter     │◀──│ ResponseEvent│◀──│                 │   │
//! │  └─────────────┘   └──────────────┘   └────────┬────────┘   │
//! └────────────────────────────────────────────────┼────────────┘
//!                                                  ▼
//!                                         ┌─────────────────┐
//!                                         │   OidcClient    │──▶ IdP
//!                                         └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use little_authn_gateway::{create_router, AppContext, GatewayConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_env();
//! let listen_addr = config.listen_addr.clone();
//! let context = AppContext::from_env(config).await?;
//!
//! let app = create_router(context);
//!
//! let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod cookies;
pub mod error;
pub mod event;
pub mod redirect;
pub mod router;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use cookies::{build_cookie_string, parse_cookies};
pub use error::ApiError;
pub use event::{RequestEvent, ResponseEvent};
pub use redirect::{build_redirect_url, CallbackState};
pub use router::AuthRouter;
pub use routes::create_router;
pub use state::AppContext;
