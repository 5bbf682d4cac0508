//! Core building blocks for little-authn.
//!
//! This crate provides the pieces the OIDC client and the gateway share:
//!
//! - **TTL caching**: [`TtlCache`], a lazily-initialised value with
//!   single-flight refresh, used for configuration and for JWKS keys
//! - **Outbound fetches**: the [`NetClient`] seam with a `reqwest`-backed
//!   implementation and a queue-driven mock
//! - **Error types**: [`CoreError`] and [`NetError`]
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use little_authn_core::{CoreError, RefreshPolicy, TtlCache};
//!
//! # async fn example() -> Result<(), CoreError> {
//! let cache: TtlCache<String, CoreError> = TtlCache::new(
//!     Duration::from_secs(300),
//!     RefreshPolicy::Blocking,
//!     || async { Ok("loaded".to_string()) },
//! );
//!
//! assert_eq!(cache.get().await?.as_str(), "loaded");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod net;
pub mod ttl_cache;

pub use error::{CoreError, NetError, Result};
pub use net::{FetchOptions, HttpNetClient, Method, MockNetClient, NetClient, RecordedRequest};
pub use ttl_cache::{RefreshPolicy, TtlCache};
