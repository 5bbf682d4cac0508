//! Common error types for little-authn.
//!
//! Every error in this module is `Clone`: a single-flight refresh hands the
//! same outcome to all of its waiters.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the caching machinery itself.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The task running a cache refresh panicked or was cancelled by
    /// runtime shutdown before producing a value.
    #[error("refresh task aborted: {0}")]
    RefreshAborted(String),
}

/// Errors that can occur during an outbound JSON fetch.
#[derive(Debug, Clone, Error)]
pub enum NetError {
    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {message}")]
    Request {
        /// Target URL.
        url: String,
        /// Transport error detail.
        message: String,
    },

    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out")]
    Timeout {
        /// Target URL.
        url: String,
    },

    /// The server answered with a non-success status.
    #[error("request to {url} returned HTTP {status}")]
    Status {
        /// Target URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, kept for server-side logging only.
        body: String,
    },

    /// The response body was not valid JSON.
    #[error("invalid JSON from {url}: {message}")]
    Decode {
        /// Target URL.
        url: String,
        /// Parser error detail.
        message: String,
    },

    /// A mock client ran out of queued responses.
    #[error("no mock response queued for {url}")]
    NoMockResponse {
        /// Target URL.
        url: String,
    },
}
