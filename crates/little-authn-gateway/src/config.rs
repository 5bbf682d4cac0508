//! Gateway process configuration.
//!
//! The relying-party configuration itself (client ID, callbacks, whitelist)
//! is loaded through a `LoadRule`; this covers only how the process runs.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the gateway service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Timeout for calls to the IdP, in seconds.
    #[serde(default = "GatewayConfig::default_http_timeout")]
    pub http_timeout_seconds: u64,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Label reported by `/health`.
    #[serde(default = "GatewayConfig::default_subject")]
    pub subject: String,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_http_timeout() -> u64 {
        10
    }

    const fn default_max_body() -> usize {
        64 * 1024
    }

    fn default_subject() -> String {
        "world".to_string()
    }

    /// Read `LISTEN_ADDR`, `REQUEST_TIMEOUT_SECS`, `AUTHN_HTTP_TIMEOUT_SECS`
    /// and `AUTHN_SUBJECT`. Unset or unparseable values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |name: &str, default: u64| {
            lookup(name)
                .and_then(|raw| match raw.trim().parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(name, value = %raw, "Ignoring invalid number");
                        None
                    }
                })
                .unwrap_or(default)
        };

        Self {
            listen_addr: lookup("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            request_timeout_seconds: number(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_seconds,
            ),
            http_timeout_seconds: number("AUTHN_HTTP_TIMEOUT_SECS", defaults.http_timeout_seconds),
            max_body_bytes: defaults.max_body_bytes,
            subject: lookup("AUTHN_SUBJECT")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.subject),
        }
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the IdP call timeout as a `Duration`.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            request_timeout_seconds: Self::default_request_timeout(),
            http_timeout_seconds: Self::default_http_timeout(),
            max_body_bytes: Self::default_max_body(),
            subject: Self::default_subject(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.http_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.subject, "world");
    }

    #[test]
    fn reads_overrides() {
        let env = HashMap::from([
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("AUTHN_HTTP_TIMEOUT_SECS", "3"),
            ("REQUEST_TIMEOUT_SECS", "soon"),
            ("AUTHN_SUBJECT", "staging"),
        ]);
        let config = GatewayConfig::from_lookup(|name| env.get(name).map(ToString::to_string));

        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.http_timeout_seconds, 3);
        assert_eq!(config.request_timeout_seconds, 30);
        assert_eq!(config.subject, "staging");
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"listen_addr": "0.0.0.0:3000"}"#).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.http_timeout_seconds, 10);
    }
}
