//! Configuration data model.
//!
//! [`ClientConfig`] is the relying party's own configuration, loaded from a
//! file or secret selected by a [`LoadRule`]. [`IdpConfig`] is the IdP's
//! discovery document. [`FullConfig`] pairs the two and only exists once
//! both halves have loaded.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// The relying party's client configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// OAuth client ID registered with the IdP.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// URL of the IdP's `.well-known/openid-configuration` document.
    pub idp_config_url: String,
    /// Where the IdP sends the browser after login.
    pub login_callback_uri: String,
    /// Where the IdP sends the browser after logout.
    pub logout_callback_uri: String,
    /// `Domain` attribute for the session cookie.
    #[serde(default)]
    pub cookie_domain: Option<String>,
    /// Maximum session age in minutes, measured from the token's `iat`.
    #[serde(default = "ClientConfig::default_session_ttl_mins")]
    pub session_ttl_mins: u64,
    /// Tokens issued before this instant (epoch seconds) are rejected.
    #[serde(default)]
    pub session_min_iat: i64,
    /// Hostname suffixes trusted as post-login/logout redirect targets.
    #[serde(default)]
    pub client_whitelist: Vec<String>,
}

impl ClientConfig {
    const fn default_session_ttl_mins() -> u64 {
        60
    }

    /// Check the fields that must be absolute URLs.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Malformed` naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("idpConfigUrl", &self.idp_config_url),
            ("loginCallbackUri", &self.login_callback_uri),
            ("logoutCallbackUri", &self.logout_callback_uri),
        ] {
            Url::parse(value).map_err(|e| ConfigError::Malformed(format!("{field}: {e}")))?;
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::Malformed("clientId is empty".to_string()));
        }
        Ok(())
    }

    /// Session TTL in seconds.
    #[must_use]
    pub const fn session_ttl_secs(&self) -> u64 {
        self.session_ttl_mins.saturating_mul(60)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("idp_config_url", &self.idp_config_url)
            .field("login_callback_uri", &self.login_callback_uri)
            .field("logout_callback_uri", &self.logout_callback_uri)
            .field("cookie_domain", &self.cookie_domain)
            .field("session_ttl_mins", &self.session_ttl_mins)
            .field("session_min_iat", &self.session_min_iat)
            .field("client_whitelist", &self.client_whitelist)
            .finish()
    }
}

/// IdP endpoints from the OIDC discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpConfig {
    /// Token issuer.
    pub issuer: String,
    /// Where the browser is sent to log in.
    pub authorization_endpoint: String,
    /// Where authorization codes are exchanged for tokens.
    pub token_endpoint: String,
    /// Published signing keys.
    pub jwks_uri: String,
    /// OIDC userinfo endpoint.
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    /// RP-initiated logout endpoint, when the IdP advertises one.
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

impl IdpConfig {
    /// The endpoint the browser is sent to on logout.
    ///
    /// Falls back to `/logout` on the authorization endpoint's origin when
    /// the IdP does not advertise an `end_session_endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Discovery` if the authorization endpoint is not
    /// a valid URL.
    pub fn logout_endpoint(&self) -> Result<String, ConfigError> {
        if let Some(endpoint) = &self.end_session_endpoint {
            return Ok(endpoint.clone());
        }
        let mut url = Url::parse(&self.authorization_endpoint)
            .map_err(|e| ConfigError::Discovery(format!("authorization_endpoint: {e}")))?;
        url.set_path("/logout");
        url.set_query(None);
        url.set_fragment(None);
        Ok(url.into())
    }
}

/// Client configuration paired with the IdP metadata it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullConfig {
    /// The relying party's configuration.
    pub client_config: ClientConfig,
    /// The IdP discovery document.
    pub idp_config: IdpConfig,
}

/// Kind of source a [`LoadRule`] reads from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A JSON file on local disk.
    #[default]
    File,
    /// A secret resolved through a `SecretStore`.
    Secret,
}

/// Where to load the client configuration from and how long to keep it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadRule {
    /// Source type.
    #[serde(rename = "type")]
    pub source: SourceKind,
    /// File path or secret identifier.
    #[serde(alias = "value")]
    pub path: String,
    /// Reload period in seconds; zero keeps the first load forever.
    pub ttl_secs: u64,
}

impl LoadRule {
    /// Environment variables consulted for the rule, in order.
    pub const ENV_VARS: [&'static str; 2] = ["LITTLE_AUTHN_CONFIG", "LITTLE_CONFIG"];

    /// Parse a rule from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidRule` for malformed JSON or an unknown
    /// source type.
    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        let json = json.trim();
        if json.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidRule(e.to_string()))
    }

    /// Read the rule from `LITTLE_AUTHN_CONFIG`, then `LITTLE_CONFIG`,
    /// falling back to the default rule.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidRule` if the variable holds an invalid rule.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = Self::ENV_VARS
            .iter()
            .find_map(|name| std::env::var(name).ok())
            .unwrap_or_default();
        Self::parse(&raw)
    }

    /// The reload period.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    fn default_path() -> String {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{home}/.local/etc/littleware/authn/config.json")
    }
}

impl Default for LoadRule {
    fn default() -> Self {
        Self {
            source: SourceKind::File,
            path: Self::default_path(),
            ttl_secs: 300,
        }
    }
}
