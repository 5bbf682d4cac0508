//! Configuration loading and periodic reloading.
//!
//! [`ConfigProvider::load_full_config`] returns a [`TtlCache`] whose producer
//! reads the raw client config through a [`ConfigLoader`], applies the
//! environment overrides, then fetches the IdP discovery document. Any step
//! failing fails the whole production, so a partial [`FullConfig`] is never
//! observable. The TTL re-pulls both halves, which picks up secret rotation
//! and IdP endpoint changes without a restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use little_authn_core::{FetchOptions, NetClient, RefreshPolicy, TtlCache};
use serde_json::Value;

use crate::config::{ClientConfig, FullConfig, IdpConfig, LoadRule, SourceKind};
use crate::error::ConfigError;

/// Reads the raw client-config bytes a rule points at.
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// Load the raw JSON bytes for `rule`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::SourceUnreadable` if the source cannot be read.
    async fn load_raw(&self, rule: &LoadRule) -> Result<Vec<u8>, ConfigError>;
}

/// Resolves secret identifiers to their string value.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the secret named `id`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::SourceUnreadable` if the secret does not exist.
    async fn secret_string(&self, id: &str) -> Result<String, ConfigError>;
}

/// Secret store backed by environment variables: the secret identifier is
/// the name of the variable holding the value.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn secret_string(&self, id: &str) -> Result<String, ConfigError> {
        std::env::var(id).map_err(|e| ConfigError::SourceUnreadable {
            location: format!("secret {id}"),
            message: e.to_string(),
        })
    }
}

/// `ConfigLoader` for the `file` and `secret` source kinds.
#[derive(Clone)]
pub struct SourceLoader {
    secrets: Arc<dyn SecretStore>,
}

impl SourceLoader {
    /// Create a loader resolving secrets through `secrets`.
    #[must_use]
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self { secrets }
    }
}

impl Default for SourceLoader {
    fn default() -> Self {
        Self::new(Arc::new(EnvSecretStore))
    }
}

#[async_trait]
impl ConfigLoader for SourceLoader {
    async fn load_raw(&self, rule: &LoadRule) -> Result<Vec<u8>, ConfigError> {
        match rule.source {
            SourceKind::File => {
                tokio::fs::read(&rule.path)
                    .await
                    .map_err(|e| ConfigError::SourceUnreadable {
                        location: rule.path.clone(),
                        message: e.to_string(),
                    })
            }
            SourceKind::Secret => self
                .secrets
                .secret_string(&rule.path)
                .await
                .map(String::into_bytes),
        }
    }
}

/// Operational overrides read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// Replaces `clientId` (`AUTHN_CLIENT_ID`).
    pub client_id: Option<String>,
    /// Replaces `clientSecret` (`AUTHN_CLIENT_SECRET`).
    pub client_secret: Option<String>,
    /// Log the loaded config once (`DEBUG`).
    pub debug: bool,
}

impl EnvOverrides {
    /// Read the overrides from the process environment. Empty values are
    /// ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            client_id: non_empty("AUTHN_CLIENT_ID"),
            client_secret: non_empty("AUTHN_CLIENT_SECRET"),
            debug: non_empty("DEBUG").is_some(),
        }
    }

    fn apply(&self, config: &mut ClientConfig) {
        if let Some(client_id) = &self.client_id {
            config.client_id.clone_from(client_id);
        }
        if let Some(client_secret) = &self.client_secret {
            config.client_secret.clone_from(client_secret);
        }
    }
}

/// Builds the cached [`FullConfig`].
#[derive(Clone)]
pub struct ConfigProvider {
    loader: Arc<dyn ConfigLoader>,
    net: Arc<dyn NetClient>,
    overrides: EnvOverrides,
}

impl ConfigProvider {
    /// Create a provider.
    #[must_use]
    pub fn new(
        loader: Arc<dyn ConfigLoader>,
        net: Arc<dyn NetClient>,
        overrides: EnvOverrides,
    ) -> Self {
        Self {
            loader,
            net,
            overrides,
        }
    }

    /// A cache of the full config for `rule`, refreshed every
    /// `rule.ttl_secs`. Callers crossing the TTL boundary wait for the
    /// refresh.
    #[must_use]
    pub fn load_full_config(&self, rule: LoadRule) -> TtlCache<FullConfig, ConfigError> {
        let provider = self.clone();
        let logged = Arc::new(AtomicBool::new(false));
        TtlCache::new(rule.ttl(), RefreshPolicy::Blocking, move || {
            let provider = provider.clone();
            let rule = rule.clone();
            let logged = Arc::clone(&logged);
            async move {
                let config = provider.load_once(&rule).await?;
                if provider.overrides.debug && !logged.swap(true, Ordering::Relaxed) {
                    tracing::info!(
                        client_id = %config.client_config.client_id,
                        idp_config_url = %config.client_config.idp_config_url,
                        issuer = %config.idp_config.issuer,
                        whitelist = ?config.client_config.client_whitelist,
                        "Config loaded"
                    );
                }
                Ok(config)
            }
        })
    }

    /// Load the client config and IdP metadata once, without caching.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    pub async fn load_once(&self, rule: &LoadRule) -> Result<FullConfig, ConfigError> {
        tracing::debug!(source = ?rule.source, path = %rule.path, "Loading client config");
        let raw = self.loader.load_raw(rule).await?;
        let mut client_config = parse_client_config(&raw)?;
        self.overrides.apply(&mut client_config);

        let idp_config = fetch_idp_config(&client_config.idp_config_url, self.net.as_ref()).await?;

        Ok(FullConfig {
            client_config,
            idp_config,
        })
    }
}

/// Parse and validate raw client-config bytes.
///
/// Accepts the config object itself, or a secret wrapper whose
/// `SecretString` field holds the config as a JSON string.
///
/// # Errors
///
/// Returns `ConfigError::Malformed` for invalid JSON or invalid fields.
pub fn parse_client_config(raw: &[u8]) -> Result<ClientConfig, ConfigError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;
    let config: ClientConfig = match value.get("SecretString") {
        Some(Value::String(inner)) => serde_json::from_str(inner),
        _ => serde_json::from_value(value),
    }
    .map_err(|e| ConfigError::Malformed(e.to_string()))?;

    config.validate()?;
    Ok(config)
}

/// Fetch the IdP discovery document.
///
/// # Errors
///
/// Returns `ConfigError::Discovery` if the fetch fails or the document lacks
/// a required endpoint.
pub async fn fetch_idp_config(url: &str, net: &dyn NetClient) -> Result<IdpConfig, ConfigError> {
    let document = net.fetch_json(url, FetchOptions::default()).await?;
    serde_json::from_value(document)
        .map_err(|e| ConfigError::Discovery(format!("invalid discovery document: {e}")))
}
