//! Gateway application state.
//!
//! Built once at startup and shared by every request handler.

use std::sync::Arc;

use little_authn_core::{HttpNetClient, NetClient};
use little_authn_oidc::{
    ConfigProvider, EnvOverrides, LoadRule, OidcClient, OidcOptions, SourceLoader,
};

use crate::config::GatewayConfig;
use crate::router::AuthRouter;

/// Shared application state for the gateway.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// The auth route dispatcher.
    pub router: AuthRouter,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl AppContext {
    /// Create a context around an existing OIDC client.
    #[must_use]
    pub fn new(oidc: OidcClient, config: GatewayConfig) -> Self {
        Self {
            router: AuthRouter::new(oidc),
            config,
        }
    }

    /// Wire up the production stack: the load rule from the environment, a
    /// `reqwest` client with the configured timeout, and an OIDC client
    /// built once the first config load succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the load rule is invalid or the first config load
    /// fails.
    pub async fn from_env(config: GatewayConfig) -> little_authn_oidc::Result<Self> {
        let rule = LoadRule::from_env()?;
        tracing::info!(
            source = ?rule.source,
            path = %rule.path,
            ttl_secs = rule.ttl_secs,
            "Config load rule"
        );

        let net: Arc<dyn NetClient> = Arc::new(HttpNetClient::new(config.http_timeout()));
        let provider = ConfigProvider::new(
            Arc::new(SourceLoader::default()),
            Arc::clone(&net),
            EnvOverrides::from_env(),
        );
        let oidc = OidcClient::new(
            provider.load_full_config(rule),
            net,
            OidcOptions::default(),
        )
        .await?;

        Ok(Self::new(oidc, config))
    }
}
