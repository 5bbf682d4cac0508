//! OIDC relying-party client: key cache, token verification and code
//! exchange.

use std::sync::Arc;

use base64::prelude::{Engine, BASE64_STANDARD};
use little_authn_core::{FetchOptions, NetClient, RefreshPolicy, TtlCache};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::FullConfig;
use crate::error::{AuthError, ConfigError, Result};
use crate::jwks::{fetch_key_map, Jwk, KeyMap};
use crate::jwt::{check_session, decode_unverified_header, verify_token, AuthInfo};
use crate::OidcOptions;

/// Outcome of a completed authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    /// The raw identity token, used as the session cookie value.
    pub token_str: String,
    /// Claims of the verified token.
    pub auth_info: AuthInfo,
}

/// Client for one OIDC identity provider.
///
/// Cloning is cheap: clones share the config and key caches.
#[derive(Clone)]
pub struct OidcClient {
    config: TtlCache<FullConfig, ConfigError>,
    keys: TtlCache<KeyMap, AuthError>,
    net: Arc<dyn NetClient>,
    options: OidcOptions,
}

impl std::fmt::Debug for OidcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcClient")
            .field("config", &self.config)
            .field("keys", &self.keys)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl OidcClient {
    /// Create a client once the config cache has produced its first value.
    ///
    /// The key cache is lazy: the JWKS document is fetched on the first
    /// verification, from whatever `jwks_uri` the config holds at that time.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the initial config load fails.
    pub async fn new(
        config: TtlCache<FullConfig, ConfigError>,
        net: Arc<dyn NetClient>,
        options: OidcOptions,
    ) -> Result<Self> {
        config.get().await?;

        let keys: TtlCache<KeyMap, AuthError> = {
            let config = config.clone();
            let net = Arc::clone(&net);
            TtlCache::new(
                options.key_cache_ttl,
                RefreshPolicy::StaleWhileRefresh,
                move || {
                    let config = config.clone();
                    let net = Arc::clone(&net);
                    async move {
                        let current = config.get().await?;
                        fetch_key_map(&current.idp_config.jwks_uri, net.as_ref()).await
                    }
                },
            )
        };

        Ok(Self {
            config,
            keys,
            net,
            options,
        })
    }

    /// The current configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if a reload is due and fails with no
    /// previous value to fall back on.
    pub async fn config(&self) -> Result<Arc<FullConfig>> {
        Ok(self.config.get().await?)
    }

    /// Look up the signing key `kid`.
    ///
    /// An unknown `kid` forces one key-cache refresh, unless the cache was
    /// refreshed within the grace window. Concurrent misses share that
    /// refresh.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidKid` if the IdP does not publish `kid`, or
    /// `AuthError::JwksFetchFailed` if the key set cannot be fetched.
    pub async fn get_key(&self, kid: &str) -> Result<Jwk> {
        let keys = self.keys.get().await?;
        if let Some(key) = keys.get(kid) {
            return Ok(key.clone());
        }

        tracing::info!(kid, "Unknown kid, checking for a newer key set");
        let keys = self
            .keys
            .refresh_if_older_than(self.options.key_refresh_grace)
            .await?;
        keys.get(kid)
            .cloned()
            .ok_or_else(|| AuthError::InvalidKid(kid.to_string()))
    }

    /// Re-fetch the key set now, joining any refresh already running.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::JwksFetchFailed` if the key set cannot be fetched.
    pub async fn refresh_key_cache(&self) -> Result<Arc<KeyMap>> {
        self.keys.force_refresh().await
    }

    /// Verify `token` and apply the session policy.
    ///
    /// `session_ttl_mins` overrides the configured session TTL for this
    /// check only.
    ///
    /// # Errors
    ///
    /// Returns `MalformedToken`, `InvalidKid` or `SignatureInvalid` if the
    /// token does not verify, and `TokenRevoked` or `SessionExpired` if the
    /// session policy rejects it.
    pub async fn get_auth_info(
        &self,
        token: &str,
        session_ttl_mins: Option<u64>,
    ) -> Result<AuthInfo> {
        let (header, kid) = decode_unverified_header(token)?;
        let key = self.get_key(&kid).await?;
        let info = verify_token(token, &header, &key)?;

        let config = self.config().await?;
        let client = &config.client_config;
        check_session(
            info.iat,
            client.session_min_iat,
            session_ttl_mins.unwrap_or(client.session_ttl_mins),
            chrono::Utc::now().timestamp(),
        )?;

        Ok(info)
    }

    /// Exchange an authorization code for an identity token and verify it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenExchangeFailed` if the token endpoint fails
    /// or returns no `id_token`, then any error of [`Self::get_auth_info`].
    pub async fn complete_login(&self, code: &str) -> Result<LoginResult> {
        let config = self.config().await?;
        let client = &config.client_config;

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "authorization_code")
            .append_pair("client_id", &client.client_id)
            .append_pair("code", code)
            .append_pair("redirect_uri", &client.login_callback_uri)
            .finish();
        let credentials =
            BASE64_STANDARD.encode(format!("{}:{}", client.client_id, client.client_secret));
        let options =
            FetchOptions::form_post(body).header("authorization", format!("Basic {credentials}"));

        let response = self
            .net
            .fetch_json(&config.idp_config.token_endpoint, options)
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;
        let token_str = response
            .get("id_token")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::TokenExchangeFailed("response has no id_token".to_string()))?
            .to_string();

        let auth_info = self.get_auth_info(&token_str, None).await?;
        tracing::info!(email = %auth_info.email, "Login completed");

        Ok(LoginResult {
            token_str,
            auth_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use little_authn_core::{Method, MockNetClient, NetError};
    use serde_json::json;
    use std::time::Duration;

    const BASE: &str = "https://idp.example.com";
    const JWKS_URL: &str = "https://idp.example.com/.well-known/jwks.json";
    const TOKEN_URL: &str = "https://idp.example.com/oauth2/token";

    async fn client_with(net: &Arc<MockNetClient>, config: FullConfig) -> OidcClient {
        let net: Arc<dyn NetClient> = Arc::clone(net) as Arc<dyn NetClient>;
        OidcClient::new(testing::static_config(config), net, OidcOptions::default())
            .await
            .unwrap()
    }

    fn fresh_claims() -> Value {
        json!({
            "email": "frickjack@example.com",
            "iat": testing::now_secs() - 60,
            "cognito:groups": ["admin"],
        })
    }

    #[tokio::test]
    async fn verifies_signed_token() {
        let net = Arc::new(MockNetClient::new());
        net.push_json(testing::jwks_document());
        let client = client_with(&net, testing::full_config(BASE)).await;

        let info = client
            .get_auth_info(&testing::sign_token(&fresh_claims()), None)
            .await
            .unwrap();

        assert_eq!(info.email, "frickjack@example.com");
        assert_eq!(info.groups, vec!["admin".to_string()]);
        assert_eq!(net.request_count(JWKS_URL), 1);
    }

    #[tokio::test]
    async fn key_cache_is_reused_across_tokens() {
        let net = Arc::new(MockNetClient::new());
        net.push_json(testing::jwks_document());
        let client = client_with(&net, testing::full_config(BASE)).await;

        for _ in 0..3 {
            let token = testing::sign_token(&fresh_claims());
            client.get_auth_info(&token, None).await.unwrap();
        }
        assert_eq!(net.request_count(JWKS_URL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_kid_refreshes_only_after_grace_window() {
        let net = Arc::new(MockNetClient::new());
        net.push_json(testing::jwks_document());
        net.push_json(testing::jwks_document());
        let client = client_with(&net, testing::full_config(BASE)).await;

        assert!(matches!(
            client.get_key("unknown").await,
            Err(AuthError::InvalidKid(_))
        ));
        assert_eq!(net.request_count(JWKS_URL), 1);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(matches!(
            client.get_key("unknown").await,
            Err(AuthError::InvalidKid(_))
        ));
        assert_eq!(net.request_count(JWKS_URL), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(
            client.get_key("unknown").await,
            Err(AuthError::InvalidKid(_))
        ));
        assert_eq!(net.request_count(JWKS_URL), 2);
    }

    /// Delays every fetch so concurrent callers overlap the refresh.
    struct SlowNet {
        inner: Arc<MockNetClient>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl NetClient for SlowNet {
        async fn fetch_json(
            &self,
            url: &str,
            options: FetchOptions,
        ) -> std::result::Result<Value, NetError> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch_json(url, options).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_unknown_kid_misses_share_one_refresh() {
        let mock = Arc::new(MockNetClient::new());
        for _ in 0..4 {
            mock.push_json(testing::jwks_document());
        }
        let net: Arc<dyn NetClient> = Arc::new(SlowNet {
            inner: Arc::clone(&mock),
            delay: Duration::from_millis(50),
        });
        let options = OidcOptions {
            key_refresh_grace: Duration::from_millis(500),
            ..OidcOptions::default()
        };
        let config = testing::static_config(testing::full_config(BASE));
        let client = OidcClient::new(config, net, options).await.unwrap();

        client.get_key(testing::TEST_KID).await.unwrap();
        assert_eq!(mock.request_count(JWKS_URL), 1);
        tokio::time::sleep(Duration::from_millis(600)).await;

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.get_key("never-seen").await })
            })
            .collect();
        for task in tasks {
            assert!(matches!(
                task.await.unwrap(),
                Err(AuthError::InvalidKid(_))
            ));
        }
        assert_eq!(mock.request_count(JWKS_URL), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rotated_key_found_after_refresh() {
        let net = Arc::new(MockNetClient::new());
        net.push_json(json!({ "keys": [] }));
        net.push_json(testing::jwks_document());
        let client = client_with(&net, testing::full_config(BASE)).await;

        assert!(client.get_key(testing::TEST_KID).await.is_err());
        tokio::time::advance(Duration::from_secs(301)).await;

        let key = client.get_key(testing::TEST_KID).await.unwrap();
        assert_eq!(key, testing::test_jwk());
    }

    #[tokio::test]
    async fn session_policy_rejects_old_and_revoked_tokens() {
        let net = Arc::new(MockNetClient::new());
        net.push_json(testing::jwks_document());
        let mut config = testing::full_config(BASE);
        config.client_config.session_min_iat = testing::now_secs() - 3600;
        let client = client_with(&net, config).await;

        let revoked = testing::sign_token(&json!({
            "email": "a@b.c",
            "iat": testing::now_secs() - 7200,
        }));
        assert!(matches!(
            client.get_auth_info(&revoked, None).await,
            Err(AuthError::TokenRevoked)
        ));

        let aging = testing::sign_token(&json!({
            "email": "a@b.c",
            "iat": testing::now_secs() - 1800,
        }));
        assert!(client.get_auth_info(&aging, None).await.is_ok());
        assert!(matches!(
            client.get_auth_info(&aging, Some(10)).await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn token_exp_is_ignored() {
        let net = Arc::new(MockNetClient::new());
        net.push_json(testing::jwks_document());
        let client = client_with(&net, testing::full_config(BASE)).await;

        let token = testing::sign_token(&json!({
            "email": "a@b.c",
            "iat": testing::now_secs() - 60,
            "exp": 1,
        }));
        assert!(client.get_auth_info(&token, None).await.is_ok());
    }

    #[tokio::test]
    async fn complete_login_exchanges_code() {
        let net = Arc::new(MockNetClient::new());
        let id_token = testing::sign_token(&fresh_claims());
        net.push_json(json!({ "id_token": id_token, "access_token": "ignored" }));
        net.push_json(testing::jwks_document());
        let client = client_with(&net, testing::full_config(BASE)).await;

        let result = client.complete_login("the-code").await.unwrap();
        assert_eq!(result.token_str, id_token);
        assert_eq!(result.auth_info.email, "frickjack@example.com");

        let exchange = &net.requests()[0];
        assert_eq!(exchange.url, TOKEN_URL);
        assert_eq!(exchange.options.method, Method::Post);
        let body = exchange.options.body.as_deref().unwrap();
        assert!(body.contains("grant_type=authorization_code"));
        assert!(body.contains("code=the-code"));
        assert!(body.contains("client_id=test-client"));
        assert!(body.contains(
            "redirect_uri=https%3A%2F%2Fauth.frickjack.com%2Fauthn%2FloginCallback"
        ));
        let expected = format!("Basic {}", BASE64_STANDARD.encode("test-client:test-secret"));
        assert!(exchange
            .options
            .headers
            .contains(&("authorization".to_string(), expected)));
    }

    #[tokio::test]
    async fn complete_login_requires_id_token() {
        let net = Arc::new(MockNetClient::new());
        net.push_json(json!({ "access_token": "only" }));
        let client = client_with(&net, testing::full_config(BASE)).await;

        assert!(matches!(
            client.complete_login("code").await,
            Err(AuthError::TokenExchangeFailed(_))
        ));
    }

    #[tokio::test]
    async fn complete_login_maps_transport_errors() {
        let net = Arc::new(MockNetClient::new());
        net.push_error(NetError::Status {
            url: TOKEN_URL.into(),
            status: 400,
            body: "invalid_grant".into(),
        });
        let client = client_with(&net, testing::full_config(BASE)).await;

        let err = client.complete_login("stale-code").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExchangeFailed(_)));
        assert!(err.is_token_rejection());
    }
}
