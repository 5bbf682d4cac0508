//! Fixtures for tests: a fixed RSA signing key, sample configs and a static
//! config loader.
//!
//! Available under `cfg(test)` and the `test-utils` feature.

#![allow(clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use little_authn_core::{RefreshPolicy, TtlCache};
use serde_json::{json, Value};

use crate::config::{ClientConfig, FullConfig, IdpConfig, LoadRule};
use crate::error::ConfigError;
use crate::jwks::Jwk;
use crate::provider::ConfigLoader;

/// Key ID of the test signing key.
pub const TEST_KID: &str = "test-key-1";

/// PKCS#8 PEM of the test RSA private key.
pub const TEST_RSA_PEM: &str = include_str!("testing/test_key.pem");

const TEST_RSA_N: &str = "kMyFY5hsuOcLnq0zKBcLQKy1QKGrYxRawbZXLu0SnDP2lmr6_23GHj39gG-ww1bte9mJ_SPRO9krvOJ3u85PJT-euDscwlMxIQhtdzjEh_qwzhpXzzegECxC6XgHOvajGE4hhqiLYrn928RghvUK_4oQj2fuvN-E4Tx3GggwyXS8f0wE4PW1CeCXKjBvmux5SdhmxHf_r0afodggESdEelXIx_xkw6jV_3GBINkzglM8RjN1G7rKDAtregrAH011giDTXHM16uW6yCxosn9XP6EBSFYD22-8l-A64OJf6LaCt0fMl6eFQ2KcEO-qbvROMMPUc-mQFjFzgHEusvaefQ";
const TEST_RSA_E: &str = "AQAB";

/// The public half of the test key as a JWK.
#[must_use]
pub fn test_jwk() -> Jwk {
    Jwk {
        kid: TEST_KID.to_string(),
        kty: "RSA".to_string(),
        key_use: Some("sig".to_string()),
        alg: Some("RS256".to_string()),
        n: Some(TEST_RSA_N.to_string()),
        e: Some(TEST_RSA_E.to_string()),
        crv: None,
        x: None,
        y: None,
    }
}

/// A JWKS document publishing the test key.
#[must_use]
pub fn jwks_document() -> Value {
    json!({ "keys": [test_jwk()] })
}

/// Sign `claims` with the test key under [`TEST_KID`].
#[must_use]
pub fn sign_token(claims: &Value) -> String {
    sign_token_with_kid(Some(TEST_KID), claims)
}

/// Sign `claims` with the test key, putting `kid` in the header.
#[must_use]
pub fn sign_token_with_kid(kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(TEST_RSA_PEM.as_bytes()).expect("test key parses");
    encode(&header, claims, &key).expect("test token signs")
}

/// Current wall-clock time in epoch seconds.
#[must_use]
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A client config pointing at `https://idp.example.com`, whitelisting
/// `localhost` and `.frickjack.com`.
#[must_use]
pub fn client_config() -> ClientConfig {
    ClientConfig {
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        idp_config_url: "https://idp.example.com/.well-known/openid-configuration".to_string(),
        login_callback_uri: "https://auth.frickjack.com/authn/loginCallback".to_string(),
        logout_callback_uri: "https://auth.frickjack.com/authn/logoutCallback".to_string(),
        cookie_domain: Some(".frickjack.com".to_string()),
        session_ttl_mins: 60,
        session_min_iat: 0,
        client_whitelist: vec!["localhost".to_string(), ".frickjack.com".to_string()],
    }
}

/// A discovery document with every endpoint under `base`.
#[must_use]
pub fn discovery_document(base: &str) -> Value {
    json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/oauth2/authorize"),
        "token_endpoint": format!("{base}/oauth2/token"),
        "jwks_uri": format!("{base}/.well-known/jwks.json"),
        "userinfo_endpoint": format!("{base}/oauth2/userInfo"),
    })
}

/// IdP metadata with every endpoint under `base`.
#[must_use]
pub fn idp_config(base: &str) -> IdpConfig {
    serde_json::from_value(discovery_document(base)).expect("discovery document parses")
}

/// [`client_config`] paired with [`idp_config`] for `base`.
#[must_use]
pub fn full_config(base: &str) -> FullConfig {
    FullConfig {
        client_config: client_config(),
        idp_config: idp_config(base),
    }
}

/// A config cache that always yields `config` and never expires.
#[must_use]
pub fn static_config(config: FullConfig) -> TtlCache<FullConfig, ConfigError> {
    TtlCache::new(Duration::ZERO, RefreshPolicy::Blocking, move || {
        let config = config.clone();
        async move { Ok(config) }
    })
}

/// A `ConfigLoader` returning fixed bytes for every rule.
#[derive(Debug, Clone)]
pub struct StaticLoader {
    raw: Arc<Vec<u8>>,
}

impl StaticLoader {
    /// Create a loader returning `raw`.
    #[must_use]
    pub fn new(raw: Vec<u8>) -> Self {
        Self { raw: Arc::new(raw) }
    }

    /// A loader returning `config` serialized as JSON.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(serde_json::to_vec(config).expect("config serializes"))
    }
}

#[async_trait]
impl ConfigLoader for StaticLoader {
    async fn load_raw(&self, _rule: &LoadRule) -> Result<Vec<u8>, ConfigError> {
        Ok(self.raw.as_ref().clone())
    }
}
