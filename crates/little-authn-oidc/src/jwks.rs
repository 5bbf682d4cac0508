//! JWKS (JSON Web Key Set) fetching and key material.
//!
//! The key cache maps `kid` to [`Jwk`]. Every refresh replaces the whole
//! mapping, so keys the IdP has rotated out disappear instead of
//! accumulating.

use std::collections::HashMap;

use jsonwebtoken::{Algorithm, DecodingKey};
use little_authn_core::{FetchOptions, NetClient};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Key cache contents: `kid` to key.
pub type KeyMap = HashMap<String, Jwk>;

/// JWKS response from the IdP.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JwkSet {
    /// The list of keys.
    pub keys: Vec<Jwk>,
}

/// A single JWK (JSON Web Key).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Jwk {
    /// Key ID.
    #[serde(default)]
    pub kid: String,
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,
    /// Key use (e.g., "sig").
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Algorithm (e.g., "RS256").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// RSA modulus (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// Curve for EC and OKP keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC x coordinate or OKP public key (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    /// Build the verification key for a token signed with `alg`.
    ///
    /// The algorithm must belong to this key's family and match the key's
    /// declared `alg`, if any. Symmetric algorithms are never accepted.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SignatureInvalid` on an algorithm mismatch or
    /// unusable key material.
    pub fn decoding_key(&self, alg: Algorithm) -> Result<DecodingKey> {
        if let Some(declared) = &self.alg {
            if declared.parse::<Algorithm>().ok() != Some(alg) {
                return Err(AuthError::SignatureInvalid(format!(
                    "token alg {alg:?} does not match key alg {declared}"
                )));
            }
        }
        if self.key_use.as_deref().is_some_and(|u| u != "sig") {
            return Err(AuthError::SignatureInvalid(format!(
                "key {} is not a signing key",
                self.kid
            )));
        }

        let key = match (self.kty.as_str(), alg) {
            (
                "RSA",
                Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512,
            ) => DecodingKey::from_rsa_components(
                self.param("n", self.n.as_deref())?,
                self.param("e", self.e.as_deref())?,
            ),
            ("EC", Algorithm::ES256 | Algorithm::ES384) => DecodingKey::from_ec_components(
                self.param("x", self.x.as_deref())?,
                self.param("y", self.y.as_deref())?,
            ),
            ("OKP", Algorithm::EdDSA) => {
                DecodingKey::from_ed_components(self.param("x", self.x.as_deref())?)
            }
            (kty, alg) => {
                return Err(AuthError::SignatureInvalid(format!(
                    "{alg:?} is not allowed for {kty} keys"
                )))
            }
        };

        key.map_err(|e| AuthError::SignatureInvalid(format!("unusable key {}: {e}", self.kid)))
    }

    fn param<'a>(&self, name: &str, value: Option<&'a str>) -> Result<&'a str> {
        value.ok_or_else(|| {
            AuthError::SignatureInvalid(format!("key {} is missing {name}", self.kid))
        })
    }
}

/// Fetch the JWKS document at `jwks_uri` and index it by `kid`.
///
/// Keys without a `kid` cannot be selected by a token and are skipped.
///
/// # Errors
///
/// Returns `AuthError::JwksFetchFailed` if the fetch fails or the document
/// is not a key set.
pub async fn fetch_key_map(jwks_uri: &str, net: &dyn NetClient) -> Result<KeyMap> {
    tracing::debug!(url = %jwks_uri, "Fetching JWKS");

    let document = net
        .fetch_json(jwks_uri, FetchOptions::default())
        .await
        .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?;
    let set: JwkSet =
        serde_json::from_value(document).map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?;

    let keys: KeyMap = set
        .keys
        .into_iter()
        .filter(|key| !key.kid.is_empty())
        .map(|key| (key.kid.clone(), key))
        .collect();

    tracing::debug!(count = keys.len(), "Cached JWKS keys");
    Ok(keys)
}
