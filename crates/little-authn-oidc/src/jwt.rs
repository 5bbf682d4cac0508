//! Identity token decoding, signature verification and session policy.
//!
//! Signature verification deliberately ignores `exp`: the session lifetime
//! is policy, enforced by [`check_session`] from the token's `iat`, so that
//! per-request TTL overrides apply. `exp` is never consulted anywhere.

use std::collections::HashSet;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::jwks::Jwk;

/// Verified, policy-checked claims surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    /// The user's email address.
    pub email: String,
    /// Group memberships, in token order.
    pub groups: Vec<String>,
    /// Issued-at, epoch seconds.
    pub iat: i64,
}

/// The identity token claims this gateway reads.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    email: String,
    iat: i64,
    #[serde(rename = "cognito:groups", default)]
    cognito_groups: Option<Vec<String>>,
    #[serde(default)]
    groups: Option<Vec<String>>,
}

impl From<IdTokenClaims> for AuthInfo {
    fn from(claims: IdTokenClaims) -> Self {
        Self {
            email: claims.email,
            groups: claims
                .cognito_groups
                .or(claims.groups)
                .unwrap_or_default(),
            iat: claims.iat,
        }
    }
}

/// Decode the token header without verifying anything.
///
/// # Errors
///
/// Returns `AuthError::MalformedToken` if the header cannot be decoded or
/// carries no `kid`.
pub fn decode_unverified_header(token: &str) -> Result<(Header, String)> {
    let header = decode_header(token).map_err(|e| AuthError::MalformedToken(e.to_string()))?;
    let kid = header
        .kid
        .clone()
        .ok_or_else(|| AuthError::MalformedToken("missing kid".to_string()))?;
    Ok((header, kid))
}

/// Verify the token signature against `jwk` and project the claims.
///
/// # Errors
///
/// Returns `AuthError::SignatureInvalid` if the signature does not verify
/// and `AuthError::MalformedToken` if the payload cannot be decoded.
pub fn verify_token(token: &str, header: &Header, jwk: &Jwk) -> Result<AuthInfo> {
    let key = jwk.decoding_key(header.alg)?;

    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let data = decode::<IdTokenClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::MalformedToken(e.to_string()),
        _ => AuthError::SignatureInvalid(e.to_string()),
    })?;

    Ok(data.claims.into())
}

/// Enforce the revocation floor and the session TTL.
///
/// # Errors
///
/// Returns `AuthError::TokenRevoked` if `iat < min_iat` and
/// `AuthError::SessionExpired` if `iat + ttl_mins * 60 < now`.
pub fn check_session(iat: i64, min_iat: i64, ttl_mins: u64, now: i64) -> Result<()> {
    if iat < min_iat {
        return Err(AuthError::TokenRevoked);
    }
    let ttl_secs = i64::try_from(ttl_mins.saturating_mul(60)).unwrap_or(i64::MAX);
    if iat.saturating_add(ttl_secs) < now {
        return Err(AuthError::SessionExpired);
    }
    Ok(())
}
