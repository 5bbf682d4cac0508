//! Cookie rendering and parsing.
//!
//! Values are percent-encoded through [`Cookie::encoded`] and decoded by
//! [`Cookie::split_parse_encoded`], so JSON state survives the `Cookie`
//! header unchanged. Attributes are rendered in a fixed order.

use std::collections::HashMap;

use axum_extra::extract::cookie::Cookie;

/// Session cookie holding the identity token.
pub const SESSION_COOKIE: &str = "Authorization";

/// Short-lived cookie stashing the post-logout redirect target.
pub const LOGOUT_STATE_COOKIE: &str = "LogoutState";

/// Lifetime of [`LOGOUT_STATE_COOKIE`], in seconds.
pub const LOGOUT_STATE_TTL_SECS: i64 = 180;

const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Render a `Set-Cookie` value.
///
/// Every cookie is `Secure; HttpOnly; SameSite=None` on `Path=/`. A
/// non-negative `ttl_secs` becomes `Max-Age`; a negative one expires the
/// cookie immediately.
#[must_use]
pub fn build_cookie_string(
    name: &str,
    value: &str,
    ttl_secs: Option<i64>,
    domain: Option<&str>,
) -> String {
    let pair = Cookie::new(name, value).encoded().to_string();
    let mut cookie = format!("{pair}; Path=/; Secure; HttpOnly; SameSite=None");
    match ttl_secs {
        Some(ttl) if ttl >= 0 => cookie.push_str(&format!("; Max-Age={ttl}")),
        Some(_) => cookie.push_str(&format!("; Expires={EXPIRED}")),
        None => {}
    }
    if let Some(domain) = domain.filter(|d| !d.is_empty()) {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    cookie
}

/// A `Set-Cookie` value deleting `name`.
#[must_use]
pub fn expired_cookie(name: &str, domain: Option<&str>) -> String {
    build_cookie_string(name, "", Some(-1), domain)
}

/// Split a `Cookie` request header into decoded name/value pairs.
///
/// The first occurrence of a name wins. Malformed entries are skipped.
#[must_use]
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for cookie in Cookie::split_parse_encoded(header).filter_map(Result::ok) {
        cookies
            .entry(cookie.name().to_string())
            .or_insert_with(|| cookie.value_trimmed().to_string());
    }
    cookies
}
