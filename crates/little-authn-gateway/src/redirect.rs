//! Redirect-target whitelisting and the OAuth `state` round trip.

use serde::{Deserialize, Serialize};
use url::Url;

/// State carried through the IdP redirect (login) or the logout-state
/// cookie (logout).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackState {
    /// Where to send the browser once the flow completes.
    pub client_redirect_uri: String,
}

impl CallbackState {
    /// Encode as the JSON carried in `state`.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::json!({ "clientRedirectUri": self.client_redirect_uri }).to_string()
    }

    /// Decode from `state`; anything unparseable is ignored.
    #[must_use]
    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Whether `host` matches a whitelist entry exactly or as a dot-bounded
/// suffix. A leading dot on the entry is optional.
#[must_use]
pub fn host_is_whitelisted(host: &str, whitelist: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    whitelist.iter().any(|entry| {
        let entry = entry.trim_start_matches('.').to_ascii_lowercase();
        !entry.is_empty()
            && (host == entry
                || host
                    .strip_suffix(entry.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')))
    })
}

/// Parse `uri` and check that it is an http(s) URL on a whitelisted host.
#[must_use]
pub fn whitelisted_url(uri: &str, whitelist: &[String]) -> Option<Url> {
    let url = Url::parse(uri).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    host_is_whitelisted(host, whitelist).then_some(url)
}

/// `uri` with its `state` query parameter set to `state`, keeping the path,
/// the other query parameters and the fragment. `None` if the target is not
/// whitelisted.
#[must_use]
pub fn build_redirect_url(uri: &str, whitelist: &[String], state: &str) -> Option<String> {
    let mut url = whitelisted_url(uri, whitelist)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != "state")
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("state", state);
    Some(url.into())
}
