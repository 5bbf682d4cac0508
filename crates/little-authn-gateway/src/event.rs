//! HTTP-shaped request and response events.
//!
//! [`crate::AuthRouter`] works on these instead of a framework's types, so
//! the same routing logic can sit behind the axum adapter in
//! [`crate::routes`] or behind an API-gateway style proxy integration. The
//! serde layout follows the proxy integration format (camelCase fields,
//! `multiValueHeaders` for repeated response headers).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use crate::cookies::parse_cookies;

/// An incoming request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    /// Request path, without the query string.
    pub path: String,
    /// Request headers. Lookups through [`RequestEvent::header`] ignore
    /// case.
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,
    /// Decoded query parameters.
    #[serde(default, deserialize_with = "null_as_default")]
    pub query_string_parameters: HashMap<String, String>,
    /// Request method, e.g. `GET`.
    #[serde(default)]
    pub http_method: String,
    /// Raw request body.
    #[serde(default)]
    pub body: Option<String>,
}

impl RequestEvent {
    /// A `GET` request for `path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            http_method: "GET".to_string(),
            ..Self::default()
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_string_parameters.insert(name.into(), value.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Query parameter by name.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_string_parameters.get(name).map(String::as_str)
    }

    /// Cookie value by name, from the `Cookie` header.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.header("cookie")
            .and_then(|header| parse_cookies(header).remove(name))
    }

    /// Whether this is a CORS preflight request.
    #[must_use]
    pub fn is_preflight(&self) -> bool {
        self.http_method.eq_ignore_ascii_case("OPTIONS")
    }
}

/// An outgoing response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEvent {
    /// HTTP status code.
    pub status_code: u16,
    /// Single-valued response headers.
    pub headers: BTreeMap<String, String>,
    /// Repeated response headers, e.g. `Set-Cookie`.
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
    /// Response body.
    pub body: String,
    /// Whether `body` is base64 encoded.
    pub is_base64_encoded: bool,
}

impl ResponseEvent {
    /// An empty response with the default headers.
    #[must_use]
    pub fn new(status_code: u16) -> Self {
        let headers = BTreeMap::from([
            (
                "Content-Type".to_string(),
                "application/json; charset=utf-8".to_string(),
            ),
            ("Cache-Control".to_string(), "no-store".to_string()),
        ]);
        Self {
            status_code,
            headers,
            multi_value_headers: BTreeMap::new(),
            body: String::new(),
            is_base64_encoded: false,
        }
    }

    /// A response carrying `body` serialized as JSON.
    #[must_use]
    pub fn json<T: Serialize>(status_code: u16, body: &T) -> Self {
        let mut response = Self::new(status_code);
        response.body = serde_json::to_string(body).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize response body");
            String::from("{}")
        });
        response
    }

    /// `{"message": message}`.
    #[must_use]
    pub fn message(status_code: u16, message: &str) -> Self {
        Self::json(status_code, &json!({ "message": message }))
    }

    /// `{"status": status}`.
    #[must_use]
    pub fn status(status_code: u16, status: &str) -> Self {
        Self::json(status_code, &json!({ "status": status }))
    }

    /// A `302` to `location`.
    #[must_use]
    pub fn redirect(location: &str) -> Self {
        Self::new(302).with_header("Location", location)
    }

    /// Set a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Append a `Set-Cookie` header.
    #[must_use]
    pub fn with_cookie(mut self, cookie: String) -> Self {
        self.multi_value_headers
            .entry("Set-Cookie".to_string())
            .or_default()
            .push(cookie);
        self
    }

    /// Header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The `Set-Cookie` values, in order.
    #[must_use]
    pub fn cookies(&self) -> &[String] {
        self.multi_value_headers
            .get("Set-Cookie")
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
