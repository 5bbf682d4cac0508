//! Outbound JSON fetches.
//!
//! [`NetClient`] is the seam through which every IdP call (discovery, JWKS,
//! token exchange) goes. [`HttpNetClient`] is the production client;
//! [`MockNetClient`] replays a queue of canned responses for tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::NetError;

/// HTTP method of an outbound fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
}

/// Options for a single fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Request method.
    pub method: Method,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Raw request body.
    pub body: Option<String>,
}

impl FetchOptions {
    /// A form-encoded `POST` with the given body.
    #[must_use]
    pub fn form_post(body: String) -> Self {
        Self {
            method: Method::Post,
            headers: vec![(
                "content-type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )],
            body: Some(body),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Performs outbound HTTP requests that return JSON.
#[async_trait]
pub trait NetClient: Send + Sync {
    /// Fetch `url` and decode the response body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, timeout, a non-success status,
    /// or a body that is not JSON.
    async fn fetch_json(&self, url: &str, options: FetchOptions) -> Result<Value, NetError>;
}

/// `NetClient` backed by a pooled, keep-alive `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpNetClient {
    client: reqwest::Client,
}

impl HttpNetClient {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a client with the given per-request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should never happen with default TLS).
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(15))
            .pool_max_idle_per_host(30)
            .build()
            .expect("failed to create HTTP client");

        Self { client }
    }
}

impl Default for HttpNetClient {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl NetClient for HttpNetClient {
    async fn fetch_json(&self, url: &str, options: FetchOptions) -> Result<Value, NetError> {
        let mut request = match options.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = options.body {
            request = request.body(body);
        }

        tracing::debug!(url = %url, method = ?options.method, "Fetching JSON");

        let response = request.send().await.map_err(|e| transport_error(url, &e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| transport_error(url, &e))?;

        if !status.is_success() {
            return Err(NetError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| NetError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

fn transport_error(url: &str, err: &reqwest::Error) -> NetError {
    if err.is_timeout() {
        NetError::Timeout {
            url: url.to_string(),
        }
    } else {
        NetError::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// A request observed by [`MockNetClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Requested URL.
    pub url: String,
    /// Options passed with the request.
    pub options: FetchOptions,
}

/// A `NetClient` that answers with queued responses, in order.
///
/// Every request is recorded so tests can assert on what was sent and how
/// many upstream calls were made.
#[derive(Debug, Default)]
pub struct MockNetClient {
    responses: Mutex<VecDeque<Result<Value, NetError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockNetClient {
    /// Create a mock with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful JSON response.
    pub fn push_json(&self, value: Value) {
        self.responses.lock().push_back(Ok(value));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: NetError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received for `url`.
    #[must_use]
    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.url == url).count()
    }
}

#[async_trait]
impl NetClient for MockNetClient {
    async fn fetch_json(&self, url: &str, options: FetchOptions) -> Result<Value, NetError> {
        self.requests.lock().push(RecordedRequest {
            url: url.to_string(),
            options,
        });
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                Err(NetError::NoMockResponse {
                    url: url.to_string(),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn http_client_fetches_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"issuer": "x"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpNetClient::default();
        let url = format!("{}/.well-known/openid-configuration", server.uri());
        let value = client.fetch_json(&url, FetchOptions::default()).await.unwrap();

        assert_eq!(value["issuer"], "x");
    }

    #[tokio::test]
    async fn http_client_posts_form_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header("authorization", "Basic abc"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("grant_type=authorization_code&code=42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id_token": "t"})))
            .mount(&server)
            .await;

        let client = HttpNetClient::default();
        let options = FetchOptions::form_post("grant_type=authorization_code&code=42".into())
            .header("authorization", "Basic abc");
        let value = client
            .fetch_json(&format!("{}/oauth2/token", server.uri()), options)
            .await
            .unwrap();

        assert_eq!(value["id_token"], "t");
    }

    #[tokio::test]
    async fn http_client_maps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let client = HttpNetClient::default();
        let err = client
            .fetch_json(&server.uri(), FetchOptions::form_post(String::new()))
            .await
            .unwrap_err();

        assert!(
            matches!(err, NetError::Status { status: 400, ref body, .. } if body == "invalid_grant")
        );
    }

    #[tokio::test]
    async fn http_client_rejects_non_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = HttpNetClient::default();
        let err = client
            .fetch_json(&server.uri(), FetchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, NetError::Decode { .. }));
    }

    #[tokio::test]
    async fn http_client_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = HttpNetClient::new(Duration::from_millis(50));
        let err = client
            .fetch_json(&server.uri(), FetchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, NetError::Timeout { .. }));
    }

    #[tokio::test]
    async fn mock_client_replays_queue_and_records() {
        let mock = MockNetClient::new();
        mock.push_json(json!({"n": 1}));
        mock.push_error(NetError::Timeout {
            url: "https://a".into(),
        });

        assert_eq!(
            mock.fetch_json("https://a", FetchOptions::default())
                .await
                .unwrap()["n"],
            1
        );
        assert!(mock
            .fetch_json("https://a", FetchOptions::default())
            .await
            .is_err());
        assert!(matches!(
            mock.fetch_json("https://b", FetchOptions::default()).await,
            Err(NetError::NoMockResponse { .. })
        ));

        assert_eq!(mock.request_count("https://a"), 2);
        assert_eq!(mock.requests().len(), 3);
    }
}
