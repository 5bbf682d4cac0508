//! Router configuration.
//!
//! This module sets up the Axum router: `/health` plus a fallback that
//! converts every other request into a [`RequestEvent`] for the
//! [`AuthRouter`](crate::AuthRouter) and the resulting [`ResponseEvent`]
//! back into an HTTP response.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::prelude::{Engine, BASE64_STANDARD};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::event::{RequestEvent, ResponseEvent};
use crate::state::AppContext;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// - `GET /health` - Health check
/// - everything else - the auth routes, dispatched on the final path
///   segment (`login`, `loginCallback`, `logout`, `logoutCallback`, `user`)
pub fn create_router(context: AppContext) -> Router {
    let max_body_bytes = context.config.max_body_bytes;
    let request_timeout = context.config.request_timeout();
    let state = Arc::new(context);

    Router::new()
        .route("/health", get(health))
        .fallback(dispatch)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(RequestBodyLimitLayer::new(max_body_bytes))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Deployment label from `AUTHN_SUBJECT`.
    pub subject: String,
}

async fn health(State(context): State<Arc<AppContext>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        subject: context.config.subject.clone(),
    };

    (StatusCode::OK, Json(response))
}

async fn dispatch(State(context): State<Arc<AppContext>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, context.config.max_body_bytes).await {
        Ok(body) => body,
        Err(err) => {
            tracing::debug!(error = %err, "Unreadable request body");
            return ApiError::BadRequest("unreadable request body".to_string())
                .into_event()
                .into_response();
        }
    };

    let event = request_event(&parts, &body);
    context.router.handle(&event).await.into_response()
}

/// A handler panic becomes the generic 500 body; the detail is only logged.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::Internal(format!("handler panicked: {detail}"))
        .into_event()
        .into_response()
}

/// Convert request parts into a [`RequestEvent`]. Repeated headers are
/// joined, with `; ` for `Cookie` and `, ` otherwise.
fn request_event(parts: &Parts, body: &Bytes) -> RequestEvent {
    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in &parts.headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        let separator = if name == axum::http::header::COOKIE {
            "; "
        } else {
            ", "
        };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(separator);
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    let query_string_parameters = parts
        .uri
        .query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    RequestEvent {
        path: parts.uri.path().to_string(),
        headers,
        query_string_parameters,
        http_method: parts.method.as_str().to_string(),
        body: (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()),
    }
}

impl IntoResponse for ResponseEvent {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or_else(|_| {
            tracing::error!(status = self.status_code, "Invalid response status");
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let body = if self.is_base64_encoded {
            match BASE64_STANDARD.decode(self.body.as_bytes()) {
                Ok(bytes) => Body::from(bytes),
                Err(err) => {
                    tracing::error!(error = %err, "Invalid base64 response body");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
        } else {
            Body::from(self.body)
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;

        let single = self
            .headers
            .into_iter()
            .map(|(name, value)| (name, vec![value]));
        for (name, values) in single.chain(self.multi_value_headers) {
            let Ok(name) = HeaderName::try_from(name.as_str()) else {
                tracing::warn!(header = %name, "Dropping invalid response header name");
                continue;
            };
            for value in values {
                match HeaderValue::try_from(value.as_str()) {
                    Ok(value) => {
                        response.headers_mut().append(name.clone(), value);
                    }
                    Err(_) => tracing::warn!(header = %name, "Dropping invalid header value"),
                }
            }
        }

        response
    }
}
