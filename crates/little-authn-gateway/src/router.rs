//! The auth request dispatcher.
//!
//! # Routes
//!
//! Matched on the final path segment, so the router works unchanged when
//! mounted under a prefix such as `/authn`:
//!
//! - `login` - Redirect to the IdP with the caller's target in `state`
//! - `loginCallback` - Exchange the code, set the session cookie
//! - `logout` - Stash the caller's target, redirect to the IdP logout
//! - `logoutCallback` - Clear the session, redirect to the stashed target
//! - `user` - Verify the session token and return its claims

use std::sync::Arc;

use little_authn_oidc::{AuthError, FullConfig, LoginResult, OidcClient};
use url::Url;

use crate::cookies::{
    build_cookie_string, expired_cookie, LOGOUT_STATE_COOKIE, LOGOUT_STATE_TTL_SECS,
    SESSION_COOKIE,
};
use crate::error::{ApiError, Result};
use crate::event::{RequestEvent, ResponseEvent};
use crate::redirect::{build_redirect_url, host_is_whitelisted, whitelisted_url, CallbackState};

const STATUS_OK: &str = r#"{"status":"ok"}"#;
const STATUS_ERROR: &str = r#"{"status":"error"}"#;

/// Stateless dispatcher for the auth routes.
#[derive(Debug, Clone)]
pub struct AuthRouter {
    oidc: OidcClient,
}

impl AuthRouter {
    /// Create a router backed by `oidc`.
    #[must_use]
    pub fn new(oidc: OidcClient) -> Self {
        Self { oidc }
    }

    /// Handle one request. Never fails: errors become error responses.
    pub async fn handle(&self, event: &RequestEvent) -> ResponseEvent {
        let route = route_name(&event.path);
        tracing::debug!(method = %event.http_method, path = %event.path, route, "Dispatching");

        let outcome = match self.oidc.config().await {
            Ok(config) => self.dispatch(route, event, &config).await,
            Err(err) => Err(ApiError::from(err)),
        };
        outcome.unwrap_or_else(ApiError::into_event)
    }

    async fn dispatch(
        &self,
        route: &str,
        event: &RequestEvent,
        config: &Arc<FullConfig>,
    ) -> Result<ResponseEvent> {
        match route {
            "login" => login(event, config),
            "loginCallback" => Ok(self.login_callback(event, config).await),
            "logout" => logout(event, config),
            "logoutCallback" => Ok(logout_callback(event, config)),
            "user" => {
                let response = if event.is_preflight() {
                    Ok(preflight())
                } else {
                    self.user(event).await
                };
                let response = response.unwrap_or_else(ApiError::into_event);
                Ok(with_cors(response, event, config))
            }
            _ => Err(ApiError::NotFound(event.path.clone())),
        }
    }

    async fn login_callback(&self, event: &RequestEvent, config: &FullConfig) -> ResponseEvent {
        let client = &config.client_config;
        let domain = client.cookie_domain.as_deref();
        let state = event.query("state").and_then(CallbackState::from_json);
        let back_to = |status: &str| {
            state.as_ref().and_then(|s| {
                build_redirect_url(&s.client_redirect_uri, &client.client_whitelist, status)
            })
        };

        match self.complete_login(event).await {
            Ok(LoginResult {
                token_str,
                auth_info,
            }) => {
                let ttl = i64::try_from(client.session_ttl_secs()).unwrap_or(i64::MAX);
                let cookie = build_cookie_string(SESSION_COOKIE, &token_str, Some(ttl), domain);
                back_to(STATUS_OK)
                    .map_or_else(
                        || ResponseEvent::json(200, &auth_info),
                        |target| ResponseEvent::redirect(&target),
                    )
                    .with_cookie(cookie)
            }
            Err(err) => {
                if err.is_token_rejection() {
                    tracing::warn!(error = %err, "Login callback rejected");
                } else {
                    tracing::error!(error = %err, "Login callback failed");
                }
                back_to(STATUS_ERROR)
                    .map_or_else(
                        || ResponseEvent::status(400, "error"),
                        |target| ResponseEvent::redirect(&target),
                    )
                    .with_cookie(expired_cookie(SESSION_COOKIE, domain))
            }
        }
    }

    async fn complete_login(&self, event: &RequestEvent) -> little_authn_oidc::Result<LoginResult> {
        let code = event
            .query("code")
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::TokenExchangeFailed("no code in callback".to_string()))?;
        self.oidc.complete_login(code).await
    }

    async fn user(&self, event: &RequestEvent) -> Result<ResponseEvent> {
        let ttl_override = event
            .query("sessionTtlMins")
            .map(|raw| {
                raw.parse::<u64>()
                    .map_err(|_| ApiError::BadRequest(format!("invalid sessionTtlMins: {raw}")))
            })
            .transpose()?;

        let token = session_token(event).ok_or(ApiError::TokenNotProvided)?;
        let info = self.oidc.get_auth_info(&token, ttl_override).await?;
        Ok(ResponseEvent::json(200, &info))
    }
}

/// Final path segment, ignoring a trailing slash.
fn route_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

/// Redirect target from `redirect_uri`, else the `Referer` header.
fn requested_target(event: &RequestEvent) -> Option<&str> {
    event
        .query("redirect_uri")
        .or_else(|| event.header("referer"))
        .filter(|target| !target.is_empty())
}

/// The session token from the `Authorization` header, else the session
/// cookie.
fn session_token(event: &RequestEvent) -> Option<String> {
    let from_header = event.header("authorization").map(|value| {
        let value = value.trim();
        value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .unwrap_or(value)
            .trim()
            .to_string()
    });
    from_header
        .filter(|token| !token.is_empty())
        .or_else(|| event.cookie(SESSION_COOKIE).filter(|token| !token.is_empty()))
}

fn login(event: &RequestEvent, config: &FullConfig) -> Result<ResponseEvent> {
    let client = &config.client_config;
    let target = requested_target(event)
        .filter(|target| whitelisted_url(target, &client.client_whitelist).is_some())
        .ok_or(ApiError::RedirectNotWhitelisted)?;

    let state = CallbackState {
        client_redirect_uri: target.to_string(),
    };
    let mut url = Url::parse(&config.idp_config.authorization_endpoint)
        .map_err(|e| ApiError::Internal(format!("authorization_endpoint: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", &client.client_id)
        .append_pair("response_type", "code")
        .append_pair("scope", "openid email")
        .append_pair("redirect_uri", &client.login_callback_uri)
        .append_pair("state", &state.to_json());

    Ok(ResponseEvent::redirect(url.as_str()))
}

fn logout(event: &RequestEvent, config: &FullConfig) -> Result<ResponseEvent> {
    let client = &config.client_config;
    let target = requested_target(event)
        .filter(|target| whitelisted_url(target, &client.client_whitelist).is_some())
        .ok_or(ApiError::RedirectNotWhitelisted)?;

    let state = CallbackState {
        client_redirect_uri: target.to_string(),
    };
    let endpoint = config
        .idp_config
        .logout_endpoint()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut url =
        Url::parse(&endpoint).map_err(|e| ApiError::Internal(format!("logout endpoint: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", &client.client_id)
        .append_pair("logout_uri", &client.logout_callback_uri);

    let cookie = build_cookie_string(
        LOGOUT_STATE_COOKIE,
        &state.to_json(),
        Some(LOGOUT_STATE_TTL_SECS),
        None,
    );
    Ok(ResponseEvent::redirect(url.as_str()).with_cookie(cookie))
}

fn logout_callback(event: &RequestEvent, config: &FullConfig) -> ResponseEvent {
    let client = &config.client_config;
    let target = event
        .cookie(LOGOUT_STATE_COOKIE)
        .and_then(|raw| CallbackState::from_json(&raw))
        .and_then(|state| {
            build_redirect_url(&state.client_redirect_uri, &client.client_whitelist, STATUS_OK)
        });

    let response = match target {
        Some(target) => ResponseEvent::redirect(&target),
        None => ResponseEvent::status(200, "ok"),
    };
    response
        .with_cookie(expired_cookie(SESSION_COOKIE, client.cookie_domain.as_deref()))
        .with_cookie(expired_cookie(LOGOUT_STATE_COOKIE, None))
}

fn preflight() -> ResponseEvent {
    ResponseEvent::new(204)
        .with_header("Access-Control-Allow-Methods", "GET, OPTIONS")
        .with_header("Access-Control-Allow-Headers", "Authorization, Content-Type")
        .with_header("Access-Control-Max-Age", "600")
}

/// Allow credentialed cross-origin reads from whitelisted origins.
fn with_cors(response: ResponseEvent, event: &RequestEvent, config: &FullConfig) -> ResponseEvent {
    let Some(origin) = event.header("origin") else {
        return response;
    };
    let allowed = Url::parse(origin).ok().is_some_and(|url| {
        url.host_str()
            .is_some_and(|host| host_is_whitelisted(host, &config.client_config.client_whitelist))
    });
    if !allowed {
        return response;
    }
    response
        .with_header("Access-Control-Allow-Origin", origin)
        .with_header("Access-Control-Allow-Credentials", "true")
        .with_header("Vary", "Origin")
}

#[cfg(test)]
mod tests {
    use super::*;
    use little_authn_core::{MockNetClient, NetClient};
    use little_authn_oidc::{testing, OidcOptions};
    use serde_json::{json, Value};

    const BASE: &str = "https://idp.example.com";

    async fn router_with(net: &Arc<MockNetClient>) -> AuthRouter {
        let net: Arc<dyn NetClient> = Arc::clone(net) as Arc<dyn NetClient>;
        let config = testing::static_config(testing::full_config(BASE));
        let oidc = OidcClient::new(config, net, OidcOptions::default())
            .await
            .unwrap();
        AuthRouter::new(oidc)
    }

    fn body(response: &ResponseEvent) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    fn query_param(location: &str, name: &str) -> Option<String> {
        Url::parse(location)
            .unwrap()
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    fn fresh_token() -> String {
        testing::sign_token(&json!({
            "email": "frickjack@example.com",
            "iat": testing::now_secs() - 60,
            "cognito:groups": ["admin"],
        }))
    }

    #[test]
    fn route_names() {
        assert_eq!(route_name("/authn/login"), "login");
        assert_eq!(route_name("/user/"), "user");
        assert_eq!(route_name("/"), "");
        assert_eq!(route_name("loginCallback"), "loginCallback");
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let router = router_with(&Arc::new(MockNetClient::new())).await;
        let response = router.handle(&RequestEvent::get("/unknown")).await;

        assert_eq!(response.status_code, 404);
        assert_eq!(body(&response), json!({"message": "unknown path /unknown"}));
    }

    #[tokio::test]
    async fn login_redirects_to_idp() {
        let router = router_with(&Arc::new(MockNetClient::new())).await;
        let event = RequestEvent::get("/authn/login")
            .with_query("redirect_uri", "https://apps.frickjack.com/app?x=1");
        let response = router.handle(&event).await;

        assert_eq!(response.status_code, 302);
        let location = response.header("Location").unwrap();
        assert!(location.starts_with("https://idp.example.com/oauth2/authorize?"));
        assert_eq!(query_param(location, "client_id").as_deref(), Some("test-client"));
        assert_eq!(query_param(location, "response_type").as_deref(), Some("code"));
        assert_eq!(query_param(location, "scope").as_deref(), Some("openid email"));
        assert_eq!(
            query_param(location, "redirect_uri").as_deref(),
            Some("https://auth.frickjack.com/authn/loginCallback")
        );
        let state: Value = serde_json::from_str(&query_param(location, "state").unwrap()).unwrap();
        assert_eq!(
            state,
            json!({"clientRedirectUri": "https://apps.frickjack.com/app?x=1"})
        );
    }

    #[tokio::test]
    async fn login_falls_back_to_referer() {
        let router = router_with(&Arc::new(MockNetClient::new())).await;
        let event = RequestEvent::get("/login").with_header("Referer", "http://localhost:3000/");
        assert_eq!(router.handle(&event).await.status_code, 302);
    }

    #[tokio::test]
    async fn login_rejects_unlisted_target() {
        let router = router_with(&Arc::new(MockNetClient::new())).await;
        let event = RequestEvent::get("/login").with_query("redirect_uri", "https://evil.com");
        let response = router.handle(&event).await;

        assert_eq!(response.status_code, 400);
        assert_eq!(
            body(&response),
            json!({"message": "redirect_uri not in white list"})
        );

        let response = router.handle(&RequestEvent::get("/login")).await;
        assert_eq!(response.status_code, 400);
    }

    #[tokio::test]
    async fn login_callback_sets_cookie_and_redirects() {
        let net = Arc::new(MockNetClient::new());
        let token = fresh_token();
        net.push_json(json!({ "id_token": token }));
        net.push_json(testing::jwks_document());
        let router = router_with(&net).await;

        let state = CallbackState {
            client_redirect_uri: "http://localhost:3000/x?state=old".into(),
        };
        let event = RequestEvent::get("/authn/loginCallback")
            .with_query("code", "abc")
            .with_query("state", state.to_json());
        let response = router.handle(&event).await;

        assert_eq!(response.status_code, 302);
        let location = response.header("Location").unwrap();
        assert!(location.starts_with("http://localhost:3000/x?"));
        assert_eq!(query_param(location, "state").as_deref(), Some(STATUS_OK));
        assert_eq!(
            response.cookies(),
            [format!(
                "Authorization={token}; Path=/; Secure; HttpOnly; SameSite=None; Max-Age=3600; \
                 Domain=.frickjack.com"
            )]
        );
    }

    #[tokio::test]
    async fn login_callback_without_state_returns_auth_info() {
        let net = Arc::new(MockNetClient::new());
        net.push_json(json!({ "id_token": fresh_token() }));
        net.push_json(testing::jwks_document());
        let router = router_with(&net).await;

        let response = router
            .handle(&RequestEvent::get("/loginCallback").with_query("code", "abc"))
            .await;

        assert_eq!(response.status_code, 200);
        assert_eq!(body(&response)["email"], "frickjack@example.com");
        assert_eq!(response.cookies().len(), 1);
    }

    #[tokio::test]
    async fn failed_login_callback_clears_session() {
        let net = Arc::new(MockNetClient::new());
        net.push_json(json!({ "error": "invalid_grant" }));
        let router = router_with(&net).await;

        let response = router
            .handle(&RequestEvent::get("/loginCallback").with_query("code", "stale"))
            .await;
        assert_eq!(response.status_code, 400);
        assert_eq!(body(&response), json!({"status": "error"}));
        assert!(response.cookies()[0].starts_with("Authorization=; "));
        assert!(response.cookies()[0].contains("Expires=Thu, 01 Jan 1970"));

        let state = CallbackState {
            client_redirect_uri: "https://apps.frickjack.com/".into(),
        };
        let response = router
            .handle(&RequestEvent::get("/loginCallback").with_query("state", state.to_json()))
            .await;
        assert_eq!(response.status_code, 302);
        let location = response.header("Location").unwrap();
        assert_eq!(query_param(location, "state").as_deref(), Some(STATUS_ERROR));
    }

    #[tokio::test]
    async fn logout_stashes_target_and_redirects_to_idp() {
        let router = router_with(&Arc::new(MockNetClient::new())).await;
        let event =
            RequestEvent::get("/logout").with_query("redirect_uri", "https://apps.frickjack.com/");
        let response = router.handle(&event).await;

        assert_eq!(response.status_code, 302);
        let location = response.header("Location").unwrap();
        assert!(location.starts_with("https://idp.example.com/logout?"));
        assert_eq!(query_param(location, "client_id").as_deref(), Some("test-client"));
        assert_eq!(
            query_param(location, "logout_uri").as_deref(),
            Some("https://auth.frickjack.com/authn/logoutCallback")
        );

        let cookie = &response.cookies()[0];
        assert!(cookie.starts_with("LogoutState="));
        assert!(cookie.contains("Max-Age=180"));
    }

    #[tokio::test]
    async fn logout_rejects_unlisted_target() {
        let router = router_with(&Arc::new(MockNetClient::new())).await;
        let event = RequestEvent::get("/logout").with_query("redirect_uri", "https://evil.com/");
        assert_eq!(router.handle(&event).await.status_code, 400);
    }

    #[tokio::test]
    async fn logout_callback_follows_stashed_target() {
        let router = router_with(&Arc::new(MockNetClient::new())).await;
        let stash = CallbackState {
            client_redirect_uri: "https://apps.frickjack.com/bye".into(),
        };
        let stashed = build_cookie_string(LOGOUT_STATE_COOKIE, &stash.to_json(), None, None);
        let pair = stashed.split("; ").next().unwrap();
        let event = RequestEvent::get("/logoutCallback").with_header("Cookie", pair);
        let response = router.handle(&event).await;

        assert_eq!(response.status_code, 302);
        let location = response.header("Location").unwrap();
        assert!(location.starts_with("https://apps.frickjack.com/bye?"));
        assert_eq!(response.cookies().len(), 2);
        assert!(response.cookies()[0].starts_with("Authorization=; "));
        assert!(response.cookies()[1].starts_with("LogoutState=; "));
    }

    #[tokio::test]
    async fn logout_callback_without_stash_is_ok() {
        let router = router_with(&Arc::new(MockNetClient::new())).await;
        let response = router.handle(&RequestEvent::get("/logoutCallback")).await;

        assert_eq!(response.status_code, 200);
        assert_eq!(body(&response), json!({"status": "ok"}));
        assert_eq!(response.cookies().len(), 2);
    }

    #[tokio::test]
    async fn user_requires_token() {
        let router = router_with(&Arc::new(MockNetClient::new())).await;
        let response = router.handle(&RequestEvent::get("/user")).await;

        assert_eq!(response.status_code, 400);
        assert_eq!(body(&response), json!({"message": "auth token not provided"}));
    }

    #[tokio::test]
    async fn user_returns_auth_info_from_header_or_cookie() {
        let net = Arc::new(MockNetClient::new());
        net.push_json(testing::jwks_document());
        let router = router_with(&net).await;
        let token = fresh_token();

        let by_header =
            RequestEvent::get("/user").with_header("Authorization", format!("Bearer {token}"));
        let response = router.handle(&by_header).await;
        assert_eq!(response.status_code, 200);
        let info = body(&response);
        assert_eq!(info["email"], "frickjack@example.com");
        assert_eq!(info["groups"], json!(["admin"]));
        assert!(info["iat"].is_i64());

        let by_cookie =
            RequestEvent::get("/user").with_header("Cookie", format!("Authorization={token}"));
        assert_eq!(router.handle(&by_cookie).await.status_code, 200);
    }

    #[tokio::test]
    async fn user_rejects_bad_token_and_honors_ttl_override() {
        let net = Arc::new(MockNetClient::new());
        net.push_json(testing::jwks_document());
        let router = router_with(&net).await;

        let response = router
            .handle(&RequestEvent::get("/user").with_header("Authorization", "garbage"))
            .await;
        assert_eq!(response.status_code, 400);
        assert_eq!(
            body(&response),
            json!({"message": "failed to validate auth token"})
        );

        let event = RequestEvent::get("/user")
            .with_header("Authorization", fresh_token())
            .with_query("sessionTtlMins", "0");
        assert_eq!(router.handle(&event).await.status_code, 400);

        let event = RequestEvent::get("/user")
            .with_header("Authorization", fresh_token())
            .with_query("sessionTtlMins", "soon");
        assert_eq!(router.handle(&event).await.status_code, 400);
    }

    #[tokio::test]
    async fn user_cors_for_whitelisted_origins() {
        let router = router_with(&Arc::new(MockNetClient::new())).await;

        let mut preflight =
            RequestEvent::get("/user").with_header("Origin", "https://apps.frickjack.com");
        preflight.http_method = "OPTIONS".into();
        let response = router.handle(&preflight).await;
        assert_eq!(response.status_code, 204);
        assert_eq!(
            response.header("Access-Control-Allow-Origin"),
            Some("https://apps.frickjack.com")
        );
        assert_eq!(response.header("Access-Control-Allow-Credentials"), Some("true"));

        let foreign = RequestEvent::get("/user").with_header("Origin", "https://evil.com");
        let response = router.handle(&foreign).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(response.header("Access-Control-Allow-Origin"), None);
    }
}
