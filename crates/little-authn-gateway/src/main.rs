//! little-authn gateway - OIDC relying-party service
//!
//! This is the main entry point for the gateway service.
//!
//! # Configuration
//!
//! The client configuration is loaded through the load rule in
//! `LITTLE_AUTHN_CONFIG` (or `LITTLE_CONFIG`), e.g.
//! `{"type": "file", "path": "/etc/authn/config.json", "ttlSecs": 300}`.
//! `AUTHN_CLIENT_ID` and `AUTHN_CLIENT_SECRET` override the loaded
//! credentials. Process settings come from `LISTEN_ADDR`,
//! `REQUEST_TIMEOUT_SECS` and `AUTHN_HTTP_TIMEOUT_SECS`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use little_authn_gateway::{create_router, AppContext, GatewayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,little_authn=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting little-authn gateway");

    let config = GatewayConfig::from_env();
    tracing::info!(
        listen_addr = %config.listen_addr,
        request_timeout_seconds = config.request_timeout_seconds,
        http_timeout_seconds = config.http_timeout_seconds,
        subject = %config.subject,
        "Gateway configuration loaded"
    );
    let listen_addr = config.listen_addr.clone();

    let context = AppContext::from_env(config)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Failed to load auth configuration"))?;
    tracing::info!("OIDC client initialized");

    let app = create_router(context);

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
