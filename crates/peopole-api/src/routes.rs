//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression,
//! per-client rate limiting on chat, and the admin token guard.

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use peopole_core::config::PeopoleConfig;
use peopole_core::PeopoleError;

use crate::auth::ADMIN_TOKEN_HEADER;
use crate::handlers;
use crate::rate_limit::RateLimiter;
use crate::state::AppState;

/// Build the CORS layer for `allowed_origin`.
///
/// `*` allows any origin; otherwise a comma-separated list of exact origins.
/// Unparseable entries are skipped with a warning.
pub fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static(ADMIN_TOKEN_HEADER),
        ]);

    if allowed_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Create the axum Router with all routes and middleware.
///
/// # Arguments
/// * `state` - The shared application state.
///
/// # Returns
/// A fully configured axum Router ready to serve requests.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origin);

    // Routes that do NOT require authentication.
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/analytics/event", post(handlers::analytics_event))
        .route("/api/analytics/pageview", post(handlers::analytics_pageview))
        .route("/api/push/public-key", get(handlers::push_public_key))
        .route("/api/push/subscribe", post(handlers::push_subscribe))
        .route("/api/push/unsubscribe", post(handlers::push_unsubscribe))
        .route("/api/admin/login", post(handlers::admin_login));

    // Chat is rate limited per client IP.
    let limiter = RateLimiter::per_minute(state.config.server.chat_requests_per_minute);
    let chat_routes = Router::new()
        .route("/chat", post(handlers::chat))
        .route("/api/chat", post(handlers::chat))
        .layer(axum::middleware::from_fn(
            crate::rate_limit::rate_limit_middleware,
        ))
        .layer(axum::Extension(limiter));

    // Admin routes behind the shared token.
    let admin_routes = Router::new()
        .route("/api/admin/stats", get(handlers::admin_stats))
        .route("/api/admin/inquiries", get(handlers::admin_inquiries))
        .route("/api/admin/analytics", get(handlers::admin_analytics))
        .route("/api/admin/reset", post(handlers::admin_reset))
        .route("/api/admin/push", post(handlers::admin_push))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_admin,
        ));

    public_routes
        .merge(chat_routes)
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB global limit
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
///
/// Serves until ctrl-c. Peer addresses are exposed to handlers so requests
/// without `X-Forwarded-For` still carry a client IP.
pub async fn start_server(config: &PeopoleConfig, state: AppState) -> Result<(), PeopoleError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| {
            PeopoleError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind {}: {}", addr, e),
            ))
        })?;
    info!(addr = %addr, "API server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

