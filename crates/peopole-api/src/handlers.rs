//! Route handler functions for all API endpoints.
//!
//! Each handler extracts its input via axum extractors, calls into the relay
//! or the JSON stores held by AppState, and returns JSON (or an SSE stream
//! for chat).

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use peopole_chat::RelayRequest;
use peopole_core::types::{ChatRequest, Lang};
use peopole_storage::{
    AnalyticsSummary, InquiryFilter, InquiryPage, NewEvent, PushKeys, StatsSummary,
};

use crate::auth::token_matches;
use crate::client_ip::ClientIp;
use crate::error::ApiError;
use crate::push::{broadcast, BroadcastReport, PushPayload};
use crate::state::AppState;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

// =============================================================================
// Query parameter types
// =============================================================================

/// Filters for `GET /api/admin/inquiries`. Values are kept as strings so a
/// malformed page number falls back to the default instead of a 400.
#[derive(Debug, Default, Deserialize)]
pub struct InquiryParams {
    pub stage: Option<String>,
    pub lang: Option<String>,
    pub source: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl InquiryParams {
    /// Build the store filter; `all` or an empty value means no filter.
    pub fn filter(&self) -> Result<InquiryFilter, ApiError> {
        Ok(InquiryFilter {
            stage: parse_filter(self.stage.as_deref(), "stage")?,
            lang: parse_filter(self.lang.as_deref(), "lang")?,
            source: parse_filter(self.source.as_deref(), "source")?,
        })
    }

    pub fn page(&self) -> Option<usize> {
        self.page.as_deref().and_then(|p| p.trim().parse().ok())
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse().ok())
            .filter(|l| *l > 0)
    }
}

fn parse_filter<T: std::str::FromStr>(
    value: Option<&str>,
    name: &str,
) -> Result<Option<T>, ApiError> {
    match value.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Unknown {} filter: {}", name, raw))),
    }
}

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PageviewRequest {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: PushKeys,
    #[serde(default)]
    pub lang: Option<Lang>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub password: Option<String>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_sessions: usize,
    pub upstream_configured: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub public_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub success: bool,
    /// False when an existing endpoint was refreshed.
    pub created: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub removed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// =============================================================================
// Chat
// =============================================================================

/// POST /chat, POST /api/chat - stream a reply as server-sent events.
///
/// The body is parsed permissively: invalid JSON is treated as an empty
/// request so the widget always receives a terminated stream.
pub async fn chat(State(state): State<AppState>, ClientIp(ip): ClientIp, body: Bytes) -> Response {
    let chat: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Unparseable chat body, treating as empty");
            ChatRequest::default()
        }
    };

    debug!(
        user_id = chat.user_id().unwrap_or("-"),
        stage = %chat.stage,
        lang = %chat.lang,
        messages = chat.messages.len(),
        "Chat request"
    );

    let events = state
        .relay
        .respond(RelayRequest { chat, ip })
        .map(|frame| Ok::<_, Infallible>(Event::default().data(frame.payload())));

    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(X_ACCEL_BUFFERING, HeaderValue::from_static("no"));
    response
}

// =============================================================================
// Analytics ingest
// =============================================================================

/// POST /api/analytics/event - record one widget event.
pub async fn analytics_event(
    State(state): State<AppState>,
    Json(event): Json<NewEvent>,
) -> Result<StatusCode, ApiError> {
    state.analytics.log_event(event).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/analytics/pageview - count one view of a page.
pub async fn analytics_pageview(
    State(state): State<AppState>,
    Json(request): Json<PageviewRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .analytics
        .log_pageview(request.path.as_deref().unwrap_or("/"))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Push opt-in
// =============================================================================

fn require_push(state: &AppState) -> Result<String, ApiError> {
    match (&state.config.push.vapid_public_key, &state.push_sender) {
        (Some(key), Some(_)) => Ok(key.clone()),
        _ => Err(ApiError::ServiceUnavailable(
            "Push notifications are not configured".to_string(),
        )),
    }
}

/// GET /api/push/public-key - VAPID public key for `pushManager.subscribe`.
pub async fn push_public_key(
    State(state): State<AppState>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let public_key = require_push(&state)?;
    Ok(Json(PublicKeyResponse { public_key }))
}

/// POST /api/push/subscribe - store or refresh a browser subscription.
pub async fn push_subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<SubscribeResponse>), ApiError> {
    require_push(&state)?;

    let endpoint = request.endpoint.trim();
    if endpoint.is_empty() {
        return Err(ApiError::BadRequest("endpoint is required".to_string()));
    }
    if request.keys.p256dh.is_empty() || request.keys.auth.is_empty() {
        return Err(ApiError::BadRequest(
            "keys.p256dh and keys.auth are required".to_string(),
        ));
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let created = state
        .push_subscriptions
        .upsert(endpoint, request.keys, user_agent, request.lang)
        .await?;
    if created {
        info!("New push subscription");
    }

    Ok((
        StatusCode::CREATED,
        Json(SubscribeResponse {
            success: true,
            created,
        }),
    ))
}

/// POST /api/push/unsubscribe - forget a browser subscription.
pub async fn push_unsubscribe(
    State(state): State<AppState>,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    let removed = state
        .push_subscriptions
        .remove(request.endpoint.trim())
        .await?;
    Ok(Json(UnsubscribeResponse { removed }))
}

// =============================================================================
// Health
// =============================================================================

/// GET /health - liveness and configuration summary.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_sessions: state.relay.sessions().len(),
        upstream_configured: state.relay.upstream_configured(),
    })
}

// =============================================================================
// Admin
// =============================================================================

/// POST /api/admin/login - exchange the admin password for the API token.
pub async fn admin_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ApiError::Unauthorized("Admin access is disabled".to_string()));
    };

    match request.password.as_deref() {
        Some(password) if token_matches(password, expected) => Ok(Json(LoginResponse {
            success: true,
            token: expected.to_string(),
        })),
        _ => {
            warn!("Rejected admin login");
            Err(ApiError::Unauthorized("Wrong password".to_string()))
        }
    }
}

/// GET /api/admin/stats - dashboard rollup.
pub async fn admin_stats(State(state): State<AppState>) -> Json<StatsSummary> {
    Json(state.inquiries.stats().await)
}

/// GET /api/admin/inquiries - filtered, paginated inquiry list.
pub async fn admin_inquiries(
    State(state): State<AppState>,
    Query(params): Query<InquiryParams>,
) -> Result<Json<InquiryPage>, ApiError> {
    let filter = params.filter()?;
    Ok(Json(
        state
            .inquiries
            .list(&filter, params.page(), params.limit())
            .await,
    ))
}

/// GET /api/admin/analytics - event and pageview summary.
pub async fn admin_analytics(State(state): State<AppState>) -> Json<AnalyticsSummary> {
    Json(state.analytics.summary().await)
}

/// POST /api/admin/reset - clear inquiries, stats and analytics.
pub async fn admin_reset(State(state): State<AppState>) -> Result<Json<SuccessResponse>, ApiError> {
    state.inquiries.reset().await?;
    state.analytics.reset().await?;
    info!("Admin reset inquiries and analytics");
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/admin/push - send a notification to every subscriber.
pub async fn admin_push(
    State(state): State<AppState>,
    Json(payload): Json<PushPayload>,
) -> Result<Json<BroadcastReport>, ApiError> {
    require_push(&state)?;
    let Some(sender) = state.push_sender.as_deref() else {
        return Err(ApiError::ServiceUnavailable(
            "Push notifications are not configured".to_string(),
        ));
    };
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }

    let report = broadcast(sender, &state.push_subscriptions, &payload).await?;
    Ok(Json(report))
}
