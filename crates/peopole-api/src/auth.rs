//! Admin authentication via a shared static token.
//!
//! The token may be presented as an `X-Admin-Token` header, an
//! `Authorization: Bearer <token>` header, or a `?token=` query parameter
//! (used by CSV export links in the dashboard). Comparison is constant time.

use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::error::ErrorBody;
use crate::state::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Debug, Deserialize)]
struct TokenParam {
    token: Option<String>,
}

/// Constant-time equality of a presented secret against the configured one.
pub fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// The token carried by a request, checked in header, bearer, query order.
fn presented_token(req: &Request) -> Option<String> {
    header_token(req.headers()).or_else(|| {
        Query::<TokenParam>::try_from_uri(req.uri())
            .ok()
            .and_then(|Query(param)| param.token)
            .filter(|t| !t.is_empty())
    })
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new("unauthorized", message)),
    )
        .into_response()
}

/// Middleware guarding the admin routes.
///
/// Returns 401 when the token is missing or wrong, and for every request
/// when no admin token is configured.
pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return unauthorized("Admin access is disabled");
    };

    match presented_token(&req) {
        Some(token) if token_matches(&token, expected) => next.run(req).await,
        Some(_) => unauthorized("Invalid admin token"),
        None => unauthorized("Missing admin token"),
    }
}
