//! Admission middleware for protected routes.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use super::{resolve_client, retry_after_secs, GateState};
use crate::ratelimit::Decision;

/// Gate a request on the limiter before dispatching it.
///
/// Apply with `axum::middleware::from_fn_with_state`. The client identifier
/// comes from connection metadata (see [`super::resolve_client`]); a rejected
/// request is answered with `429 Too Many Requests` and never reaches the
/// inner handler.
pub async fn admit(State(state): State<GateState>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let client = resolve_client(req.headers(), peer, state.trust_forwarded_for);
    let path = req.uri().path().to_string();

    let decision = state
        .limiter
        .check_and_admit(&path, &client, state.clock.now())
        .await;

    if decision.admitted {
        return next.run(req).await;
    }

    warn!(client = %client, path = %path, "Request rejected");
    rejection_response(&decision)
}

fn rejection_response(decision: &Decision) -> Response {
    let headers = [
        (
            header::RETRY_AFTER,
            retry_after_secs(decision.retry_after).to_string(),
        ),
        (
            HeaderName::from_static("x-ratelimit-limit"),
            decision.limit.to_string(),
        ),
        (
            HeaderName::from_static("x-ratelimit-remaining"),
            decision.remaining.to_string(),
        ),
    ];

    (
        StatusCode::TOO_MANY_REQUESTS,
        headers,
        Json(serde_json::json!({ "error": "too many requests" })),
    )
        .into_response()
}
