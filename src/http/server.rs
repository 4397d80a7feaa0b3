//! HTTP server exposing the admission check API.

use std::future::Future;
use std::net::SocketAddr;

use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::{resolve_client, retry_after_secs, GateState};
use crate::error::{FloodgateError, Result};
use crate::ratelimit::{ClientId, Decision};

/// Largest accepted check request body.
const MAX_CHECK_BODY: usize = 16 * 1024;

/// HTTP server for the admission check service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared gate state
    state: GateState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: GateState) -> Self {
        Self { addr, state }
    }

    /// Build the service router.
    pub fn router(state: GateState) -> Router {
        Router::new()
            .route("/v1/check", post(check_handler))
            .route("/healthz", get(health_handler))
            .route("/stats", get(stats_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = Self::router(self.state);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server for admission checks");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            FloodgateError::Io(e)
        })
    }
}

/// An admission check submitted by a fronting API layer.
///
/// Both fields are optional: a missing identifier falls back to connection
/// metadata, a missing route is metered under the default rule.
#[derive(Debug, Default, Deserialize)]
struct CheckRequest {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    route: Option<String>,
}

/// The decision returned to the caller.
#[derive(Debug, Serialize)]
struct CheckResponse {
    admitted: bool,
    limit: u64,
    remaining: u64,
    retry_after_ms: u64,
}

impl From<Decision> for CheckResponse {
    fn from(decision: Decision) -> Self {
        Self {
            admitted: decision.admitted,
            limit: decision.limit,
            remaining: decision.remaining,
            retry_after_ms: decision.retry_after.as_millis() as u64,
        }
    }
}

async fn check_handler(State(state): State<GateState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);

    let bytes = match to_bytes(body, MAX_CHECK_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Unreadable check request body");
            return (StatusCode::BAD_REQUEST, "unreadable request body").into_response();
        }
    };

    let check: CheckRequest = if bytes.is_empty() {
        CheckRequest::default()
    } else {
        match serde_json::from_slice(&bytes) {
            Ok(check) => check,
            Err(e) => {
                warn!(error = %e, "Malformed check request");
                return (StatusCode::BAD_REQUEST, "malformed check request").into_response();
            }
        }
    };

    let client = match check.identifier.as_deref() {
        Some(id) if !id.trim().is_empty() => ClientId::new(id),
        _ => resolve_client(&parts.headers, peer, state.trust_forwarded_for),
    };
    let route = check.route.as_deref().unwrap_or("/");

    let decision = state
        .limiter
        .check_and_admit(route, &client, state.clock.now())
        .await;

    let status = if decision.admitted {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };
    let headers = [
        (
            HeaderName::from_static("x-ratelimit-limit"),
            decision.limit.to_string(),
        ),
        (
            HeaderName::from_static("x-ratelimit-remaining"),
            decision.remaining.to_string(),
        ),
        (
            header::RETRY_AFTER,
            retry_after_secs(decision.retry_after).to_string(),
        ),
    ];

    (status, headers, Json(CheckResponse::from(decision))).into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    active_buckets: usize,
    route_rules: usize,
}

async fn stats_handler(State(state): State<GateState>) -> impl IntoResponse {
    let stats = StatsResponse {
        active_buckets: state.limiter.bucket_count().await,
        route_rules: state.limiter.rules().routes.len(),
    };
    Json(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::{InMemoryStore, LimitRules, RateLimiter};
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use std::sync::Arc;
    use std::time::Instant;
    use tower::ServiceExt;

    fn test_state(rules_yaml: &str) -> GateState {
        let rules = LimitRules::from_yaml(rules_yaml).unwrap();
        GateState {
            limiter: Arc::new(RateLimiter::with_rules(
                Arc::new(InMemoryStore::new()),
                rules,
            )),
            clock: Arc::new(ManualClock::new(Instant::now())),
            trust_forwarded_for: false,
        }
    }

    fn check_request(body: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri("/v1/check")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn response_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn check_admits_then_rejects() {
        let router = HttpServer::router(test_state(
            "default:\n  max_requests: 2\n  window_ms: 60000\n",
        ));
        let body = r#"{"identifier": "1.2.3.4"}"#;

        for _ in 0..2 {
            let response = router.clone().oneshot(check_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let json = response_json(response).await;
            assert_eq!(json["admitted"], true);
        }

        let response = router.clone().oneshot(check_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        let json = response_json(response).await;
        assert_eq!(json["admitted"], false);
        assert_eq!(json["limit"], 2);
    }

    #[tokio::test]
    async fn check_scopes_by_route() {
        let router = HttpServer::router(test_state(
            "default:\n  max_requests: 100\n  window_ms: 60000\nroutes:\n  - prefix: /api/reports\n    rate_limit:\n      max_requests: 1\n      window_ms: 60000\n",
        ));
        let reports = r#"{"identifier": "1.2.3.4", "route": "/api/reports"}"#;
        let students = r#"{"identifier": "1.2.3.4", "route": "/api/students"}"#;

        assert_eq!(
            router.clone().oneshot(check_request(reports)).await.unwrap().status(),
            StatusCode::OK
        );
        assert_eq!(
            router.clone().oneshot(check_request(reports)).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            router.clone().oneshot(check_request(students)).await.unwrap().status(),
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn check_falls_back_to_peer_identity() {
        let state = test_state("default:\n  max_requests: 1\n  window_ms: 60000\n");
        let router = HttpServer::router(state.clone());
        let peer: SocketAddr = "9.9.9.9:1234".parse().unwrap();

        for expected in [StatusCode::OK, StatusCode::TOO_MANY_REQUESTS] {
            let mut req = HttpRequest::builder()
                .method("POST")
                .uri("/v1/check")
                .body(Body::empty())
                .unwrap();
            req.extensions_mut().insert(ConnectInfo(peer));

            let response = router.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn malformed_check_body_is_rejected() {
        let router = HttpServer::router(test_state(
            "default:\n  max_requests: 1\n  window_ms: 60000\n",
        ));

        let response = router
            .clone()
            .oneshot(check_request("{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_and_stats_endpoints() {
        let state = test_state("default:\n  max_requests: 10\n  window_ms: 60000\n");
        let router = HttpServer::router(state.clone());

        let response = router
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["status"], "healthy");

        router
            .clone()
            .oneshot(check_request(r#"{"identifier": "1.2.3.4"}"#))
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .uri("/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = response_json(response).await;
        assert_eq!(json["active_buckets"], 1);
        assert_eq!(json["route_rules"], 0);
    }
}
