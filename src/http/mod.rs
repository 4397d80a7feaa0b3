//! HTTP surface: admission middleware and the check API server.

mod middleware;
mod server;

pub use middleware::admit;
pub use server::HttpServer;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;

use crate::clock::Clock;
use crate::ratelimit::{ClientId, RateLimiter};

/// Shared state for the HTTP layer.
#[derive(Clone)]
pub struct GateState {
    /// The limiter consulted before dispatch
    pub limiter: Arc<RateLimiter>,
    /// Time source for admission decisions
    pub clock: Arc<dyn Clock>,
    /// Whether `X-Forwarded-For` is trusted for client identity
    pub trust_forwarded_for: bool,
}

/// Resolve the client identity for a request.
///
/// Order: trusted `X-Forwarded-For` first hop, then the connection peer
/// address, then the `"unknown"` sentinel.
pub(crate) fn resolve_client(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> ClientId {
    if trust_forwarded_for {
        if let Some(value) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(client) = ClientId::from_forwarded_for(value) {
                return client;
            }
        }
    }

    match peer {
        Some(addr) => ClientId::from_addr(&addr),
        None => ClientId::unknown(),
    }
}

/// Seconds until retry, rounded up for the `Retry-After` header.
pub(crate) fn retry_after_secs(retry_after: Duration) -> u64 {
    retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)
}
