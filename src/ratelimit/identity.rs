//! Client identity and bucket key handling.

use std::net::SocketAddr;

/// Sentinel identifier used when no client identity can be resolved.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// The identifier used to bucket requests, typically derived from
/// network-connection metadata.
///
/// An empty or whitespace-only identifier collapses into the `"unknown"`
/// sentinel, so every request lands in some bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Create a client identifier, normalizing empty input to the sentinel.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::unknown();
        }
        Self(trimmed.to_string())
    }

    /// The sentinel identifier.
    pub fn unknown() -> Self {
        Self(UNKNOWN_CLIENT.to_string())
    }

    /// Identify a client by the peer address of its connection.
    pub fn from_addr(addr: &SocketAddr) -> Self {
        Self(addr.ip().to_string())
    }

    /// Parse the originating client from an `X-Forwarded-For` value.
    ///
    /// The header lists hops left to right, so the first entry is the
    /// original client. Returns `None` when the header carries nothing usable.
    pub fn from_forwarded_for(header: &str) -> Option<Self> {
        let first = header.split(',').next()?.trim();
        if first.is_empty() {
            return None;
        }
        Some(Self(first.to_string()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key identifying one counter bucket: the rule scope plus the client.
///
/// Routes governed by different rules meter independently, so the scope is
/// part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// The rule scope the request matched
    pub scope: String,
    /// The client being metered
    pub client: ClientId,
}

impl BucketKey {
    /// Create a new bucket key.
    pub fn new(scope: &str, client: ClientId) -> Self {
        Self {
            scope: scope.to_string(),
            client,
        }
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scope, self.client)
    }
}
