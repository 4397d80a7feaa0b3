//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::identity::{BucketKey, ClientId};
use super::rules::LimitRules;
use super::store::{AdmissionStore, Decision};

/// The core rate limiter: resolves the rule governing a request and applies
/// it against the injected store.
///
/// This struct is thread-safe and can be shared across handlers.
pub struct RateLimiter {
    /// Per-client window state
    store: Arc<dyn AdmissionStore>,
    /// Active limit rules, hot-swappable
    rules: RwLock<LimitRules>,
}

impl RateLimiter {
    /// Create a rate limiter with default rules over the given store.
    pub fn new(store: Arc<dyn AdmissionStore>) -> Self {
        Self::with_rules(store, LimitRules::new())
    }

    /// Create a rate limiter with an explicit rule set.
    pub fn with_rules(store: Arc<dyn AdmissionStore>, rules: LimitRules) -> Self {
        Self {
            store,
            rules: RwLock::new(rules),
        }
    }

    /// Replace the active rule set.
    pub fn set_rules(&self, rules: LimitRules) {
        let mut current = self.rules.write();
        *current = rules;
    }

    /// Get a copy of the active rule set.
    pub fn rules(&self) -> LimitRules {
        self.rules.read().clone()
    }

    /// Decide whether `client`'s request to `path` at `now` may proceed.
    ///
    /// Pure over the injected state: the same sequence of calls with the same
    /// timestamps yields the same decisions.
    pub async fn check_and_admit(&self, path: &str, client: &ClientId, now: Instant) -> Decision {
        let (scope, limit) = {
            let rules = self.rules.read();
            let (scope, limit) = rules.resolve(path);
            (scope.to_string(), limit)
        };

        let key = BucketKey::new(&scope, client.clone());
        let window_ms = limit.window.as_millis() as u64;

        trace!(
            key = %key,
            limit = limit.max_requests,
            window_ms,
            "Checking admission"
        );

        let decision = self.store.check_and_admit(&key, limit, now).await;

        if !decision.admitted {
            debug!(
                key = %key,
                limit = decision.limit,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Number of live buckets in the store.
    pub async fn bucket_count(&self) -> usize {
        self.store.len().await
    }
}
