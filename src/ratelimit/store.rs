//! Admission state storage.
//!
//! The identifier-to-window map lives behind the [`AdmissionStore`] trait so
//! the limiter owns an injected store rather than process-global state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::identity::BucketKey;
use super::window::{ClientWindow, Limit};
use crate::clock::Clock;

/// The outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// The limit that was applied
    pub limit: u64,
    /// Quota left in the current window
    pub remaining: u64,
    /// Time until the current window resets
    pub retry_after: Duration,
}

/// Storage for per-client window state.
///
/// Implementations must be safe to share across request handlers.
#[async_trait]
pub trait AdmissionStore: Send + Sync {
    /// Apply one request against `limit` for `key` at `now`.
    async fn check_and_admit(&self, key: &BucketKey, limit: Limit, now: Instant) -> Decision;

    /// Drop entries whose window has been stale longer than `grace`.
    ///
    /// Returns the number of evicted entries.
    async fn sweep(&self, now: Instant, grace: Duration) -> usize;

    /// Number of live buckets.
    async fn len(&self) -> usize;
}

/// In-memory store backed by a sharded concurrent map.
///
/// Each check locks a single map entry, so concurrent handlers for distinct
/// clients do not contend.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    buckets: DashMap<BucketKey, ClientWindow>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Remove every bucket. Primarily useful for tests.
    pub fn clear(&self) {
        self.buckets.clear();
    }
}

#[async_trait]
impl AdmissionStore for InMemoryStore {
    async fn check_and_admit(&self, key: &BucketKey, limit: Limit, now: Instant) -> Decision {
        let mut entry = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| {
                trace!(key = %key, "Creating new client window");
                ClientWindow::new(now)
            });

        let admitted = entry.observe(&limit, now);

        Decision {
            admitted,
            limit: limit.max_requests,
            remaining: entry.remaining(&limit),
            retry_after: entry.duration_until_reset(&limit, now),
        }
    }

    async fn sweep(&self, now: Instant, grace: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, window| !window.is_stale(now, grace));
        before - self.buckets.len()
    }

    async fn len(&self) -> usize {
        self.buckets.len()
    }
}

/// Spawn the background task that periodically sweeps stale buckets.
pub fn spawn_sweeper(
    store: Arc<dyn AdmissionStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    grace: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let evicted = store.sweep(clock.now(), grace).await;
            if evicted > 0 {
                let remaining = store.len().await;
                debug!(evicted, remaining, "Swept stale buckets");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::identity::ClientId;

    fn key(client: &str) -> BucketKey {
        BucketKey::new("default", ClientId::new(client))
    }

    fn limit(max: u64, window_ms: u64) -> Limit {
        Limit::new(max, Duration::from_millis(window_ms))
    }

    #[tokio::test]
    async fn identifiers_have_independent_counters() {
        let store = InMemoryStore::new();
        let l = limit(2, 60_000);
        let t0 = Instant::now();

        // Exhaust one client's quota.
        assert!(store.check_and_admit(&key("1.2.3.4"), l, t0).await.admitted);
        assert!(store.check_and_admit(&key("1.2.3.4"), l, t0).await.admitted);
        assert!(!store.check_and_admit(&key("1.2.3.4"), l, t0).await.admitted);

        // The other client is unaffected.
        let decision = store.check_and_admit(&key("5.6.7.8"), l, t0).await;
        assert!(decision.admitted);
        assert_eq!(decision.remaining, 1);

        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn decision_reports_quota_and_reset() {
        let store = InMemoryStore::new();
        let l = limit(3, 60_000);
        let t0 = Instant::now();

        let decision = store.check_and_admit(&key("1.2.3.4"), l, t0).await;
        assert!(decision.admitted);
        assert_eq!(decision.limit, 3);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.retry_after, Duration::from_millis(60_000));

        let later = t0 + Duration::from_millis(15_000);
        let decision = store.check_and_admit(&key("1.2.3.4"), l, later).await;
        assert!(decision.admitted);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.retry_after, Duration::from_millis(45_000));
    }

    #[tokio::test]
    async fn sweep_drops_only_stale_buckets() {
        let store = InMemoryStore::new();
        let l = limit(10, 1_000);
        let t0 = Instant::now();

        store.check_and_admit(&key("stale"), l, t0).await;
        store
            .check_and_admit(&key("fresh"), l, t0 + Duration::from_millis(1_800))
            .await;
        assert_eq!(store.len().await, 2);

        let grace = Duration::from_millis(1_000);
        let evicted = store.sweep(t0 + Duration::from_millis(2_100), grace).await;

        assert_eq!(evicted, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn sweeper_task_evicts_in_background() {
        let store: Arc<dyn AdmissionStore> = Arc::new(InMemoryStore::new());
        let t0 = Instant::now();
        let clock = Arc::new(ManualClock::new(t0));
        let l = limit(10, 10);

        store
            .check_and_admit(&key("idle"), l, t0)
            .await;
        clock.advance(Duration::from_millis(100));

        let handle = spawn_sweeper(
            store.clone(),
            clock.clone(),
            Duration::from_millis(5),
            Duration::ZERO,
        );

        // Give the sweeper a couple of ticks to run.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.len().await, 0);

        handle.abort();
    }
}
