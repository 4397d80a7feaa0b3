//! Per-client window state.

use std::time::{Duration, Instant};

/// A request limit applied over a fixed time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    /// Maximum requests admitted per window
    pub max_requests: u64,
    /// Length of the window
    pub window: Duration,
}

impl Limit {
    /// Create a new limit.
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Tracks one client's admitted requests within the current window.
///
/// The window is fixed: it starts when the first request arrives and is
/// replaced wholesale once it has fully elapsed. The boundary is inclusive,
/// so a request arriving exactly one window after `window_start` begins a
/// fresh window.
#[derive(Debug, Clone)]
pub struct ClientWindow {
    /// Requests admitted in the current window
    count: u64,
    /// When the current window began
    window_start: Instant,
    /// Window length applied at the last observation, kept for staleness checks
    window: Duration,
}

impl ClientWindow {
    /// Create an empty window starting at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            window: Duration::ZERO,
        }
    }

    /// Observe one request at `now` under `limit`.
    ///
    /// Returns `true` if the request is admitted. A rejected request leaves
    /// the state untouched, so `count` never exceeds `limit.max_requests`.
    pub fn observe(&mut self, limit: &Limit, now: Instant) -> bool {
        self.window = limit.window;

        if now.duration_since(self.window_start) >= limit.window {
            self.count = 0;
            self.window_start = now;
        }

        if self.count >= limit.max_requests {
            return false;
        }

        self.count += 1;
        true
    }

    /// Requests admitted in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// When the current window began.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Quota left in the current window.
    pub fn remaining(&self, limit: &Limit) -> u64 {
        limit.max_requests.saturating_sub(self.count)
    }

    /// Time until the current window is replaced.
    pub fn duration_until_reset(&self, limit: &Limit, now: Instant) -> Duration {
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= limit.window {
            Duration::ZERO
        } else {
            limit.window - elapsed
        }
    }

    /// Whether the entry has sat past its window plus `grace` without a reset.
    ///
    /// A stale entry carries no information: the next observation would reset
    /// it anyway, so it can be dropped.
    pub fn is_stale(&self, now: Instant, grace: Duration) -> bool {
        now.duration_since(self.window_start) >= self.window + grace
    }
}
