//! Rate limiting logic and state management.

mod identity;
mod limiter;
mod rules;
mod store;
mod window;

pub use identity::{BucketKey, ClientId, UNKNOWN_CLIENT};
pub use limiter::RateLimiter;
pub use rules::{LimitRules, LimitSpec, RouteRule, DEFAULT_SCOPE};
pub use store::{spawn_sweeper, AdmissionStore, Decision, InMemoryStore};
pub use window::{ClientWindow, Limit};
