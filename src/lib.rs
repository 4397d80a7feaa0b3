//! Floodgate - Per-Client Request Admission Service
//!
//! This crate implements a request admission service built around a
//! fixed-window rate limiter: request counts are tracked per client
//! identifier inside a fixed time window and each request is admitted or
//! rejected against a configurable threshold. The decision core is pure over
//! an injected clock and store; an HTTP layer exposes it as a check API and
//! as middleware for embedding in other services.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
