//! Floodgate - Client-Side Rate Limiting and Retry
//!
//! This crate implements cooperative, in-process rate limiting for HTTP API
//! clients. A sliding-window admission controller tracks past requests per
//! logical endpoint and decides whether a new attempt may proceed; a retry
//! driver waits out local exhaustion exactly and backs off exponentially on
//! server-signaled 429s; an intercepting client routes API-shaped URLs
//! through the limiter transparently and converts terminal exhaustion into
//! a synthesized 429 response.
//!
//! The limiter is advisory. It keeps well-behaved clients inside their
//! server-enforced quotas but cannot substitute for them.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
