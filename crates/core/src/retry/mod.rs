//! Retry subsystem.
//!
//! Failed jobs move `failed → retrying`, wait out an exponential backoff, and
//! are re-dispatched one at a time per job through the orchestrator. A job
//! stops being retried once it succeeds or reaches `max_retries` attempts.

mod backoff;
mod handler;

pub use backoff::BackoffPolicy;
pub use handler::{RetryHandler, RetryReport};
