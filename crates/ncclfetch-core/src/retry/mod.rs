//! Retry and backoff policy for digest mismatches.
//!
//! Only verification failures are retried; network and local I/O errors end
//! the attempt immediately.

mod policy;

pub use policy::{RetryDecision, RetryPolicy};
