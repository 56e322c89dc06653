//! Retry with backoff for connection establishment
//!
//! This module decides whether and when a failed connect attempt is retried.
//! A policy is stateless: each `acquire` that needs a new session runs its
//! own attempt sequence of at most `max_retries + 1` attempts.
//!
//! # Example
//!
//! ```ignore
//! use fleetdeck_pool::reconnect::{RetryPolicy, retry_with_backoff};
//!
//! let policy = RetryPolicy::fixed(2, Duration::from_millis(500));
//! let session = retry_with_backoff(&policy, |_attempt| transport.connect(&host, timeout), |_, _| {})
//!     .await?;
//! ```

mod backoff;
mod retry;


pub use backoff::RetryPolicy;
pub use retry::{RetryExhausted, retry_with_backoff};
