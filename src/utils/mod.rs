//! Shared utilities: errors, logging, retry/backoff and runtime metrics.

pub mod error;
pub mod logging;
pub mod metrics;
pub mod retry;
