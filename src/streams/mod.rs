//! The log-subscription stream: wire protocol, transport, delivery and the
//! reconnecting connector that ties them together.
//!
//! The `LogSource` trait is the pull-side interface, mirroring how a consumer
//! drains events in batches; callback consumers use
//! [`crate::types::traits::LogEventHandler`] instead.

use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One `logsNotification` from the endpoint.
///
/// Identity is the signature only. The same transaction may be delivered more
/// than once (for instance around a reconnect); consumers deduplicate if they
/// need to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Slot the transaction was processed in.
    pub slot: u64,
    /// Base58 transaction signature, exactly as sent by the endpoint.
    pub signature: String,
    /// Transaction error, `None` when the transaction succeeded.
    pub err: Option<serde_json::Value>,
    /// Program log lines in execution order.
    pub logs: Vec<String>,
}

impl LogEvent {
    /// `true` when the transaction executed without error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.err.as_ref().map_or(true, serde_json::Value::is_null)
    }

    /// `true` when any log line contains `needle`.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.logs.iter().any(|line| line.contains(needle))
    }
}

/// Pull-side interface over a stream of log events.
#[async_trait]
pub trait LogSource: Send {
    /// Get the next batch of log events.
    ///
    /// Waits until at least one event is available and then drains whatever is
    /// already buffered, up to the configured batch size. Returns an empty
    /// batch once the stream has ended.
    async fn next_batch(&mut self) -> Result<Vec<LogEvent>>;

    /// Get a human-readable name for this source (for logging)
    fn source_name(&self) -> &str;
}

pub mod connector;
pub mod delivery;
pub mod handle;
pub mod protocol;
pub mod transport;
