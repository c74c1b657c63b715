//! `solana-log-stream` - A resilient `logsSubscribe` connector for Solana.
//!
//! The connector opens a WebSocket session to a Solana RPC endpoint, subscribes
//! to transaction logs for a set of programs, keeps the session alive with
//! periodic pings, and reconnects with exponential backoff when the session
//! drops. Every received log notification is handed to the consumer exactly
//! once per receipt, in arrival order.
//!
//! # Quick Start
//!
//! ```no_run
//! use solana_log_stream::{LogEvent, LogStreamConfigBuilder, LogStreamConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     dotenvy::dotenv().ok();
//!
//!     let config = LogStreamConfigBuilder::new()
//!         .with_endpoint(std::env::var("SOLANA_WS_URL")?)
//!         .program_id("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8") // Raydium AMM v4
//!         .with_max_retries(5)
//!         .build()?;
//!
//!     let handle = LogStreamConnector::new(config)?
//!         .on_event(|event: LogEvent| {
//!             println!("slot {} {} ({} lines)", event.slot, event.signature, event.logs.len());
//!         })
//!         .start()?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Stateful handlers
//!
//! ```no_run
//! use async_trait::async_trait;
//! use solana_log_stream::{LogEvent, LogEventHandler, LogStreamError, Result};
//!
//! struct SwapCounter {
//!     swaps: u64,
//! }
//!
//! #[async_trait]
//! impl LogEventHandler for SwapCounter {
//!     async fn handle(&mut self, event: LogEvent) -> Result<()> {
//!         if !event.is_success() {
//!             return Err(LogStreamError::HandlerError(format!("{} failed", event.signature)));
//!         }
//!         if event.mentions("Instruction: Swap") {
//!             self.swaps += 1;
//!         }
//!         Ok(())
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! 1. **`LogStreamConfigBuilder`** - Validated configuration (builder or env)
//! 2. **`Transport` / `Connect`** - Streaming transport seam (WebSocket by default)
//! 3. **`classify`** - Sorts every inbound payload into ack, rejection,
//!    notification, unrecognized or malformed
//! 4. **`LogStreamConnector`** - Supervisor loop: connect, subscribe, receive,
//!    heartbeat, back off, reconnect
//! 5. **Delivery** - Sequential callback dispatch or pull-mode [`LogStream`]
//! 6. **`LogStreamHandle`** - State, metrics, stop and join
//!
//! Operational messages (state changes, transport errors, malformed payloads)
//! never reach the event consumer; they go to a [`DiagnosticSink`], which by
//! default forwards them to `tracing`.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Public API exports
pub use config::{
    BufferPolicy, CommitmentLevel, LogStreamConfig, LogStreamConfigBuilder, Overflow, RetryConfig,
};
pub use streams::connector::LogStreamConnector;
pub use streams::delivery::LogStream;
pub use streams::handle::{ConnectorState, LogStreamHandle};
pub use streams::protocol::{classify, Inbound, LogsFilter, SubscriptionRequest};
pub use streams::transport::{Connect, Frame, Transport, WsConnect, WsTransport};
pub use streams::{LogEvent, LogSource};
pub use types::diagnostic::{Diagnostic, DiagnosticKind};
pub use types::traits::{DiagnosticSink, LogEventHandler, TracingSink};
pub use utils::error::{LogStreamError, Result};
pub use utils::logging::LogLevel;
pub use utils::metrics::{ConnectorMetrics, MetricsSnapshot};

// Module declarations
pub mod config;
pub mod streams;
pub mod types;
pub mod utils;

/// Console telemetry. Requires the `telemetry` feature (on by default).
#[cfg(feature = "telemetry")]
pub mod telemetry;
