//! Consumer-facing traits of the connector.
//!
//! Two collaborators plug into a running connector: a [`LogEventHandler`]
//! that receives every decoded notification, and a [`DiagnosticSink`] that
//! receives operational messages. Neither is implemented by this crate beyond
//! closure adapters and the tracing-backed default sink.

use crate::streams::LogEvent;
use crate::types::diagnostic::Diagnostic;
use crate::utils::error::Result;
use crate::utils::logging;
use async_trait::async_trait;

/// Consumer of the log stream.
///
/// The dispatcher owns the handler and awaits each call before starting the
/// next one, so a handler never runs concurrently with itself and sees events
/// in arrival order. Errors are reported to the diagnostic sink; the stream
/// keeps going.
///
/// Any `FnMut(LogEvent)` closure is a handler.
///
/// # Example
/// ```no_run
/// use async_trait::async_trait;
/// use solana_log_stream::{LogEvent, LogEventHandler, Result};
///
/// struct SwapCounter {
///     swaps: u64,
/// }
///
/// #[async_trait]
/// impl LogEventHandler for SwapCounter {
///     async fn handle(&mut self, event: LogEvent) -> Result<()> {
///         if event.logs.iter().any(|l| l.contains("Instruction: Swap")) {
///             self.swaps += 1;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait LogEventHandler: Send + 'static {
    /// Processes one event.
    async fn handle(&mut self, event: LogEvent) -> Result<()>;
}

#[async_trait]
impl<F> LogEventHandler for F
where
    F: FnMut(LogEvent) + Send + 'static,
{
    async fn handle(&mut self, event: LogEvent) -> Result<()> {
        (self)(event);
        Ok(())
    }
}

/// Receiver of human-readable operational messages.
///
/// Called synchronously from the connector's tasks; implementations should
/// return quickly.
pub trait DiagnosticSink: Send + Sync + 'static {
    fn report(&self, diagnostic: &Diagnostic);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&Diagnostic) + Send + Sync + 'static,
{
    fn report(&self, diagnostic: &Diagnostic) {
        (self)(diagnostic);
    }
}

/// Default sink: forwards every diagnostic to `tracing` at its level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        logging::log(
            diagnostic.level,
            &format!("[{}] {}", diagnostic.kind, diagnostic.message),
        );
    }
}
