//! Lifecycle state and the caller's handle on a running connector.

use crate::utils::error::{LogStreamError, Result};
use crate::utils::logging;
use crate::utils::metrics::{ConnectorMetrics, MetricsSnapshot};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a connector.
///
/// ```text
/// Idle → Connecting → Subscribed → Receiving
///             ↑            │            │
///             └── Reconnecting ←────────┘
///                     │
///                   Failed          (any) → Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorState {
    /// Created, no network activity yet.
    Idle,
    /// Transport handshake in progress.
    Connecting,
    /// Subscribe request sent, waiting for the acknowledgment.
    Subscribed,
    /// Acknowledged; events flow and the heartbeat runs.
    Receiving,
    /// Waiting out a backoff delay.
    Reconnecting,
    /// Retry budget exhausted. Terminal.
    Failed,
    /// Stopped on request. Terminal.
    Stopped,
}

impl ConnectorState {
    /// `true` for `Failed` and `Stopped`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectorState::Failed | ConnectorState::Stopped)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectorState::Idle => "idle",
            ConnectorState::Connecting => "connecting",
            ConnectorState::Subscribed => "subscribed",
            ConnectorState::Receiving => "receiving",
            ConnectorState::Reconnecting => "reconnecting",
            ConnectorState::Failed => "failed",
            ConnectorState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writer side of the connector state, owned by the supervisor loop.
pub(crate) struct StateCell {
    tx: watch::Sender<ConnectorState>,
}

impl StateCell {
    pub(crate) fn new() -> (Self, watch::Receiver<ConnectorState>) {
        let (tx, rx) = watch::channel(ConnectorState::Idle);
        (Self { tx }, rx)
    }

    pub(crate) fn get(&self) -> ConnectorState {
        *self.tx.borrow()
    }

    /// Moves to `next`. Terminal states are sticky: once `Failed` or
    /// `Stopped` is reached every later transition is a no-op. Returns
    /// whether the state changed.
    pub(crate) fn transition(&self, next: ConnectorState) -> bool {
        let mut from = None;
        self.tx.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                return false;
            }
            from = Some(*state);
            *state = next;
            true
        });

        match from {
            Some(from) => {
                logging::log_transition(from.as_str(), next.as_str());
                true
            }
            None => false,
        }
    }
}

/// Caller-side handle of a started connector.
///
/// Dropping the handle does not stop the connector; call
/// [`LogStreamHandle::stop`] for that.
pub struct LogStreamHandle {
    state: watch::Receiver<ConnectorState>,
    cancel: CancellationToken,
    metrics: Arc<ConnectorMetrics>,
    supervisor: JoinHandle<Result<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl LogStreamHandle {
    pub(crate) fn new(
        state: watch::Receiver<ConnectorState>,
        cancel: CancellationToken,
        metrics: Arc<ConnectorMetrics>,
        supervisor: JoinHandle<Result<()>>,
        dispatcher: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            state,
            cancel,
            metrics,
            supervisor,
            dispatcher,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectorState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectorState> {
        self.state.clone()
    }

    /// Waits until the state satisfies `predicate` and returns that state.
    ///
    /// If the connector ends without ever satisfying it, returns the final state.
    pub async fn wait_for_state<F>(&self, predicate: F) -> ConnectorState
    where
        F: FnMut(&ConnectorState) -> bool,
    {
        let mut rx = self.state.clone();
        let reached = match rx.wait_for(predicate).await {
            Ok(state) => Some(*state),
            Err(_) => None,
        };
        reached.unwrap_or_else(|| *rx.borrow())
    }

    /// Requests a graceful stop. Idempotent.
    ///
    /// Every pending wait (handshake, receive, backoff) is cancelled and no new
    /// connection attempt starts afterwards.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// `true` once [`LogStreamHandle::stop`] was called.
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Point-in-time copy of the connector metrics.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Logs the current metrics through `tracing`.
    pub fn report_metrics(&self) {
        self.metrics.report();
    }

    /// Subscription id of the live connection, if receiving.
    #[must_use]
    pub fn subscription_id(&self) -> Option<u64> {
        self.metrics.subscription_id()
    }

    /// Retry counter of the current failure streak (0 when healthy).
    #[must_use]
    pub fn retry_attempt(&self) -> u32 {
        self.metrics.retry_attempt()
    }

    /// Waits for the connector to end.
    ///
    /// Buffered events are still handed to the registered handler before this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns the terminal error when the connector reached `Failed`
    /// (normally `LogStreamError::RetryExhausted`). `Stopped` is `Ok(())`.
    pub async fn join(self) -> Result<()> {
        let result = self
            .supervisor
            .await
            .map_err(|e| LogStreamError::InternalError(format!("connector task: {e}")))?;
        if let Some(dispatcher) = self.dispatcher {
            if let Err(e) = dispatcher.await {
                logging::log_error("Dispatcher task", &e.to_string());
            }
        }
        result
    }

    /// [`LogStreamHandle::stop`] followed by [`LogStreamHandle::join`].
    ///
    /// # Errors
    ///
    /// Same as [`LogStreamHandle::join`].
    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        self.join().await
    }
}
