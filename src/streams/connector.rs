//! Reconnecting `logsSubscribe` connector.
//!
//! A single supervisor task owns the whole lifecycle: connect, subscribe,
//! receive with heartbeat, back off, reconnect. It is an explicit loop over
//! sessions; every session owns one [`Connection`] which is dropped when the
//! session ends, so there is never more than one live connection per
//! connector. Every wait inside the loop races the connector's cancellation
//! token, which is what makes `stop()` prompt.

use super::delivery::{self, Delivered, DeliveryTx, LogStream};
use super::handle::{ConnectorState, LogStreamHandle, StateCell};
use super::protocol::{classify, unsubscribe_text, Inbound, SubscriptionRequest};
use super::transport::{Connect, Frame, Transport, WsConnect};
use super::LogEvent;
use crate::config::LogStreamConfig;
use crate::types::diagnostic::{Diagnostic, DiagnosticKind};
use crate::types::traits::{DiagnosticSink, LogEventHandler, TracingSink};
use crate::utils::error::{LogStreamError, Result};
use crate::utils::logging::{self, LogLevel};
use crate::utils::metrics::ConnectorMetrics;
use crate::utils::retry::{is_transient, RetryState};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Upper bound on the best-effort unsubscribe + close on stop.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest wait ever scheduled on the clock. Larger configured durations are
/// clamped so deadline arithmetic on `Instant` cannot overflow.
const MAX_WAIT: Duration = Duration::from_secs(86_400 * 365 * 30);

type FailureCallback = Box<dyn FnOnce(&LogStreamError) + Send + 'static>;

/// Builder and entry point of a log-stream connector.
///
/// # Example
///
/// ```no_run
/// use solana_log_stream::{LogEvent, LogStreamConfigBuilder, LogStreamConnector};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = LogStreamConfigBuilder::new()
///     .with_endpoint("wss://api.mainnet-beta.solana.com")
///     .program_id("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8")
///     .build()?;
///
/// let handle = LogStreamConnector::new(config)?
///     .on_event(|event: LogEvent| println!("{} @ {}", event.signature, event.slot))
///     .on_failure(|err| eprintln!("log stream gave up: {err}"))
///     .start()?;
///
/// // ... later
/// handle.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct LogStreamConnector<C: Connect = WsConnect> {
    config: LogStreamConfig,
    connect: C,
    handler: Option<Box<dyn LogEventHandler>>,
    on_failure: Option<FailureCallback>,
    sink: Arc<dyn DiagnosticSink>,
}

impl LogStreamConnector<WsConnect> {
    /// Creates a connector over the default WebSocket transport.
    ///
    /// # Errors
    ///
    /// Returns `LogStreamError::ConfigError` if `config` is invalid.
    pub fn new(config: LogStreamConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connect: WsConnect,
            handler: None,
            on_failure: None,
            sink: Arc::new(TracingSink),
        })
    }
}

impl<C: Connect> LogStreamConnector<C> {
    /// Replaces the transport.
    #[must_use]
    pub fn with_transport<D: Connect>(self, connect: D) -> LogStreamConnector<D> {
        LogStreamConnector {
            config: self.config,
            connect,
            handler: self.handler,
            on_failure: self.on_failure,
            sink: self.sink,
        }
    }

    /// Registers the consumer invoked once per received event, in order.
    #[must_use]
    pub fn on_event<H: LogEventHandler>(mut self, handler: H) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Registers a callback run once if the connector reaches `Failed`.
    #[must_use]
    pub fn on_failure<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&LogStreamError) + Send + 'static,
    {
        self.on_failure = Some(Box::new(callback));
        self
    }

    /// Replaces the default tracing-backed diagnostic sink.
    #[must_use]
    pub fn with_diagnostics<S: DiagnosticSink>(mut self, sink: S) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Starts the connector in callback mode and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns `LogStreamError::ConfigError` if no handler was registered or
    /// if called outside a Tokio runtime.
    pub fn start(mut self) -> Result<LogStreamHandle> {
        let handler = self.handler.take().ok_or_else(|| {
            LogStreamError::ConfigError(
                "No event handler registered. Use .on_event() or .into_stream()".to_string(),
            )
        })?;
        let runtime = current_runtime()?;

        let (tx, rx) = delivery::channel(self.config.buffer);
        let metrics = Arc::new(ConnectorMetrics::default());
        let dispatcher = runtime.spawn(delivery::dispatch(
            rx,
            handler,
            self.sink.clone(),
            metrics.clone(),
        ));

        Ok(self.spawn_supervisor(&runtime, tx, metrics, Some(dispatcher)))
    }

    /// Starts the connector in pull mode.
    ///
    /// Events are read from the returned [`LogStream`]; dropping it stops the
    /// connector.
    ///
    /// # Errors
    ///
    /// Returns `LogStreamError::ConfigError` if a handler was registered or if
    /// called outside a Tokio runtime.
    pub fn into_stream(self) -> Result<(LogStreamHandle, LogStream)> {
        if self.handler.is_some() {
            return Err(LogStreamError::ConfigError(
                "An event handler is registered. Use .start() instead".to_string(),
            ));
        }
        let runtime = current_runtime()?;

        let (tx, rx) = delivery::channel(self.config.buffer);
        let metrics = Arc::new(ConnectorMetrics::default());
        let stream = LogStream::new(rx, self.config.batch_size, metrics.clone());

        let handle = self.spawn_supervisor(&runtime, tx, metrics, None);
        Ok((handle, stream))
    }

    fn spawn_supervisor(
        self,
        runtime: &tokio::runtime::Handle,
        delivery: DeliveryTx,
        metrics: Arc<ConnectorMetrics>,
        dispatcher: Option<tokio::task::JoinHandle<()>>,
    ) -> LogStreamHandle {
        let (state, state_rx) = StateCell::new();
        let cancel = CancellationToken::new();

        let supervisor = Supervisor {
            config: self.config,
            connect: self.connect,
            state,
            metrics: metrics.clone(),
            sink: self.sink,
            delivery,
            cancel: cancel.clone(),
        };
        let on_failure = self.on_failure;

        let task = runtime.spawn(async move {
            let result = supervisor.run().await;
            if let (Err(err), Some(callback)) = (&result, on_failure) {
                callback(err);
            }
            result
        });

        LogStreamHandle::new(state_rx, cancel, metrics, task, dispatcher)
    }
}

fn current_runtime() -> Result<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        LogStreamError::ConfigError("The connector must be started inside a Tokio runtime".into())
    })
}

/// One transport session. Replaced, never reused, on reconnect.
struct Connection<T> {
    endpoint: String,
    transport: T,
    request_id: u64,
    subscription: Option<u64>,
    opened_at: Instant,
    last_activity: Instant,
}

impl<T: Transport> Connection<T> {
    fn new(endpoint: String, transport: T, request_id: u64) -> Self {
        let now = Instant::now();
        Self {
            endpoint,
            transport,
            request_id,
            subscription: None,
            opened_at: now,
            last_activity: now,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Why a session ended.
#[derive(Debug)]
enum SessionEnd {
    Stopped,
    ConsumerGone,
    Failed(LogStreamError),
}

/// Where a session is in its handshake.
#[derive(Debug, Clone, Copy)]
enum Phase {
    AwaitingAck { request_id: u64 },
    Receiving,
}

/// Result of processing one inbound frame.
enum Step {
    Continue,
    Acknowledged(u64),
    End(SessionEnd),
}

/// What woke the receive loop.
enum Wake {
    Cancelled,
    Heartbeat,
    Frame(Option<Result<Frame>>),
}

struct Supervisor<C: Connect> {
    config: LogStreamConfig,
    connect: C,
    state: StateCell,
    metrics: Arc<ConnectorMetrics>,
    sink: Arc<dyn DiagnosticSink>,
    delivery: DeliveryTx,
    cancel: CancellationToken,
}

impl<C: Connect> Supervisor<C> {
    async fn run(self) -> Result<()> {
        logging::log_startup(
            &self.config.endpoint,
            &self.config.filter.to_string(),
            self.config.retry.max_retries,
            self.config.keepalive_interval.as_secs(),
        );

        let mut retry = RetryState::new(self.config.retry);
        let mut request_id: u64 = 0;

        loop {
            if self.cancel.is_cancelled() || self.delivery.is_closed() {
                self.enter(ConnectorState::Stopped);
                return Ok(());
            }

            self.enter(ConnectorState::Connecting);
            request_id += 1;

            let err = match self.run_session(request_id, &mut retry).await {
                SessionEnd::Stopped => {
                    self.enter(ConnectorState::Stopped);
                    return Ok(());
                }
                SessionEnd::ConsumerGone => {
                    self.report(
                        DiagnosticKind::StateChange,
                        LogLevel::Info,
                        "Consumer dropped the stream, stopping",
                    );
                    self.enter(ConnectorState::Stopped);
                    return Ok(());
                }
                SessionEnd::Failed(err) => err,
            };

            self.metrics.clear_subscription();
            self.report(
                DiagnosticKind::TransportError,
                LogLevel::Warning,
                err.to_string(),
            );

            if !is_transient(&err) {
                self.enter(ConnectorState::Failed);
                return Err(err);
            }

            self.enter(ConnectorState::Reconnecting);

            let Some(delay) = retry.next_delay() else {
                let exhausted = LogStreamError::RetryExhausted {
                    attempts: retry.attempts_made(),
                    last_error: err.to_string(),
                };
                self.report(
                    DiagnosticKind::RetryExhausted,
                    LogLevel::Error,
                    exhausted.to_string(),
                );
                self.enter(ConnectorState::Failed);
                return Err(exhausted);
            };

            self.metrics.set_retry_attempt(retry.attempt());
            self.metrics.inc_reconnects();
            self.report(
                DiagnosticKind::RetryScheduled,
                LogLevel::Warning,
                format!(
                    "Reconnecting in {delay:?} (retry {}/{})",
                    retry.attempt(),
                    self.config.retry.max_retries
                ),
            );

            if or_cancel(&self.cancel, sleep(delay)).await.is_none() {
                self.enter(ConnectorState::Stopped);
                return Ok(());
            }
        }
    }

    async fn run_session(&self, request_id: u64, retry: &mut RetryState) -> SessionEnd {
        self.metrics.inc_connection_attempts();

        let endpoint = self.config.endpoint.clone();
        let handshake = timeout(self.config.handshake_timeout, self.connect.connect(&endpoint));
        let transport = match or_cancel(&self.cancel, handshake).await {
            None => return SessionEnd::Stopped,
            Some(Err(_)) => {
                return SessionEnd::Failed(LogStreamError::Timeout(format!(
                    "handshake with {} did not complete within {:?}",
                    logging::sanitize_url(&endpoint),
                    self.config.handshake_timeout
                )))
            }
            Some(Ok(Err(e))) => return SessionEnd::Failed(e),
            Some(Ok(Ok(transport))) => transport,
        };
        let mut conn = Connection::new(endpoint, transport, request_id);

        let request = SubscriptionRequest::new(
            request_id,
            self.config.filter.clone(),
            self.config.commitment,
        );
        self.enter(ConnectorState::Subscribed);
        match or_cancel(&self.cancel, conn.transport.send(Frame::Text(request.to_text()))).await
        {
            None => return self.close(&mut conn).await,
            Some(Err(e)) => return SessionEnd::Failed(e),
            Some(Ok(())) => {}
        }

        let subscription = match self.await_ack(&mut conn, request.id).await {
            Ok(subscription) => subscription,
            Err(end) => return end,
        };

        conn.subscription = Some(subscription);
        retry.reset();
        self.metrics.record_subscribed(subscription);
        self.enter(ConnectorState::Receiving);
        self.report(
            DiagnosticKind::Subscribed,
            LogLevel::Success,
            format!(
                "Subscribed to {} at {} (subscription {subscription}, after {:?})",
                self.config.filter,
                logging::sanitize_url(&conn.endpoint),
                conn.opened_at.elapsed()
            ),
        );

        self.receive(&mut conn).await
    }

    /// Waits for the acknowledgment of `request_id`, bounded by `ack_timeout`.
    async fn await_ack(
        &self,
        conn: &mut Connection<C::Transport>,
        request_id: u64,
    ) -> std::result::Result<u64, SessionEnd> {
        let deadline = deadline_after(self.config.ack_timeout);
        let phase = Phase::AwaitingAck { request_id };

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                _ = sleep_until(deadline) => {
                    return Err(SessionEnd::Failed(LogStreamError::Timeout(format!(
                        "no subscription acknowledgment within {:?}",
                        self.config.ack_timeout
                    ))));
                }
                frame = conn.transport.recv() => Some(frame),
            };
            let Some(frame) = frame else {
                return Err(self.close(conn).await);
            };

            match self.process_frame(conn, frame, phase).await {
                Step::Continue => {}
                Step::Acknowledged(subscription) => return Ok(subscription),
                Step::End(SessionEnd::Stopped) => return Err(self.close(conn).await),
                Step::End(SessionEnd::ConsumerGone) => {
                    self.close(conn).await;
                    return Err(SessionEnd::ConsumerGone);
                }
                Step::End(end) => return Err(end),
            }
        }
    }

    /// Receive loop with heartbeat. Returns when the session ends.
    async fn receive(&self, conn: &mut Connection<C::Transport>) -> SessionEnd {
        let keepalive = self.config.keepalive_interval.min(MAX_WAIT);
        let mut heartbeat = interval_at(deadline_after(keepalive), keepalive);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // The tick is polled before recv so a backlog of inbound frames
            // cannot hold back a due keepalive.
            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Wake::Cancelled,
                _ = heartbeat.tick() => Wake::Heartbeat,
                frame = conn.transport.recv() => Wake::Frame(frame),
            };

            match wake {
                Wake::Cancelled => return self.close(conn).await,
                Wake::Heartbeat => {
                    if let Some(idle) = self.config.idle_timeout {
                        if conn.last_activity.elapsed() >= idle {
                            return SessionEnd::Failed(LogStreamError::Timeout(format!(
                                "no inbound traffic for {idle:?}"
                            )));
                        }
                    }
                    match or_cancel(&self.cancel, conn.transport.send(Frame::Ping(Vec::new())))
                        .await
                    {
                        None => return self.close(conn).await,
                        Some(Err(e)) => {
                            return SessionEnd::Failed(LogStreamError::ConnectionError(format!(
                                "heartbeat failed: {e}"
                            )))
                        }
                        Some(Ok(())) => self.metrics.inc_heartbeats(),
                    }
                }
                Wake::Frame(frame) => match self.process_frame(conn, frame, Phase::Receiving).await
                {
                    Step::Continue | Step::Acknowledged(_) => {}
                    Step::End(SessionEnd::Stopped) => return self.close(conn).await,
                    Step::End(SessionEnd::ConsumerGone) => {
                        self.close(conn).await;
                        return SessionEnd::ConsumerGone;
                    }
                    Step::End(end) => return end,
                },
            }
        }
    }

    async fn process_frame(
        &self,
        conn: &mut Connection<C::Transport>,
        frame: Option<Result<Frame>>,
        phase: Phase,
    ) -> Step {
        let frame = match frame {
            None => {
                return Step::End(SessionEnd::Failed(LogStreamError::ConnectionError(
                    "connection closed by peer".to_string(),
                )))
            }
            Some(Err(e)) => return Step::End(SessionEnd::Failed(e)),
            Some(Ok(frame)) => frame,
        };
        conn.touch();

        let text = match frame {
            Frame::Text(text) => text,
            Frame::Ping(_) | Frame::Pong(_) => return Step::Continue,
            Frame::Close => {
                return Step::End(SessionEnd::Failed(LogStreamError::ConnectionError(
                    "endpoint closed the connection".to_string(),
                )))
            }
            Frame::Binary(data) => {
                self.unrecognized(format!("binary frame of {} bytes", data.len()));
                return Step::Continue;
            }
        };

        match classify(&text) {
            Inbound::Ack { id, subscription } => {
                self.metrics.inc_acknowledgements();
                match phase {
                    Phase::AwaitingAck { request_id } if id == request_id => {
                        Step::Acknowledged(subscription)
                    }
                    _ => {
                        tracing::debug!(id, subscription, "Recorded stray acknowledgment");
                        Step::Continue
                    }
                }
            }
            Inbound::Rejected { id, code, message } => match phase {
                Phase::AwaitingAck { request_id } if id.map_or(true, |id| id == request_id) => {
                    Step::End(SessionEnd::Failed(LogStreamError::SubscriptionRejected {
                        code,
                        message,
                    }))
                }
                _ => {
                    self.unrecognized(format!("error response (code {code}): {message}"));
                    Step::Continue
                }
            },
            Inbound::Notification {
                subscription,
                event,
            } => match conn.subscription {
                Some(active) if active != subscription => {
                    self.unrecognized(format!(
                        "notification for subscription {subscription}, active is {active}"
                    ));
                    Step::Continue
                }
                _ => self.forward(event).await,
            },
            Inbound::Unrecognized(reason) => {
                self.unrecognized(reason);
                Step::Continue
            }
            Inbound::Malformed(reason) => {
                self.metrics.inc_malformed();
                let err = LogStreamError::ProtocolError(format!(
                    "{reason} (payload: {})",
                    truncate(&text, 256)
                ));
                self.report(
                    DiagnosticKind::MalformedPayload,
                    LogLevel::Warning,
                    err.to_string(),
                );
                Step::Continue
            }
        }
    }

    /// Hands one event to the consumer queue.
    async fn forward(&self, event: LogEvent) -> Step {
        self.metrics.record_event(event.slot);
        logging::log_event(&event.signature, event.slot, event.logs.len());

        let signature = event.signature.clone();
        match or_cancel(&self.cancel, self.delivery.deliver(event)).await {
            None => Step::End(SessionEnd::Stopped),
            Some(Delivered::Accepted) => Step::Continue,
            Some(Delivered::Dropped) => {
                self.metrics.inc_dropped();
                self.report(
                    DiagnosticKind::EventDropped,
                    LogLevel::Warning,
                    format!("delivery buffer full, dropped {signature}"),
                );
                Step::Continue
            }
            Some(Delivered::Closed) => Step::End(SessionEnd::ConsumerGone),
        }
    }

    /// Best-effort unsubscribe and close, bounded by [`CLOSE_TIMEOUT`].
    async fn close(&self, conn: &mut Connection<C::Transport>) -> SessionEnd {
        let subscription = conn.subscription;
        let unsubscribe_id = conn.request_id + 1;
        let transport = &mut conn.transport;
        let graceful = async {
            if let Some(subscription) = subscription {
                let _ = transport
                    .send(Frame::Text(unsubscribe_text(unsubscribe_id, subscription)))
                    .await;
            }
            transport.close().await
        };

        match timeout(CLOSE_TIMEOUT, graceful).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Close after stop failed"),
            Err(_) => tracing::debug!("Close after stop timed out"),
        }
        SessionEnd::Stopped
    }

    fn enter(&self, next: ConnectorState) {
        let from = self.state.get();
        if self.state.transition(next) {
            self.report(
                DiagnosticKind::StateChange,
                LogLevel::Debug,
                format!("{from} -> {next}"),
            );
        }
    }

    fn unrecognized(&self, reason: String) {
        self.metrics.inc_unrecognized();
        self.report(DiagnosticKind::UnrecognizedPayload, LogLevel::Debug, reason);
    }

    fn report(&self, kind: DiagnosticKind, level: LogLevel, message: impl Into<String>) {
        self.sink.report(&Diagnostic::new(kind, level, message));
    }
}

fn deadline_after(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait).unwrap_or_else(|| now + MAX_WAIT)
}

/// Runs `fut` unless `cancel` fires first.
async fn or_cancel<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
