//! Hand-off between the receive loop and the consumer.
//!
//! The receive loop pushes events into a queue shaped by [`BufferPolicy`].
//! On the other side either a dispatcher task drives the registered
//! [`LogEventHandler`] one event at a time, or the caller drains a
//! [`LogStream`] directly.

use super::{LogEvent, LogSource};
use crate::config::{BufferPolicy, Overflow};
use crate::types::diagnostic::{Diagnostic, DiagnosticKind};
use crate::types::traits::{DiagnosticSink, LogEventHandler};
use crate::utils::error::Result;
use crate::utils::logging::LogLevel;
use crate::utils::metrics::ConnectorMetrics;
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Outcome of handing one event to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivered {
    Accepted,
    /// Queue full under [`Overflow::DropNewest`].
    Dropped,
    /// The consumer side is gone.
    Closed,
}

pub(crate) enum DeliveryTx {
    Unbounded(mpsc::UnboundedSender<LogEvent>),
    Bounded {
        tx: mpsc::Sender<LogEvent>,
        overflow: Overflow,
    },
}

pub(crate) enum DeliveryRx {
    Unbounded(mpsc::UnboundedReceiver<LogEvent>),
    Bounded(mpsc::Receiver<LogEvent>),
}

/// Creates the queue for `policy`.
pub(crate) fn channel(policy: BufferPolicy) -> (DeliveryTx, DeliveryRx) {
    match policy {
        BufferPolicy::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (DeliveryTx::Unbounded(tx), DeliveryRx::Unbounded(rx))
        }
        BufferPolicy::Bounded { capacity, overflow } => {
            let (tx, rx) = mpsc::channel(capacity);
            (
                DeliveryTx::Bounded { tx, overflow },
                DeliveryRx::Bounded(rx),
            )
        }
    }
}

impl DeliveryTx {
    /// Queues `event`. Under [`Overflow::Block`] this waits for room.
    pub(crate) async fn deliver(&self, event: LogEvent) -> Delivered {
        match self {
            DeliveryTx::Unbounded(tx) => match tx.send(event) {
                Ok(()) => Delivered::Accepted,
                Err(_) => Delivered::Closed,
            },
            DeliveryTx::Bounded {
                tx,
                overflow: Overflow::Block,
            } => match tx.send(event).await {
                Ok(()) => Delivered::Accepted,
                Err(_) => Delivered::Closed,
            },
            DeliveryTx::Bounded {
                tx,
                overflow: Overflow::DropNewest,
            } => match tx.try_send(event) {
                Ok(()) => Delivered::Accepted,
                Err(TrySendError::Full(_)) => Delivered::Dropped,
                Err(TrySendError::Closed(_)) => Delivered::Closed,
            },
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        match self {
            DeliveryTx::Unbounded(tx) => tx.is_closed(),
            DeliveryTx::Bounded { tx, .. } => tx.is_closed(),
        }
    }
}

impl DeliveryRx {
    async fn recv(&mut self) -> Option<LogEvent> {
        match self {
            DeliveryRx::Unbounded(rx) => rx.recv().await,
            DeliveryRx::Bounded(rx) => rx.recv().await,
        }
    }

    fn try_recv(&mut self) -> Option<LogEvent> {
        match self {
            DeliveryRx::Unbounded(rx) => rx.try_recv().ok(),
            DeliveryRx::Bounded(rx) => rx.try_recv().ok(),
        }
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<LogEvent>> {
        match self {
            DeliveryRx::Unbounded(rx) => rx.poll_recv(cx),
            DeliveryRx::Bounded(rx) => rx.poll_recv(cx),
        }
    }
}

/// Drives `handler` with every queued event, strictly one at a time.
///
/// Returns once the sending side is dropped and the queue is drained.
pub(crate) async fn dispatch(
    mut rx: DeliveryRx,
    mut handler: Box<dyn LogEventHandler>,
    sink: Arc<dyn DiagnosticSink>,
    metrics: Arc<ConnectorMetrics>,
) {
    while let Some(event) = rx.recv().await {
        let signature = event.signature.clone();
        metrics.inc_delivered();
        if let Err(e) = handler.handle(event).await {
            metrics.inc_handler_errors();
            sink.report(&Diagnostic::new(
                DiagnosticKind::HandlerError,
                LogLevel::Warning,
                format!("handler failed for {signature}: {e}"),
            ));
        }
    }
}

/// Pull-mode consumer side of a connector.
///
/// Dropping the stream stops the connector at its next delivery attempt.
pub struct LogStream {
    rx: DeliveryRx,
    batch_size: usize,
    metrics: Arc<ConnectorMetrics>,
}

impl LogStream {
    pub(crate) fn new(rx: DeliveryRx, batch_size: usize, metrics: Arc<ConnectorMetrics>) -> Self {
        Self {
            rx,
            batch_size,
            metrics,
        }
    }

    /// Waits for the next event. `None` once the connector has ended and the
    /// buffer is empty.
    pub async fn next_event(&mut self) -> Option<LogEvent> {
        let event = self.rx.recv().await;
        if event.is_some() {
            self.metrics.inc_delivered();
        }
        event
    }
}

#[async_trait]
impl LogSource for LogStream {
    async fn next_batch(&mut self) -> Result<Vec<LogEvent>> {
        let mut events = Vec::new();

        // Block for at least one
        match self.rx.recv().await {
            Some(event) => events.push(event),
            None => return Ok(events),
        }

        while events.len() < self.batch_size {
            match self.rx.try_recv() {
                Some(event) => events.push(event),
                None => break,
            }
        }

        for _ in &events {
            self.metrics.inc_delivered();
        }
        Ok(events)
    }

    fn source_name(&self) -> &str {
        "WebSocket logsSubscribe"
    }
}

impl Stream for LogStream {
    type Item = LogEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<LogEvent>> {
        let poll = self.rx.poll_recv(cx);
        if let Poll::Ready(Some(_)) = &poll {
            self.metrics.inc_delivered();
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::LogStreamError;
    use futures_util::StreamExt;
    use std::sync::Mutex;

    fn event(slot: u64) -> LogEvent {
        LogEvent {
            slot,
            signature: format!("sig{slot}"),
            err: None,
            logs: vec![],
        }
    }

    #[tokio::test]
    async fn test_drop_newest_when_full() {
        let (tx, mut rx) = channel(BufferPolicy::Bounded {
            capacity: 2,
            overflow: Overflow::DropNewest,
        });
        assert_eq!(tx.deliver(event(1)).await, Delivered::Accepted);
        assert_eq!(tx.deliver(event(2)).await, Delivered::Accepted);
        assert_eq!(tx.deliver(event(3)).await, Delivered::Dropped);

        assert_eq!(rx.recv().await.map(|e| e.slot), Some(1));
        assert_eq!(rx.recv().await.map(|e| e.slot), Some(2));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_block_waits_for_room() {
        let (tx, mut rx) = channel(BufferPolicy::Bounded {
            capacity: 1,
            overflow: Overflow::Block,
        });
        assert_eq!(tx.deliver(event(1)).await, Delivered::Accepted);

        let sender = tokio::spawn(async move { tx.deliver(event(2)).await });
        tokio::task::yield_now().await;
        assert!(!sender.is_finished());

        assert_eq!(rx.recv().await.map(|e| e.slot), Some(1));
        assert_eq!(sender.await.unwrap(), Delivered::Accepted);
        assert_eq!(rx.recv().await.map(|e| e.slot), Some(2));
    }

    #[tokio::test]
    async fn test_closed_when_consumer_gone() {
        let (tx, rx) = channel(BufferPolicy::Unbounded);
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.deliver(event(1)).await, Delivered::Closed);
    }

    #[tokio::test]
    async fn test_dispatch_in_order_and_reports_handler_errors() {
        struct Recorder {
            seen: Arc<Mutex<Vec<u64>>>,
        }

        #[async_trait]
        impl LogEventHandler for Recorder {
            async fn handle(&mut self, event: LogEvent) -> Result<()> {
                self.seen.lock().unwrap().push(event.slot);
                if event.slot == 2 {
                    return Err(LogStreamError::HandlerError("boom".into()));
                }
                Ok(())
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let diagnostics = Arc::new(Mutex::new(Vec::new()));
        let diagnostics_sink = diagnostics.clone();
        let sink: Arc<dyn DiagnosticSink> = Arc::new(move |d: &Diagnostic| {
            diagnostics_sink.lock().unwrap().push(d.kind);
        });
        let metrics = Arc::new(ConnectorMetrics::default());

        let (tx, rx) = channel(BufferPolicy::Unbounded);
        for slot in 1..=3 {
            tx.deliver(event(slot)).await;
        }
        drop(tx);

        dispatch(
            rx,
            Box::new(Recorder { seen: seen.clone() }),
            sink,
            metrics.clone(),
        )
        .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(
            *diagnostics.lock().unwrap(),
            vec![DiagnosticKind::HandlerError]
        );
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_delivered, 3);
        assert_eq!(snapshot.handler_errors, 1);
    }

    #[tokio::test]
    async fn test_log_stream_batches() {
        let metrics = Arc::new(ConnectorMetrics::default());
        let (tx, rx) = channel(BufferPolicy::Unbounded);
        let mut stream = LogStream::new(rx, 2, metrics.clone());
        for slot in 1..=3 {
            tx.deliver(event(slot)).await;
        }

        let batch = stream.next_batch().await.unwrap();
        assert_eq!(batch.iter().map(|e| e.slot).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(stream.next().await.map(|e| e.slot), Some(3));

        drop(tx);
        assert!(stream.next_batch().await.unwrap().is_empty());
        assert_eq!(metrics.snapshot().events_delivered, 3);
        assert_eq!(stream.source_name(), "WebSocket logsSubscribe");
    }
}
