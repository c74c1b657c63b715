//! Operational messages emitted by the connector.

use crate::utils::logging::LogLevel;
use std::fmt;

/// What a [`Diagnostic`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Lifecycle state changed.
    StateChange,
    /// The endpoint acknowledged the subscription.
    Subscribed,
    /// A connection attempt or a live session failed.
    TransportError,
    /// A reconnection was scheduled after a backoff delay.
    RetryScheduled,
    /// The retry budget ran out; the connector failed.
    RetryExhausted,
    /// An inbound payload could not be parsed.
    MalformedPayload,
    /// An inbound payload parsed but is not something the connector handles.
    UnrecognizedPayload,
    /// An event was discarded because the delivery buffer was full.
    EventDropped,
    /// The registered handler returned an error.
    HandlerError,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::StateChange => "state",
            DiagnosticKind::Subscribed => "subscribed",
            DiagnosticKind::TransportError => "transport",
            DiagnosticKind::RetryScheduled => "retry",
            DiagnosticKind::RetryExhausted => "exhausted",
            DiagnosticKind::MalformedPayload => "malformed",
            DiagnosticKind::UnrecognizedPayload => "unrecognized",
            DiagnosticKind::EventDropped => "dropped",
            DiagnosticKind::HandlerError => "handler",
        };
        f.write_str(name)
    }
}

/// One operational message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub level: LogLevel,
    pub message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(kind: DiagnosticKind, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            kind,
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}
