//! Runtime metrics for a log-stream connector.
//!
//! `ConnectorMetrics` is shared between the supervisor loop, the dispatcher
//! and the caller's handle. All counters are relaxed atomics; a snapshot is
//! a consistent-enough view for dashboards and tests, not a transaction.

use crate::utils::error::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const NO_SUBSCRIPTION: u64 = u64::MAX;

/// Live counters for one connector instance.
#[derive(Debug)]
pub struct ConnectorMetrics {
    connection_attempts: AtomicU64,
    subscriptions: AtomicU64,
    reconnects: AtomicU64,
    heartbeats_sent: AtomicU64,
    acknowledgements: AtomicU64,
    events_received: AtomicU64,
    events_delivered: AtomicU64,
    events_dropped: AtomicU64,
    malformed_payloads: AtomicU64,
    unrecognized_payloads: AtomicU64,
    handler_errors: AtomicU64,
    highest_slot: AtomicU64,
    retry_attempt: AtomicU32,
    subscription_id: AtomicU64,
}

impl Default for ConnectorMetrics {
    fn default() -> Self {
        Self {
            connection_attempts: AtomicU64::new(0),
            subscriptions: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            heartbeats_sent: AtomicU64::new(0),
            acknowledgements: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            malformed_payloads: AtomicU64::new(0),
            unrecognized_payloads: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            highest_slot: AtomicU64::new(0),
            retry_attempt: AtomicU32::new(0),
            subscription_id: AtomicU64::new(NO_SUBSCRIPTION),
        }
    }
}

impl ConnectorMetrics {
    pub(crate) fn inc_connection_attempts(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_heartbeats(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_acknowledgements(&self) {
        self.acknowledgements.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_malformed(&self) {
        self.malformed_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_unrecognized(&self) {
        self.unrecognized_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_handler_errors(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an event accepted from the transport.
    pub(crate) fn record_event(&self, slot: u64) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        self.highest_slot.fetch_max(slot, Ordering::Relaxed);
    }

    /// Records a confirmed subscription and ends the failure streak.
    pub(crate) fn record_subscribed(&self, subscription_id: u64) {
        self.subscriptions.fetch_add(1, Ordering::Relaxed);
        self.subscription_id.store(subscription_id, Ordering::Relaxed);
        self.retry_attempt.store(0, Ordering::Relaxed);
    }

    pub(crate) fn clear_subscription(&self) {
        self.subscription_id
            .store(NO_SUBSCRIPTION, Ordering::Relaxed);
    }

    pub(crate) fn set_retry_attempt(&self, attempt: u32) {
        self.retry_attempt.store(attempt, Ordering::Relaxed);
    }

    /// Current retry counter of the active failure streak (0 when healthy).
    #[must_use]
    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt.load(Ordering::Relaxed)
    }

    /// Subscription id assigned by the endpoint for the live connection.
    #[must_use]
    pub fn subscription_id(&self) -> Option<u64> {
        match self.subscription_id.load(Ordering::Relaxed) {
            NO_SUBSCRIPTION => None,
            id => Some(id),
        }
    }

    /// Takes a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            acknowledgements: self.acknowledgements.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
            unrecognized_payloads: self.unrecognized_payloads.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            highest_slot: self.highest_slot.load(Ordering::Relaxed),
            retry_attempt: self.retry_attempt(),
            subscription_id: self.subscription_id(),
        }
    }

    /// Reports current metrics to logs.
    pub fn report(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            attempts = snapshot.connection_attempts,
            reconnects = snapshot.reconnects,
            received = snapshot.events_received,
            delivered = snapshot.events_delivered,
            dropped = snapshot.events_dropped,
            malformed = snapshot.malformed_payloads,
            highest_slot = snapshot.highest_slot,
            "Log stream metrics"
        );
    }
}

/// Plain copy of [`ConnectorMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connection_attempts: u64,
    pub subscriptions: u64,
    pub reconnects: u64,
    pub heartbeats_sent: u64,
    pub acknowledgements: u64,
    pub events_received: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub malformed_payloads: u64,
    pub unrecognized_payloads: u64,
    pub handler_errors: u64,
    pub highest_slot: u64,
    pub retry_attempt: u32,
    pub subscription_id: Option<u64>,
}

impl MetricsSnapshot {
    /// Serializes the snapshot as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `LogStreamError::SerializationError` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_slot_only_grows() {
        let metrics = ConnectorMetrics::default();
        metrics.record_event(10);
        metrics.record_event(7);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.highest_slot, 10);
        assert_eq!(snapshot.events_received, 2);
    }

    #[test]
    fn test_subscription_id_zero_is_valid() {
        let metrics = ConnectorMetrics::default();
        assert_eq!(metrics.subscription_id(), None);
        metrics.set_retry_attempt(3);
        metrics.record_subscribed(0);
        assert_eq!(metrics.subscription_id(), Some(0));
        assert_eq!(metrics.retry_attempt(), 0);
        metrics.clear_subscription();
        assert_eq!(metrics.subscription_id(), None);
    }

    #[test]
    fn test_snapshot_json() {
        let metrics = ConnectorMetrics::default();
        metrics.inc_connection_attempts();
        let json: serde_json::Value =
            serde_json::from_str(&metrics.snapshot().to_json().unwrap()).unwrap();
        assert_eq!(json["connection_attempts"], 1);
        assert!(json["subscription_id"].is_null());
    }
}
