//! JSON-RPC payloads of the `logsSubscribe` pub/sub method.
//!
//! Outbound: [`SubscriptionRequest`] and the `logsUnsubscribe` message sent on
//! graceful stop. Inbound: [`classify`] sorts every text frame into exactly
//! one [`Inbound`] kind.

use crate::config::CommitmentLevel;
use crate::streams::LogEvent;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::fmt;

const NOTIFICATION_METHOD: &str = "logsNotification";

/// Transaction filter of a logs subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogsFilter {
    /// Every transaction except simple votes.
    All,
    /// Every transaction including simple votes.
    AllWithVotes,
    /// Transactions whose logs mention any of these addresses.
    Mentions(Vec<Pubkey>),
}

impl LogsFilter {
    /// First element of the `params` array.
    #[must_use]
    pub fn to_param(&self) -> Value {
        match self {
            LogsFilter::All => json!("all"),
            LogsFilter::AllWithVotes => json!("allWithVotes"),
            LogsFilter::Mentions(ids) => json!({
                "mentions": ids.iter().map(ToString::to_string).collect::<Vec<String>>()
            }),
        }
    }
}

impl fmt::Display for LogsFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogsFilter::All => f.write_str("all"),
            LogsFilter::AllWithVotes => f.write_str("allWithVotes"),
            LogsFilter::Mentions(ids) => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                write!(f, "mentions[{}]", ids.join(","))
            }
        }
    }
}

/// One `logsSubscribe` request. Built once per connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    /// JSON-RPC request id, echoed back by the acknowledgment.
    pub id: u64,
    pub filter: LogsFilter,
    pub commitment: CommitmentLevel,
}

impl SubscriptionRequest {
    #[must_use]
    pub fn new(id: u64, filter: LogsFilter, commitment: CommitmentLevel) -> Self {
        Self {
            id,
            filter,
            commitment,
        }
    }

    /// The request as a JSON value.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": self.id,
            "method": "logsSubscribe",
            "params": [
                self.filter.to_param(),
                { "commitment": self.commitment.as_str() }
            ]
        })
    }

    /// The request as a text frame body.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_payload().to_string()
    }
}

/// Text body of a `logsUnsubscribe` request for `subscription`.
#[must_use]
pub fn unsubscribe_text(id: u64, subscription: u64) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "logsUnsubscribe",
        "params": [subscription]
    })
    .to_string()
}

/// Classification of one inbound text payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Successful response to a subscribe request.
    Ack { id: u64, subscription: u64 },
    /// JSON-RPC error response.
    Rejected {
        id: Option<u64>,
        code: i64,
        message: String,
    },
    /// A decoded log notification.
    Notification { subscription: u64, event: LogEvent },
    /// Well-formed JSON that is none of the above.
    Unrecognized(String),
    /// Not JSON, or a notification with missing or mistyped fields.
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct LogsNotification {
    params: LogsNotificationParams,
}

#[derive(Debug, Deserialize)]
struct LogsNotificationParams {
    result: LogsNotificationResult,
    subscription: u64,
}

#[derive(Debug, Deserialize)]
struct LogsNotificationResult {
    context: LogsNotificationContext,
    value: LogsNotificationValue,
}

#[derive(Debug, Deserialize)]
struct LogsNotificationContext {
    slot: u64,
}

#[derive(Debug, Deserialize)]
struct LogsNotificationValue {
    signature: String,
    #[serde(default)]
    err: Option<Value>,
    logs: Vec<String>,
}

/// Sorts an inbound text payload into exactly one [`Inbound`] kind.
///
/// Never panics and never fails: anything that cannot be understood comes back
/// as `Malformed` or `Unrecognized`.
#[must_use]
pub fn classify(text: &str) -> Inbound {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Inbound::Malformed(format!("invalid JSON: {e}")),
    };

    let Some(obj) = value.as_object() else {
        return Inbound::Unrecognized("payload is not a JSON object".to_string());
    };

    let method = obj.get("method").and_then(Value::as_str).map(str::to_owned);
    if let Some(method) = method {
        if method != NOTIFICATION_METHOD {
            return Inbound::Unrecognized(format!("unexpected method '{method}'"));
        }
        return match serde_json::from_value::<LogsNotification>(value) {
            Ok(n) => Inbound::Notification {
                subscription: n.params.subscription,
                event: LogEvent {
                    slot: n.params.result.context.slot,
                    signature: n.params.result.value.signature,
                    err: n.params.result.value.err,
                    logs: n.params.result.value.logs,
                },
            },
            Err(e) => Inbound::Malformed(format!("{NOTIFICATION_METHOD}: {e}")),
        };
    }

    let id = obj.get("id").and_then(Value::as_u64);

    if let Some(error) = obj.get("error") {
        return Inbound::Rejected {
            id,
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        };
    }

    match (id, obj.get("result")) {
        (Some(id), Some(result)) => match result.as_u64() {
            Some(subscription) => Inbound::Ack { id, subscription },
            None => Inbound::Unrecognized(format!(
                "response to request {id} carries no subscription id"
            )),
        },
        _ => Inbound::Unrecognized("no method, result or error field".to_string()),
    }
}
