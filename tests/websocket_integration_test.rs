use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use solana_log_stream::{
    ConnectorState, Diagnostic, DiagnosticKind, LogEvent, LogSource, LogStreamConfig,
    LogStreamConfigBuilder, LogStreamConnector, LogStreamError,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

const PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
const SUBSCRIPTION: u64 = 12345;
const WAIT: Duration = Duration::from_secs(10);

/// What the mock node does with one accepted connection.
#[derive(Clone)]
enum Session {
    /// Acknowledge, push the payloads, keep the socket open until the client leaves.
    Serve(Vec<String>),
    /// Acknowledge, push the payloads, then close the socket.
    ServeThenClose(Vec<String>),
}

/// Mock Solana WebSocket node. Records every text frame the client sends.
struct MockNode {
    url: String,
    received: Arc<Mutex<Vec<Value>>>,
}

impl MockNode {
    async fn start(sessions: Vec<Session>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let received = Arc::new(Mutex::new(Vec::new()));
        let recorder = received.clone();

        tokio::spawn(async move {
            for session in sessions {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let mut ws = accept_async(stream).await.unwrap();

                // Wait for subscription request
                let request: Value = loop {
                    match ws.next().await {
                        Some(Ok(Message::Text(text))) => break serde_json::from_str(&text).unwrap(),
                        Some(Ok(_)) => continue,
                        _ => return,
                    }
                };
                let id = request["id"].clone();
                recorder.lock().unwrap().push(request);

                // Send subscription confirmation
                ws.send(Message::Text(
                    json!({"jsonrpc": "2.0", "result": SUBSCRIPTION, "id": id}).to_string(),
                ))
                .await
                .unwrap();

                let (payloads, close) = match session {
                    Session::Serve(p) => (p, false),
                    Session::ServeThenClose(p) => (p, true),
                };
                for payload in payloads {
                    ws.send(Message::Text(payload)).await.unwrap();
                }

                if close {
                    let _ = ws.close(None).await;
                    continue;
                }
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(text) => {
                            recorder
                                .lock()
                                .unwrap()
                                .push(serde_json::from_str(&text).unwrap());
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            }
            // Keep the listener alive so later attempts hang rather than fail.
            std::future::pending::<()>().await;
        });

        Self { url, received }
    }

    fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }
}

fn notification(slot: u64, signature: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": "logsNotification",
        "params": {
            "result": {
                "context": { "slot": slot },
                "value": {
                    "signature": signature,
                    "err": null,
                    "logs": [
                        "Program 675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8 invoke [1]",
                        "Program log: ray_log: A8CWmAAAAAAA"
                    ]
                }
            },
            "subscription": SUBSCRIPTION
        }
    })
    .to_string()
}

fn config(url: &str) -> LogStreamConfig {
    LogStreamConfigBuilder::new()
        .with_endpoint(url)
        .program_id(PROGRAM_ID)
        .with_max_retries(3)
        .with_initial_delay(Duration::from_millis(50))
        .build()
        .unwrap()
}

fn recorder() -> (Arc<Mutex<Vec<LogEvent>>>, impl FnMut(LogEvent) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let writer = seen.clone();
    (seen, move |event: LogEvent| writer.lock().unwrap().push(event))
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_subscribe_and_receive_verbatim() {
    let node = MockNode::start(vec![Session::Serve(vec![notification(
        350803560, "3up5a7",
    )])])
    .await;
    let (seen, handler) = recorder();

    let handle = LogStreamConnector::new(config(&node.url))
        .unwrap()
        .on_event(handler)
        .start()
        .unwrap();

    eventually(|| !seen.lock().unwrap().is_empty()).await;
    assert_eq!(handle.state(), ConnectorState::Receiving);
    assert_eq!(handle.subscription_id(), Some(SUBSCRIPTION));

    let request = &node.received()[0];
    assert_eq!(request["jsonrpc"], "2.0");
    assert_eq!(request["method"], "logsSubscribe");
    assert_eq!(request["params"][0], json!({ "mentions": [PROGRAM_ID] }));
    assert_eq!(request["params"][1], json!({ "commitment": "confirmed" }));

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].slot, 350803560);
        assert_eq!(seen[0].signature, "3up5a7");
        assert!(seen[0].is_success());
        assert_eq!(seen[0].logs.len(), 2);
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_payload_does_not_interrupt_stream() {
    let node = MockNode::start(vec![Session::Serve(vec![
        "{this is not json".to_string(),
        json!({"jsonrpc": "2.0", "method": "logsNotification", "params": {"subscription": SUBSCRIPTION}})
            .to_string(),
        notification(2, "after"),
    ])])
    .await;
    let (seen, handler) = recorder();
    let diagnostics: Arc<Mutex<Vec<Diagnostic>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = diagnostics.clone();

    let handle = LogStreamConnector::new(config(&node.url))
        .unwrap()
        .with_diagnostics(move |d: &Diagnostic| sink.lock().unwrap().push(d.clone()))
        .on_event(handler)
        .start()
        .unwrap();

    eventually(|| !seen.lock().unwrap().is_empty()).await;

    let malformed = diagnostics
        .lock()
        .unwrap()
        .iter()
        .filter(|d| d.kind == DiagnosticKind::MalformedPayload)
        .count();
    assert_eq!(malformed, 2);
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(handle.state(), ConnectorState::Receiving);
    assert_eq!(handle.metrics().connection_attempts, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let node = MockNode::start(vec![
        Session::ServeThenClose(vec![notification(1, "first")]),
        Session::Serve(vec![notification(2, "second")]),
    ])
    .await;
    let (seen, handler) = recorder();

    let handle = LogStreamConnector::new(config(&node.url))
        .unwrap()
        .on_event(handler)
        .start()
        .unwrap();

    eventually(|| seen.lock().unwrap().len() == 2).await;

    let signatures: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.signature.clone())
        .collect();
    assert_eq!(signatures, vec!["first", "second"]);

    let requests: Vec<Value> = node
        .received()
        .into_iter()
        .filter(|r| r["method"] == "logsSubscribe")
        .collect();
    assert_eq!(requests.len(), 2);
    assert_ne!(requests[0]["id"], requests[1]["id"]);

    let metrics = handle.metrics();
    assert_eq!(metrics.reconnects, 1);
    assert_eq!(metrics.retry_attempt, 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_unsubscribes_and_is_idempotent() {
    let node = MockNode::start(vec![Session::Serve(vec![])]).await;
    let (_, handler) = recorder();

    let handle = LogStreamConnector::new(config(&node.url))
        .unwrap()
        .on_event(handler)
        .start()
        .unwrap();

    let state = tokio::time::timeout(
        WAIT,
        handle.wait_for_state(|s| *s == ConnectorState::Receiving),
    )
    .await
    .unwrap();
    assert_eq!(state, ConnectorState::Receiving);

    handle.stop();
    handle.stop();
    let state = tokio::time::timeout(WAIT, handle.wait_for_state(|s| s.is_terminal()))
        .await
        .unwrap();
    assert_eq!(state, ConnectorState::Stopped);
    assert!(handle.is_stop_requested());
    handle.join().await.unwrap();

    eventually(|| {
        node.received()
            .iter()
            .any(|r| r["method"] == "logsUnsubscribe" && r["params"][0] == SUBSCRIPTION)
    })
    .await;
}

#[tokio::test]
async fn test_unreachable_endpoint_exhausts_retries() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let config = LogStreamConfigBuilder::new()
        .with_endpoint(url)
        .all_transactions()
        .with_max_retries(2)
        .with_initial_delay(Duration::from_millis(20))
        .build()
        .unwrap();
    let failed = Arc::new(Mutex::new(false));
    let flag = failed.clone();

    let handle = LogStreamConnector::new(config)
        .unwrap()
        .on_event(|_event: LogEvent| {})
        .on_failure(move |_err| *flag.lock().unwrap() = true)
        .start()
        .unwrap();

    let result = tokio::time::timeout(WAIT, handle.join()).await.unwrap();
    match result {
        Err(LogStreamError::RetryExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("Expected RetryExhausted, got {other:?}"),
    }
    assert!(*failed.lock().unwrap());
}

#[tokio::test]
async fn test_pull_mode_batches() {
    let node = MockNode::start(vec![Session::Serve(
        (1..=5).map(|slot| notification(slot, &format!("sig{slot}"))).collect(),
    )])
    .await;

    let (handle, mut stream) = LogStreamConnector::new(config(&node.url))
        .unwrap()
        .into_stream()
        .unwrap();

    let mut slots = Vec::new();
    tokio::time::timeout(WAIT, async {
        while slots.len() < 5 {
            let batch = stream.next_batch().await.unwrap();
            slots.extend(batch.into_iter().map(|e| e.slot));
        }
    })
    .await
    .unwrap();
    assert_eq!(slots, vec![1, 2, 3, 4, 5]);
    assert_eq!(stream.source_name(), "WebSocket logsSubscribe");

    drop(stream);
    handle.shutdown().await.unwrap();
}
