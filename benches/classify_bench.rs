use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use solana_log_stream::{classify, CommitmentLevel, Inbound, LogsFilter, SubscriptionRequest};
use solana_sdk::pubkey::Pubkey;

fn notification(log_lines: usize) -> String {
    let logs: Vec<String> = (0..log_lines)
        .map(|i| format!("Program log: ray_log: A8CWmAAAAAAA{i:04}"))
        .collect();
    json!({
        "jsonrpc": "2.0",
        "method": "logsNotification",
        "params": {
            "result": {
                "context": { "slot": 350803560 },
                "value": {
                    "signature": "5j7s6NiJS3JAkvgkoc18WVAsiSaci2pxB2A6ueCJP4tprA2TFg9wSyTLeYouxPBJEMzJinENTkpA52YStRW5Dia7",
                    "err": null,
                    "logs": logs
                }
            },
            "subscription": 12345
        }
    })
    .to_string()
}

fn classify_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");

    for lines in [4usize, 32, 256] {
        let payload = notification(lines);
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("notification", lines),
            &payload,
            |b, payload| {
                b.iter(|| {
                    let inbound = classify(black_box(payload));
                    assert!(matches!(inbound, Inbound::Notification { .. }));
                })
            },
        );
    }

    let ack = json!({"jsonrpc": "2.0", "result": 12345, "id": 1}).to_string();
    group.bench_function("ack", |b| b.iter(|| classify(black_box(&ack))));

    let malformed = "{\"jsonrpc\":\"2.0\",\"method\":\"logsNotification\",\"params\":{}}";
    group.bench_function("malformed", |b| b.iter(|| classify(black_box(malformed))));

    group.finish();
}

fn subscribe_benchmark(c: &mut Criterion) {
    let programs: Vec<Pubkey> = (0..8).map(|_| Pubkey::new_unique()).collect();
    let request = SubscriptionRequest::new(
        1,
        LogsFilter::Mentions(programs),
        CommitmentLevel::Confirmed,
    );

    c.bench_function("subscribe_request_8_programs", |b| {
        b.iter(|| black_box(&request).to_text())
    });
}

criterion_group!(benches, classify_benchmark, subscribe_benchmark);
criterion_main!(benches);
