//! Solana Log Stream - Example Usage
//!
//! Streams program logs from a Solana WebSocket endpoint and prints one line
//! per transaction until Ctrl+C.
//!
//! Environment (a `.env` file is honoured):
//! - `SOLANA_WS_URL` (default: `wss://api.mainnet-beta.solana.com`)
//! - `PROGRAM_IDS` comma separated (default: Raydium AMM v4)
//! - `MAX_RETRIES`, `INITIAL_RETRY_DELAY_MS`, `KEEPALIVE_INTERVAL_SECS`, `COMMITMENT`
//! - `RUST_LOG` to tune log output

use solana_log_stream::telemetry::{init_telemetry, TelemetryConfig};
use solana_log_stream::{ConnectorState, LogEvent, LogStreamConfigBuilder, LogStreamConnector};

const DEFAULT_WS_URL: &str = "wss://api.mainnet-beta.solana.com";
const DEFAULT_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let _telemetry = init_telemetry(TelemetryConfig::default());

    let mut builder = LogStreamConfigBuilder::from_env()?;
    if std::env::var("SOLANA_WS_URL").is_err() {
        builder = builder.with_endpoint(DEFAULT_WS_URL);
    }
    if std::env::var("PROGRAM_IDS").is_err() {
        builder = builder.program_id(DEFAULT_PROGRAM_ID);
    }
    let config = builder.build()?;

    println!("=== Solana Log Stream ===\n");
    println!("Configuration:");
    println!("  Endpoint: {}", config.endpoint);
    println!("  Filter: {}", config.filter);
    println!("  Commitment: {}", config.commitment.as_str());
    println!("  Max Retries: {}", config.retry.max_retries);
    println!("  Keepalive: {:?}\n", config.keepalive_interval);

    let handle = LogStreamConnector::new(config)?
        .on_event(|event: LogEvent| {
            let status = if event.is_success() { "ok" } else { "failed" };
            println!(
                "[slot {}] {} {} ({} log lines)",
                event.slot,
                event.signature,
                status,
                event.logs.len()
            );
        })
        .on_failure(|err| eprintln!("Log stream gave up: {err}"))
        .start()?;

    println!("Streaming, press Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
        state = handle.wait_for_state(|s| s.is_terminal()) => {
            if state == ConnectorState::Failed {
                eprintln!("Connector failed");
            }
        }
    }

    handle.report_metrics();
    println!("Metrics: {}", handle.metrics().to_json()?);
    handle.shutdown().await?;
    Ok(())
}
