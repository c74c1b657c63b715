//! Logging utilities (thin wrappers over `tracing`)

/// Log levels used by the connector and its diagnostic sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

const SILENT_ENV: &str = "SOLANA_LOG_STREAM_SILENT";

fn silenced() -> bool {
    std::env::var(SILENT_ENV).is_ok()
}

/// Logs a message
pub fn log(level: LogLevel, message: &str) {
    if silenced() {
        return;
    }

    match level {
        LogLevel::Info | LogLevel::Success => tracing::info!("{}", message),
        LogLevel::Warning => tracing::warn!("{}", message),
        LogLevel::Error => tracing::error!("{}", message),
        LogLevel::Debug => tracing::debug!("{}", message),
    }
}

/// Masks the value of an `api-key=` query parameter.
///
/// Hosted endpoints (Helius, Triton, ...) carry credentials in the query string,
/// so every URL that reaches the logs goes through here first.
#[must_use]
pub fn sanitize_url(url: &str) -> String {
    match url.find("api-key=") {
        Some(pos) => {
            let before = &url[..pos + 8];
            let after = &url[pos + 8..];
            let end_pos = after.find('&').unwrap_or(after.len());
            format!("{}[REDACTED]{}", before, &after[end_pos..])
        }
        None => url.to_string(),
    }
}

/// Logs connector startup information
pub fn log_startup(endpoint: &str, filter: &str, max_retries: u32, keepalive_secs: u64) {
    if silenced() {
        return;
    }

    tracing::info!(
        endpoint = sanitize_url(endpoint),
        filter = filter,
        max_retries = max_retries,
        keepalive_s = keepalive_secs,
        "Solana log stream startup"
    );
}

/// Logs a state transition
pub fn log_transition(from: &str, to: &str) {
    tracing::debug!(from = from, to = to, "Connector state change");
}

/// Logs a received notification
pub fn log_event(signature: &str, slot: u64, lines: usize) {
    tracing::trace!(
        signature = signature,
        slot = slot,
        lines = lines,
        "Log notification"
    );
}

/// Logs an error with context
pub fn log_error(context: &str, error: &str) {
    if silenced() {
        return;
    }
    tracing::error!(context = context, error = error, "Log stream error");
}
