use super::config::TelemetryConfig;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Guard that keeps the telemetry subsystem alive.
///
/// Dropping it logs a final shutdown line; the subscriber itself stays
/// installed for the rest of the process.
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Telemetry shut down");
    }
}

static TELEMETRY_INIT: OnceLock<bool> = OnceLock::new();

/// Initialize the global tracing subscriber (singleton, called once).
///
/// Uses `RUST_LOG` env var if set, otherwise falls back to `config.log_filter`.
/// Safe to call multiple times; subsequent calls are no-ops. If another
/// subscriber was already installed by the host application, that one is kept.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let installed = *TELEMETRY_INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

        let fmt_layer = fmt::layer()
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_ansi(config.enable_console_colors);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .is_ok()
    });

    if installed {
        tracing::debug!(service = %config.service_name, "Telemetry initialised");
    }

    TelemetryGuard {
        service_name: config.service_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let first = init_telemetry(TelemetryConfig::default());
        let second = init_telemetry(TelemetryConfig::default().with_log_filter("debug"));
        assert_eq!(first.service_name, second.service_name);
    }
}
