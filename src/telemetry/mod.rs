//! Process-wide `tracing` subscriber setup.
//!
//! The library itself only emits through `tracing`; binaries and tests that
//! want console output call [`init_telemetry`] once at startup.

// ── Submodules ────────────────────────────────────────────────────────────────

/// Telemetry configuration.
pub mod config;

/// Global subscriber initialisation and graceful shutdown.
pub mod subscriber;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::TelemetryConfig;
pub use subscriber::{init_telemetry, TelemetryGuard};
