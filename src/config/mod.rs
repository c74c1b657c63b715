//! Configuration management for the log-stream connector.
//!
//! This module provides a builder-based configuration system. Every value the
//! connector needs is validated up front, so a connector that started will
//! never fail because of its configuration.

use crate::streams::protocol::LogsFilter;
use crate::utils::error::{LogStreamError, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BATCH_SIZE: usize = 100;

/// Transaction commitment level requested from the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentLevel {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl CommitmentLevel {
    /// Wire name of the commitment level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentLevel::Processed => "processed",
            CommitmentLevel::Confirmed => "confirmed",
            CommitmentLevel::Finalized => "finalized",
        }
    }
}

impl FromStr for CommitmentLevel {
    type Err = LogStreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(Self::Processed),
            "confirmed" => Ok(Self::Confirmed),
            "finalized" => Ok(Self::Finalized),
            other => Err(LogStreamError::ConfigError(format!(
                "Unknown commitment level '{other}'"
            ))),
        }
    }
}

/// Reconnection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of reconnection attempts in one failure streak (default: 5).
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every following one (default: 1s).
    pub initial_delay: Duration,
    /// Optional upper bound on a single delay (default: none).
    pub max_delay: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: None,
        }
    }
}

/// What to do when a bounded delivery buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Suspend the receive loop until the consumer catches up. Back-pressure
    /// then reaches the endpoint through the transport's flow control.
    #[default]
    Block,
    /// Discard the incoming event and report it to the diagnostic sink.
    DropNewest,
}

/// Buffering between the receive loop and the consumer.
///
/// With [`BufferPolicy::Unbounded`] a consumer slower than the endpoint makes
/// the buffer grow without limit. Keeping up is the caller's responsibility in
/// that mode; pick a bounded policy otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferPolicy {
    #[default]
    Unbounded,
    Bounded { capacity: usize, overflow: Overflow },
}

/// Configuration for one log-stream connector.
///
/// Use [`LogStreamConfigBuilder`] to construct instances of this struct.
#[derive(Debug, Clone)]
pub struct LogStreamConfig {
    /// WebSocket endpoint (ws:// or wss://)
    pub endpoint: String,

    /// Which transactions the endpoint should report
    pub filter: LogsFilter,

    /// Commitment level for notifications (default: Confirmed)
    pub commitment: CommitmentLevel,

    /// Reconnection policy
    pub retry: RetryConfig,

    /// Interval between keepalive pings while receiving (default: 30s)
    pub keepalive_interval: Duration,

    /// Bound on the transport handshake (default: 10s)
    pub handshake_timeout: Duration,

    /// Bound on the wait for the subscription acknowledgment (default: 10s)
    pub ack_timeout: Duration,

    /// Reconnect when nothing at all arrives for this long (default: disabled)
    pub idle_timeout: Option<Duration>,

    /// Delivery buffering between receive loop and consumer
    pub buffer: BufferPolicy,

    /// Maximum number of events returned by one pull-mode batch (default: 100)
    pub batch_size: usize,
}

impl LogStreamConfig {
    /// Checks every invariant the connector relies on.
    ///
    /// # Errors
    ///
    /// Returns `LogStreamError::ConfigError` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(config_error("Endpoint URL is required"));
        }
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(config_error(format!(
                "Endpoint '{endpoint}' must use the ws:// or wss:// scheme"
            )));
        }
        if let LogsFilter::Mentions(ids) = &self.filter {
            if ids.is_empty() {
                return Err(config_error("At least one program ID is required"));
            }
        }
        if self.retry.max_retries == 0 {
            return Err(config_error("max_retries must be positive"));
        }
        if self.retry.initial_delay.is_zero() {
            return Err(config_error("initial retry delay must be positive"));
        }
        if self.retry.max_delay.is_some_and(|d| d.is_zero()) {
            return Err(config_error("max retry delay must be positive"));
        }
        if self.keepalive_interval.is_zero() {
            return Err(config_error("keepalive interval must be positive"));
        }
        if self.handshake_timeout.is_zero() || self.ack_timeout.is_zero() {
            return Err(config_error("handshake and ack timeouts must be positive"));
        }
        if self.idle_timeout.is_some_and(|d| d.is_zero()) {
            return Err(config_error("idle timeout must be positive"));
        }
        if let BufferPolicy::Bounded { capacity: 0, .. } = self.buffer {
            return Err(config_error("bounded buffer capacity must be positive"));
        }
        if self.batch_size == 0 {
            return Err(config_error("batch size must be positive"));
        }
        Ok(())
    }
}

fn config_error(msg: impl Into<String>) -> LogStreamError {
    LogStreamError::ConfigError(msg.into())
}

#[derive(Debug, Clone)]
enum PendingFilter {
    All,
    AllWithVotes,
    Mentions(Vec<String>),
}

/// Builder for `LogStreamConfig`.
///
/// # Example
///
/// ```no_run
/// use solana_log_stream::LogStreamConfigBuilder;
/// use std::time::Duration;
///
/// let config = LogStreamConfigBuilder::new()
///     .with_endpoint("wss://api.mainnet-beta.solana.com")
///     .program_id("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8")
///     .with_max_retries(5)
///     .with_keepalive_interval(Duration::from_secs(30))
///     .build()?;
/// # Ok::<(), solana_log_stream::LogStreamError>(())
/// ```
#[derive(Debug, Default)]
pub struct LogStreamConfigBuilder {
    endpoint: Option<String>,
    filter: Option<PendingFilter>,
    commitment: Option<CommitmentLevel>,
    max_retries: Option<u32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    keepalive_interval: Option<Duration>,
    handshake_timeout: Option<Duration>,
    ack_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
    buffer: Option<BufferPolicy>,
    batch_size: Option<usize>,
}

impl LogStreamConfigBuilder {
    /// Creates a new configuration builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a builder from process environment variables.
    ///
    /// | Variable                   | Meaning                                 |
    /// |----------------------------|-----------------------------------------|
    /// | `SOLANA_WS_URL`            | endpoint (required at `build()` time)   |
    /// | `PROGRAM_IDS`              | comma separated program IDs             |
    /// | `MAX_RETRIES`              | retry budget                            |
    /// | `INITIAL_RETRY_DELAY_MS`   | first backoff delay in milliseconds     |
    /// | `KEEPALIVE_INTERVAL_SECS`  | ping interval in seconds                |
    /// | `COMMITMENT`               | processed / confirmed / finalized       |
    ///
    /// # Errors
    ///
    /// Returns `LogStreamError::ConfigError` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LogStreamConfigBuilder::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns `LogStreamError::ConfigError` if a numeric variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::new();

        if let Some(url) = lookup("SOLANA_WS_URL") {
            builder = builder.with_endpoint(url);
        }
        if let Some(ids) = lookup("PROGRAM_IDS") {
            let ids: Vec<String> = ids
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            builder = builder.program_ids(ids);
        }
        if let Some(raw) = lookup("MAX_RETRIES") {
            builder = builder.with_max_retries(parse_env("MAX_RETRIES", &raw)?);
        }
        if let Some(raw) = lookup("INITIAL_RETRY_DELAY_MS") {
            let ms: u64 = parse_env("INITIAL_RETRY_DELAY_MS", &raw)?;
            builder = builder.with_initial_delay(Duration::from_millis(ms));
        }
        if let Some(raw) = lookup("KEEPALIVE_INTERVAL_SECS") {
            let secs: u64 = parse_env("KEEPALIVE_INTERVAL_SECS", &raw)?;
            builder = builder.with_keepalive_interval(Duration::from_secs(secs));
        }
        if let Some(raw) = lookup("COMMITMENT") {
            builder = builder.with_commitment(raw.parse()?);
        }

        Ok(builder)
    }

    /// Sets the WebSocket endpoint URL (e.g., <ws://127.0.0.1:8900>).
    #[must_use]
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Adds a program ID to the mentions filter.
    #[must_use]
    pub fn program_id(mut self, id: impl Into<String>) -> Self {
        let mut ids = match self.filter.take() {
            Some(PendingFilter::Mentions(ids)) => ids,
            _ => Vec::new(),
        };
        ids.push(id.into());
        self.filter = Some(PendingFilter::Mentions(ids));
        self
    }

    /// Replaces the mentions filter with `ids`.
    #[must_use]
    pub fn program_ids(mut self, ids: Vec<impl Into<String>>) -> Self {
        self.filter = Some(PendingFilter::Mentions(
            ids.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Subscribes to every transaction except simple vote transactions.
    #[must_use]
    pub fn all_transactions(mut self) -> Self {
        self.filter = Some(PendingFilter::All);
        self
    }

    /// Subscribes to every transaction including votes.
    #[must_use]
    pub fn all_transactions_with_votes(mut self) -> Self {
        self.filter = Some(PendingFilter::AllWithVotes);
        self
    }

    /// Sets the commitment level.
    #[must_use]
    pub fn with_commitment(mut self, level: CommitmentLevel) -> Self {
        self.commitment = Some(level);
        self
    }

    /// Sets the retry budget of one failure streak (default: 5).
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the delay before the first retry (default: 1s).
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Caps a single backoff delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Sets the keepalive ping interval (default: 30s).
    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = Some(interval);
        self
    }

    /// Sets the transport handshake timeout (default: 10s).
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Sets the subscription acknowledgment timeout (default: 10s).
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = Some(timeout);
        self
    }

    /// Reconnects when no frame arrives for `timeout`.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Sets the delivery buffer policy (default: unbounded).
    #[must_use]
    pub fn with_buffer(mut self, policy: BufferPolicy) -> Self {
        self.buffer = Some(policy);
        self
    }

    /// Sets the maximum pull-mode batch size (default: 100).
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `LogStreamError::ConfigError` if:
    /// - The endpoint is missing, empty or not a WebSocket URL
    /// - No filter was chosen, or a program ID is not a valid `Pubkey`
    /// - Any retry bound, interval, timeout or size is zero
    pub fn build(self) -> Result<LogStreamConfig> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| config_error("Endpoint URL is required. Use .with_endpoint()"))?;

        let filter = match self.filter {
            None => {
                return Err(config_error(
                    "A filter is required. Use .program_id() or .all_transactions()",
                ))
            }
            Some(PendingFilter::All) => LogsFilter::All,
            Some(PendingFilter::AllWithVotes) => LogsFilter::AllWithVotes,
            Some(PendingFilter::Mentions(ids)) => LogsFilter::Mentions(
                ids.into_iter()
                    .map(|s| {
                        Pubkey::from_str(&s).map_err(|e| {
                            config_error(format!("Invalid program ID '{s}': {e}"))
                        })
                    })
                    .collect::<Result<Vec<Pubkey>>>()?,
            ),
        };

        let config = LogStreamConfig {
            endpoint,
            filter,
            commitment: self.commitment.unwrap_or_default(),
            retry: RetryConfig {
                max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                initial_delay: self.initial_delay.unwrap_or(DEFAULT_INITIAL_DELAY),
                max_delay: self.max_delay,
            },
            keepalive_interval: self.keepalive_interval.unwrap_or(DEFAULT_KEEPALIVE),
            handshake_timeout: self.handshake_timeout.unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT),
            ack_timeout: self.ack_timeout.unwrap_or(DEFAULT_ACK_TIMEOUT),
            idle_timeout: self.idle_timeout,
            buffer: self.buffer.unwrap_or_default(),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_env<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| config_error(format!("Invalid {key} '{raw}': {e}")))
}
