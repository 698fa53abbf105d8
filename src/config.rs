//! # config — runtime configuration from environment variables

use std::time::Duration;

use anyhow::Context;

/// Everything the transport client and ledger need at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker base URL, e.g. `http://localhost:5000`. The WebSocket endpoint
    /// is derived from it; publishes POST to `<broker_url>/publish`.
    pub broker_url: String,
    /// SQLite database URL, e.g. `sqlite://positions.db`.
    pub database_url: String,
    /// Consumer identity — subscription handshake, acks, and producer name.
    pub consumer: String,
    /// Queue poll timeout; bounds shutdown latency of the dispatch loop.
    pub poll_interval: Duration,
    /// Outbound publish timeout.
    pub publish_timeout: Duration,
    /// Initial reconnect delay (doubles per failed attempt).
    pub reconnect_delay: Duration,
    /// Reconnect delay cap.
    pub reconnect_delay_max: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            broker_url: std::env::var("PUBSUB_URL")
                .unwrap_or_else(|_| "http://localhost:5000".to_string()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://positions.db".to_string()),
            consumer: std::env::var("CONSUMER_NAME")
                .unwrap_or_else(|_| "position-ledger".to_string()),
            poll_interval: Duration::from_millis(env_u64("QUEUE_POLL_MS", 1_000)?),
            publish_timeout: Duration::from_secs(env_u64("PUBLISH_TIMEOUT_SECS", 30)?),
            reconnect_delay: Duration::from_millis(env_u64("RECONNECT_DELAY_MS", 2_000)?),
            reconnect_delay_max: Duration::from_millis(env_u64("RECONNECT_DELAY_MAX_MS", 10_000)?),
        })
    }
}

fn env_u64(key: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("{key} must be a number")),
        Err(_) => Ok(default),
    }
}
