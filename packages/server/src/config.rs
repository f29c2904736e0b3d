//! Per-binary configuration: clap derive with environment fallbacks.
//!
//! Defaults are chosen so `cargo run` on a single machine works with no
//! flags: in-memory store, in-process bus, well-known local ports.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Question service configuration.
#[derive(Parser, Debug)]
#[command(name = "askstack-questions", about = "AskStack question service", version)]
pub struct QuestionsConfig {
    /// Bind address.
    #[arg(long, env = "ASKSTACK_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Listen port.
    #[arg(long, env = "ASKSTACK_QUESTIONS_PORT", default_value_t = 8081)]
    pub port: u16,
    /// HMAC secret shared with the identity provider for token verification.
    #[arg(
        long,
        env = "ASKSTACK_AUTH_SECRET",
        default_value = "askstack-dev-secret",
        hide_env_values = true
    )]
    pub auth_secret: String,
    /// Broker URL (requires the redis-bus feature). In-process bus when unset.
    #[arg(long, env = "ASKSTACK_BROKER_URL")]
    pub broker_url: Option<String>,
    /// Postgres URL (requires the postgres feature). In-memory store when unset.
    #[arg(long, env = "ASKSTACK_DATABASE_URL")]
    pub database_url: Option<String>,
    /// Outbox relay tick interval in milliseconds.
    #[arg(long, env = "ASKSTACK_RELAY_INTERVAL_MS", default_value_t = 500)]
    pub relay_interval_ms: u64,
    /// Tag slugs to seed into an empty tag table, comma-separated.
    #[arg(long, env = "ASKSTACK_SEED_TAGS", value_delimiter = ',')]
    pub seed_tags: Vec<String>,
    /// Request timeout in seconds.
    #[arg(long, env = "ASKSTACK_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

/// Search service configuration.
#[derive(Parser, Debug)]
#[command(name = "askstack-search", about = "AskStack search service", version)]
pub struct SearchConfig {
    /// Bind address.
    #[arg(long, env = "ASKSTACK_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Listen port.
    #[arg(long, env = "ASKSTACK_SEARCH_PORT", default_value_t = 8082)]
    pub port: u16,
    /// Broker URL (requires the redis-bus feature). In-process bus when unset.
    #[arg(long, env = "ASKSTACK_BROKER_URL")]
    pub broker_url: Option<String>,
    /// Index directory. In-RAM index when unset (contents lost on restart).
    #[arg(long, env = "ASKSTACK_INDEX_DIR")]
    pub index_dir: Option<PathBuf>,
    /// Request timeout in seconds.
    #[arg(long, env = "ASKSTACK_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

/// Gateway configuration.
#[derive(Parser, Debug)]
#[command(name = "askstack-gateway", about = "AskStack gateway", version)]
pub struct GatewayConfig {
    /// Bind address.
    #[arg(long, env = "ASKSTACK_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Listen port.
    #[arg(long, env = "ASKSTACK_GATEWAY_PORT", default_value_t = 8080)]
    pub port: u16,
    /// Question service base URL.
    #[arg(
        long,
        env = "ASKSTACK_QUESTIONS_UPSTREAM",
        default_value = "http://127.0.0.1:8081"
    )]
    pub questions_upstream: String,
    /// Search service base URL.
    #[arg(
        long,
        env = "ASKSTACK_SEARCH_UPSTREAM",
        default_value = "http://127.0.0.1:8082"
    )]
    pub search_upstream: String,
    /// Request timeout in seconds.
    #[arg(long, env = "ASKSTACK_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl QuestionsConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SearchConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
