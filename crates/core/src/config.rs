//! Environment-driven configuration.
//!
//! Every section has hard-coded defaults suitable for local development and
//! a `from_env` constructor that overrides them from environment variables.
//! Malformed values fail fast at startup: a service running with a silently
//! ignored setting is worse than one that refuses to boot.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Parse an environment variable, falling back to `default` when unset.
///
/// Panics on a present-but-malformed value.
fn var_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{name} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}

fn var_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// PostgreSQL pool configuration.
///
/// | Env Var                    | Default |
/// |----------------------------|---------|
/// | `DATABASE_URL`             | (required) |
/// | `DATABASE_MIN_CONNECTIONS` | `10`    |
/// | `DATABASE_MAX_CONNECTIONS` | `50`    |
/// | `DATABASE_MAX_IDLE_SECS`   | `3600`  |
/// | `DATABASE_MAX_LIFETIME_SECS` | `86400` |
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub max_idle: Duration,
    pub max_lifetime: Duration,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        Self {
            url,
            min_connections: var_or("DATABASE_MIN_CONNECTIONS", 10),
            max_connections: var_or("DATABASE_MAX_CONNECTIONS", 50),
            max_idle: Duration::from_secs(var_or("DATABASE_MAX_IDLE_SECS", 3600)),
            max_lifetime: Duration::from_secs(var_or("DATABASE_MAX_LIFETIME_SECS", 86400)),
        }
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Where a freshly attached consumer starts reading a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    /// Deliver every retained uncommitted message.
    Earliest,
    /// Deliver only messages published after the consumer attached.
    Latest,
}

impl FromStr for OffsetReset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earliest" => Ok(OffsetReset::Earliest),
            "latest" => Ok(OffsetReset::Latest),
            other => Err(format!("expected 'earliest' or 'latest', got '{other}'")),
        }
    }
}

/// Partitioned queue configuration.
///
/// | Env Var                    | Default    |
/// |----------------------------|------------|
/// | `QUEUE_PARTITIONS`         | `16`       |
/// | `QUEUE_PARTITION_CAPACITY` | `10000`    |
/// | `QUEUE_AUTO_OFFSET_RESET`  | `earliest` |
/// | `QUEUE_CONSUMER_COUNT`     | `1`        |
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub partitions: usize,
    pub partition_capacity: usize,
    pub auto_offset_reset: OffsetReset,
    pub consumer_count: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            partitions: 16,
            partition_capacity: 10_000,
            auto_offset_reset: OffsetReset::Earliest,
            consumer_count: 1,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            partitions: var_or("QUEUE_PARTITIONS", defaults.partitions),
            partition_capacity: var_or("QUEUE_PARTITION_CAPACITY", defaults.partition_capacity),
            auto_offset_reset: var_or("QUEUE_AUTO_OFFSET_RESET", defaults.auto_offset_reset),
            consumer_count: var_or("QUEUE_CONSUMER_COUNT", defaults.consumer_count),
        }
    }
}

// ---------------------------------------------------------------------------
// Ingestion batcher
// ---------------------------------------------------------------------------

/// Ingestion batcher configuration.
///
/// | Env Var                        | Default |
/// |--------------------------------|---------|
/// | `INGEST_BATCH_SIZE`            | `100`   |
/// | `INGEST_BATCH_TIMEOUT_MS`      | `100`   |
/// | `INGEST_FLUSH_CHANNEL_CAPACITY`| `100`   |
/// | `INGEST_FLUSH_RETRY_LIMIT`     | `3`     |
/// | `INGEST_FLUSH_RETRY_BACKOFF_MS`| `100`   |
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub flush_channel_capacity: usize,
    pub flush_retry_limit: u32,
    pub flush_retry_backoff: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_timeout: Duration::from_millis(100),
            flush_channel_capacity: 100,
            flush_retry_limit: 3,
            flush_retry_backoff: Duration::from_millis(100),
        }
    }
}

impl BatcherConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: var_or("INGEST_BATCH_SIZE", defaults.batch_size),
            batch_timeout: Duration::from_millis(var_or("INGEST_BATCH_TIMEOUT_MS", 100)),
            flush_channel_capacity: var_or(
                "INGEST_FLUSH_CHANNEL_CAPACITY",
                defaults.flush_channel_capacity,
            ),
            flush_retry_limit: var_or("INGEST_FLUSH_RETRY_LIMIT", defaults.flush_retry_limit),
            flush_retry_backoff: Duration::from_millis(var_or("INGEST_FLUSH_RETRY_BACKOFF_MS", 100)),
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Processing worker configuration.
///
/// | Env Var                         | Default |
/// |---------------------------------|---------|
/// | `WORKER_CONCURRENCY`            | `QUEUE_CONSUMER_COUNT` |
/// | `WORKER_BATCH_SIZE`             | `100`   |
/// | `WORKER_BATCH_TIMEOUT_MS`       | `1000`  |
/// | `WORKER_CONSUMER_RETRY_DELAY_MS`| `5000`  |
/// | `WORKER_LEDGER_TIMEOUT_MS`      | `15000` |
/// | `MAX_TASK_RETRIES`              | `3`     |
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub consumer_retry_delay: Duration,
    pub ledger_timeout: Duration,
    pub max_task_retries: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            batch_size: 100,
            batch_timeout: Duration::from_secs(1),
            consumer_retry_delay: Duration::from_secs(5),
            ledger_timeout: Duration::from_secs(15),
            max_task_retries: 3,
        }
    }
}

impl WorkerConfig {
    pub fn from_env(consumer_count: usize) -> Self {
        let defaults = Self::default();
        Self {
            concurrency: var_or("WORKER_CONCURRENCY", consumer_count),
            batch_size: var_or("WORKER_BATCH_SIZE", defaults.batch_size),
            batch_timeout: Duration::from_millis(var_or("WORKER_BATCH_TIMEOUT_MS", 1000)),
            consumer_retry_delay: Duration::from_millis(var_or(
                "WORKER_CONSUMER_RETRY_DELAY_MS",
                5000,
            )),
            ledger_timeout: Duration::from_millis(var_or("WORKER_LEDGER_TIMEOUT_MS", 15_000)),
            max_task_retries: var_or("MAX_TASK_RETRIES", defaults.max_task_retries),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Which ledger client implementation the supervisor constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    /// JSON/HTTP gateway in front of a real ledger node.
    Http,
    /// In-memory mock with full contract semantics.
    Mock,
}

impl FromStr for LedgerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(LedgerMode::Http),
            "mock" => Ok(LedgerMode::Mock),
            other => Err(format!("expected 'http' or 'mock', got '{other}'")),
        }
    }
}

/// Ledger client configuration.
///
/// | Env Var                     | Default             |
/// |-----------------------------|---------------------|
/// | `LEDGER_MODE`               | `mock`              |
/// | `LEDGER_GATEWAY_URL`        | `http://127.0.0.1:18080` |
/// | `LEDGER_CONTRACT_NAME`      | `log_attestor`      |
/// | `LEDGER_SUBMIT_BATCH_METHOD`| `submit_logs_batch` |
/// | `LEDGER_FIND_BY_HASH_METHOD`| `find_log_by_hash`  |
/// | `LEDGER_GET_BY_TX_METHOD`   | `get_log_by_tx`     |
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub mode: LedgerMode,
    pub gateway_url: String,
    pub contract_name: String,
    pub submit_batch_method: String,
    pub find_by_hash_method: String,
    pub get_by_tx_method: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: LedgerMode::Mock,
            gateway_url: "http://127.0.0.1:18080".to_string(),
            contract_name: "log_attestor".to_string(),
            submit_batch_method: "submit_logs_batch".to_string(),
            find_by_hash_method: "find_log_by_hash".to_string(),
            get_by_tx_method: "get_log_by_tx".to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            mode: var_or("LEDGER_MODE", defaults.mode),
            gateway_url: var_string("LEDGER_GATEWAY_URL", &defaults.gateway_url),
            contract_name: var_string("LEDGER_CONTRACT_NAME", &defaults.contract_name),
            submit_batch_method: var_string(
                "LEDGER_SUBMIT_BATCH_METHOD",
                &defaults.submit_batch_method,
            ),
            find_by_hash_method: var_string(
                "LEDGER_FIND_BY_HASH_METHOD",
                &defaults.find_by_hash_method,
            ),
            get_by_tx_method: var_string("LEDGER_GET_BY_TX_METHOD", &defaults.get_by_tx_method),
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP server
// ---------------------------------------------------------------------------

/// Ingestion HTTP server configuration.
///
/// | Env Var                | Default   |
/// |------------------------|-----------|
/// | `HOST`                 | `0.0.0.0` |
/// | `PORT`                 | `3000`    |
/// | `REQUEST_TIMEOUT_SECS` | `30`      |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: var_string("HOST", &defaults.host),
            port: var_or("PORT", defaults.port),
            request_timeout_secs: var_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batcher_defaults_match_documented_values() {
        let cfg = BatcherConfig::default();
        assert_eq!(cfg.batch_size, 100);
        assert_eq!(cfg.batch_timeout, Duration::from_millis(100));
        assert_eq!(cfg.flush_channel_capacity, 100);
    }

    #[test]
    fn worker_defaults_match_documented_values() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.batch_size, 100);
        assert_eq!(cfg.batch_timeout, Duration::from_secs(1));
        assert_eq!(cfg.consumer_retry_delay, Duration::from_secs(5));
        assert_eq!(cfg.ledger_timeout, Duration::from_secs(15));
        assert_eq!(cfg.max_task_retries, 3);
    }

    #[test]
    fn offset_reset_parses_both_variants() {
        assert_eq!("earliest".parse::<OffsetReset>().unwrap(), OffsetReset::Earliest);
        assert_eq!("latest".parse::<OffsetReset>().unwrap(), OffsetReset::Latest);
        assert!("neither".parse::<OffsetReset>().is_err());
    }

    #[test]
    fn ledger_mode_parses_both_variants() {
        assert_eq!("http".parse::<LedgerMode>().unwrap(), LedgerMode::Http);
        assert_eq!("mock".parse::<LedgerMode>().unwrap(), LedgerMode::Mock);
        assert!("fabric".parse::<LedgerMode>().is_err());
    }
}
