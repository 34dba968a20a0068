//! Operational configuration, loaded from TOML.

pub mod logging;

use std::path::PathBuf;

use mintio_params::MintParams;
use serde::{Deserialize, Serialize};

/// Default datadir.
const DEFAULT_DATADIR: &str = "mintio-data";

/// Default interval between sweeper passes in ms.
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 30_000;

/// Default interval for deposit polling in ms.
const DEFAULT_DEPOSIT_POLL_MS: u64 = 2_000;

/// Default deposit-wait timeout in ms.
const DEFAULT_DEPOSIT_TIMEOUT_MS: u64 = 120_000;

/// Default initial indexer poll interval in ms.
const DEFAULT_INDEXER_POLL_MS: u64 = 3_000;

/// Default ceiling for the indexer backoff in ms.
const DEFAULT_INDEXER_MAX_BACKOFF_MS: u64 = 30_000;

/// Default indexer verification timeout in ms.
const DEFAULT_INDEXER_TIMEOUT_MS: u64 = 300_000;

/// Default number of internal retries for ledger submission.
const DEFAULT_SUBMIT_RETRY_COUNT: u16 = 3;

/// Ledger node connection config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub rpc_user: String,
    pub rpc_password: String,

    /// Internal retries for transaction submission before the error is
    /// surfaced to the caller.
    #[serde(default = "default_submit_retry_count")]
    pub submit_retry_count: u16,
}

/// External indexer connection and polling config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Base URL of the read-only indexer REST service.
    pub base_url: String,

    /// Initial poll interval; doubles per attempt up to `max_backoff_ms`.
    #[serde(default = "default_indexer_poll_ms")]
    pub poll_interval_ms: u64,

    /// Backoff ceiling.
    #[serde(default = "default_indexer_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Overall verification deadline per transaction.
    #[serde(default = "default_indexer_timeout_ms")]
    pub verify_timeout_ms: u64,
}

/// Engine scheduling knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The data directory where the reservation store resides.
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,

    /// Interval between sweeper passes.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// How often to poll for the commit deposit at the derived address.
    #[serde(default = "default_deposit_poll_ms")]
    pub deposit_poll_ms: u64,

    /// How long to wait for the commit deposit before reporting a
    /// retryable timeout.
    #[serde(default = "default_deposit_timeout_ms")]
    pub deposit_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Directory path for file-based logging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Use JSON format for logs instead of compact format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_format: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub indexer: IndexerConfig,
    pub engine: EngineConfig,

    /// Protocol parameters (fees, TTLs, ticker policy).
    pub params: MintParams,

    /// Logging configuration (optional section in TOML).
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_datadir() -> PathBuf {
    DEFAULT_DATADIR.into()
}

fn default_sweep_interval_ms() -> u64 {
    DEFAULT_SWEEP_INTERVAL_MS
}

fn default_deposit_poll_ms() -> u64 {
    DEFAULT_DEPOSIT_POLL_MS
}

fn default_deposit_timeout_ms() -> u64 {
    DEFAULT_DEPOSIT_TIMEOUT_MS
}

fn default_indexer_poll_ms() -> u64 {
    DEFAULT_INDEXER_POLL_MS
}

fn default_indexer_max_backoff_ms() -> u64 {
    DEFAULT_INDEXER_MAX_BACKOFF_MS
}

fn default_indexer_timeout_ms() -> u64 {
    DEFAULT_INDEXER_TIMEOUT_MS
}

fn default_submit_retry_count() -> u16 {
    DEFAULT_SUBMIT_RETRY_COUNT
}
