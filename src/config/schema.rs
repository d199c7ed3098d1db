//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the storage relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener configuration.
    pub listener: ListenerConfig,

    /// Chain connection and gas settings.
    pub blockchain: BlockchainConfig,

    /// The storage contract being served.
    pub contract: ContractConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8081").
    pub bind_address: String,

    /// Total time allowed for one HTTP request, in seconds.
    ///
    /// Writes block until the transaction is mined, so this should be
    /// comfortably above the chain's block time.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8081".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// Blockchain connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs for the same chain.
    pub failover_urls: Vec<String>,

    /// Websocket endpoint used for live log subscriptions.
    ///
    /// When absent, live events are obtained by polling `eth_getLogs`.
    pub ws_url: Option<String>,

    /// Expected chain ID. When set, the signer refuses to start on any other chain.
    pub chain_id: Option<u64>,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Interval between receipt / log polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Blocks that must be built on top of a receipt's block before it counts.
    pub confirmation_blocks: u32,

    /// Deadline for a write's confirmation wait. Absent means wait indefinitely.
    pub confirmation_timeout_secs: Option<u64>,

    /// Gas price multiplier (1.0 = node suggestion, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,

    /// Fixed gas limit for writes. Absent means estimate per transaction.
    pub gas_limit: Option<u64>,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            ws_url: None,
            chain_id: None,
            rpc_timeout_secs: 10,
            poll_interval_ms: 2000,
            confirmation_blocks: 0,
            confirmation_timeout_secs: None,
            gas_price_multiplier: 1.0,
            max_gas_price_gwei: 500,
            gas_limit: None,
        }
    }
}

/// Storage contract configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Contract address. Takes precedence over `address_file`.
    pub address: Option<String>,

    /// File holding the deployed contract address (written by `storage-cli deploy`).
    pub address_file: String,

    /// First block scanned when backfilling change events.
    pub from_block: u64,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            address: None,
            address_file: "contract_address.txt".to_string(),
            from_block: 0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
