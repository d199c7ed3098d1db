//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment (private key) + BlockchainConfig (endpoints, gas rules)
//!     → wallet.rs (key loading, signing)
//!     → client.rs (RPC connection with timeouts and failover)
//!     → transaction.rs (fresh nonce/gas per call, authorization)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::{BlockchainClient, ChainConnection};
pub use transaction::{GasPolicy, TransactOpts, Transactor};
pub use types::{BlockchainConfig, BlockchainError, BlockchainResult, ChainId, TxStatus, WriteReceipt};
pub use wallet::{Wallet, PRIVATE_KEY_ENV_VAR};
