//! Chain-specific types and error definitions.

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export BlockchainConfig from config module to avoid duplication
pub use crate::config::schema::BlockchainConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Transaction was not mined before the confirmation deadline.
    #[error("Transaction not confirmed within {0} seconds")]
    ConfirmationTimeout(u64),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid private key format or signing failure.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Gas price exceeded maximum allowed.
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Call result or log could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A live subscription ended without reporting an error.
    #[error("Subscription closed")]
    SubscriptionClosed,

    /// Capability not configured for this client.
    #[error("Blockchain not available: {0}")]
    NotAvailable(String),
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// Mined outcome of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Success,
    Failure,
}

/// Receipt of a mined write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// Hash of the mined transaction.
    pub tx_hash: TxHash,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Execution status.
    pub status: TxStatus,
    /// Account nonce the transaction consumed, when known.
    pub nonce: Option<u64>,
}

impl WriteReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == TxStatus::Success
    }
}
