//! Error taxonomy for storage value operations.

use alloy::primitives::TxHash;
use thiserror::Error;

use crate::blockchain::BlockchainError;

/// Failure of a read, write or watch.
///
/// No variant is retried internally. After `SubmissionFailed` nothing reached
/// the chain. After `ConfirmationFailed` the transaction may still be mined
/// later. `TransactionReverted` means it was mined and had no effect.
#[derive(Debug, Error)]
pub enum InteractorError {
    #[error("failed to read value: {0}")]
    ReadFailed(#[source] BlockchainError),

    #[error("failed to submit transaction: {0}")]
    SubmissionFailed(#[source] BlockchainError),

    #[error("failed to confirm transaction {tx_hash}: {source}")]
    ConfirmationFailed {
        tx_hash: TxHash,
        #[source]
        source: BlockchainError,
    },

    #[error("transaction {tx_hash} reverted in block {block_number}")]
    TransactionReverted { tx_hash: TxHash, block_number: u64 },

    #[error("failed to filter change events: {0}")]
    EventFilterFailed(#[source] BlockchainError),

    #[error("failed to decode change event: {0}")]
    EventDecodeFailed(#[source] BlockchainError),

    #[error("event subscription error: {0}")]
    SubscriptionFailed(#[source] BlockchainError),

    #[error("invalid credential: {0}")]
    InvalidCredential(#[source] BlockchainError),

    #[error("chain identity unavailable: {0}")]
    IdentityUnavailable(#[source] BlockchainError),
}

impl InteractorError {
    /// Short, stable name of the failure kind for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReadFailed(_) => "read_failed",
            Self::SubmissionFailed(_) => "submission_failed",
            Self::ConfirmationFailed { .. } => "confirmation_failed",
            Self::TransactionReverted { .. } => "transaction_reverted",
            Self::EventFilterFailed(_) => "event_filter_failed",
            Self::EventDecodeFailed(_) => "event_decode_failed",
            Self::SubscriptionFailed(_) => "subscription_failed",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::IdentityUnavailable(_) => "identity_unavailable",
        }
    }

    /// Classify a log retrieval error: decoding problems are reported apart
    /// from transport problems.
    pub fn from_filter(err: BlockchainError) -> Self {
        match err {
            BlockchainError::Decode(_) => Self::EventDecodeFailed(err),
            other => Self::EventFilterFailed(other),
        }
    }
}

/// Result type for interactor operations.
pub type InteractorResult<T> = Result<T, InteractorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_classification() {
        let err = InteractorError::from_filter(BlockchainError::Decode("bad data".into()));
        assert_eq!(err.kind(), "event_decode_failed");

        let err = InteractorError::from_filter(BlockchainError::Timeout(10));
        assert_eq!(err.kind(), "event_filter_failed");
    }

    #[test]
    fn test_reverted_display() {
        let err = InteractorError::TransactionReverted {
            tx_hash: TxHash::ZERO,
            block_number: 12,
        };
        assert!(err.to_string().contains("reverted in block 12"));
    }
}
