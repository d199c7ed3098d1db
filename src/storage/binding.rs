//! Contract binding for the `SimpleStorage` contract.
//!
//! Encodes `get()` / `set(uint256)` calls and decodes `DataStored` logs. The
//! [`StorageBinding`] trait is the seam the interactor depends on; the
//! alloy-backed [`ContractBinding`] is the production implementation.

use std::future::Future;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use futures_util::StreamExt;

use crate::blockchain::{BlockchainClient, BlockchainError, BlockchainResult, TransactOpts, Transactor};
use crate::storage::events::{ChangeEvent, ChangeSubscription, SUBSCRIPTION_BUFFER};
use crate::storage::monitor::LogPoller;

sol! {
    /// Single-slot integer store.
    #[sol(bytecode = "6080604052348015600e575f5ffd5b5061017a8061001c5f395ff3fe608060405234801561000f575f5ffd5b5060043610610034575f3560e01c806360fe47b1146100385780636d4ce63c14610054575b5f5ffd5b610052600480360381019061004d91906100f1565b610072565b005b61005c6100b2565b604051610069919061012b565b60405180910390f35b805f819055507f9455957c3b77d1d4ed071e2b469dd77e37fc5dfd3b4d44dc8a997cc97c7b3d49816040516100a7919061012b565b60405180910390a150565b5f5f54905090565b5f5ffd5b5f819050919050565b6100d0816100be565b81146100da575f5ffd5b50565b5f813590506100eb816100c7565b92915050565b5f60208284031215610106576101056100ba565b5b5f610113848285016100dd565b91505092915050565b610125816100be565b82525050565b5f60208201905061013e5f83018461011c565b9291505056fea26469706673582212207b2b384981404b37d53366f49681e3a297b35b3dcd6e6ef82ab066338a6211f664736f6c634300081e0033")]
    contract SimpleStorage {
        /// Emitted on every successful `set`.
        event DataStored(uint256 newValue);

        function get() external view returns (uint256);
        function set(uint256 x) external;
    }
}

/// Widest block range requested in one `eth_getLogs` call.
///
/// Public endpoints commonly cap log queries at 10k blocks.
pub const MAX_LOG_RANGE: u64 = 10_000;

/// Read, write and event access to the storage contract.
pub trait StorageBinding: Send + Sync {
    /// Current stored value.
    fn read(&self) -> impl Future<Output = BlockchainResult<U256>> + Send;

    /// Sign and submit `set(value)` with `opts`; returns the pending tx hash.
    fn write(
        &self,
        auth: &Transactor,
        opts: &TransactOpts,
        value: U256,
    ) -> impl Future<Output = BlockchainResult<TxHash>> + Send;

    /// Change events in `[from_block, to_block]`, in chain order.
    ///
    /// Undecodable logs fail with [`BlockchainError::Decode`].
    fn filter_changes(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = BlockchainResult<Vec<ChangeEvent>>> + Send;

    /// Open a live subscription for change events mined from now on.
    ///
    /// Implementations may also deliver some earlier events; the caller
    /// de-duplicates against its backfill.
    fn subscribe_changes(&self) -> impl Future<Output = BlockchainResult<ChangeSubscription>> + Send;
}

/// Decode one `DataStored` log.
pub fn decode_change(log: &Log) -> BlockchainResult<ChangeEvent> {
    let decoded = log
        .log_decode::<SimpleStorage::DataStored>()
        .map_err(|e| BlockchainError::Decode(format!("DataStored log: {}", e)))?;

    let missing = |field: &str| BlockchainError::Decode(format!("log without {}", field));
    Ok(ChangeEvent {
        new_value: decoded.inner.data.newValue,
        block_number: log.block_number.ok_or_else(|| missing("block number"))?,
        log_index: log.log_index.ok_or_else(|| missing("log index"))?,
        tx_hash: log.transaction_hash.ok_or_else(|| missing("transaction hash"))?,
    })
}

/// Filter selecting `DataStored` logs of the contract at `address`.
pub fn change_filter(address: Address) -> Filter {
    Filter::new()
        .address(address)
        .event_signature(SimpleStorage::DataStored::SIGNATURE_HASH)
}

/// Fetch and decode change events in `[from_block, to_block]`, chunked.
pub(crate) async fn fetch_changes(
    client: &BlockchainClient,
    address: Address,
    from_block: u64,
    to_block: u64,
) -> BlockchainResult<Vec<ChangeEvent>> {
    let mut events = Vec::new();
    let mut start = from_block;

    while start <= to_block {
        let end = start.saturating_add(MAX_LOG_RANGE - 1).min(to_block);
        let filter = change_filter(address).from_block(start).to_block(end);
        let logs = client.get_logs(&filter).await?;

        tracing::debug!(from = start, to = end, logs = logs.len(), "Fetched change logs");
        for log in logs.iter().filter(|log| !log.removed) {
            events.push(decode_change(log)?);
        }

        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }

    events.sort_by_key(ChangeEvent::position);
    events.dedup_by_key(|event| event.position());
    Ok(events)
}

/// alloy-backed binding to one deployed `SimpleStorage` contract.
#[derive(Debug, Clone)]
pub struct ContractBinding {
    client: BlockchainClient,
    address: Address,
}

impl ContractBinding {
    pub fn new(client: BlockchainClient, address: Address) -> Self {
        Self { client, address }
    }

    /// Contract address.
    pub fn address(&self) -> Address {
        self.address
    }

    async fn subscribe_ws(&self) -> BlockchainResult<ChangeSubscription> {
        let subscription = self.client.subscribe_logs(&change_filter(self.address)).await?;
        tracing::info!(contract = %self.address, "Subscribed to change logs over websocket");

        Ok(ChangeSubscription::spawn(SUBSCRIPTION_BUFFER, move |feed| async move {
            let mut logs = std::pin::pin!(subscription.into_stream());
            loop {
                let next = tokio::select! {
                    _ = feed.closed() => return,
                    next = logs.next() => next,
                };

                let Some(log) = next else {
                    feed.fail(BlockchainError::SubscriptionClosed);
                    return;
                };
                if log.removed {
                    tracing::warn!(block = ?log.block_number, "Ignoring removed change log");
                    continue;
                }
                match decode_change(&log) {
                    Ok(event) => {
                        if !feed.send(event).await {
                            return;
                        }
                    }
                    Err(e) => {
                        feed.fail(e);
                        return;
                    }
                }
            }
        }))
    }
}

impl StorageBinding for ContractBinding {
    async fn read(&self) -> BlockchainResult<U256> {
        let request = TransactionRequest::default()
            .with_to(self.address)
            .with_input(SimpleStorage::getCall {}.abi_encode());
        let output = self.client.call(request).await?;

        SimpleStorage::getCall::abi_decode_returns(&output)
            .map_err(|e| BlockchainError::Decode(format!("get() result: {}", e)))
    }

    async fn write(
        &self,
        auth: &Transactor,
        opts: &TransactOpts,
        value: U256,
    ) -> BlockchainResult<TxHash> {
        let request = TransactionRequest::default()
            .with_to(self.address)
            .with_input(SimpleStorage::setCall { x: value }.abi_encode());

        let mut opts = opts.clone();
        if opts.gas_limit.is_none() {
            let estimate = self
                .client
                .estimate_gas(request.clone().with_from(opts.from).with_value(opts.value))
                .await?;
            tracing::debug!(gas = estimate, "Estimated gas for set()");
            opts.gas_limit = Some(estimate);
        }

        let envelope = auth.authorize(&opts, request).await?;
        self.client.send_envelope(envelope).await
    }

    async fn filter_changes(&self, from_block: u64, to_block: u64) -> BlockchainResult<Vec<ChangeEvent>> {
        fetch_changes(&self.client, self.address, from_block, to_block).await
    }

    async fn subscribe_changes(&self) -> BlockchainResult<ChangeSubscription> {
        if self.client.supports_subscriptions() {
            self.subscribe_ws().await
        } else {
            LogPoller::start(self.client.clone(), self.address).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, LogData, B256};

    fn rpc_log(data: LogData, block: Option<u64>) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: Address::ZERO,
                data,
            },
            block_hash: Some(B256::ZERO),
            block_number: block,
            block_timestamp: None,
            transaction_hash: Some(TxHash::with_last_byte(1)),
            transaction_index: Some(0),
            log_index: Some(2),
            removed: false,
        }
    }

    #[test]
    fn test_selectors_match_deployed_abi() {
        assert_eq!(SimpleStorage::getCall::SELECTOR, [0x6d, 0x4c, 0xe6, 0x3c]);
        assert_eq!(SimpleStorage::setCall::SELECTOR, [0x60, 0xfe, 0x47, 0xb1]);
    }

    #[test]
    fn test_decode_change_event() {
        let event = SimpleStorage::DataStored {
            newValue: U256::from(42),
        };
        let log = rpc_log(event.encode_log_data(), Some(9));

        let change = decode_change(&log).unwrap();
        assert_eq!(change.new_value, U256::from(42));
        assert_eq!(change.position(), (9, 2));
    }

    #[test]
    fn test_decode_rejects_foreign_log() {
        let data = LogData::new_unchecked(vec![B256::ZERO], Bytes::new());
        let err = decode_change(&rpc_log(data, Some(1))).unwrap_err();
        assert!(matches!(err, BlockchainError::Decode(_)));
    }

    #[test]
    fn test_decode_requires_block_number() {
        let event = SimpleStorage::DataStored {
            newValue: U256::from(1),
        };
        let err = decode_change(&rpc_log(event.encode_log_data(), None)).unwrap_err();
        assert!(err.to_string().contains("block number"));
    }
}
