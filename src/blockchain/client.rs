//! Blockchain RPC client with timeout and error handling.
//!
//! # Responsibilities
//! - Connect to JSON-RPC endpoints (primary + failovers, optional websocket)
//! - Query chain state (chain id, nonce, gas price, head block, receipts)
//! - Wait for transactions to be mined, with cancellation
//! - Handle timeouts and network errors gracefully

use std::future::Future;
use std::time::Duration;

use alloy::consensus::TxEnvelope;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::pubsub::Subscription;
use alloy::rpc::types::{Filter, Log, TransactionReceipt, TransactionRequest};
use alloy::transports::TransportResult;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::blockchain::types::{
    BlockchainConfig, BlockchainError, BlockchainResult, ChainId, TxStatus, WriteReceipt,
};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Remote ledger node capabilities needed by the write and watch protocols.
///
/// Every method is a remote call; implementations must not cache results.
pub trait ChainConnection: Send + Sync {
    /// Chain identity used for replay protection.
    fn chain_id(&self) -> impl Future<Output = BlockchainResult<ChainId>> + Send;

    /// Next nonce for `account`, counting pending transactions.
    fn pending_nonce(&self, account: Address)
        -> impl Future<Output = BlockchainResult<u64>> + Send;

    /// Node's suggested gas price in wei.
    fn suggested_gas_price(&self) -> impl Future<Output = BlockchainResult<u128>> + Send;

    /// Current head block number.
    fn block_number(&self) -> impl Future<Output = BlockchainResult<u64>> + Send;

    /// Block until `tx_hash` is mined, or `cancel` fires.
    ///
    /// There is no built-in deadline; callers wrap this in a timeout when
    /// they need one.
    fn wait_until_mined(
        &self,
        tx_hash: TxHash,
        cancel: &Shutdown,
    ) -> impl Future<Output = BlockchainResult<WriteReceipt>> + Send;
}

/// Blockchain RPC client wrapper with failover support.
#[derive(Clone)]
pub struct BlockchainClient {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    /// Websocket provider for log subscriptions.
    ws_provider: Option<DynProvider>,
    /// Configuration.
    config: BlockchainConfig,
    /// Request timeout duration.
    timeout_duration: Duration,
}

impl BlockchainClient {
    /// Create a new blockchain client.
    ///
    /// HTTP endpoints are connected lazily, so this only fails on a malformed
    /// primary URL or an unreachable websocket endpoint.
    pub async fn new(config: BlockchainConfig) -> BlockchainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        // 1. Add primary provider
        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(
            ProviderBuilder::new()
                .disable_recommended_fillers()
                .connect_http(primary_url)
                .erased(),
        );

        // 2. Add failover providers
        for url_str in &config.failover_urls {
            match url_str.parse::<url::Url>() {
                Ok(url) => providers.push(
                    ProviderBuilder::new()
                        .disable_recommended_fillers()
                        .connect_http(url)
                        .erased(),
                ),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        // 3. Optional websocket provider for live subscriptions
        let ws_provider = match &config.ws_url {
            Some(ws_url) => {
                let fut = ProviderBuilder::new()
                    .disable_recommended_fillers()
                    .connect_ws(WsConnect::new(ws_url.clone()));
                let provider = timeout(timeout_duration, fut)
                    .await
                    .map_err(|_| BlockchainError::Timeout(config.rpc_timeout_secs))?
                    .map_err(|e| {
                        BlockchainError::Rpc(format!("Websocket connect to '{}' failed: {}", ws_url, e))
                    })?;
                Some(provider.erased())
            }
            None => None,
        };

        tracing::info!(
            rpc_url = %config.rpc_url,
            failovers = providers.len() - 1,
            websocket = ws_provider.is_some(),
            "Blockchain client initialized"
        );

        Ok(Self {
            providers,
            ws_provider,
            config,
            timeout_duration,
        })
    }

    /// Run `call` against each provider in turn until one answers in time.
    async fn with_failover<T, F, Fut>(&self, op: &'static str, call: F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let mut last_error = String::from("no providers configured");
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, call(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, op, error = %e, "RPC error, trying next provider");
                    last_error = e.to_string();
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, op, "RPC timeout, trying next provider");
                    last_error = format!("timeout after {}s", self.config.rpc_timeout_secs);
                }
            }
            metrics::record_rpc_error(op);
        }
        Err(BlockchainError::Rpc(format!(
            "All providers failed to {}: {}",
            op, last_error
        )))
    }

    /// Verify the connected chain ID matches `expected`.
    pub async fn verify_chain_id(&self, expected: u64) -> BlockchainResult<ChainId> {
        let chain_id = self.get_chain_id().await?;
        if chain_id.0 != expected {
            return Err(BlockchainError::ChainMismatch {
                expected,
                actual: chain_id.0,
            });
        }
        Ok(chain_id)
    }

    /// Get the chain ID from the RPC.
    pub async fn get_chain_id(&self) -> BlockchainResult<ChainId> {
        self.with_failover("get chain id", |p| async move { p.get_chain_id().await })
            .await
            .map(ChainId)
    }

    /// Get the latest block number.
    pub async fn get_block_number(&self) -> BlockchainResult<u64> {
        self.with_failover("get block number", |p| async move { p.get_block_number().await })
            .await
    }

    /// Get the balance of an address.
    pub async fn get_balance(&self, address: Address) -> BlockchainResult<U256> {
        self.with_failover("get balance", move |p| async move { p.get_balance(address).await })
            .await
    }

    /// Get the pending transaction count (nonce) for an address.
    pub async fn get_transaction_count(&self, address: Address) -> BlockchainResult<u64> {
        self.with_failover("get transaction count", move |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    /// Get a transaction receipt by hash.
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> BlockchainResult<Option<TransactionReceipt>> {
        self.with_failover("get receipt", move |p| async move {
            p.get_transaction_receipt(tx_hash).await
        })
        .await
    }

    /// Get current gas price in wei.
    pub async fn get_gas_price(&self) -> BlockchainResult<u128> {
        self.with_failover("get gas price", |p| async move { p.get_gas_price().await })
            .await
    }

    /// Execute a read-only call against the latest block.
    pub async fn call(&self, tx: TransactionRequest) -> BlockchainResult<Bytes> {
        self.with_failover("call", move |p| {
            let tx = tx.clone();
            async move { p.call(tx).await }
        })
        .await
    }

    /// Estimate gas for a transaction.
    pub async fn estimate_gas(&self, tx: TransactionRequest) -> BlockchainResult<u64> {
        self.with_failover("estimate gas", move |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(tx).await }
        })
        .await
    }

    /// Fetch logs matching `filter`.
    pub async fn get_logs(&self, filter: &Filter) -> BlockchainResult<Vec<Log>> {
        self.with_failover("get logs", move |p| {
            let filter = filter.clone();
            async move { p.get_logs(&filter).await }
        })
        .await
    }

    /// Broadcast a signed transaction through the primary provider.
    ///
    /// Never retried against failovers: a timed-out broadcast may still have
    /// reached the mempool, and resending is the caller's decision.
    pub async fn send_envelope(&self, envelope: TxEnvelope) -> BlockchainResult<TxHash> {
        let fut = self.providers[0].send_tx_envelope(envelope);
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(pending)) => Ok(*pending.tx_hash()),
            Ok(Err(e)) => {
                metrics::record_rpc_error("send transaction");
                Err(BlockchainError::Rpc(format!("Transaction rejected: {}", e)))
            }
            Err(_) => {
                metrics::record_rpc_error("send transaction");
                Err(BlockchainError::Timeout(self.config.rpc_timeout_secs))
            }
        }
    }

    /// Open a websocket log subscription.
    pub async fn subscribe_logs(&self, filter: &Filter) -> BlockchainResult<Subscription<Log>> {
        let provider = self
            .ws_provider
            .as_ref()
            .ok_or_else(|| BlockchainError::NotAvailable("no websocket endpoint configured".into()))?;
        timeout(self.timeout_duration, provider.subscribe_logs(filter))
            .await
            .map_err(|_| BlockchainError::Timeout(self.config.rpc_timeout_secs))?
            .map_err(|e| BlockchainError::Rpc(format!("Log subscription failed: {}", e)))
    }

    /// Whether live logs can be pushed over a websocket.
    pub fn supports_subscriptions(&self) -> bool {
        self.ws_provider.is_some()
    }

    /// Check if the blockchain is reachable.
    pub async fn is_healthy(&self) -> bool {
        self.get_block_number().await.is_ok()
    }

    /// Interval between receipt and log polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    async fn poll_receipt(&self, tx_hash: TxHash) -> BlockchainResult<WriteReceipt> {
        let required_confirmations = u64::from(self.config.confirmation_blocks);
        let mut ticker = interval(self.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let receipt = match self.get_transaction_receipt(tx_hash).await? {
                Some(r) => r,
                None => {
                    tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
                    continue;
                }
            };
            let Some(tx_block) = receipt.block_number else {
                continue;
            };

            // A revert is final; extra depth cannot change it.
            if !receipt.status() {
                return Ok(WriteReceipt {
                    tx_hash,
                    block_number: tx_block,
                    status: TxStatus::Failure,
                    nonce: None,
                });
            }

            if required_confirmations > 0 {
                let current_block = self.get_block_number().await?;
                let confirmations = current_block.saturating_sub(tx_block);
                if confirmations < required_confirmations {
                    tracing::debug!(
                        tx_hash = %tx_hash,
                        confirmations,
                        required = required_confirmations,
                        "Waiting for confirmations"
                    );
                    continue;
                }
            }

            return Ok(WriteReceipt {
                tx_hash,
                block_number: tx_block,
                status: TxStatus::Success,
                nonce: None,
            });
        }
    }
}

impl ChainConnection for BlockchainClient {
    async fn chain_id(&self) -> BlockchainResult<ChainId> {
        self.get_chain_id().await
    }

    async fn pending_nonce(&self, account: Address) -> BlockchainResult<u64> {
        self.get_transaction_count(account).await
    }

    async fn suggested_gas_price(&self) -> BlockchainResult<u128> {
        self.get_gas_price().await
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        self.get_block_number().await
    }

    async fn wait_until_mined(
        &self,
        tx_hash: TxHash,
        cancel: &Shutdown,
    ) -> BlockchainResult<WriteReceipt> {
        tokio::select! {
            biased;
            _ = cancel.triggered() => {
                tracing::info!(tx_hash = %tx_hash, "Confirmation wait cancelled");
                Err(BlockchainError::Cancelled)
            }
            receipt = self.poll_receipt(tx_hash) => receipt,
        }
    }
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("failovers", &(self.providers.len() - 1))
            .field("websocket", &self.ws_provider.is_some())
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BlockchainConfig {
        BlockchainConfig {
            // Nothing listens on port 1, so every call fails fast.
            rpc_url: "http://127.0.0.1:1".to_string(),
            rpc_timeout_secs: 2,
            poll_interval_ms: 50,
            ..BlockchainConfig::default()
        }
    }

    #[tokio::test]
    async fn test_client_creation() {
        // HTTP providers connect lazily, so an unreachable node is fine here.
        let result = BlockchainClient::new(test_config()).await;
        assert!(result.is_ok());
        assert!(!result.unwrap().supports_subscriptions());
    }

    #[tokio::test]
    async fn test_invalid_primary_url() {
        let mut config = test_config();
        config.rpc_url = "not a url".to_string();
        let err = BlockchainClient::new(config).await.unwrap_err();
        assert!(err.to_string().contains("Invalid RPC URL"));
    }

    #[tokio::test]
    async fn test_rpc_failover() {
        let mut config = test_config();
        config.failover_urls.push("http://127.0.0.1:2".to_string());
        config.failover_urls.push("definitely not a url".to_string());

        let client = BlockchainClient::new(config).await.unwrap();
        assert_eq!(client.providers.len(), 2);

        let result = client.get_chain_id().await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("All providers failed to get chain id"));
    }

    #[tokio::test]
    async fn test_subscription_needs_websocket() {
        let client = BlockchainClient::new(test_config()).await.unwrap();
        let err = client.subscribe_logs(&Filter::new()).await.unwrap_err();
        assert!(matches!(err, BlockchainError::NotAvailable(_)));
    }

    #[tokio::test]
    async fn test_wait_until_mined_cancelled() {
        let client = BlockchainClient::new(test_config()).await.unwrap();
        let cancel = Shutdown::new();
        cancel.trigger();

        let err = client
            .wait_until_mined(TxHash::ZERO, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BlockchainError::Cancelled));
    }
}
