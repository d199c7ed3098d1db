//! Transaction authorization: call-scoped options and signing.
//!
//! # Responsibilities
//! - Fetch a fresh nonce and gas price for every transaction
//! - Enforce the gas price ceiling and apply the safety multiplier
//! - Sign fully populated transactions for one account
//!
//! A `Transactor` is the authorization context for one account. It is not
//! safe to drive two writes through it concurrently: both would fetch the same
//! pending nonce. `ValueInteractor` keeps it behind a mutex for that reason.

use alloy::consensus::TxEnvelope;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, U256};
use alloy::rpc::types::TransactionRequest;

use crate::blockchain::client::ChainConnection;
use crate::blockchain::types::{BlockchainConfig, BlockchainError, BlockchainResult, ChainId};
use crate::blockchain::wallet::Wallet;
use crate::error::InteractorError;

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Gas pricing rules applied to every write.
#[derive(Debug, Clone, PartialEq)]
pub struct GasPolicy {
    /// Multiplier applied to the node's suggestion.
    pub multiplier: f64,
    /// Refuse to sign above this price.
    pub max_gas_price_gwei: u64,
    /// Fixed gas limit; `None` asks the binding to estimate.
    pub gas_limit: Option<u64>,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self::from(&BlockchainConfig::default())
    }
}

impl From<&BlockchainConfig> for GasPolicy {
    fn from(config: &BlockchainConfig) -> Self {
        Self {
            multiplier: config.gas_price_multiplier,
            max_gas_price_gwei: config.max_gas_price_gwei,
            gas_limit: config.gas_limit,
        }
    }
}

impl GasPolicy {
    /// Check `suggested` against the ceiling and apply the multiplier.
    pub fn price(&self, suggested: u128) -> BlockchainResult<u128> {
        let current_gwei = suggested / WEI_PER_GWEI;
        if current_gwei > u128::from(self.max_gas_price_gwei) {
            return Err(BlockchainError::GasPriceTooHigh {
                current_gwei: u64::try_from(current_gwei).unwrap_or(u64::MAX),
                max_gwei: self.max_gas_price_gwei,
            });
        }

        // Per-mille integer math keeps large prices exact.
        let per_mille = (self.multiplier * 1000.0).round() as u128;
        Ok(suggested.saturating_mul(per_mille) / 1000)
    }
}

/// Per-call transaction options. Built fresh for each write, never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactOpts {
    /// Sending account.
    pub from: Address,
    /// Account nonce at preparation time.
    pub nonce: u64,
    /// Gas price in wei, multiplier already applied.
    pub gas_price: u128,
    /// Gas limit, if fixed by policy.
    pub gas_limit: Option<u64>,
    /// Native value attached to the call.
    pub value: U256,
}

/// Authorization context for one account on one chain.
#[derive(Debug, Clone)]
pub struct Transactor {
    wallet: Wallet,
    chain_id: ChainId,
}

impl Transactor {
    /// Create a transactor for a known chain.
    pub fn new(wallet: Wallet, chain_id: ChainId) -> Self {
        Self { wallet, chain_id }
    }

    /// Parse `private_key_hex` and bind it to the chain behind `conn`.
    ///
    /// When `expected_chain_id` is set, a node on any other chain is refused.
    pub async fn connect<C: ChainConnection>(
        private_key_hex: &str,
        conn: &C,
        expected_chain_id: Option<u64>,
    ) -> Result<Self, InteractorError> {
        let wallet =
            Wallet::from_private_key(private_key_hex).map_err(InteractorError::InvalidCredential)?;
        Self::for_wallet(wallet, conn, expected_chain_id).await
    }

    /// Like [`connect`](Self::connect), but `None` means no signing key.
    ///
    /// Only an absent key yields `Ok(None)`; a key that is present but does
    /// not parse fails with `InvalidCredential`.
    pub async fn from_optional_key<C: ChainConnection>(
        private_key_hex: Option<&str>,
        conn: &C,
        expected_chain_id: Option<u64>,
    ) -> Result<Option<Self>, InteractorError> {
        match private_key_hex {
            Some(key) => Self::connect(key, conn, expected_chain_id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Bind an already loaded wallet to the chain behind `conn`.
    pub async fn for_wallet<C: ChainConnection>(
        wallet: Wallet,
        conn: &C,
        expected_chain_id: Option<u64>,
    ) -> Result<Self, InteractorError> {
        let chain_id = conn
            .chain_id()
            .await
            .map_err(InteractorError::IdentityUnavailable)?;

        if let Some(expected) = expected_chain_id {
            if chain_id.0 != expected {
                return Err(InteractorError::IdentityUnavailable(
                    BlockchainError::ChainMismatch {
                        expected,
                        actual: chain_id.0,
                    },
                ));
            }
        }

        tracing::info!(address = %wallet.address(), chain_id = %chain_id, "Transactor ready");
        Ok(Self::new(wallet, chain_id))
    }

    /// Account this context signs for.
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Chain this context signs for.
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Fetch a fresh nonce and gas price and build the options for one call.
    pub async fn prepare<C: ChainConnection>(
        &self,
        conn: &C,
        policy: &GasPolicy,
    ) -> BlockchainResult<TransactOpts> {
        let nonce = conn.pending_nonce(self.address()).await?;
        let suggested = conn.suggested_gas_price().await?;
        let gas_price = policy.price(suggested)?;

        tracing::debug!(
            nonce,
            suggested_gas_price = suggested,
            gas_price,
            "Prepared transaction options"
        );

        Ok(TransactOpts {
            from: self.address(),
            nonce,
            gas_price,
            gas_limit: policy.gas_limit,
            value: U256::ZERO,
        })
    }

    /// Apply `opts` to `request` and sign it.
    ///
    /// `opts.gas_limit` must be set by now (fixed or estimated).
    pub async fn authorize(
        &self,
        opts: &TransactOpts,
        request: TransactionRequest,
    ) -> BlockchainResult<TxEnvelope> {
        let gas_limit = opts
            .gas_limit
            .ok_or_else(|| BlockchainError::Wallet("gas limit not set".to_string()))?;

        let request = request
            .with_from(opts.from)
            .with_nonce(opts.nonce)
            .with_gas_price(opts.gas_price)
            .with_gas_limit(gas_limit)
            .with_value(opts.value)
            .with_chain_id(self.chain_id.0);

        self.wallet.sign_transaction(request).await
    }
}
