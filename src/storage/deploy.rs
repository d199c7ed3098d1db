//! Deployment of the storage contract and its cost preview.

use std::path::Path;

use alloy::network::TransactionBuilder;
use alloy::primitives::utils::format_ether;
use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use serde::Serialize;

use crate::blockchain::{
    BlockchainClient, BlockchainError, BlockchainResult, ChainConnection, ChainId, GasPolicy, Transactor,
};
use crate::error::{InteractorError, InteractorResult};
use crate::lifecycle::Shutdown;
use crate::storage::binding::SimpleStorage;

/// Gas limit used for the creation transaction. The contract needs well
/// under this.
pub const DEPLOY_GAS_LIMIT: u64 = 300_000;

/// Cost preview for deploying the contract from one account.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentEstimate {
    pub from: Address,
    pub chain_id: ChainId,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub balance: U256,
}

impl DeploymentEstimate {
    /// Worst-case cost in wei.
    pub fn cost(&self) -> U256 {
        U256::from(self.gas_price) * U256::from(self.gas_limit)
    }

    /// Whether the balance covers the worst-case cost.
    pub fn is_affordable(&self) -> bool {
        self.balance >= self.cost()
    }

    pub fn cost_eth(&self) -> String {
        format_ether(self.cost())
    }

    pub fn balance_eth(&self) -> String {
        format_ether(self.balance)
    }
}

/// A deployed contract.
#[derive(Debug, Clone, Serialize)]
pub struct Deployment {
    pub address: Address,
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// Preview deployment cost for `transactor`'s account without sending anything.
pub async fn estimate_deployment(
    client: &BlockchainClient,
    transactor: &Transactor,
    policy: &GasPolicy,
) -> BlockchainResult<DeploymentEstimate> {
    let from = transactor.address();
    let nonce = client.pending_nonce(from).await?;
    let gas_price = policy.price(client.suggested_gas_price().await?)?;
    let balance = client.get_balance(from).await?;

    let estimate = DeploymentEstimate {
        from,
        chain_id: transactor.chain_id(),
        nonce,
        gas_price,
        gas_limit: DEPLOY_GAS_LIMIT,
        balance,
    };

    tracing::info!(
        from = %from,
        nonce,
        gas_price,
        gas_limit = DEPLOY_GAS_LIMIT,
        cost_eth = %estimate.cost_eth(),
        balance_eth = %estimate.balance_eth(),
        "Deployment estimate"
    );
    Ok(estimate)
}

/// Deploy the contract, wait for it to be mined and record its address.
///
/// The address is written to `address_file` when given; failing to write it
/// is logged but does not fail the deployment.
pub async fn deploy_contract(
    client: &BlockchainClient,
    transactor: &Transactor,
    policy: &GasPolicy,
    address_file: Option<&Path>,
    cancel: &Shutdown,
) -> InteractorResult<Deployment> {
    let estimate = estimate_deployment(client, transactor, policy)
        .await
        .map_err(InteractorError::SubmissionFailed)?;
    if !estimate.is_affordable() {
        return Err(InteractorError::SubmissionFailed(BlockchainError::Wallet(format!(
            "insufficient funds for deployment: balance {} ETH, cost {} ETH",
            estimate.balance_eth(),
            estimate.cost_eth()
        ))));
    }

    let opts = transactor
        .prepare(client, &GasPolicy {
            gas_limit: Some(DEPLOY_GAS_LIMIT),
            ..policy.clone()
        })
        .await
        .map_err(InteractorError::SubmissionFailed)?;
    let request = TransactionRequest::default().with_deploy_code(SimpleStorage::BYTECODE.clone());
    let envelope = transactor
        .authorize(&opts, request)
        .await
        .map_err(InteractorError::SubmissionFailed)?;
    let tx_hash = client
        .send_envelope(envelope)
        .await
        .map_err(InteractorError::SubmissionFailed)?;

    tracing::info!(tx_hash = %tx_hash, nonce = opts.nonce, "Deployment sent, waiting to be mined");

    let receipt = client
        .wait_until_mined(tx_hash, cancel)
        .await
        .map_err(|source| InteractorError::ConfirmationFailed { tx_hash, source })?;
    if !receipt.succeeded() {
        return Err(InteractorError::TransactionReverted {
            tx_hash,
            block_number: receipt.block_number,
        });
    }

    let deployment = Deployment {
        address: opts.from.create(opts.nonce),
        tx_hash,
        block_number: receipt.block_number,
    };
    tracing::info!(
        address = %deployment.address,
        block = deployment.block_number,
        "Contract deployed"
    );

    if let Some(path) = address_file {
        if let Err(e) = std::fs::write(path, deployment.address.to_string()) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to save contract address");
        }
    }

    Ok(deployment)
}
