//! Account key management and transaction signing.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables or the caller
//! - Keys are never logged or serialized

use alloy::consensus::TxEnvelope;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::Address;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "PRIVATE_KEY";

/// Signing key for a single account.
#[derive(Clone)]
pub struct Wallet {
    /// The underlying signer (private key).
    signer: PrivateKeySigner,
    /// Network wallet used to sign transaction requests.
    network_wallet: EthereumWallet,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key string.
    ///
    /// Accepts the key with or without a `0x` prefix.
    pub fn from_private_key(private_key_hex: &str) -> BlockchainResult<Self> {
        let key_hex = private_key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BlockchainError::Wallet(format!("Invalid private key format: {}", e)))?;

        tracing::info!(address = %signer.address(), "Wallet initialized");

        Ok(Self {
            network_wallet: EthereumWallet::from(signer.clone()),
            signer,
        })
    }

    /// Load wallet from the `PRIVATE_KEY` environment variable.
    pub fn from_env() -> BlockchainResult<Self> {
        let private_key = Self::env_key()?.ok_or_else(|| {
            BlockchainError::Wallet(format!(
                "Environment variable {} not set",
                PRIVATE_KEY_ENV_VAR
            ))
        })?;

        Self::from_private_key(&private_key)
    }

    /// Raw `PRIVATE_KEY` value, `None` when the variable is not set.
    pub fn env_key() -> BlockchainResult<Option<String>> {
        key_from_var(std::env::var(PRIVATE_KEY_ENV_VAR))
    }

    /// Get the wallet's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a fully populated transaction request.
    ///
    /// The request must carry nonce, gas price and gas limit; nothing is
    /// filled in from the network here.
    pub async fn sign_transaction(&self, request: TransactionRequest) -> BlockchainResult<TxEnvelope> {
        request
            .with_from(self.address())
            .build(&self.network_wallet)
            .await
            .map_err(|e| BlockchainError::Wallet(format!("Signing failed: {}", e)))
    }
}

fn key_from_var(var: Result<String, std::env::VarError>) -> BlockchainResult<Option<String>> {
    match var {
        Ok(key) => Ok(Some(key)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(BlockchainError::Wallet(format!(
            "Invalid private key format: {} is not valid UTF-8",
            PRIVATE_KEY_ENV_VAR
        ))),
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    // Well-known test private key (Anvil's first account)
    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_wallet_from_private_key() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY).unwrap();
        assert_eq!(
            wallet.address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_wallet_with_0x_prefix() {
        let wallet = Wallet::from_private_key(&format!("0x{}", TEST_PRIVATE_KEY)).unwrap();
        assert_eq!(
            wallet.address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_key_from_var() {
        use std::env::VarError;

        assert_eq!(key_from_var(Err(VarError::NotPresent)).unwrap(), None);
        assert_eq!(
            key_from_var(Ok("zz".to_string())).unwrap().as_deref(),
            Some("zz")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_key_from_var_rejects_non_utf8() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let raw = OsString::from_vec(vec![0xff, 0xfe]);
        let err = key_from_var(Err(std::env::VarError::NotUnicode(raw))).unwrap_err();
        assert!(err.to_string().contains("Invalid private key"));
    }

    #[test]
    fn test_invalid_private_key() {
        let result = Wallet::from_private_key("invalid_key");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid private key"));
    }

    #[test]
    fn test_debug_hides_key() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let debug = format!("{:?}", wallet);
        assert!(!debug.contains(TEST_PRIVATE_KEY));
    }

    #[tokio::test]
    async fn test_sign_transaction_is_deterministic() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let request = TransactionRequest::default()
            .with_to(Address::ZERO)
            .with_value(U256::ZERO)
            .with_nonce(0)
            .with_gas_price(1_000_000_000)
            .with_gas_limit(50_000)
            .with_chain_id(31337);

        let first = wallet.sign_transaction(request.clone()).await.unwrap();
        let second = wallet.sign_transaction(request).await.unwrap();
        assert_eq!(first.tx_hash(), second.tx_hash());
    }
}
