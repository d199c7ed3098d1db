//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use alloy::primitives::Address;
use thiserror::Error;

use crate::config::schema::{AppConfig, ContractConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Overrides `blockchain.rpc_url`.
pub const RPC_URL_ENV_VAR: &str = "STORAGE_RPC_URL";

/// Overrides `contract.address`.
pub const CONTRACT_ADDRESS_ENV_VAR: &str = "STORAGE_CONTRACT_ADDRESS";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Contract address unavailable: {0}")]
    ContractAddress(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// Environment overrides are applied before validation.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: AppConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load from `path` when given, otherwise start from defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let mut config = AppConfig::default();
            apply_env_overrides(&mut config);
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(url) = std::env::var(RPC_URL_ENV_VAR) {
        config.blockchain.rpc_url = url;
    }
    if let Ok(address) = std::env::var(CONTRACT_ADDRESS_ENV_VAR) {
        config.contract.address = Some(address);
    }
}

/// Resolve the storage contract address from config or the address file.
pub fn resolve_contract_address(contract: &ContractConfig) -> Result<Address, ConfigError> {
    let raw = match &contract.address {
        Some(address) => address.clone(),
        None => fs::read_to_string(&contract.address_file).map_err(|e| {
            ConfigError::ContractAddress(format!(
                "cannot read {}: {}",
                contract.address_file, e
            ))
        })?,
    };

    raw.trim()
        .parse()
        .map_err(|e| ConfigError::ContractAddress(format!("'{}': {}", raw.trim(), e)))
}
