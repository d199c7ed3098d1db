//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate endpoint URLs and addresses
//! - Validate value ranges (timeouts > 0, gas bounds sane)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use alloy::primitives::Address;

use crate::config::schema::AppConfig;

/// Smallest gas limit any transaction can carry.
const INTRINSIC_GAS: u64 = 21_000;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `blockchain.rpc_url`.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }

    let chain = &config.blockchain;
    check_url(&mut errors, "blockchain.rpc_url", &chain.rpc_url, &["http", "https"]);
    for url in &chain.failover_urls {
        check_url(&mut errors, "blockchain.failover_urls", url, &["http", "https"]);
    }
    if let Some(ws) = &chain.ws_url {
        check_url(&mut errors, "blockchain.ws_url", ws, &["ws", "wss"]);
    }
    if chain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("blockchain.rpc_timeout_secs", "must be > 0"));
    }
    if chain.poll_interval_ms == 0 {
        errors.push(ValidationError::new("blockchain.poll_interval_ms", "must be > 0"));
    }
    if chain.confirmation_timeout_secs == Some(0) {
        errors.push(ValidationError::new(
            "blockchain.confirmation_timeout_secs",
            "must be > 0 when set",
        ));
    }
    if !chain.gas_price_multiplier.is_finite() || chain.gas_price_multiplier < 1.0 {
        errors.push(ValidationError::new(
            "blockchain.gas_price_multiplier",
            "must be a finite number >= 1.0",
        ));
    }
    if chain.max_gas_price_gwei == 0 {
        errors.push(ValidationError::new("blockchain.max_gas_price_gwei", "must be > 0"));
    }
    if let Some(limit) = chain.gas_limit {
        if limit < INTRINSIC_GAS {
            errors.push(ValidationError::new(
                "blockchain.gas_limit",
                format!("must be at least {}", INTRINSIC_GAS),
            ));
        }
    }

    if let Some(address) = &config.contract.address {
        if address.trim().parse::<Address>().is_err() {
            errors.push(ValidationError::new(
                "contract.address",
                format!("'{}' is not a valid address", address),
            ));
        }
    }
    if config.contract.address.is_none() && config.contract.address_file.trim().is_empty() {
        errors.push(ValidationError::new(
            "contract.address_file",
            "must be set when contract.address is absent",
        ));
    }

    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", obs.log_level),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, raw: &str, schemes: &[&str]) {
    match raw.parse::<url::Url>() {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}' in '{}'", url.scheme(), raw),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("'{}': {}", raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = AppConfig::default();
        config.blockchain.rpc_url = "not a url".to_string();
        config.blockchain.ws_url = Some("http://localhost:8546".to_string());
        config.blockchain.poll_interval_ms = 0;
        config.blockchain.gas_limit = Some(100);
        config.contract.address = Some("0x1234".to_string());

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "blockchain.rpc_url",
                "blockchain.ws_url",
                "blockchain.poll_interval_ms",
                "blockchain.gas_limit",
                "contract.address",
            ]
        );
    }

    #[test]
    fn test_multiplier_below_one_rejected() {
        let mut config = AppConfig::default();
        config.blockchain.gas_price_multiplier = 0.5;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("gas_price_multiplier"));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = AppConfig::default();
        config.observability.metrics_address = "nowhere".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
