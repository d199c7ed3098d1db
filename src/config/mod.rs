//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + environment overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → handed to the chain client, interactor and HTTP server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The signing key never lives in the file (see `blockchain::wallet`)

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, resolve_contract_address, ConfigError};
pub use schema::{AppConfig, BlockchainConfig, ContractConfig, ListenerConfig, ObservabilityConfig};
