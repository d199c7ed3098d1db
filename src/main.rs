//! Storage relay
//!
//! Serves the value held by a `SimpleStorage` contract over HTTP.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request           ┌──────────────────────────────────────────────┐
//!     ─────────────────────────┼─▶ http ──▶ storage::ValueInteractor          │
//!                              │              │            │                   │
//!                              │              ▼            ▼                   │
//!                              │       storage::binding  blockchain::Transactor│
//!                              │              │            │                   │
//!                              │              ▼            ▼                   │
//!                              │          blockchain::BlockchainClient ────────┼──▶ JSON-RPC node
//!                              │                                              │
//!                              │  config · observability · lifecycle          │
//!                              └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use storage_relay::blockchain::{BlockchainClient, Transactor, Wallet, PRIVATE_KEY_ENV_VAR};
use storage_relay::config::{load_or_default, resolve_contract_address};
use storage_relay::lifecycle::{wait_for_signal, Shutdown};
use storage_relay::observability::{logging, metrics};
use storage_relay::storage::{ContractBinding, InteractorSettings, ValueInteractor};
use storage_relay::{HttpServer, InteractorError};

#[derive(Parser)]
#[command(name = "storage-relay")]
#[command(about = "HTTP relay for an on-chain storage value", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_or_default(args.config.as_deref())?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "storage-relay starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let client = BlockchainClient::new(config.blockchain.clone()).await?;
    if !client.is_healthy().await {
        tracing::warn!(rpc_url = %config.blockchain.rpc_url, "Node not reachable yet, serving anyway");
    }
    let contract_address = resolve_contract_address(&config.contract)?;
    let binding = ContractBinding::new(client.clone(), contract_address);
    let settings = InteractorSettings::from(&config);

    tracing::info!(
        rpc_url = %config.blockchain.rpc_url,
        contract = %contract_address,
        "Configuration loaded"
    );

    let key = Wallet::env_key().map_err(InteractorError::InvalidCredential)?;
    let transactor =
        Transactor::from_optional_key(key.as_deref(), &client, config.blockchain.chain_id).await?;
    let interactor = match transactor {
        Some(transactor) => ValueInteractor::new(client, binding, transactor, settings),
        None => {
            tracing::warn!(env = PRIVATE_KEY_ENV_VAR, "No signing key set, serving read-only");
            if let Some(expected) = config.blockchain.chain_id {
                client.verify_chain_id(expected).await?;
            }
            ValueInteractor::read_only(client, binding, settings)
        }
    };

    let shutdown = Shutdown::new();
    let interactor = Arc::new(interactor.with_shutdown(shutdown.clone()));

    tokio::spawn(wait_for_signal(shutdown.clone()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(&config.listener, interactor);
    server.run(listener, shutdown).await?;

    tracing::info!("storage-relay stopped");
    Ok(())
}
