use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use storage_relay::blockchain::{BlockchainClient, GasPolicy, Transactor, Wallet};
use storage_relay::config::{load_or_default, resolve_contract_address, AppConfig};
use storage_relay::lifecycle::{wait_for_signal, Shutdown};
use storage_relay::observability::logging;
use storage_relay::storage::deploy::{deploy_contract, estimate_deployment};
use storage_relay::storage::{ContractBinding, InteractorSettings, ValueInteractor};

#[derive(Parser)]
#[command(name = "storage-cli")]
#[command(about = "Command line client for the storage relay", long_about = None)]
struct Cli {
    /// Base URL of a running relay (get, set)
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Relay configuration file (watch, estimate, deploy)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the stored value through the relay
    Get,
    /// Store a new value through the relay
    Set {
        /// Non-negative decimal integer
        value: String,
    },
    /// Stream value changes straight from the chain
    Watch {
        /// First block to replay from (defaults to the configured block)
        #[arg(long)]
        from_block: Option<u64>,
    },
    /// Preview the cost of deploying the contract
    Estimate,
    /// Deploy the contract and record its address
    Deploy,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Get => {
            let res = reqwest::Client::new()
                .get(format!("{}/api/v1/storage/value", cli.url))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Set { value } => {
            let res = reqwest::Client::new()
                .post(format!("{}/api/v1/storage/value", cli.url))
                .json(&json!({ "value": value }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Watch { from_block } => {
            let config = load(cli.config.as_deref())?;
            watch(config, from_block).await?;
        }
        Commands::Estimate => {
            let config = load(cli.config.as_deref())?;
            let client = BlockchainClient::new(config.blockchain.clone()).await?;
            let transactor = signer(&client, &config).await?;
            let estimate =
                estimate_deployment(&client, &transactor, &GasPolicy::from(&config.blockchain))
                    .await?;

            println!("Deployer:   {}", estimate.from);
            println!("Chain ID:   {}", estimate.chain_id);
            println!("Nonce:      {}", estimate.nonce);
            println!("Gas price:  {} wei", estimate.gas_price);
            println!("Gas limit:  {}", estimate.gas_limit);
            println!("Cost:       {} ETH", estimate.cost_eth());
            println!("Balance:    {} ETH", estimate.balance_eth());
            if !estimate.is_affordable() {
                eprintln!("Warning: balance does not cover the deployment cost");
            }
        }
        Commands::Deploy => {
            let config = load(cli.config.as_deref())?;
            let client = BlockchainClient::new(config.blockchain.clone()).await?;
            let transactor = signer(&client, &config).await?;

            let shutdown = Shutdown::new();
            tokio::spawn(wait_for_signal(shutdown.clone()));

            let deployment = deploy_contract(
                &client,
                &transactor,
                &GasPolicy::from(&config.blockchain),
                Some(Path::new(&config.contract.address_file)),
                &shutdown,
            )
            .await?;

            println!("Contract:   {}", deployment.address);
            println!("Tx hash:    {}", deployment.tx_hash);
            println!("Block:      {}", deployment.block_number);
        }
    }

    Ok(())
}

fn load(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = load_or_default(path)?;
    logging::init(&config.observability.log_level);
    Ok(config)
}

async fn signer(
    client: &BlockchainClient,
    config: &AppConfig,
) -> Result<Transactor, Box<dyn std::error::Error>> {
    let wallet = Wallet::from_env()?;
    Ok(Transactor::for_wallet(wallet, client, config.blockchain.chain_id).await?)
}

async fn watch(config: AppConfig, from_block: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let client = BlockchainClient::new(config.blockchain.clone()).await?;
    let address = resolve_contract_address(&config.contract)?;
    let binding = ContractBinding::new(client.clone(), address);
    let interactor = ValueInteractor::read_only(client, binding, InteractorSettings::from(&config));

    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let mut stream = interactor.watch_events(from_block, shutdown).await?;
    eprintln!("Watching {} (head at block {})", address, stream.head_block());

    while let Some(item) = stream.recv().await {
        let event = item?;
        println!(
            "block={} log={} tx={} value={}",
            event.block_number, event.log_index, event.tx_hash, event.new_value
        );
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
