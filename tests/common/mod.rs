//! Shared utilities for integration testing.
//!
//! [`MockChain`] is an in-memory ledger with one storage contract. It plays
//! both the node ([`ChainConnection`]) and the contract ([`StorageBinding`])
//! and can be told to misbehave.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{address, Address, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};

use storage_relay::blockchain::{
    BlockchainError, BlockchainResult, ChainConnection, ChainId, GasPolicy, TransactOpts,
    Transactor, TxStatus, WriteReceipt,
};
use storage_relay::config::ListenerConfig;
use storage_relay::lifecycle::Shutdown;
use storage_relay::storage::{
    ChangeEvent, ChangeSubscription, InteractorSettings, StorageBinding, ValueInteractor,
};
use storage_relay::HttpServer;

/// First Anvil development account.
pub const TEST_PRIVATE_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_ADDRESS: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub const CONTRACT: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
pub const CHAIN_ID: u64 = 31337;
pub const GAS_PRICE_WEI: u128 = 1_000_000_000;

/// Gas limit the mock "estimates" when none is configured.
const ESTIMATED_GAS: u64 = 43_000;

#[derive(Clone)]
enum Live {
    Event(ChangeEvent),
    Fail(String),
}

#[derive(Default)]
struct Faults {
    fail_reads: AtomicBool,
    reject_submissions: AtomicBool,
    revert: AtomicBool,
    stall_mining: AtomicBool,
    fail_receipts: AtomicBool,
    fail_filter: AtomicBool,
    corrupt_filter: AtomicBool,
    fail_subscribe: AtomicBool,
    replay_on_subscribe: AtomicBool,
}

#[derive(Default)]
struct State {
    head: u64,
    value: U256,
    nonces: HashMap<Address, u64>,
    pending: Vec<(TxHash, U256)>,
    receipts: HashMap<TxHash, WriteReceipt>,
    events: Vec<ChangeEvent>,
    submitted_nonces: Vec<u64>,
    gas_limits: Vec<u64>,
    in_flight: usize,
    max_in_flight: usize,
    mine_on_subscribe: Option<U256>,
}

struct Inner {
    state: Mutex<State>,
    faults: Faults,
    mined: Notify,
    live: broadcast::Sender<Live>,
}

/// In-memory chain with a single storage contract.
#[derive(Clone)]
pub struct MockChain {
    inner: Arc<Inner>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                faults: Faults::default(),
                mined: Notify::new(),
                live,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().unwrap()
    }

    // ----- inspection -----

    pub fn value(&self) -> U256 {
        self.state().value
    }

    pub fn head(&self) -> u64 {
        self.state().head
    }

    pub fn nonce_of(&self, account: Address) -> u64 {
        self.state().nonces.get(&account).copied().unwrap_or(0)
    }

    pub fn submitted_nonces(&self) -> Vec<u64> {
        self.state().submitted_nonces.clone()
    }

    pub fn gas_limits(&self) -> Vec<u64> {
        self.state().gas_limits.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    pub fn live_subscribers(&self) -> usize {
        self.inner.live.receiver_count()
    }

    // ----- chain manipulation -----

    /// Advance the head by `blocks` empty blocks.
    pub fn advance(&self, blocks: u64) {
        self.state().head += blocks;
    }

    /// Mine a `set(value)` from some other account, outside the interactor.
    pub fn external_set(&self, value: U256) -> ChangeEvent {
        let tx_hash = {
            let state = self.state();
            let mut bytes = [0u8; 32];
            bytes[..8].copy_from_slice(&(state.head + 1).to_be_bytes());
            bytes[31] = 0xee;
            TxHash::from(bytes)
        };
        self.mine(tx_hash, value)
    }

    /// Mine everything accepted while mining was stalled.
    pub fn mine_pending(&self) {
        let pending = std::mem::take(&mut self.state().pending);
        for (tx_hash, value) in pending {
            self.mine(tx_hash, value);
        }
    }

    /// End every open live subscription with an error.
    pub fn break_subscriptions(&self, reason: &str) {
        let _ = self.inner.live.send(Live::Fail(reason.to_string()));
    }

    /// Mine `value` right after the next subscription opens.
    pub fn mine_on_subscribe(&self, value: U256) {
        self.state().mine_on_subscribe = Some(value);
    }

    fn mine(&self, tx_hash: TxHash, value: U256) -> ChangeEvent {
        let reverted = self.inner.faults.revert.load(Ordering::SeqCst);
        let mut state = self.state();
        state.head += 1;
        let block_number = state.head;

        let status = if reverted {
            TxStatus::Failure
        } else {
            TxStatus::Success
        };
        state.receipts.insert(
            tx_hash,
            WriteReceipt {
                tx_hash,
                block_number,
                status,
                nonce: None,
            },
        );

        let event = ChangeEvent {
            new_value: value,
            block_number,
            log_index: 0,
            tx_hash,
        };
        if !reverted {
            state.value = value;
            state.events.push(event.clone());
            let _ = self.inner.live.send(Live::Event(event.clone()));
        }
        drop(state);

        self.inner.mined.notify_waiters();
        event
    }

    // ----- faults -----

    pub fn fail_reads(&self, on: bool) {
        self.inner.faults.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn reject_submissions(&self, on: bool) {
        self.inner.faults.reject_submissions.store(on, Ordering::SeqCst);
    }

    pub fn revert(&self, on: bool) {
        self.inner.faults.revert.store(on, Ordering::SeqCst);
    }

    pub fn stall_mining(&self, on: bool) {
        self.inner.faults.stall_mining.store(on, Ordering::SeqCst);
    }

    pub fn fail_receipts(&self, on: bool) {
        self.inner.faults.fail_receipts.store(on, Ordering::SeqCst);
    }

    pub fn fail_filter(&self, on: bool) {
        self.inner.faults.fail_filter.store(on, Ordering::SeqCst);
    }

    pub fn corrupt_filter(&self, on: bool) {
        self.inner.faults.corrupt_filter.store(on, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, on: bool) {
        self.inner.faults.fail_subscribe.store(on, Ordering::SeqCst);
    }

    /// Make new subscriptions replay every past event before live ones.
    pub fn replay_on_subscribe(&self, on: bool) {
        self.inner.faults.replay_on_subscribe.store(on, Ordering::SeqCst);
    }

    fn fault(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

impl ChainConnection for MockChain {
    async fn chain_id(&self) -> BlockchainResult<ChainId> {
        Ok(ChainId(CHAIN_ID))
    }

    async fn pending_nonce(&self, account: Address) -> BlockchainResult<u64> {
        Ok(self.nonce_of(account))
    }

    async fn suggested_gas_price(&self) -> BlockchainResult<u128> {
        Ok(GAS_PRICE_WEI)
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        Ok(self.head())
    }

    async fn wait_until_mined(&self, tx_hash: TxHash, cancel: &Shutdown) -> BlockchainResult<WriteReceipt> {
        let result = loop {
            let notified = self.inner.mined.notified();
            if Self::fault(&self.inner.faults.fail_receipts) {
                break Err(BlockchainError::Rpc("receipt lookup failed".to_string()));
            }
            if let Some(receipt) = self.state().receipts.get(&tx_hash).cloned() {
                break Ok(receipt);
            }
            tokio::select! {
                _ = cancel.triggered() => break Err(BlockchainError::Cancelled),
                _ = notified => {}
            }
        };

        let mut state = self.state();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        result
    }
}

impl StorageBinding for MockChain {
    async fn read(&self) -> BlockchainResult<U256> {
        if Self::fault(&self.inner.faults.fail_reads) {
            return Err(BlockchainError::Rpc("connection refused".to_string()));
        }
        Ok(self.value())
    }

    async fn write(&self, auth: &Transactor, opts: &TransactOpts, value: U256) -> BlockchainResult<TxHash> {
        if Self::fault(&self.inner.faults.reject_submissions) {
            return Err(BlockchainError::Rpc("insufficient funds for gas * price + value".to_string()));
        }

        let mut opts = opts.clone();
        let gas_limit = *opts.gas_limit.get_or_insert(ESTIMATED_GAS);
        let request = TransactionRequest::default().with_to(CONTRACT);
        let envelope = auth.authorize(&opts, request).await?;
        let tx_hash = *envelope.tx_hash();

        {
            let mut state = self.state();
            let expected = state.nonces.get(&opts.from).copied().unwrap_or(0);
            if opts.nonce != expected {
                return Err(BlockchainError::Rpc(format!(
                    "nonce mismatch: expected {}, got {}",
                    expected, opts.nonce
                )));
            }
            state.nonces.insert(opts.from, expected + 1);
            state.submitted_nonces.push(opts.nonce);
            state.gas_limits.push(gas_limit);
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            if Self::fault(&self.inner.faults.stall_mining) {
                state.pending.push((tx_hash, value));
                return Ok(tx_hash);
            }
        }

        // Let concurrent writers run before the block lands.
        tokio::task::yield_now().await;
        self.mine(tx_hash, value);
        Ok(tx_hash)
    }

    async fn filter_changes(&self, from_block: u64, to_block: u64) -> BlockchainResult<Vec<ChangeEvent>> {
        if Self::fault(&self.inner.faults.fail_filter) {
            return Err(BlockchainError::Rpc("query returned more than 10000 results".to_string()));
        }
        if Self::fault(&self.inner.faults.corrupt_filter) {
            return Err(BlockchainError::Decode("DataStored: buffer overrun".to_string()));
        }
        Ok(self
            .state()
            .events
            .iter()
            .filter(|e| (from_block..=to_block).contains(&e.block_number))
            .cloned()
            .collect())
    }

    async fn subscribe_changes(&self) -> BlockchainResult<ChangeSubscription> {
        if Self::fault(&self.inner.faults.fail_subscribe) {
            return Err(BlockchainError::Rpc("subscriptions not supported".to_string()));
        }

        let mut rx = self.inner.live.subscribe();
        let replay = if Self::fault(&self.inner.faults.replay_on_subscribe) {
            self.state().events.clone()
        } else {
            Vec::new()
        };

        let subscription = ChangeSubscription::spawn(64, move |feed| async move {
            for event in replay {
                if !feed.send(event).await {
                    return;
                }
            }
            loop {
                let msg = tokio::select! {
                    _ = feed.closed() => return,
                    msg = rx.recv() => msg,
                };
                match msg {
                    Ok(Live::Event(event)) => {
                        if !feed.send(event).await {
                            return;
                        }
                    }
                    Ok(Live::Fail(reason)) => {
                        feed.fail(BlockchainError::Rpc(reason));
                        return;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        let pending = self.state().mine_on_subscribe.take();
        if let Some(value) = pending {
            self.external_set(value);
        }
        Ok(subscription)
    }
}

pub fn test_settings() -> InteractorSettings {
    InteractorSettings {
        gas: GasPolicy {
            multiplier: 1.0,
            max_gas_price_gwei: 500,
            gas_limit: Some(100_000),
        },
        confirmation_timeout: None,
        from_block: 0,
    }
}

/// Interactor signing with the test key against `chain`.
pub async fn interactor(chain: &MockChain) -> ValueInteractor<MockChain, MockChain> {
    interactor_with(chain, test_settings()).await
}

pub async fn interactor_with(
    chain: &MockChain,
    settings: InteractorSettings,
) -> ValueInteractor<MockChain, MockChain> {
    let transactor = Transactor::connect(TEST_PRIVATE_KEY, chain, Some(CHAIN_ID))
        .await
        .expect("test key binds to mock chain");
    ValueInteractor::new(chain.clone(), chain.clone(), transactor, settings)
}

/// Serve `interactor` on an ephemeral port; returns its base URL.
pub async fn spawn_server(
    interactor: ValueInteractor<MockChain, MockChain>,
    shutdown: Shutdown,
) -> String {
    spawn_server_with(interactor, shutdown, 5).await
}

/// Like [`spawn_server`] with a custom request timeout.
pub async fn spawn_server_with(
    interactor: ValueInteractor<MockChain, MockChain>,
    shutdown: Shutdown,
    request_timeout_secs: u64,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let config = ListenerConfig {
        bind_address: addr.to_string(),
        request_timeout_secs,
        ..ListenerConfig::default()
    };

    let server = HttpServer::new(&config, Arc::new(interactor));
    tokio::spawn(server.run(listener, shutdown));
    tokio::time::sleep(Duration::from_millis(20)).await;

    format!("http://{}", addr)
}
