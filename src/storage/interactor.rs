//! Read, write and watch the stored value.
//!
//! # Write protocol
//! ```text
//! lock signer ─▶ fresh nonce + gas price ─▶ sign & submit ─▶ wait until mined ─▶ classify
//!                └──────── SubmissionFailed ────────┘        ConfirmationFailed   TransactionReverted
//! ```
//! The signer lock is held for the whole protocol, so at most one write per
//! account is in flight and no two writes can be signed with the same nonce.

use std::time::{Duration, Instant};

use alloy::primitives::{Address, U256};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::blockchain::{BlockchainError, ChainConnection, GasPolicy, Transactor, WriteReceipt};
use crate::config::AppConfig;
use crate::error::{InteractorError, InteractorResult};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::storage::binding::StorageBinding;
use crate::storage::events::EventStream;

/// Tunables for the interactor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InteractorSettings {
    /// Gas pricing applied to every write.
    pub gas: GasPolicy,
    /// Deadline for the confirmation wait; `None` waits indefinitely.
    pub confirmation_timeout: Option<Duration>,
    /// Default first block for event backfill.
    pub from_block: u64,
}

impl From<&AppConfig> for InteractorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            gas: GasPolicy::from(&config.blockchain),
            confirmation_timeout: config
                .blockchain
                .confirmation_timeout_secs
                .map(Duration::from_secs),
            from_block: config.contract.from_block,
        }
    }
}

/// Orchestrates reads, serialized writes and event watches for one contract.
pub struct ValueInteractor<C, B> {
    conn: C,
    binding: B,
    signer: Option<Address>,
    transactor: Option<Mutex<Transactor>>,
    settings: InteractorSettings,
    shutdown: Shutdown,
}

impl<C, B> ValueInteractor<C, B>
where
    C: ChainConnection,
    B: StorageBinding,
{
    /// Create an interactor that can write as `transactor`'s account.
    pub fn new(conn: C, binding: B, transactor: Transactor, settings: InteractorSettings) -> Self {
        Self {
            conn,
            binding,
            signer: Some(transactor.address()),
            transactor: Some(Mutex::new(transactor)),
            settings,
            shutdown: Shutdown::new(),
        }
    }

    /// Create an interactor without a signing key. Writes fail with
    /// `SubmissionFailed`.
    pub fn read_only(conn: C, binding: B, settings: InteractorSettings) -> Self {
        Self {
            conn,
            binding,
            signer: None,
            transactor: None,
            settings,
            shutdown: Shutdown::new(),
        }
    }

    /// Cancel pending confirmation waits of [`write_value`](Self::write_value)
    /// when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Account writes are sent from, if any.
    pub fn signer(&self) -> Option<Address> {
        self.signer
    }

    pub fn settings(&self) -> &InteractorSettings {
        &self.settings
    }

    /// Read the current value from the contract. Never cached, never retried.
    pub async fn read_value(&self) -> InteractorResult<U256> {
        metrics::record_read();
        self.binding.read().await.map_err(|e| {
            tracing::warn!(error = %e, "Reading stored value failed");
            InteractorError::ReadFailed(e)
        })
    }

    /// Write `value` and wait for it to be mined.
    ///
    /// Blocks until the transaction is mined unless a confirmation timeout is
    /// configured or the interactor's shutdown signal fires.
    pub async fn write_value(&self, value: U256) -> InteractorResult<WriteReceipt> {
        self.write_value_until(value, &self.shutdown).await
    }

    /// Write `value`, abandoning the confirmation wait when `cancel` fires.
    ///
    /// Cancelling does not recall a submitted transaction; it may still be
    /// mined later.
    pub async fn write_value_until(&self, value: U256, cancel: &Shutdown) -> InteractorResult<WriteReceipt> {
        self.observe_write(value, cancel, self.settings.confirmation_timeout)
            .await
    }

    /// Write `value`, giving up on confirmation after `deadline` or the
    /// configured confirmation timeout, whichever is shorter.
    ///
    /// A confirmation that runs out of time fails with `ConfirmationFailed`
    /// carrying the transaction hash; the transaction may still be mined.
    pub async fn write_value_within(&self, value: U256, deadline: Duration) -> InteractorResult<WriteReceipt> {
        let deadline = match self.settings.confirmation_timeout {
            Some(configured) => configured.min(deadline),
            None => deadline,
        };
        self.observe_write(value, &self.shutdown, Some(deadline)).await
    }

    async fn observe_write(
        &self,
        value: U256,
        cancel: &Shutdown,
        confirmation_timeout: Option<Duration>,
    ) -> InteractorResult<WriteReceipt> {
        let started = Instant::now();
        let result = self.run_write(value, cancel, confirmation_timeout).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_write(outcome, started);
        result
    }

    async fn run_write(
        &self,
        value: U256,
        cancel: &Shutdown,
        confirmation_timeout: Option<Duration>,
    ) -> InteractorResult<WriteReceipt> {
        let Some(transactor) = &self.transactor else {
            return Err(InteractorError::SubmissionFailed(BlockchainError::NotAvailable(
                "no signing key configured".to_string(),
            )));
        };
        let transactor = transactor.lock().await;

        // Price & sign
        let opts = transactor
            .prepare(&self.conn, &self.settings.gas)
            .await
            .map_err(InteractorError::SubmissionFailed)?;
        let tx_hash = self
            .binding
            .write(&transactor, &opts, value)
            .await
            .map_err(|e| {
                tracing::warn!(nonce = opts.nonce, error = %e, "Transaction submission failed");
                InteractorError::SubmissionFailed(e)
            })?;

        tracing::info!(
            tx_hash = %tx_hash,
            nonce = opts.nonce,
            value = %value,
            "Transaction sent, waiting to be mined"
        );

        // Await confirmation
        let wait = self.conn.wait_until_mined(tx_hash, cancel);
        let mined = match confirmation_timeout {
            Some(deadline) => timeout(deadline, wait)
                .await
                .unwrap_or(Err(BlockchainError::ConfirmationTimeout(deadline.as_secs()))),
            None => wait.await,
        };
        let mut receipt = mined.map_err(|source| {
            tracing::warn!(tx_hash = %tx_hash, error = %source, "Confirmation wait failed");
            InteractorError::ConfirmationFailed { tx_hash, source }
        })?;
        receipt.nonce = Some(opts.nonce);

        // Classify
        if !receipt.succeeded() {
            tracing::warn!(
                tx_hash = %tx_hash,
                block = receipt.block_number,
                "Transaction reverted"
            );
            return Err(InteractorError::TransactionReverted {
                tx_hash,
                block_number: receipt.block_number,
            });
        }

        tracing::info!(
            tx_hash = %tx_hash,
            block = receipt.block_number,
            "Transaction confirmed"
        );
        Ok(receipt)
    }

    /// Watch change events from `from_block` (default: configured start).
    ///
    /// Historical events up to the current head are fetched before this
    /// returns; retrieval or decoding problems fail the call. The returned
    /// stream replays them in chain order and then follows live events until
    /// `cancel` fires, the stream is dropped, or the subscription fails.
    pub async fn watch_events(&self, from_block: Option<u64>, cancel: Shutdown) -> InteractorResult<EventStream> {
        let from_block = from_block.unwrap_or(self.settings.from_block);

        // Live first: anything mined after the head snapshot must reach it.
        let live = self
            .binding
            .subscribe_changes()
            .await
            .map_err(InteractorError::SubscriptionFailed)?;
        let head = self
            .conn
            .block_number()
            .await
            .map_err(InteractorError::EventFilterFailed)?;

        let mut backfill = if from_block <= head {
            self.binding
                .filter_changes(from_block, head)
                .await
                .map_err(InteractorError::from_filter)?
        } else {
            Vec::new()
        };
        backfill.sort_by_key(|event| event.position());

        tracing::info!(
            from_block,
            head,
            backfilled = backfill.len(),
            "Watching change events"
        );
        Ok(EventStream::spawn(backfill, live, from_block, head, cancel))
    }
}
