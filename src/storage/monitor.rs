//! Polling source of live change events.
//!
//! Used when no websocket endpoint is configured: every poll interval the
//! head block is read and any new `DataStored` logs since the previous head
//! are pushed into the subscription.

use std::time::Duration;

use alloy::primitives::Address;
use tokio::time::{interval, MissedTickBehavior};

use crate::blockchain::{BlockchainClient, BlockchainResult};
use crate::storage::binding::fetch_changes;
use crate::storage::events::{ChangeEvent, ChangeSubscription, SubscriptionFeed, SUBSCRIPTION_BUFFER};

/// Service that polls the chain for change logs.
pub struct LogPoller {
    client: BlockchainClient,
    contract_address: Address,
    poll_interval: Duration,
    last_block: u64,
}

impl LogPoller {
    /// Start polling from the current head and return the live subscription.
    ///
    /// Fails if the head block cannot be read.
    pub async fn start(client: BlockchainClient, contract_address: Address) -> BlockchainResult<ChangeSubscription> {
        let last_block = client.get_block_number().await?;
        tracing::info!(
            contract = %contract_address,
            block = last_block,
            "Polling for change logs"
        );

        let poller = Self {
            poll_interval: client.poll_interval(),
            client,
            contract_address,
            last_block,
        };
        Ok(ChangeSubscription::spawn(SUBSCRIPTION_BUFFER, move |feed| poller.run(feed)))
    }

    async fn run(mut self, feed: SubscriptionFeed) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = feed.closed() => return,
                _ = ticker.tick() => {}
            }

            match self.poll_events().await {
                Ok(events) => {
                    for event in events {
                        if !feed.send(event).await {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Error polling change logs");
                    feed.fail(e);
                    return;
                }
            }
        }
    }

    async fn poll_events(&mut self) -> BlockchainResult<Vec<ChangeEvent>> {
        let current_block = self.client.get_block_number().await?;
        let Some((from, to)) = next_range(self.last_block, current_block) else {
            return Ok(Vec::new());
        };

        let events = fetch_changes(&self.client, self.contract_address, from, to).await?;

        self.last_block = to;
        Ok(events)
    }
}

/// Blocks not yet polled, given the last polled block and the current head.
///
/// `None` while the head has not moved past `last_block` (including a head
/// that went backwards after a reorg or failover).
fn next_range(last_block: u64, current_block: u64) -> Option<(u64, u64)> {
    (current_block > last_block).then(|| (last_block + 1, current_block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::BlockchainConfig;

    fn unreachable_client_config() -> BlockchainConfig {
        BlockchainConfig {
            rpc_url: "http://127.0.0.1:1".to_string(),
            rpc_timeout_secs: 2,
            poll_interval_ms: 50,
            ..BlockchainConfig::default()
        }
    }

    #[test]
    fn test_next_range_advances_past_last_block() {
        assert_eq!(next_range(10, 11), Some((11, 11)));
        assert_eq!(next_range(10, 15), Some((11, 15)));
        assert_eq!(next_range(0, 1), Some((1, 1)));
    }

    #[test]
    fn test_next_range_idle_head() {
        assert_eq!(next_range(10, 10), None);
        // Head behind the last poll: wait for it to catch up.
        assert_eq!(next_range(10, 7), None);
    }

    #[test]
    fn test_successive_polls_cover_every_block_once() {
        let mut last_block = 3;
        let mut covered = Vec::new();
        for head in [3, 5, 5, 4, 9] {
            if let Some((from, to)) = next_range(last_block, head) {
                covered.extend(from..=to);
                last_block = to;
            }
        }
        assert_eq!(covered, (4..=9).collect::<Vec<_>>());
        assert_eq!(last_block, 9);
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_position() {
        let client = BlockchainClient::new(unreachable_client_config()).await.unwrap();
        let mut poller = LogPoller {
            poll_interval: client.poll_interval(),
            client,
            contract_address: Address::ZERO,
            last_block: 42,
        };

        assert!(poller.poll_events().await.is_err());
        assert_eq!(poller.last_block, 42);
    }

    #[tokio::test]
    async fn test_start_requires_head_block() {
        let client = BlockchainClient::new(unreachable_client_config()).await.unwrap();
        assert!(LogPoller::start(client, Address::ZERO).await.is_err());
    }
}
