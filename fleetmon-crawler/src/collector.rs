//! Chain metrics collection
//!
//! One pass over every known node, producing one stake sample per node that
//! the chain state provider can resolve.

use crate::chain::{ChainError, ChainStateProvider};
use crate::error::Result;
use fleetmon_core::ChecksumAddress;
use fleetmon_metadata::NodeMetadataStore;
use fleetmon_timeseries::StakeSample;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Output of one collection pass
#[derive(Debug, Clone, Default)]
pub struct CollectedRound {
    /// Sorted by staker address
    pub samples: Vec<StakeSample>,
    pub nodes_seen: usize,
    pub skipped: Vec<ChecksumAddress>,
    /// Highest current period reported this round
    pub period: Option<u64>,
}

pub struct ChainMetricsCollector {
    store: Arc<NodeMetadataStore>,
    chain: Arc<dyn ChainStateProvider>,
    concurrency: usize,
}

impl ChainMetricsCollector {
    pub fn new(
        store: Arc<NodeMetadataStore>,
        chain: Arc<dyn ChainStateProvider>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            chain,
            concurrency: concurrency.max(1),
        }
    }

    /// Read stake info for every known node
    ///
    /// A node the provider cannot resolve, or one reporting a non-finite
    /// stake, is skipped; store and block-time failures abort the pass.
    pub async fn collect(&self) -> Result<CollectedRound> {
        let nodes = self.store.get_all_nodes().await?;
        let timestamp = self.chain.latest_block_time().await?;

        let results: Vec<_> = stream::iter(nodes.into_keys())
            .map(|address| async move {
                let info = self.chain.get_stake_info(&address).await;
                (address, info)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut round = CollectedRound {
            nodes_seen: results.len(),
            ..Default::default()
        };

        for (address, info) in results {
            match info {
                Ok(info) if !(info.stake.is_finite() && info.locked_stake.is_finite()) => {
                    warn!(
                        address = %address,
                        stake = info.stake,
                        locked_stake = info.locked_stake,
                        "Non-finite stake reported, skipping"
                    );
                    round.skipped.push(address);
                }
                Ok(info) => {
                    round.period = round.period.max(Some(info.current_period));
                    round.samples.push(StakeSample {
                        staker_address: address,
                        worker_address: info.worker_address,
                        stake: info.stake,
                        locked_stake: info.locked_stake,
                        current_period: info.current_period,
                        last_confirmed_period: info.last_active_period,
                        start_date: info.start_date,
                        end_date: info.end_date,
                        timestamp,
                    });
                }
                Err(ChainError::NotFound(_)) => {
                    debug!(address = %address, "Not a staker, skipping");
                    round.skipped.push(address);
                }
                Err(e) => {
                    warn!(address = %address, error = %e, "Stake lookup failed, skipping");
                    round.skipped.push(address);
                }
            }
        }

        round
            .samples
            .sort_by(|a, b| a.staker_address.cmp(&b.staker_address));
        round.skipped.sort();
        Ok(round)
    }
}
