//! Chain state provider seam

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetmon_core::ChecksumAddress;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    /// No staking data for this address; the node is skipped
    #[error("No stake found for {0}")]
    NotFound(ChecksumAddress),

    #[error("Chain state unavailable: {0}")]
    Unavailable(String),
}

/// Staking figures for one staker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeInfo {
    pub worker_address: String,
    pub stake: f64,
    pub locked_stake: f64,
    pub current_period: u64,
    pub last_active_period: u64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[async_trait]
pub trait ChainStateProvider: Send + Sync {
    async fn get_stake_info(&self, staker: &ChecksumAddress) -> Result<StakeInfo, ChainError>;

    /// Time of the latest block; used as the timestamp of a collection round
    async fn latest_block_time(&self) -> Result<DateTime<Utc>, ChainError> {
        Ok(Utc::now())
    }
}
