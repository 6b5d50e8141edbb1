//! Stake metric samples

use chrono::{DateTime, Utc};
use fleetmon_core::ChecksumAddress;
use serde::{Deserialize, Serialize};

/// Measurement holding one point per staker per collection round
pub const MEASUREMENT: &str = "crawler_node_info";

/// One immutable point of the stake series
///
/// `timestamp` is the time of the collection round that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeSample {
    pub staker_address: ChecksumAddress,
    pub worker_address: String,
    pub stake: f64,
    pub locked_stake: f64,
    pub current_period: u64,
    pub last_confirmed_period: u64,
    /// First period of the stake
    pub start_date: DateTime<Utc>,
    /// Last period of the stake
    pub end_date: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}
