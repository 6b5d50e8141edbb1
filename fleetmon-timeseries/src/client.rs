//! Time-series client seams

use crate::error::Result;
use crate::sample::StakeSample;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Append-only writer and daily range-query client for stake samples
#[async_trait]
pub trait TimeSeriesClient: Send + Sync {
    /// Create the database and its retention policy if missing
    ///
    /// Returns `true` when the database was created by this call.
    async fn ensure_database(&self, name: &str) -> Result<bool>;

    /// Write a whole collection round in one request
    async fn write_samples(&self, samples: &[StakeSample]) -> Result<()>;

    /// Sum of each staker's last locked stake, per day, for the last `days` days
    async fn query_daily_locked_stake_sum(&self, days: u32) -> Result<BTreeMap<NaiveDate, f64>>;

    /// Distinct stakers observed, per day, for the last `days` days
    async fn query_daily_staker_count(&self, days: u32) -> Result<BTreeMap<NaiveDate, u64>>;

    async fn close(&self) -> Result<()>;
}

/// Opens a client; fails with `Connection` when the store is unreachable
#[async_trait]
pub trait TimeSeriesConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn TimeSeriesClient>>;
}
