//! In-process time-series store
//!
//! Keeps samples in memory and answers daily queries with the aggregation
//! in [`crate::aggregate`]. Backs `crawl --dry-run` and tests.

use crate::aggregate::{daily_locked_stake_sum, daily_staker_count};
use crate::client::{TimeSeriesClient, TimeSeriesConnector};
use crate::error::{Result, TimeSeriesError};
use crate::sample::StakeSample;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use fleetmon_core::day_window;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct MemoryTimeSeries {
    databases: RwLock<HashSet<String>>,
    samples: RwLock<Vec<StakeSample>>,
    closed: AtomicBool,
}

impl MemoryTimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored sample, in write order
    pub fn samples(&self) -> Vec<StakeSample> {
        self.samples.read().clone()
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.databases.read().contains(name)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TimeSeriesError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl TimeSeriesClient for MemoryTimeSeries {
    async fn ensure_database(&self, name: &str) -> Result<bool> {
        self.check_open()?;
        Ok(self.databases.write().insert(name.to_string()))
    }

    async fn write_samples(&self, samples: &[StakeSample]) -> Result<()> {
        if self.is_closed() {
            return Err(TimeSeriesError::WriteUnavailable("client is closed".to_string()));
        }
        self.samples.write().extend_from_slice(samples);
        debug!(count = samples.len(), "Samples stored in memory");
        Ok(())
    }

    async fn query_daily_locked_stake_sum(&self, days: u32) -> Result<BTreeMap<NaiveDate, f64>> {
        self.check_open()?;
        let window = day_window(days, &Utc::now());
        Ok(daily_locked_stake_sum(&self.samples.read(), &window))
    }

    async fn query_daily_staker_count(&self, days: u32) -> Result<BTreeMap<NaiveDate, u64>> {
        self.check_open()?;
        let window = day_window(days, &Utc::now());
        Ok(daily_staker_count(&self.samples.read(), &window))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one shared in-memory store on every connect
///
/// Connecting reopens a store closed by an earlier session; samples survive.
#[derive(Default, Clone)]
pub struct MemoryConnector {
    store: Arc<MemoryTimeSeries>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryTimeSeries>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<MemoryTimeSeries> {
        self.store.clone()
    }
}

#[async_trait]
impl TimeSeriesConnector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn TimeSeriesClient>> {
        self.store.reopen();
        Ok(self.store.clone())
    }
}
