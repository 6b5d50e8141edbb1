//! Hand-written counting fakes for the crawler's collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fleetmon_core::ChecksumAddress;
use fleetmon_crawler::{
    ChainError, ChainStateProvider, LearningOutcome, MiddlewareError, NetworkMiddleware,
    PeerHandle, StakeInfo,
};
use fleetmon_metadata::{FleetStateRecord, NodeMetadataStore, NodeRecord, StoreConfig};
use fleetmon_timeseries::{
    StakeSample, TimeSeriesClient, TimeSeriesConnector, TimeSeriesError,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub fn address(value: &str) -> ChecksumAddress {
    ChecksumAddress::new(value).unwrap()
}

/// Node record reachable at `https://10.0.0.{n}:9151`
pub fn node(addr: &str, n: u8) -> NodeRecord {
    NodeRecord::new(address(addr), format!("10.0.0.{n}"), 9151)
}

pub fn fleet_state(nickname: &str, minutes: u32) -> FleetStateRecord {
    FleetStateRecord {
        nickname: nickname.to_string(),
        symbol: "♣".to_string(),
        color_hex: "#00ffff".to_string(),
        color_name: "cyan".to_string(),
        updated: Utc.with_ymd_and_hms(2023, 6, 1, 12, minutes, 0).unwrap(),
    }
}

pub fn stake(locked: f64, period: u64) -> StakeInfo {
    StakeInfo {
        worker_address: "0xWORKER".to_string(),
        stake: locked + 100.0,
        locked_stake: locked,
        current_period: period,
        last_active_period: period - 1,
        start_date: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        end_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// Store in a temp dir, schema ready
pub async fn temp_store(dir: &TempDir) -> Arc<NodeMetadataStore> {
    let store = NodeMetadataStore::open(StoreConfig::new(dir.path().join("crawler.sqlite")))
        .await
        .unwrap();
    store.initialize().await.unwrap();
    Arc::new(store)
}

// ============ Network Middleware ============

#[derive(Default)]
pub struct FakeMiddleware {
    seed: Mutex<Option<PeerHandle>>,
    /// Verified record per reachable URI
    records: Mutex<HashMap<String, NodeRecord>>,
    peers: Mutex<Vec<PeerHandle>>,
    fleet_state: Mutex<Option<FleetStateRecord>>,
    pub discover_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub learn_calls: AtomicUsize,
}

impl FakeMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed that bootstraps `teacher`; the teacher is also reachable at its REST URL
    pub fn with_teacher(teacher: NodeRecord) -> Self {
        let fake = Self::new();
        *fake.seed.lock().unwrap() = Some(PeerHandle::new("https://seed:9151"));
        fake.add_reachable("https://seed:9151", teacher.clone());
        fake.add_reachable(&teacher.rest_url(), teacher);
        fake
    }

    pub fn add_reachable(&self, uri: &str, record: NodeRecord) {
        self.records.lock().unwrap().insert(uri.to_string(), record);
    }

    pub fn make_unreachable(&self, uri: &str) {
        self.records.lock().unwrap().remove(uri);
    }

    /// Peer the teacher reports; verifiable when `record` is given
    pub fn add_peer(&self, uri: &str, record: Option<NodeRecord>) {
        let address = record.as_ref().map(|r| r.checksum_address.clone());
        if let Some(record) = record {
            self.add_reachable(uri, record);
        }
        self.peers.lock().unwrap().push(PeerHandle {
            uri: uri.to_string(),
            checksum_address: address,
        });
    }

    pub fn set_fleet_state(&self, state: Option<FleetStateRecord>) {
        *self.fleet_state.lock().unwrap() = state;
    }
}

#[async_trait]
impl NetworkMiddleware for FakeMiddleware {
    async fn discover_teacher(&self) -> Result<Option<PeerHandle>, MiddlewareError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.seed.lock().unwrap().clone())
    }

    async fn verify_and_fetch(&self, peer: &PeerHandle) -> Result<NodeRecord, MiddlewareError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .get(&peer.uri)
            .cloned()
            .ok_or_else(|| MiddlewareError::Unreachable(peer.uri.clone()))
    }

    async fn learn_from(&self, _teacher: &PeerHandle) -> Result<LearningOutcome, MiddlewareError> {
        self.learn_calls.fetch_add(1, Ordering::SeqCst);
        Ok(LearningOutcome {
            peers: self.peers.lock().unwrap().clone(),
            fleet_state: self.fleet_state.lock().unwrap().clone(),
        })
    }
}

// ============ Chain State Provider ============

#[derive(Default)]
pub struct FakeChain {
    stakes: Mutex<HashMap<ChecksumAddress, StakeInfo>>,
    unavailable: Mutex<HashSet<ChecksumAddress>>,
    pub block_time: Option<DateTime<Utc>>,
    pub lookups: AtomicUsize,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_staker(&self, addr: &str, info: StakeInfo) {
        self.stakes.lock().unwrap().insert(address(addr), info);
    }

    pub fn make_unavailable(&self, addr: &str) {
        self.unavailable.lock().unwrap().insert(address(addr));
    }
}

#[async_trait]
impl ChainStateProvider for FakeChain {
    async fn get_stake_info(&self, staker: &ChecksumAddress) -> Result<StakeInfo, ChainError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.lock().unwrap().contains(staker) {
            return Err(ChainError::Unavailable("rpc timeout".to_string()));
        }
        self.stakes
            .lock()
            .unwrap()
            .get(staker)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(staker.clone()))
    }

    async fn latest_block_time(&self) -> Result<DateTime<Utc>, ChainError> {
        Ok(self.block_time.unwrap_or_else(Utc::now))
    }
}

// ============ Time Series ============

/// Records every call; each write keeps its batch
#[derive(Default)]
pub struct CountingTimeSeries {
    pub fail_ensure: AtomicBool,
    pub fail_writes: AtomicBool,
    pub ensure_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    batches: Mutex<Vec<Vec<StakeSample>>>,
}

impl CountingTimeSeries {
    pub fn batches(&self) -> Vec<Vec<StakeSample>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimeSeriesClient for CountingTimeSeries {
    async fn ensure_database(&self, name: &str) -> Result<bool, TimeSeriesError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ensure.load(Ordering::SeqCst) {
            return Err(TimeSeriesError::Connection(format!("cannot create {name}")));
        }
        Ok(true)
    }

    async fn write_samples(&self, samples: &[StakeSample]) -> Result<(), TimeSeriesError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TimeSeriesError::WriteUnavailable("connection refused".to_string()));
        }
        self.batches.lock().unwrap().push(samples.to_vec());
        Ok(())
    }

    async fn query_daily_locked_stake_sum(
        &self,
        _days: u32,
    ) -> Result<BTreeMap<chrono::NaiveDate, f64>, TimeSeriesError> {
        Ok(BTreeMap::new())
    }

    async fn query_daily_staker_count(
        &self,
        _days: u32,
    ) -> Result<BTreeMap<chrono::NaiveDate, u64>, TimeSeriesError> {
        Ok(BTreeMap::new())
    }

    async fn close(&self) -> Result<(), TimeSeriesError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct CountingConnector {
    pub client: Arc<CountingTimeSeries>,
    pub reachable: AtomicBool,
    pub connects: AtomicUsize,
}

impl CountingConnector {
    pub fn new() -> Self {
        Self {
            client: Arc::new(CountingTimeSeries::default()),
            reachable: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        let connector = Self::new();
        connector.reachable.store(false, Ordering::SeqCst);
        connector
    }
}

#[async_trait]
impl TimeSeriesConnector for CountingConnector {
    async fn connect(&self) -> Result<Arc<dyn TimeSeriesClient>, TimeSeriesError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(TimeSeriesError::Connection("localhost:8086 refused".to_string()));
        }
        Ok(self.client.clone())
    }
}
