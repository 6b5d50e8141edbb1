//! Crawler lifecycle and periodic tasks
//!
//! Two independent background loops run while the crawler is started:
//! - learning: one discovery round against the current teacher, then sleep
//! - metrics: one chain metrics round over all known nodes, then sleep
//!
//! `stop()` signals both loops and waits for any in-flight round to finish
//! before closing the time-series client.

use crate::chain::ChainStateProvider;
use crate::collector::ChainMetricsCollector;
use crate::error::{CrawlerError, Result};
use crate::metrics::names;
use crate::middleware::{NetworkMiddleware, PeerHandle};
use fleetmon_core::ChecksumAddress;
use fleetmon_metadata::{NodeMetadataStore, NodeRecord};
use fleetmon_timeseries::{TimeSeriesClient, TimeSeriesConnector};
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Runtime settings for the crawler
#[derive(Debug, Clone)]
pub struct CrawlerOptions {
    pub learning_interval: Duration,
    pub slow_learning_interval: Duration,
    /// Consecutive rounds without a new node before switching to the slow interval
    pub rounds_before_slowdown: u32,
    pub metrics_interval: Duration,
    pub learn_on_launch: bool,
    /// Fleet states kept after each state write (0 = unlimited)
    pub max_fleet_states: usize,
    /// Concurrent stake lookups per metrics round
    pub chain_concurrency: usize,
    /// Concurrent peer verifications per learning round
    pub peer_concurrency: usize,
    /// Time-series database ensured on start
    pub database: String,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            learning_interval: Duration::from_millis(500),
            slow_learning_interval: Duration::from_secs(30),
            rounds_before_slowdown: 25,
            metrics_interval: Duration::from_secs(60),
            learn_on_launch: false,
            max_fleet_states: 0,
            chain_concurrency: 4,
            peer_concurrency: 8,
            database: "network".to_string(),
        }
    }
}

/// Outcome of one learning round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearningReport {
    /// Teacher used this round; `None` when no teacher was available
    pub teacher: Option<ChecksumAddress>,
    /// Node records written, teacher included
    pub nodes_stored: usize,
    /// Stored nodes that were not known before this round
    pub new_nodes: usize,
    pub peers_failed: usize,
    /// Nickname of the fleet state recorded this round
    pub fleet_state: Option<String>,
    pub states_pruned: u64,
}

/// Outcome of one metrics round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsReport {
    pub nodes_seen: usize,
    pub samples_written: usize,
    pub nodes_skipped: usize,
    pub period: Option<u64>,
}

struct RunningTasks {
    client: Arc<dyn TimeSeriesClient>,
    shutdown: watch::Sender<bool>,
    learning: JoinHandle<()>,
    metrics: JoinHandle<()>,
}

/// State shared with the background loops
struct CrawlerInner {
    options: CrawlerOptions,
    store: Arc<NodeMetadataStore>,
    middleware: Arc<dyn NetworkMiddleware>,
    connector: Arc<dyn TimeSeriesConnector>,
    collector: ChainMetricsCollector,
    client: RwLock<Option<Arc<dyn TimeSeriesClient>>>,
}

pub struct Crawler {
    inner: Arc<CrawlerInner>,
    tasks: Mutex<Option<RunningTasks>>,
    running: AtomicBool,
}

impl Crawler {
    pub fn new(
        options: CrawlerOptions,
        store: Arc<NodeMetadataStore>,
        middleware: Arc<dyn NetworkMiddleware>,
        chain: Arc<dyn ChainStateProvider>,
        connector: Arc<dyn TimeSeriesConnector>,
    ) -> Self {
        let collector = ChainMetricsCollector::new(store.clone(), chain, options.chain_concurrency);
        Self {
            inner: Arc::new(CrawlerInner {
                options,
                store,
                middleware,
                connector,
                collector,
                client: RwLock::new(None),
            }),
            tasks: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &CrawlerOptions {
        &self.inner.options
    }

    /// Metadata store shared with downstream readers
    pub fn store(&self) -> &Arc<NodeMetadataStore> {
        &self.inner.store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Connect the time series, prepare the store and spawn both loops
    ///
    /// A no-op when already running. On failure the crawler stays stopped.
    pub async fn start(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            debug!("Crawler already running");
            return Ok(());
        }

        let client = self
            .inner
            .connector
            .connect()
            .await
            .map_err(|e| CrawlerError::Connection(e.to_string()))?;

        if let Err(e) = client.ensure_database(&self.inner.options.database).await {
            close_quietly(client.as_ref()).await;
            return Err(CrawlerError::Connection(e.to_string()));
        }

        if let Err(e) = self.inner.store.initialize().await {
            close_quietly(client.as_ref()).await;
            return Err(e.into());
        }

        *self.inner.client.write() = Some(client.clone());

        let (shutdown, shutdown_rx) = watch::channel(false);
        let learning = tokio::spawn(learning_loop(self.inner.clone(), shutdown_rx.clone()));
        let metrics = tokio::spawn(metrics_loop(self.inner.clone(), shutdown_rx));

        *tasks = Some(RunningTasks {
            client,
            shutdown,
            learning,
            metrics,
        });
        self.running.store(true, Ordering::SeqCst);
        gauge!(names::CRAWLER_RUNNING).set(1.0);

        info!(
            learning_interval_ms = self.inner.options.learning_interval.as_millis() as u64,
            metrics_interval_secs = self.inner.options.metrics_interval.as_secs(),
            database = %self.inner.options.database,
            "Crawler started"
        );
        Ok(())
    }

    /// Stop both loops and close the time-series client
    ///
    /// In-flight rounds complete first. A no-op when not running.
    pub async fn stop(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        let Some(running) = tasks.take() else {
            debug!("Crawler not running");
            return Ok(());
        };

        // receivers may already be gone if a loop panicked
        let _ = running.shutdown.send(true);
        for (name, handle) in [("learning", running.learning), ("metrics", running.metrics)] {
            if let Err(e) = handle.await {
                error!(task = name, error = %e, "Crawler task ended abnormally");
            }
        }

        *self.inner.client.write() = None;
        self.running.store(false, Ordering::SeqCst);
        gauge!(names::CRAWLER_RUNNING).set(0.0);

        running.client.close().await?;
        info!("Crawler stopped");
        Ok(())
    }

    /// One discovery round against the current (or a bootstrapped) teacher
    pub async fn learn_from_teacher_node(&self) -> Result<LearningReport> {
        self.inner.learn_from_teacher_node().await
    }

    /// One chain metrics round; requires a started crawler
    pub async fn collect_chain_metrics(&self) -> Result<MetricsReport> {
        self.inner.collect_chain_metrics().await
    }
}

impl CrawlerInner {
    /// Stored teacher first, falling back to the middleware's bootstrap
    async fn resolve_teacher(&self) -> Result<Option<(PeerHandle, NodeRecord)>> {
        if let Some(address) = self.store.get_current_teacher().await? {
            if let Some(record) = self.store.get_node(&address).await? {
                let handle = PeerHandle::from_record(&record);
                match self.middleware.verify_and_fetch(&handle).await {
                    Ok(verified) => return Ok(Some((handle, verified))),
                    Err(e) => {
                        warn!(teacher = %address, error = %e, "Stored teacher failed verification");
                    }
                }
            }
        }

        let Some(handle) = self.middleware.discover_teacher().await? else {
            return Ok(None);
        };
        let verified = self.middleware.verify_and_fetch(&handle).await?;
        Ok(Some((handle, verified)))
    }

    async fn learn_from_teacher_node(&self) -> Result<LearningReport> {
        let Some((handle, teacher)) = self.resolve_teacher().await? else {
            warn!("No teacher available, can't learn right now");
            return Ok(LearningReport::default());
        };

        let known: HashSet<ChecksumAddress> =
            self.store.get_all_nodes().await?.into_keys().collect();
        let mut report = LearningReport {
            teacher: Some(teacher.checksum_address.clone()),
            ..Default::default()
        };

        self.store.upsert_node(&teacher).await?;
        report.nodes_stored += 1;
        if !known.contains(&teacher.checksum_address) {
            report.new_nodes += 1;
        }

        let outcome = self.middleware.learn_from(&handle).await?;

        let peers: Vec<PeerHandle> = outcome
            .peers
            .into_iter()
            .filter(|peer| peer.checksum_address.as_ref() != Some(&teacher.checksum_address))
            .collect();
        let verified: Vec<_> = stream::iter(peers)
            .map(|peer| async move {
                let result = self.middleware.verify_and_fetch(&peer).await;
                (peer, result)
            })
            .buffer_unordered(self.options.peer_concurrency.max(1))
            .collect()
            .await;

        for (peer, result) in verified {
            match result {
                Ok(node) => {
                    self.store.upsert_node(&node).await?;
                    report.nodes_stored += 1;
                    if !known.contains(&node.checksum_address) {
                        report.new_nodes += 1;
                    }
                }
                Err(e) => {
                    debug!(peer = %peer.uri, error = %e, "Peer verification failed");
                    report.peers_failed += 1;
                }
            }
        }

        // state and teacher pointer only after this round's nodes are stored
        if let Some(state) = outcome.fleet_state {
            self.store.upsert_fleet_state(&state).await?;
            if self.options.max_fleet_states > 0 {
                report.states_pruned = self
                    .store
                    .retain_recent_states(self.options.max_fleet_states)
                    .await?;
            }
            report.fleet_state = Some(state.nickname);
        }
        self.store.set_current_teacher(&teacher.checksum_address).await?;

        counter!(names::LEARNING_ROUNDS).increment(1);
        counter!(names::NODES_STORED).increment(report.nodes_stored as u64);
        counter!(names::PEER_VERIFICATION_FAILURES).increment(report.peers_failed as u64);
        gauge!(names::KNOWN_NODES).set((known.len() + report.new_nodes) as f64);

        info!(
            teacher = %teacher.checksum_address,
            stored = report.nodes_stored,
            new = report.new_nodes,
            failed = report.peers_failed,
            fleet_state = ?report.fleet_state,
            "Learning round complete"
        );
        Ok(report)
    }

    async fn collect_chain_metrics(&self) -> Result<MetricsReport> {
        let client = self.client.read().clone().ok_or(CrawlerError::NotRunning)?;

        let round = self.collector.collect().await?;

        if let Err(e) = client.write_samples(&round.samples).await {
            counter!(names::WRITE_FAILURES).increment(1);
            error!(samples = round.samples.len(), error = %e, "Failed to write stake samples");
            return Err(CrawlerError::WriteUnavailable(e.to_string()));
        }

        counter!(names::METRICS_ROUNDS).increment(1);
        counter!(names::SAMPLES_WRITTEN).increment(round.samples.len() as u64);
        counter!(names::NODES_SKIPPED).increment(round.skipped.len() as u64);

        let report = MetricsReport {
            nodes_seen: round.nodes_seen,
            samples_written: round.samples.len(),
            nodes_skipped: round.skipped.len(),
            period: round.period,
        };
        info!(
            nodes = report.nodes_seen,
            written = report.samples_written,
            skipped = report.nodes_skipped,
            period = ?report.period,
            "Metrics round complete"
        );
        Ok(report)
    }
}

async fn close_quietly(client: &dyn TimeSeriesClient) {
    if let Err(e) = client.close().await {
        debug!(error = %e, "Failed to close time-series client");
    }
}

/// Sleep for `delay` unless shutdown is signalled first; `false` on shutdown
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.changed() => false,
    }
}

/// Delay before the next learning round after `idle_rounds` rounds without a new node
fn learning_delay(options: &CrawlerOptions, idle_rounds: u32) -> Duration {
    if idle_rounds >= options.rounds_before_slowdown {
        options.slow_learning_interval
    } else {
        options.learning_interval
    }
}

async fn learning_loop(inner: Arc<CrawlerInner>, mut shutdown: watch::Receiver<bool>) {
    let options = &inner.options;
    let mut idle_rounds: u32 = 0;
    let mut delay = if options.learn_on_launch {
        Duration::ZERO
    } else {
        options.learning_interval
    };

    info!("Learning task started");
    while wait_or_shutdown(delay, &mut shutdown).await {
        match inner.learn_from_teacher_node().await {
            Ok(report) if report.new_nodes > 0 => idle_rounds = 0,
            Ok(_) => idle_rounds = idle_rounds.saturating_add(1),
            Err(e) => {
                counter!(names::LEARNING_FAILURES).increment(1);
                error!(error = %e, "Learning round failed");
                idle_rounds = idle_rounds.saturating_add(1);
            }
        }

        if idle_rounds > 0 && idle_rounds == options.rounds_before_slowdown {
            info!(
                rounds = idle_rounds,
                interval_secs = options.slow_learning_interval.as_secs(),
                "No new nodes found, slowing down learning"
            );
        }
        delay = learning_delay(options, idle_rounds);
    }
    info!("Learning task stopped");
}

async fn metrics_loop(inner: Arc<CrawlerInner>, mut shutdown: watch::Receiver<bool>) {
    info!("Metrics task started");
    while wait_or_shutdown(inner.options.metrics_interval, &mut shutdown).await {
        if let Err(e) = inner.collect_chain_metrics().await {
            error!(error = %e, "Metrics round failed");
        }
    }
    info!("Metrics task stopped");
}
