//! Prometheus metrics for the crawler
//!
//! Recording is a no-op until a recorder is installed.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names as constants
pub mod names {
    // Learning
    pub const LEARNING_ROUNDS: &str = "fleetmon_learning_rounds_total";
    pub const LEARNING_FAILURES: &str = "fleetmon_learning_failures_total";
    pub const NODES_STORED: &str = "fleetmon_nodes_stored_total";
    pub const PEER_VERIFICATION_FAILURES: &str = "fleetmon_peer_verification_failures_total";
    pub const KNOWN_NODES: &str = "fleetmon_known_nodes";

    // Chain metrics collection
    pub const METRICS_ROUNDS: &str = "fleetmon_metrics_rounds_total";
    pub const SAMPLES_WRITTEN: &str = "fleetmon_samples_written_total";
    pub const WRITE_FAILURES: &str = "fleetmon_write_failures_total";
    pub const NODES_SKIPPED: &str = "fleetmon_nodes_skipped_total";

    // Lifecycle
    pub const CRAWLER_RUNNING: &str = "fleetmon_crawler_running";
}

/// Initialize metric descriptions
pub fn init_metrics() {
    describe_counter!(names::LEARNING_ROUNDS, "Completed learning rounds");
    describe_counter!(names::LEARNING_FAILURES, "Learning rounds that failed");
    describe_counter!(names::NODES_STORED, "Node records written to the metadata store");
    describe_counter!(
        names::PEER_VERIFICATION_FAILURES,
        "Peers skipped because verification failed"
    );
    describe_gauge!(names::KNOWN_NODES, "Nodes currently in the metadata store");

    describe_counter!(names::METRICS_ROUNDS, "Completed chain metrics rounds");
    describe_counter!(names::SAMPLES_WRITTEN, "Stake samples written to the time series");
    describe_counter!(names::WRITE_FAILURES, "Metrics rounds whose batch write failed");
    describe_counter!(
        names::NODES_SKIPPED,
        "Nodes skipped in a metrics round (no stake or chain unavailable)"
    );

    describe_gauge!(
        names::CRAWLER_RUNNING,
        "Whether the crawler is running (1) or stopped (0)"
    );
}

/// Install the Prometheus recorder and serve `/metrics` on `port`
///
/// Must be called from within a Tokio runtime.
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    init_metrics();
    info!(addr = %addr, "Metrics exporter listening");
    Ok(())
}
