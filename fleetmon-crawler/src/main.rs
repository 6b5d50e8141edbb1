//! fleetmon Crawler Daemon
//!
//! `crawl` runs the learning and metrics loops until interrupted.
//! `report` prints what a dashboard would read: recent fleet states, the
//! current teacher and daily stake aggregates.

use anyhow::Context;
use clap::{Parser, Subcommand};
use fleetmon_core::DEFAULT_RECENT_STATES;
use fleetmon_crawler::{
    install_exporter, Crawler, CrawlerConfig, HttpChainStateProvider, HttpNetworkMiddleware,
};
use fleetmon_metadata::NodeMetadataStore;
use fleetmon_timeseries::{InfluxConnector, MemoryConnector, TimeSeriesConnector};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetmon-crawler")]
#[command(about = "Network crawler and stake metrics collector")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "crawler.toml")]
    config: PathBuf,

    /// Metadata database file (overrides config file)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the crawler until Ctrl-C
    Crawl {
        /// Seednode REST URI used to bootstrap a teacher
        #[arg(long)]
        teacher_uri: Option<String>,

        /// Run the first learning round immediately
        #[arg(long)]
        learn_on_launch: bool,

        /// Keep stake samples in memory instead of writing to InfluxDB
        #[arg(long)]
        dry_run: bool,
    },

    /// Print stored state and daily aggregates as JSON
    Report {
        /// Days of aggregates to include
        #[arg(long, default_value = "7")]
        days: u32,

        /// Number of recent fleet states
        #[arg(long, default_value_t = DEFAULT_RECENT_STATES)]
        limit: usize,
    },
}

#[derive(Serialize)]
struct Report {
    current_teacher: Option<String>,
    known_nodes: u64,
    recent_states: Vec<fleetmon_metadata::FleetStateRecord>,
    daily_locked_stake: BTreeMap<String, f64>,
    daily_stakers: BTreeMap<String, u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Command::Crawl {
            teacher_uri,
            learn_on_launch,
            dry_run,
        } => {
            let config = CrawlerConfig::load_or_default(&cli.config)
                .with_env_overrides()
                .with_overrides(cli.db_path, teacher_uri, learn_on_launch);
            config.validate()?;
            crawl(config, dry_run).await
        }
        Command::Report { days, limit } => {
            let config = CrawlerConfig::load_or_default(&cli.config)
                .with_env_overrides()
                .with_overrides(cli.db_path, None, false);
            config.validate()?;
            report(config, days, limit).await
        }
    }
}

async fn crawl(config: CrawlerConfig, dry_run: bool) -> anyhow::Result<()> {
    info!("fleetmon crawler starting...");

    if config.metrics.enabled {
        install_exporter(config.metrics.port)?;
    }

    let timeout = Duration::from_secs(config.network.request_timeout_secs);
    let chain_url = config
        .network
        .chain_provider_url
        .as_deref()
        .context("network.chain_provider_url (or CHAIN_PROVIDER_URL) is required")?;

    let store = Arc::new(NodeMetadataStore::open(config.store_config()).await?);
    let middleware = Arc::new(HttpNetworkMiddleware::new(
        config.network.teacher_uri.clone(),
        timeout,
    )?);
    let chain = Arc::new(HttpChainStateProvider::new(chain_url, timeout)?);
    let memory = dry_run.then(MemoryConnector::default);
    let connector: Arc<dyn TimeSeriesConnector> = match &memory {
        Some(memory) => {
            info!("Dry run, stake samples stay in memory");
            Arc::new(memory.clone())
        }
        None => Arc::new(InfluxConnector::new(config.influx_config())),
    };

    let crawler = Crawler::new(
        config.crawler_options(),
        store.clone(),
        middleware,
        chain,
        connector,
    );

    crawler.start().await?;
    info!(db_path = %store.path().display(), "Crawler running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    if let Err(e) = crawler.stop().await {
        error!(error = %e, "Error while stopping crawler");
    }
    store.close().await?;

    if let Some(memory) = memory {
        info!(samples = memory.store().samples().len(), "Dry run samples discarded");
    }
    info!("fleetmon crawler stopped");
    Ok(())
}

async fn report(config: CrawlerConfig, days: u32, limit: usize) -> anyhow::Result<()> {
    let store = NodeMetadataStore::open(config.store_config()).await?;
    store.initialize().await?;

    let client = InfluxConnector::new(config.influx_config()).connect().await?;
    let locked = client.query_daily_locked_stake_sum(days).await?;
    let stakers = client.query_daily_staker_count(days).await?;
    client.close().await?;

    let report = Report {
        current_teacher: store.get_current_teacher().await?.map(|a| a.into_inner()),
        known_nodes: store.node_count().await?,
        recent_states: store.get_recent_states(limit).await?,
        daily_locked_stake: locked.into_iter().map(|(d, v)| (d.to_string(), v)).collect(),
        daily_stakers: stakers.into_iter().map(|(d, v)| (d.to_string(), v)).collect(),
    };
    store.close().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
