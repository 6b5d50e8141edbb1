//! fleetmon Crawler Library
//!
//! Long-running network observer:
//! - Learns peers and fleet state from a teacher node (network middleware)
//! - Persists node, fleet-state and teacher records (metadata store)
//! - Periodically samples staking figures per known node (chain state provider)
//!   and writes them to the time series

pub mod chain;
pub mod collector;
pub mod config;
pub mod crawler;
pub mod error;
pub mod http;
pub mod metrics;
pub mod middleware;

// Re-export main types
pub use chain::{ChainError, ChainStateProvider, StakeInfo};
pub use collector::{ChainMetricsCollector, CollectedRound};
pub use config::{ConfigError, CrawlerConfig};
pub use crawler::{Crawler, CrawlerOptions, LearningReport, MetricsReport};
pub use error::{CrawlerError, Result};
pub use http::{HttpChainStateProvider, HttpNetworkMiddleware};
pub use crate::metrics::{init_metrics, install_exporter};
pub use middleware::{LearningOutcome, MiddlewareError, NetworkMiddleware, PeerHandle};
