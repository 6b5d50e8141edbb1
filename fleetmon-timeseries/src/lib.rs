//! fleetmon Time Series
//!
//! Append-only stake samples and their daily aggregates.
//!
//! - [`TimeSeriesClient`]: the seam the crawler writes through
//! - [`InfluxClient`]: InfluxDB 1.x over HTTP, aggregates computed server-side
//! - [`MemoryTimeSeries`]: in-process store using the same aggregation rules
//!
//! Daily queries bucket by UTC day, keep each staker's last observation per
//! day, then combine. Days without samples are absent from results.

pub mod aggregate;
pub mod client;
pub mod error;
pub mod influx;
pub mod line_protocol;
pub mod memory;
pub mod sample;

pub use client::{TimeSeriesClient, TimeSeriesConnector};
pub use error::{Result, TimeSeriesError};
pub use influx::{InfluxClient, InfluxConfig, InfluxConnector};
pub use memory::{MemoryConnector, MemoryTimeSeries};
pub use sample::{StakeSample, MEASUREMENT};
