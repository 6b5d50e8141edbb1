//! Crawler error types

use crate::chain::ChainError;
use crate::middleware::MiddlewareError;
use fleetmon_metadata::StoreError;
use fleetmon_timeseries::TimeSeriesError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlerError {
    /// The time-series store could not be reached during `start()`
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// A metrics round could not write its batch
    #[error("Write unavailable: {0}")]
    WriteUnavailable(String),

    #[error("Time-series error: {0}")]
    TimeSeries(#[from] TimeSeriesError),

    #[error("Network middleware error: {0}")]
    Middleware(#[from] MiddlewareError),

    #[error("Chain state error: {0}")]
    Chain(#[from] ChainError),

    #[error("Crawler is not running")]
    NotRunning,

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, CrawlerError>;
