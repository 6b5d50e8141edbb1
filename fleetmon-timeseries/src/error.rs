//! Time-series error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimeSeriesError {
    #[error("Time-series store unreachable: {0}")]
    Connection(String),

    #[error("Write unavailable: {0}")]
    WriteUnavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Client is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TimeSeriesError>;
