//! fleetmon Core Library
//!
//! Primitives shared by every fleetmon crate:
//! - Checksum addresses identifying peers and stakers
//! - UTC timestamp formatting and day bucketing
//! - Common error type

pub mod address;
pub mod error;
pub mod time;

pub use address::ChecksumAddress;
pub use error::{CoreError, Result};
pub use time::{day_start, day_window, format_timestamp, parse_timestamp, DayWindow};

/// Default number of fleet states returned by recent-state queries
pub const DEFAULT_RECENT_STATES: usize = 5;

/// Seconds in one aggregation bucket
pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
