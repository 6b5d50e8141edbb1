//! Metadata models
//!
//! Public records handed to callers, plus the row structs that map
//! directly to the SQLite tables.

use chrono::{DateTime, Utc};
use fleetmon_core::{format_timestamp, parse_timestamp, ChecksumAddress};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::sqlite::{Result, StoreError};

/// A discovered peer, keyed by its checksum address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub checksum_address: ChecksumAddress,

    // Reachability
    pub rest_host: String,
    pub rest_port: u16,

    pub nickname: Option<String>,

    /// Operator/worker address; unset for nodes without a bonded worker
    pub worker_address: Option<String>,

    /// Protocol/software version advertised by the node
    pub version: Option<String>,

    /// Timestamp the node advertises for itself
    pub timestamp: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,

    /// TLS certificate (stored separately from the metadata row)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Vec<u8>>,
}

impl NodeRecord {
    /// Minimal record for a freshly seen node
    pub fn new(
        checksum_address: ChecksumAddress,
        rest_host: impl Into<String>,
        rest_port: u16,
    ) -> Self {
        let now = Utc::now();
        Self {
            checksum_address,
            rest_host: rest_host.into(),
            rest_port,
            nickname: None,
            worker_address: None,
            version: None,
            timestamp: now,
            last_seen: now,
            certificate: None,
        }
    }

    /// REST endpoint of the node
    pub fn rest_url(&self) -> String {
        format!("https://{}:{}", self.rest_host, self.rest_port)
    }
}

/// Snapshot of the fleet's aggregate convergence state, keyed by nickname
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetStateRecord {
    pub nickname: String,
    pub symbol: String,
    pub color_hex: String,
    pub color_name: String,
    pub updated: DateTime<Utc>,
}

/// Row of the `nodes` table joined with its certificate
#[derive(Debug, FromRow)]
pub(crate) struct NodeRow {
    pub checksum_address: String,
    pub rest_host: String,
    pub rest_port: i64,
    pub nickname: Option<String>,
    pub worker_address: Option<String>,
    pub version: Option<String>,
    pub timestamp: String,
    pub last_seen: String,
    pub certificate: Option<Vec<u8>>,
}

impl TryFrom<NodeRow> for NodeRecord {
    type Error = StoreError;

    fn try_from(row: NodeRow) -> Result<Self> {
        let rest_port = u16::try_from(row.rest_port).map_err(|_| {
            StoreError::InvalidRecord(format!(
                "port {} out of range for {}",
                row.rest_port, row.checksum_address
            ))
        })?;

        Ok(Self {
            checksum_address: ChecksumAddress::new(row.checksum_address)
                .map_err(|e| StoreError::InvalidRecord(e.to_string()))?,
            rest_host: row.rest_host,
            rest_port,
            nickname: row.nickname,
            worker_address: row.worker_address,
            version: row.version,
            timestamp: decode_timestamp(&row.timestamp)?,
            last_seen: decode_timestamp(&row.last_seen)?,
            certificate: row.certificate,
        })
    }
}

/// Row of the `fleet_state` table
#[derive(Debug, FromRow)]
pub(crate) struct FleetStateRow {
    pub nickname: String,
    pub symbol: String,
    pub color_hex: String,
    pub color_name: String,
    pub updated: String,
}

impl TryFrom<FleetStateRow> for FleetStateRecord {
    type Error = StoreError;

    fn try_from(row: FleetStateRow) -> Result<Self> {
        Ok(Self {
            updated: decode_timestamp(&row.updated)?,
            nickname: row.nickname,
            symbol: row.symbol,
            color_hex: row.color_hex,
            color_name: row.color_name,
        })
    }
}

pub(crate) fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    format_timestamp(ts)
}

fn decode_timestamp(value: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(value).map_err(|e| StoreError::InvalidRecord(e.to_string()))
}
