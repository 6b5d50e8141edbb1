//! Network middleware seam
//!
//! Transport, handshake and certificate exchange live behind
//! [`NetworkMiddleware`]; the crawler only sees verified records.

use async_trait::async_trait;
use fleetmon_core::ChecksumAddress;
use fleetmon_metadata::{FleetStateRecord, NodeRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MiddlewareError {
    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    #[error("Peer verification failed: {0}")]
    Verification(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// How to reach a peer, with its address when already known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerHandle {
    pub uri: String,
    #[serde(default)]
    pub checksum_address: Option<ChecksumAddress>,
}

impl PeerHandle {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            checksum_address: None,
        }
    }

    pub fn with_address(uri: impl Into<String>, address: ChecksumAddress) -> Self {
        Self {
            uri: uri.into(),
            checksum_address: Some(address),
        }
    }

    pub fn from_record(node: &NodeRecord) -> Self {
        Self::with_address(node.rest_url(), node.checksum_address.clone())
    }
}

/// What a teacher reported in one learning round
#[derive(Debug, Clone, Default)]
pub struct LearningOutcome {
    /// Peers the teacher reports as new or updated
    pub peers: Vec<PeerHandle>,
    /// Fleet-state summary, when the round changed or refreshed it
    pub fleet_state: Option<FleetStateRecord>,
}

#[async_trait]
pub trait NetworkMiddleware: Send + Sync {
    /// Bootstrap a teacher when none is stored
    async fn discover_teacher(&self) -> Result<Option<PeerHandle>, MiddlewareError>;

    /// Verify a peer and fetch its current metadata
    async fn verify_and_fetch(&self, peer: &PeerHandle) -> Result<NodeRecord, MiddlewareError>;

    /// Ask a verified teacher for the peers and fleet state it knows
    async fn learn_from(&self, teacher: &PeerHandle) -> Result<LearningOutcome, MiddlewareError>;
}
