//! HTTP adapters for the seednode REST API and the chain state provider

use crate::chain::{ChainError, ChainStateProvider, StakeInfo};
use crate::middleware::{LearningOutcome, MiddlewareError, NetworkMiddleware, PeerHandle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetmon_core::ChecksumAddress;
use fleetmon_metadata::{FleetStateRecord, NodeRecord};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

// ============ Response Types ============

/// `GET {peer}/node`
#[derive(Debug, Deserialize)]
struct NodeInfoResponse {
    checksum_address: ChecksumAddress,
    rest_host: String,
    rest_port: u16,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    worker_address: Option<String>,
    #[serde(default)]
    version: Option<String>,
    timestamp: DateTime<Utc>,
}

/// `GET {teacher}/known_nodes`
#[derive(Debug, Deserialize)]
struct KnownNodesResponse {
    #[serde(default)]
    nodes: Vec<PeerHandle>,
    #[serde(default)]
    fleet_state: Option<FleetStateRecord>,
}

/// `GET {provider}/block/latest`
#[derive(Debug, Deserialize)]
struct BlockResponse {
    /// Unix seconds
    timestamp: i64,
}

fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

// ============ Network Middleware ============

/// Peers reached over their REST endpoints; identity checked by address only
pub struct HttpNetworkMiddleware {
    client: Client,
    seed_uri: Option<String>,
}

impl HttpNetworkMiddleware {
    pub fn new(seed_uri: Option<String>, timeout: Duration) -> Result<Self, MiddlewareError> {
        let client = build_client(timeout).map_err(|e| MiddlewareError::Protocol(e.to_string()))?;
        Ok(Self {
            client,
            seed_uri: seed_uri.map(|uri| trim_base(&uri)),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, MiddlewareError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MiddlewareError::Unreachable(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(MiddlewareError::Protocol(format!(
                "{url}: unexpected status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| MiddlewareError::Protocol(format!("{url}: {e}")))
    }
}

#[async_trait]
impl NetworkMiddleware for HttpNetworkMiddleware {
    async fn discover_teacher(&self) -> Result<Option<PeerHandle>, MiddlewareError> {
        Ok(self.seed_uri.as_ref().map(PeerHandle::new))
    }

    async fn verify_and_fetch(&self, peer: &PeerHandle) -> Result<NodeRecord, MiddlewareError> {
        let url = format!("{}/node", trim_base(&peer.uri));
        let info: NodeInfoResponse = self.get_json(&url).await?;

        if let Some(expected) = &peer.checksum_address {
            if *expected != info.checksum_address {
                return Err(MiddlewareError::Verification(format!(
                    "{} reports {} but {} was expected",
                    peer.uri, info.checksum_address, expected
                )));
            }
        }

        debug!(address = %info.checksum_address, uri = %peer.uri, "Peer verified");
        Ok(NodeRecord {
            checksum_address: info.checksum_address,
            rest_host: info.rest_host,
            rest_port: info.rest_port,
            nickname: info.nickname,
            worker_address: info.worker_address,
            version: info.version,
            timestamp: info.timestamp,
            last_seen: Utc::now(),
            certificate: None,
        })
    }

    async fn learn_from(&self, teacher: &PeerHandle) -> Result<LearningOutcome, MiddlewareError> {
        let url = format!("{}/known_nodes", trim_base(&teacher.uri));
        let known: KnownNodesResponse = self.get_json(&url).await?;
        Ok(LearningOutcome {
            peers: known.nodes,
            fleet_state: known.fleet_state,
        })
    }
}

// ============ Chain State Provider ============

pub struct HttpChainStateProvider {
    client: Client,
    base_url: String,
}

impl HttpChainStateProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ChainError> {
        let client = build_client(timeout).map_err(|e| ChainError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: trim_base(base_url),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, ChainError> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(format!("{url}: {e}")))
    }
}

#[async_trait]
impl ChainStateProvider for HttpChainStateProvider {
    async fn get_stake_info(&self, staker: &ChecksumAddress) -> Result<StakeInfo, ChainError> {
        let url = format!("{}/stakers/{}", self.base_url, staker);
        let response = self.get(&url).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ChainError::NotFound(staker.clone())),
            status if status.is_success() => response
                .json()
                .await
                .map_err(|e| ChainError::Unavailable(format!("{url}: {e}"))),
            status => Err(ChainError::Unavailable(format!("{url}: unexpected status {status}"))),
        }
    }

    async fn latest_block_time(&self) -> Result<DateTime<Utc>, ChainError> {
        let url = format!("{}/block/latest", self.base_url);
        let response = self.get(&url).await?;
        if !response.status().is_success() {
            return Err(ChainError::Unavailable(format!(
                "{url}: unexpected status {}",
                response.status()
            )));
        }

        let block: BlockResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Unavailable(format!("{url}: {e}")))?;
        DateTime::from_timestamp(block.timestamp, 0)
            .ok_or_else(|| ChainError::Unavailable(format!("bad block timestamp {}", block.timestamp)))
    }
}
