//! fleetmon Metadata Store
//!
//! Durable record of what the crawler has learned about the network,
//! kept in a local SQLite database.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │               NodeMetadataStore               │
//! │                                               │
//! │  ┌─────────┐ ┌──────────────┐ ┌────────────┐  │
//! │  │  nodes  │ │ certificates │ │ fleet_state│  │
//! │  └─────────┘ └──────────────┘ └────────────┘  │
//! │                 ┌─────────┐                   │
//! │                 │ teacher │                   │
//! │                 └─────────┘                   │
//! │                                               │
//! │        SqlitePool (one connection per call)   │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use fleetmon_metadata::{NodeMetadataStore, StoreConfig};
//!
//! let store = NodeMetadataStore::open(StoreConfig::new("crawler.sqlite")).await?;
//! store.initialize().await?;
//!
//! store.upsert_node(&node).await?;
//! let recent = store.get_recent_states(5).await?;
//! ```

pub mod models;
pub mod sqlite;

pub use models::{FleetStateRecord, NodeRecord};
pub use sqlite::{NodeMetadataStore, Result, StoreConfig, StoreError, DB_FILE_NAME};
