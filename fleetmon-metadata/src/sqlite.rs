//! SQLite metadata store
//!
//! Durable upsert storage for discovered nodes, fleet-state snapshots and the
//! current teacher pointer. Every operation acquires its own connection from
//! the pool, so the learning task, the metrics task and any downstream reader
//! never share a handle.

use crate::models::{encode_timestamp, FleetStateRecord, FleetStateRow, NodeRecord, NodeRow};
use fleetmon_core::ChecksumAddress;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const NODE_TABLE: &str = "nodes";
pub const CERTIFICATE_TABLE: &str = "certificates";
pub const STATE_TABLE: &str = "fleet_state";
pub const TEACHER_TABLE: &str = "teacher";

/// Key of the single row in the teacher table
const TEACHER_ID: &str = "current_teacher";

/// File name used when no path is configured
pub const DB_FILE_NAME: &str = "crawler-storage.sqlite";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS nodes (
        checksum_address TEXT PRIMARY KEY,
        rest_host TEXT NOT NULL,
        rest_port INTEGER NOT NULL,
        nickname TEXT,
        worker_address TEXT,
        version TEXT,
        timestamp TEXT NOT NULL,
        last_seen TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS certificates (
        checksum_address TEXT PRIMARY KEY,
        certificate BLOB NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fleet_state (
        nickname TEXT PRIMARY KEY,
        symbol TEXT NOT NULL,
        color_hex TEXT NOT NULL,
        color_name TEXT NOT NULL,
        updated TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS fleet_state_updated ON fleet_state (updated)",
    r#"
    CREATE TABLE IF NOT EXISTS teacher (
        id TEXT PRIMARY KEY,
        checksum_address TEXT NOT NULL
    )
    "#,
];

/// Store error types
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable at {path}: {reason}")]
    StorageUnavailable { path: String, reason: String },

    #[error("Schema not initialized: {0}")]
    SchemaNotReady(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    Sqlx(sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.message().contains("no such table") => {
                StoreError::SchemaNotReady(db.message().to_string())
            }
            sqlx::Error::PoolClosed => StoreError::StorageUnavailable {
                path: String::new(),
                reason: "store is closed".to_string(),
            },
            _ => StoreError::Sqlx(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite database file
    pub path: PathBuf,
    /// Delete the database file on `close()`
    pub ephemeral: bool,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DB_FILE_NAME),
            ephemeral: false,
            max_connections: 4,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Mark the store as temporary: its file is removed on `close()`
    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }
}

/// Metadata store for the crawler
pub struct NodeMetadataStore {
    pool: SqlitePool,
    path: PathBuf,
    ephemeral: bool,
}

impl NodeMetadataStore {
    /// Open (creating if needed) the database file
    ///
    /// Tables are not created here; call [`initialize`](Self::initialize).
    /// Queries against missing tables fail with `SchemaNotReady`.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let unavailable = |reason: String| StoreError::StorageUnavailable {
            path: config.path.display().to_string(),
            reason,
        };

        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.connect_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        info!(
            path = %config.path.display(),
            ephemeral = config.ephemeral,
            "Opened node metadata store"
        );

        Ok(Self {
            pool,
            path: config.path,
            ephemeral: config.ephemeral,
        })
    }

    /// Open an ephemeral store in a fresh temporary file
    pub async fn temporary() -> Result<Self> {
        let path = tempfile::Builder::new()
            .prefix("fleetmon-")
            .suffix(".sqlite")
            .tempfile()?
            .into_temp_path()
            .keep()
            .map_err(|e| StoreError::Io(e.error))?;

        Self::open(StoreConfig::new(path).ephemeral()).await
    }

    /// Database file backing this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Create any missing tables; existing tables and rows are left untouched
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!(path = %self.path.display(), "Metadata schema ready");
        Ok(())
    }

    // =========================================================================
    // NODE OPERATIONS
    // =========================================================================

    /// Insert or replace the record for a node
    ///
    /// A record without a certificate leaves any stored certificate in place.
    #[instrument(skip(self, node), fields(address = %node.checksum_address))]
    pub async fn upsert_node(&self, node: &NodeRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO nodes
                (checksum_address, rest_host, rest_port, nickname, worker_address, version, timestamp, last_seen)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(node.checksum_address.as_str())
        .bind(&node.rest_host)
        .bind(i64::from(node.rest_port))
        .bind(&node.nickname)
        .bind(&node.worker_address)
        .bind(&node.version)
        .bind(encode_timestamp(&node.timestamp))
        .bind(encode_timestamp(&node.last_seen))
        .execute(&mut *tx)
        .await?;

        if let Some(certificate) = &node.certificate {
            sqlx::query(
                "INSERT OR REPLACE INTO certificates (checksum_address, certificate) VALUES (?, ?)",
            )
            .bind(node.checksum_address.as_str())
            .bind(certificate)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Node stored");
        Ok(())
    }

    /// Get a single node by address
    pub async fn get_node(&self, address: &ChecksumAddress) -> Result<Option<NodeRecord>> {
        let row = sqlx::query_as::<_, NodeRow>(
            r#"
            SELECT n.*, c.certificate
            FROM nodes n
            LEFT JOIN certificates c ON c.checksum_address = n.checksum_address
            WHERE n.checksum_address = ?
            "#,
        )
        .bind(address.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(NodeRecord::try_from).transpose()
    }

    /// Snapshot of every known node keyed by address
    pub async fn get_all_nodes(&self) -> Result<HashMap<ChecksumAddress, NodeRecord>> {
        let rows = sqlx::query_as::<_, NodeRow>(
            r#"
            SELECT n.*, c.certificate
            FROM nodes n
            LEFT JOIN certificates c ON c.checksum_address = n.checksum_address
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let node = NodeRecord::try_from(row)?;
                Ok((node.checksum_address.clone(), node))
            })
            .collect()
    }

    /// Number of known nodes
    pub async fn node_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM nodes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    // =========================================================================
    // FLEET STATE OPERATIONS
    // =========================================================================

    /// Insert or replace a fleet state keyed by nickname
    #[instrument(skip(self, state), fields(nickname = %state.nickname))]
    pub async fn upsert_fleet_state(&self, state: &FleetStateRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO fleet_state (nickname, symbol, color_hex, color_name, updated)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&state.nickname)
        .bind(&state.symbol)
        .bind(&state.color_hex)
        .bind(&state.color_name)
        .bind(encode_timestamp(&state.updated))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent fleet states, newest first, at most `limit` rows
    pub async fn get_recent_states(&self, limit: usize) -> Result<Vec<FleetStateRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, FleetStateRow>(
            "SELECT * FROM fleet_state ORDER BY updated DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FleetStateRecord::try_from).collect()
    }

    /// Delete all but the `keep` most recent fleet states
    ///
    /// Returns the number of rows removed.
    #[instrument(skip(self))]
    pub async fn retain_recent_states(&self, keep: usize) -> Result<u64> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        let result = sqlx::query(
            r#"
            DELETE FROM fleet_state
            WHERE nickname NOT IN (
                SELECT nickname FROM fleet_state ORDER BY updated DESC LIMIT ?
            )
            "#,
        )
        .bind(keep)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            debug!(removed, "Pruned old fleet states");
        }
        Ok(removed)
    }

    // =========================================================================
    // TEACHER OPERATIONS
    // =========================================================================

    /// Replace the current teacher pointer
    #[instrument(skip(self))]
    pub async fn set_current_teacher(&self, address: &ChecksumAddress) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO teacher (id, checksum_address) VALUES (?, ?)")
            .bind(TEACHER_ID)
            .bind(address.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Current teacher, absent until one has been set
    pub async fn get_current_teacher(&self) -> Result<Option<ChecksumAddress>> {
        let address: Option<String> =
            sqlx::query_scalar("SELECT checksum_address FROM teacher WHERE id = ?")
                .bind(TEACHER_ID)
                .fetch_optional(&self.pool)
                .await?;

        address
            .map(|a| ChecksumAddress::new(a).map_err(|e| StoreError::InvalidRecord(e.to_string())))
            .transpose()
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Bulk clear
    ///
    /// `metadata` empties the node, fleet-state and teacher tables;
    /// `certificates` empties the certificate table. The flags are independent.
    #[instrument(skip(self))]
    pub async fn clear(&self, metadata: bool, certificates: bool) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if metadata {
            for table in [NODE_TABLE, STATE_TABLE, TEACHER_TABLE] {
                sqlx::query(&format!("DELETE FROM {table}"))
                    .execute(&mut *tx)
                    .await?;
            }
        }
        if certificates {
            sqlx::query(&format!("DELETE FROM {CERTIFICATE_TABLE}"))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(metadata, certificates, "Metadata store cleared");
        Ok(())
    }

    /// Close all connections; an ephemeral store also removes its files
    ///
    /// Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        self.pool.close().await;

        if self.ephemeral {
            for path in self.files() {
                match std::fs::remove_file(&path) {
                    Ok(()) => debug!(path = %path.display(), "Removed ephemeral store file"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to remove store file");
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Database file plus its WAL side files
    fn files(&self) -> Vec<PathBuf> {
        let base = self.path.as_os_str().to_owned();
        let mut files = vec![self.path.clone()];
        for suffix in ["-wal", "-shm"] {
            let mut name = base.clone();
            name.push(suffix);
            files.push(PathBuf::from(name));
        }
        files
    }
}
