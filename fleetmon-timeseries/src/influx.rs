//! InfluxDB 1.x HTTP client
//!
//! Speaks the `/ping`, `/query` and `/write` endpoints. Daily aggregates are
//! computed server-side with a nested InfluxQL query: the inner query takes
//! the last value per staker per day, the outer query combines them per day.

use crate::client::{TimeSeriesClient, TimeSeriesConnector};
use crate::error::{Result, TimeSeriesError};
use crate::line_protocol;
use crate::sample::{StakeSample, MEASUREMENT};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use fleetmon_core::{day_window, DayWindow};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection settings
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub host: String,
    pub port: u16,
    /// Database that samples are written to and queried from
    pub database: String,
    pub retention_policy: String,
    /// InfluxQL duration literal, e.g. `5w`
    pub retention_duration: String,
    pub replication: u32,
    pub timeout: Duration,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8086,
            database: "network".to_string(),
            retention_policy: "network_info_retention".to_string(),
            retention_duration: "5w".to_string(),
            replication: 1,
            timeout: Duration::from_secs(10),
        }
    }
}

impl InfluxConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

// ============ Response Types ============

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

// ============ Client ============

pub struct InfluxClient {
    client: Client,
    base_url: String,
    config: InfluxConfig,
    closed: AtomicBool,
}

impl InfluxClient {
    pub fn new(config: InfluxConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TimeSeriesError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            config,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &InfluxConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TimeSeriesError::Closed);
        }
        Ok(())
    }

    /// Check the server answers `/ping`
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/ping", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TimeSeriesError::Connection(format!("{url}: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(TimeSeriesError::Connection(format!(
                "{url}: unexpected status {}",
                response.status()
            )))
        }
    }

    /// Names of existing databases
    async fn list_databases(&self) -> Result<Vec<String>> {
        let response = self
            .query("SHOW DATABASES", None)
            .await
            .map_err(into_connection)?;

        Ok(series_rows(response)?
            .into_iter()
            .filter_map(|row| row.first().and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    /// Run a statement; schema changes go through POST
    async fn execute(&self, statement: &str) -> Result<()> {
        let url = format!("{}/query", self.base_url);
        let response = self
            .client
            .post(&url)
            .form(&[("q", statement)])
            .send()
            .await
            .map_err(|e| TimeSeriesError::Connection(e.to_string()))?;

        decode_query_response(response).await.and_then(series_rows).map(|_| ())
    }

    async fn query(&self, statement: &str, database: Option<&str>) -> Result<QueryResponse> {
        let url = format!("{}/query", self.base_url);
        let mut params = vec![("q", statement), ("epoch", "s")];
        if let Some(db) = database {
            params.push(("db", db));
        }

        debug!(query = statement, "InfluxQL query");
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| TimeSeriesError::Query(e.to_string()))?;

        decode_query_response(response).await
    }

    /// Nested daily query: last value per staker per day, then `outer` per day
    async fn daily_query(&self, outer: &str, days: u32) -> Result<Vec<(NaiveDate, f64)>> {
        self.check_open()?;

        let window = day_window(days, &Utc::now());
        if window.is_empty() {
            return Ok(Vec::new());
        }

        let statement = daily_statement(outer, &window);
        let response = self.query(&statement, Some(&self.config.database)).await?;
        daily_values(series_rows(response)?)
    }
}

#[async_trait]
impl TimeSeriesClient for InfluxClient {
    async fn ensure_database(&self, name: &str) -> Result<bool> {
        self.check_open()?;

        if self.list_databases().await?.iter().any(|db| db == name) {
            debug!(database = name, "Time-series database exists");
            return Ok(false);
        }

        self.execute(&format!("CREATE DATABASE \"{name}\"")).await?;
        self.execute(&format!(
            "CREATE RETENTION POLICY \"{}\" ON \"{name}\" DURATION {} REPLICATION {} DEFAULT",
            self.config.retention_policy, self.config.retention_duration, self.config.replication
        ))
        .await?;

        info!(
            database = name,
            retention_policy = %self.config.retention_policy,
            duration = %self.config.retention_duration,
            "Created time-series database"
        );
        Ok(true)
    }

    async fn write_samples(&self, samples: &[StakeSample]) -> Result<()> {
        if self.is_closed() {
            return Err(TimeSeriesError::WriteUnavailable("client is closed".to_string()));
        }
        if samples.is_empty() {
            return Ok(());
        }

        let body = line_protocol::encode_batch(samples)?;
        let url = format!("{}/write", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("db", self.config.database.as_str()), ("precision", "s")])
            .body(body)
            .send()
            .await
            .map_err(|e| TimeSeriesError::WriteUnavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status.is_success() {
            debug!(count = samples.len(), measurement = MEASUREMENT, "Samples written");
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        warn!(status = %status, detail = %detail, "Sample write rejected");
        Err(TimeSeriesError::WriteUnavailable(format!("{status}: {detail}")))
    }

    async fn query_daily_locked_stake_sum(&self, days: u32) -> Result<BTreeMap<NaiveDate, f64>> {
        Ok(self
            .daily_query("SUM(locked_stake)", days)
            .await?
            .into_iter()
            .collect())
    }

    async fn query_daily_staker_count(&self, days: u32) -> Result<BTreeMap<NaiveDate, u64>> {
        Ok(self
            .daily_query("COUNT(staker_address)", days)
            .await?
            .into_iter()
            .filter(|(_, count)| *count > 0.0)
            .map(|(day, count)| (day, count as u64))
            .collect())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(url = %self.base_url, "Time-series client closed");
        }
        Ok(())
    }
}

/// Connects by building a client and pinging the server
#[derive(Debug, Clone)]
pub struct InfluxConnector {
    config: InfluxConfig,
}

impl InfluxConnector {
    pub fn new(config: InfluxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TimeSeriesConnector for InfluxConnector {
    async fn connect(&self) -> Result<Arc<dyn TimeSeriesClient>> {
        let client = InfluxClient::new(self.config.clone())?;
        client.ping().await?;
        info!(url = %client.base_url, "Connected to InfluxDB");
        Ok(Arc::new(client))
    }
}

// ============ Helpers ============

fn into_connection(err: TimeSeriesError) -> TimeSeriesError {
    match err {
        TimeSeriesError::Query(msg) => TimeSeriesError::Connection(msg),
        other => other,
    }
}

fn influx_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// InfluxDB timestamps are int64 nanoseconds; the crawler never writes before the epoch
fn daily_statement(outer: &str, window: &DayWindow) -> String {
    let begin = window.begin.max(DateTime::<Utc>::UNIX_EPOCH);
    format!(
        "SELECT {outer} FROM (\
            SELECT staker_address, LAST(locked_stake) AS locked_stake \
            FROM {MEASUREMENT} \
            WHERE time >= '{begin}' AND time < '{end}' \
            GROUP BY staker_address, time(1d)\
         ) GROUP BY time(1d)",
        begin = influx_time(&begin),
        end = influx_time(&window.end),
    )
}

async fn decode_query_response(response: reqwest::Response) -> Result<QueryResponse> {
    let status = response.status();
    let body: QueryResponse = response
        .json()
        .await
        .map_err(|e| TimeSeriesError::Query(format!("{status}: {e}")))?;

    if let Some(error) = body.error {
        return Err(TimeSeriesError::Query(error));
    }
    Ok(body)
}

/// All rows of all series, failing on the first statement error
fn series_rows(response: QueryResponse) -> Result<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    for result in response.results {
        if let Some(error) = result.error {
            return Err(TimeSeriesError::Query(error));
        }
        for series in result.series {
            rows.extend(series.values);
        }
    }
    Ok(rows)
}

/// `[epoch_seconds, value]` rows to day/value pairs; null-valued days dropped
fn daily_values(rows: Vec<Vec<Value>>) -> Result<Vec<(NaiveDate, f64)>> {
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(time), Some(value)) = (row.first(), row.get(1)) else {
            return Err(TimeSeriesError::Query(format!("malformed row: {row:?}")));
        };
        let Some(value) = value.as_f64() else {
            continue;
        };
        let day = time
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| TimeSeriesError::Query(format!("bad timestamp: {time}")))?
            .date_naive();
        values.push((day, value));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = InfluxConfig::default();
        assert_eq!(config.base_url(), "http://localhost:8086");
        assert_eq!(config.database, "network");
        assert_eq!(config.retention_policy, "network_info_retention");
        assert_eq!(config.retention_duration, "5w");
    }

    #[test]
    fn test_daily_statement_window() {
        let now = Utc.with_ymd_and_hms(2023, 6, 10, 15, 0, 0).unwrap();
        let statement = daily_statement("SUM(locked_stake)", &day_window(7, &now));
        assert!(statement.starts_with("SELECT SUM(locked_stake) FROM (SELECT staker_address"));
        assert!(statement.contains("FROM crawler_node_info"));
        assert!(statement.contains("time >= '2023-06-04T00:00:00Z'"));
        assert!(statement.contains("time < '2023-06-11T00:00:00Z'"));
        assert!(statement.ends_with("GROUP BY time(1d)"));
    }

    #[test]
    fn test_daily_statement_clamps_begin_to_epoch() {
        let now = Utc.with_ymd_and_hms(2023, 6, 10, 15, 0, 0).unwrap();
        let statement = daily_statement("COUNT(locked_stake)", &day_window(u32::MAX, &now));
        assert!(statement.contains("time >= '1970-01-01T00:00:00Z'"));
        assert!(statement.contains("time < '2023-06-11T00:00:00Z'"));
    }

    #[test]
    fn test_daily_values_skip_nulls() {
        let response: QueryResponse = serde_json::from_value(json!({
            "results": [{
                "statement_id": 0,
                "series": [{
                    "name": "crawler_node_info",
                    "columns": ["time", "sum"],
                    "values": [
                        [1685836800, 100.5],
                        [1685923200, null],
                        [1686009600, 42]
                    ]
                }]
            }]
        }))
        .unwrap();

        let values = daily_values(series_rows(response).unwrap()).unwrap();
        assert_eq!(
            values,
            vec![
                (NaiveDate::from_ymd_opt(2023, 6, 4).unwrap(), 100.5),
                (NaiveDate::from_ymd_opt(2023, 6, 6).unwrap(), 42.0),
            ]
        );
    }

    #[test]
    fn test_statement_error_surfaces() {
        let response: QueryResponse = serde_json::from_value(json!({
            "results": [{"statement_id": 0, "error": "database not found: network"}]
        }))
        .unwrap();
        assert!(matches!(
            series_rows(response),
            Err(TimeSeriesError::Query(msg)) if msg.contains("database not found")
        ));
    }

    #[test]
    fn test_empty_result_has_no_rows() {
        let response: QueryResponse =
            serde_json::from_value(json!({"results": [{"statement_id": 0}]})).unwrap();
        assert!(series_rows(response).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_unreachable_is_connection_error() {
        // nothing listens on port 9 locally
        let config = InfluxConfig {
            host: "127.0.0.1".to_string(),
            port: 9,
            timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let result = InfluxConnector::new(config).connect().await;
        assert!(matches!(result, Err(TimeSeriesError::Connection(_))));
    }

    #[tokio::test]
    async fn test_closed_client_rejects_writes() {
        let client = InfluxClient::new(InfluxConfig::default()).unwrap();
        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(client.is_closed());

        let result = client.write_samples(&[]).await;
        assert!(matches!(result, Err(TimeSeriesError::WriteUnavailable(_))));
    }
}
