//! Data source adapter for the upstream mining-pool statistics API.
//!
//! Fetches the three upstream resources (blocks found, share window, per
//! address hashrate CSV) and normalizes them into typed records. Transport
//! and parse failures stop here: every public fetch degrades to an empty or
//! default value instead of surfacing an error, so the calculator and the
//! correlator never see a failure.

use crate::survey::scorer::retain_positive;
use crate::survey::types::SurveyConfig;
use crate::types::{BlockRecord, HashRateSample, ShareWindow};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, instrument, warn};

/// Wire shape of one row of `GET /blocksfound`.
#[derive(Debug, Deserialize)]
struct BlockFoundRow {
    #[serde(rename = "solverId")]
    solver_id: u64,
    #[serde(rename = "solverAddress")]
    solver_address: String,
    /// Unix seconds
    time: i64,
    height: u64,
    #[serde(rename = "acceptedShares")]
    accepted_shares: u64,
    #[serde(rename = "blockHash")]
    block_hash: String,
    #[serde(rename = "solverName")]
    solver_name: String,
}

/// Wire shape of `GET /sharewindow`.
#[derive(Debug, Deserialize)]
struct ShareWindowBody {
    /// Unix seconds
    date: i64,
    size: u64,
}

/// Adapter over the pool statistics endpoints.
pub struct PoolDataSources {
    http_client: Client,
    config: SurveyConfig,
}

impl PoolDataSources {
    pub fn new(http_client: Client, config: SurveyConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Fetch the recent blocks-found list; empty on any transport/parse error.
    #[instrument(skip(self))]
    pub async fn fetch_blocks_found(&self) -> Vec<BlockRecord> {
        match self
            .with_retries(|| self.try_fetch_blocks_found())
            .await
        {
            Ok(blocks) => {
                debug!("Fetched {} found blocks", blocks.len());
                blocks
            }
            Err(e) => {
                warn!("Blocks-found fetch degraded to empty: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Fetch the pool share window; `{now, 0}` on error.
    #[instrument(skip(self))]
    pub async fn fetch_share_window(&self) -> ShareWindow {
        match self
            .with_retries(|| self.try_fetch_share_window())
            .await
        {
            Ok(window) => {
                debug!("Fetched share window of {} shares", window.size);
                window
            }
            Err(e) => {
                warn!("Share-window fetch degraded to default: {:#}", e);
                ShareWindow::empty()
            }
        }
    }

    /// Fetch and normalize the hashrate series for an address; empty on
    /// transport error. Malformed and non-positive rows are dropped per-row,
    /// surrounding rows still parse.
    #[instrument(skip(self), fields(address = %address))]
    pub async fn fetch_hashrate_series(&self, address: &str) -> Vec<HashRateSample> {
        match self
            .with_retries(|| self.try_fetch_hashrate_csv(address))
            .await
        {
            Ok(body) => {
                let samples = parse_hashrate_csv(&body, &self.config);
                debug!("Parsed {} hashrate samples for {}", samples.len(), address);
                samples
            }
            Err(e) => {
                warn!("Hashrate fetch degraded to empty for {}: {:#}", address, e);
                Vec::new()
            }
        }
    }

    async fn with_retries<T, F, Fut>(&self, fetch: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let retry_strategy = ExponentialBackoff::from_millis(100)
            .max_delay(Duration::from_secs(5))
            .take(self.config.fetch_retry_attempts);

        Retry::spawn(retry_strategy, fetch).await
    }

    async fn try_fetch_blocks_found(&self) -> Result<Vec<BlockRecord>> {
        let url = format!("{}/blocksfound", self.config.pool_base_url);
        let rows: Vec<BlockFoundRow> = self
            .get(&url)
            .await?
            .json()
            .await
            .context("Failed to parse blocks-found response")?;

        Ok(rows.into_iter().filter_map(block_from_row).collect())
    }

    async fn try_fetch_share_window(&self) -> Result<ShareWindow> {
        let url = format!("{}/sharewindow", self.config.pool_base_url);
        let body: ShareWindowBody = self
            .get(&url)
            .await?
            .json()
            .await
            .context("Failed to parse share-window response")?;

        Ok(ShareWindow {
            as_of: DateTime::from_timestamp(body.date, 0).unwrap_or_else(Utc::now),
            size: body.size,
        })
    }

    async fn try_fetch_hashrate_csv(&self, address: &str) -> Result<String> {
        let url = format!("{}/hashrates/worker/{}", self.config.pool_base_url, address);
        self.get(&url)
            .await?
            .text()
            .await
            .context("Failed to read hashrate CSV body")
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .get(url)
            .timeout(Duration::from_secs(self.config.fetch_timeout_seconds))
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        if !response.status().is_success() {
            return Err(anyhow!("Request to {} returned {}", url, response.status()));
        }
        Ok(response)
    }
}

fn block_from_row(row: BlockFoundRow) -> Option<BlockRecord> {
    let time = DateTime::from_timestamp(row.time, 0)?;
    Some(BlockRecord {
        solver_id: row.solver_id,
        solver_address: row.solver_address,
        time,
        height: row.height,
        accepted_shares: row.accepted_shares,
        block_hash: row.block_hash,
        solver_name: row.solver_name,
    })
}

/// Parse the upstream hashrate CSV: `timestamp,workerLabel,rateValue` rows.
///
/// Rows with unparseable fields are dropped individually; retained values are
/// normalized to TH/s and filtered to the positive-value invariant.
fn parse_hashrate_csv(body: &str, config: &SurveyConfig) -> Vec<HashRateSample> {
    let mut samples = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split(',');
        let (Some(ts_raw), Some(_label), Some(rate_raw)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };

        let Ok(ts) = ts_raw.trim().parse::<i64>() else {
            // also skips a header row, if the deployment sends one
            continue;
        };
        let Ok(rate) = rate_raw.trim().parse::<f64>() else {
            continue;
        };
        let Some(timestamp) = DateTime::from_timestamp(ts, 0) else {
            continue;
        };

        samples.push(HashRateSample {
            timestamp,
            value: config.hashrate_unit.to_terahashes(rate),
        });
    }

    retain_positive(samples)
}
