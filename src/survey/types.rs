//! Configuration types for the survey engine.

use serde::{Deserialize, Serialize};

/// Rate unit convention of the upstream hashrate endpoint.
///
/// Deployments differ: some report raw H/s, some already report TH/s. The
/// adapter normalizes to TH/s either way; the scorer never sees raw units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashRateUnit {
    /// Upstream reports raw hashes per second; divide by 1e12
    RawHashes,
    /// Upstream already reports TH/s; pass through
    TeraHashes,
}

impl HashRateUnit {
    /// Convert an upstream rate value to TH/s.
    pub fn to_terahashes(self, raw: f64) -> f64 {
        match self {
            HashRateUnit::RawHashes => raw / 1e12,
            HashRateUnit::TeraHashes => raw,
        }
    }
}

/// Survey engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    /// Base URL of the mining pool statistics API
    pub pool_base_url: String,
    /// Relay endpoints notes are published to and fetched from
    pub relay_endpoints: Vec<String>,
    /// The address whose mining activity is being surveyed
    pub address: String,
    /// Campaign tag attached to published notes and used as subscribe filter
    pub campaign_tag: String,
    /// Upstream hashrate unit convention
    pub hashrate_unit: HashRateUnit,
    /// Retry attempts per upstream fetch before degrading
    pub fetch_retry_attempts: usize,
    /// Per-request HTTP timeout in seconds
    pub fetch_timeout_seconds: u64,
    /// Maximum remote notes collected per subscribe call
    pub subscribe_limit: usize,
    /// Subscribe timeout in milliseconds; partial results are kept
    pub subscribe_timeout_ms: u64,
    /// Interval between survey cycles in seconds
    pub survey_interval_seconds: u64,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            pool_base_url: "http://localhost:4000".to_string(),
            relay_endpoints: vec!["http://localhost:7777".to_string()],
            address: String::new(),
            campaign_tag: "poolscout".to_string(),
            hashrate_unit: HashRateUnit::TeraHashes,
            fetch_retry_attempts: 3,
            fetch_timeout_seconds: 10,
            subscribe_limit: 50,
            subscribe_timeout_ms: 5_000,
            survey_interval_seconds: 300,
        }
    }
}
