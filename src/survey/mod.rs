//! Survey module: data source adapter, score calculator, survey builder,
//! correlator and the periodic engine that wires them together.

pub mod builder;
pub mod correlator;
pub mod data_sources;
pub mod engine;
pub mod scorer;
pub mod types;

pub use builder::SurveyBuilder;
pub use correlator::correlate;
pub use data_sources::PoolDataSources;
pub use engine::SurveyEngine;
pub use scorer::{discovery_score, discovery_score_at};
pub use types::{HashRateUnit, SurveyConfig};

/// Configuration builder with sensible defaults.
pub struct SurveyConfigBuilder {
    config: SurveyConfig,
}

impl SurveyConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SurveyConfig::default(),
        }
    }

    /// Set the mining pool API base URL.
    pub fn with_pool_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.pool_base_url = url.into();
        self
    }

    /// Set the relay endpoints.
    pub fn with_relay_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.config.relay_endpoints = endpoints;
        self
    }

    /// Set the monitored address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    /// Set the campaign tag notes are published under.
    pub fn with_campaign_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.campaign_tag = tag.into();
        self
    }

    /// Set the upstream hashrate unit convention.
    pub fn with_hashrate_unit(mut self, unit: HashRateUnit) -> Self {
        self.config.hashrate_unit = unit;
        self
    }

    /// Set upstream fetch retry attempts.
    pub fn with_fetch_retries(mut self, attempts: usize) -> Self {
        self.config.fetch_retry_attempts = attempts;
        self
    }

    /// Set the subscribe limit and timeout.
    pub fn with_subscribe(mut self, limit: usize, timeout_ms: u64) -> Self {
        self.config.subscribe_limit = limit;
        self.config.subscribe_timeout_ms = timeout_ms;
        self
    }

    /// Set the survey cycle interval in seconds.
    pub fn with_interval_seconds(mut self, seconds: u64) -> Self {
        self.config.survey_interval_seconds = seconds;
        self
    }

    pub fn build(self) -> SurveyConfig {
        self.config
    }
}

impl Default for SurveyConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
