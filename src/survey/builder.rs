//! Survey builder: one fetch cycle turned into an immutable survey record.

use crate::survey::data_sources::PoolDataSources;
use crate::survey::scorer;
use crate::types::{DiscoverySurvey, SurveyorKey};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

/// Assembles a timestamped, identity-tagged survey from one concurrent pass
/// over the upstream endpoints.
pub struct SurveyBuilder {
    data_sources: Arc<PoolDataSources>,
    surveyor_identity: SurveyorKey,
}

impl SurveyBuilder {
    pub fn new(data_sources: Arc<PoolDataSources>, surveyor_identity: SurveyorKey) -> Self {
        Self {
            data_sources,
            surveyor_identity,
        }
    }

    /// Build a survey for `address`.
    ///
    /// The three upstream fetches run concurrently; each degrades
    /// independently on failure, so this never errors and a partially failed
    /// cycle just scores lower.
    #[instrument(skip(self), fields(address = %address))]
    pub async fn build_survey(&self, address: &str) -> DiscoverySurvey {
        let (blocks, share_window, hash_rate_samples) = tokio::join!(
            self.data_sources.fetch_blocks_found(),
            self.data_sources.fetch_share_window(),
            self.data_sources.fetch_hashrate_series(address),
        );

        let timestamp = Utc::now();
        let discovery_score =
            scorer::discovery_score_at(&blocks, &share_window, &hash_rate_samples, address, timestamp);

        info!(
            "Built survey for {}: score {:.2} ({} blocks, {} samples, window {})",
            address,
            discovery_score,
            blocks.len(),
            hash_rate_samples.len(),
            share_window.size
        );

        DiscoverySurvey {
            address: address.to_string(),
            timestamp,
            blocks,
            share_window,
            hash_rate_samples,
            discovery_score,
            surveyor_identity: self.surveyor_identity.clone(),
        }
    }
}
