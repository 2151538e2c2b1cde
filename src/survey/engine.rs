//! Survey cycle orchestrator.
//!
//! Drives the periodic pipeline: build a survey from upstream pool data,
//! publish it as a signed note, pull down other participants' notes, and hand
//! the correlated results to the consumer over a channel. The identity
//! keypair is set up once before the first cycle; beyond that, cycles are
//! independent and each is a pure pass over freshly fetched data.

use crate::relay::{NoteFilter, NoteTransport, SurveyNote, SurveyorIdentity};
use crate::survey::builder::SurveyBuilder;
use crate::survey::correlator;
use crate::survey::data_sources::PoolDataSources;
use crate::survey::types::SurveyConfig;
use crate::types::MatchResult;
use anyhow::{anyhow, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

/// Periodic survey engine wiring builder, transport and correlator together.
pub struct SurveyEngine {
    config: SurveyConfig,
    builder: SurveyBuilder,
    transport: Arc<dyn NoteTransport>,
    identity: Arc<SurveyorIdentity>,
    match_sender: mpsc::Sender<Vec<MatchResult>>,
}

impl SurveyEngine {
    /// Create an engine with a fresh session identity.
    pub fn new(
        config: SurveyConfig,
        transport: Arc<dyn NoteTransport>,
        match_sender: mpsc::Sender<Vec<MatchResult>>,
    ) -> Result<Self> {
        if config.address.is_empty() {
            return Err(anyhow!("A monitored address is required"));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_seconds))
            .build()?;

        let identity = Arc::new(SurveyorIdentity::generate());
        let data_sources = Arc::new(PoolDataSources::new(http_client, config.clone()));
        let builder = SurveyBuilder::new(data_sources, identity.public_key_hex());

        info!(
            "Survey engine ready for {} as surveyor {}",
            config.address,
            identity.public_key_hex()
        );

        Ok(Self {
            config,
            builder,
            transport,
            identity,
            match_sender,
        })
    }

    /// The session identity public key, hex.
    pub fn surveyor_identity(&self) -> String {
        self.identity.public_key_hex()
    }

    /// Run survey cycles on the configured interval until the consumer side
    /// of the match channel goes away.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.survey_interval_seconds));

        loop {
            interval.tick().await;
            match self.run_cycle().await {
                Ok(sent) => {
                    if !sent {
                        info!("Match consumer dropped, stopping survey loop");
                        break;
                    }
                }
                Err(e) => warn!("Survey cycle failed: {:#}", e),
            }
        }
    }

    /// One full cycle. Returns whether the results could still be delivered.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<bool> {
        let survey = self.builder.build_survey(&self.config.address).await;

        let note = SurveyNote::from_survey(&survey, &self.config.campaign_tag, &self.identity)?;
        match self.transport.publish(&note).await {
            Ok(note_id) => info!("Published survey note {}", note_id),
            // publish failure degrades the cycle, retrieval still runs
            Err(e) => warn!("Survey note publish failed: {:#}", e),
        }

        let filter = NoteFilter::survey_notes(&self.config.campaign_tag);
        let mut remote_notes = self
            .transport
            .subscribe(&filter, self.config.subscribe_limit, self.config.subscribe_timeout_ms)
            .await;
        // our own note coming back from a relay is not a peer report
        let own_identity = self.identity.public_key_hex();
        remote_notes.retain(|note| note.surveyor_identity != own_identity);

        let results = correlator::correlate(&survey, &remote_notes);
        info!(
            "Correlated {} remote notes into {} matches for {}",
            remote_notes.len(),
            results.len(),
            survey.address
        );

        Ok(self.match_sender.send(results).await.is_ok())
    }
}
