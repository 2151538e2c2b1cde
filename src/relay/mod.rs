//! Social-network note transport.
//!
//! Survey summaries travel as signed notes published to a set of relays and
//! fetched back by campaign tag. The transport is a thin collaborator: the
//! survey engine hands it finished notes and gets raw remote notes back; all
//! interpretation happens in the correlator.

pub mod client;
pub mod identity;

pub use client::HttpRelayClient;
pub use identity::SurveyorIdentity;

use crate::survey::correlator::{TAG_ADDRESS, TAG_SCORE};
use crate::types::{DiscoverySurvey, RemoteSurveyNote};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Note kind published and subscribed to by the survey engine.
pub const SURVEY_NOTE_KIND: &str = "surveyNote";
/// Tag key carrying the campaign tag notes are filtered by.
pub const TAG_CAMPAIGN: &str = "campaign";

/// Signed wire envelope of one published survey summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyNote {
    /// blake3 hash of the signable form, lowercase hex
    pub id: String,
    /// Publishing surveyor public key, lowercase hex
    pub surveyor_identity: String,
    pub published_at: DateTime<Utc>,
    pub kind: String,
    /// Key/value tags; carries at least the address and score tags
    pub tags: Vec<(String, String)>,
    /// Free-text body
    pub content: String,
    /// Detached ed25519 signature over the signable form, hex
    pub signature: String,
}

impl SurveyNote {
    /// Build and sign a note for a finished survey.
    pub fn from_survey(
        survey: &DiscoverySurvey,
        campaign_tag: &str,
        identity: &SurveyorIdentity,
    ) -> Result<SurveyNote> {
        let tags = vec![
            (TAG_ADDRESS.to_string(), survey.address.clone()),
            (TAG_SCORE.to_string(), format!("{:.2}", survey.discovery_score)),
            (TAG_CAMPAIGN.to_string(), campaign_tag.to_string()),
        ];
        // The body repeats the address label and trailing hashtag so peers
        // that only see free text can still recover a grouping key.
        let content = format!(
            "Discovery survey for address: {} score: {:.2} ({} blocks, {} hashrate samples) #{}",
            survey.address,
            survey.discovery_score,
            survey.blocks.len(),
            survey.hash_rate_samples.len(),
            survey.address
        );

        let surveyor_identity = identity.public_key_hex();
        let signable = signable_form(
            &surveyor_identity,
            survey.timestamp,
            SURVEY_NOTE_KIND,
            &tags,
            &content,
        )?;

        Ok(SurveyNote {
            id: hex::encode(blake3::hash(&signable).as_bytes()),
            surveyor_identity,
            published_at: survey.timestamp,
            kind: SURVEY_NOTE_KIND.to_string(),
            tags,
            content,
            signature: identity.sign_hex(&signable),
        })
    }

    /// The byte form the id and signature are computed over.
    pub fn signable(&self) -> Result<Vec<u8>> {
        signable_form(
            &self.surveyor_identity,
            self.published_at,
            &self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// Check the envelope signature against its claimed identity.
    pub fn verify(&self) -> bool {
        self.signable()
            .map(|payload| identity::verify_hex(&self.surveyor_identity, &payload, &self.signature))
            .unwrap_or(false)
    }

    /// Strip the envelope down to the record the correlator consumes.
    pub fn into_remote(self) -> RemoteSurveyNote {
        RemoteSurveyNote {
            note_id: self.id,
            surveyor_identity: self.surveyor_identity,
            published_at: self.published_at,
            raw_tags: self.tags,
            content: self.content,
        }
    }
}

fn signable_form(
    surveyor_identity: &str,
    published_at: DateTime<Utc>,
    kind: &str,
    tags: &[(String, String)],
    content: &str,
) -> Result<Vec<u8>> {
    serde_json::to_vec(&(
        surveyor_identity,
        published_at.timestamp(),
        kind,
        tags,
        content,
    ))
    .context("Failed to serialize signable note form")
}

/// Subscribe filter: note kind plus campaign tag.
#[derive(Debug, Clone)]
pub struct NoteFilter {
    pub kind: String,
    pub campaign_tag: String,
}

impl NoteFilter {
    pub fn survey_notes(campaign_tag: &str) -> Self {
        Self {
            kind: SURVEY_NOTE_KIND.to_string(),
            campaign_tag: campaign_tag.to_string(),
        }
    }
}

/// Publish/retrieve seam between the survey engine and the relay network.
#[async_trait]
pub trait NoteTransport: Send + Sync {
    /// Fan the note out to the configured relays and return the local note id.
    /// Publish acknowledgements are best-effort; callers do not wait on them.
    async fn publish(&self, note: &SurveyNote) -> Result<String>;

    /// Collect matching remote notes until the result set closes or the
    /// timeout elapses; partial results are returned, sorted by publish time
    /// descending.
    async fn subscribe(
        &self,
        filter: &NoteFilter,
        limit: usize,
        timeout_ms: u64,
    ) -> Vec<RemoteSurveyNote>;
}
