//! HTTP relay client: concurrent multi-relay publish and subscribe.

use crate::relay::{NoteFilter, NoteTransport, SurveyNote};
use crate::types::RemoteSurveyNote;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Upper bound on one background publish attempt, so a stalled relay cannot
/// pin its fan-out task past the cycle that spawned it.
const PUBLISH_TIMEOUT_SECS: u64 = 10;

/// Transport over a set of plain-HTTP relay endpoints.
pub struct HttpRelayClient {
    http_client: Client,
    relay_endpoints: Vec<String>,
}

impl HttpRelayClient {
    pub fn new(http_client: Client, relay_endpoints: Vec<String>) -> Self {
        Self {
            http_client,
            relay_endpoints,
        }
    }

    async fn publish_to_relay(http_client: &Client, endpoint: &str, note: &SurveyNote) -> Result<()> {
        http_client
            .post(format!("{}/notes", endpoint))
            .timeout(Duration::from_secs(PUBLISH_TIMEOUT_SECS))
            .json(note)
            .send()
            .await
            .with_context(|| format!("Publish to {} failed", endpoint))?
            .error_for_status()
            .with_context(|| format!("Relay {} rejected note", endpoint))?;
        Ok(())
    }

    /// One relay query under a single deadline covering the full exchange,
    /// connection through body decode; a relay that returns headers and then
    /// stalls the body still cannot outlive `timeout_ms`.
    async fn fetch_from_relay(
        &self,
        endpoint: &str,
        filter: &NoteFilter,
        limit: usize,
        timeout_ms: u64,
    ) -> Result<Vec<SurveyNote>> {
        let fetch = async {
            let response = self
                .http_client
                .get(format!("{}/notes", endpoint))
                .query(&[
                    ("kind", filter.kind.as_str()),
                    ("campaign", filter.campaign_tag.as_str()),
                    ("limit", &limit.to_string()),
                ])
                .send()
                .await
                .with_context(|| format!("Subscribe to {} failed", endpoint))?
                .error_for_status()
                .with_context(|| format!("Relay {} rejected subscribe", endpoint))?;

            response
                .json::<Vec<SurveyNote>>()
                .await
                .with_context(|| format!("Failed to parse notes from {}", endpoint))
        };

        tokio::time::timeout(Duration::from_millis(timeout_ms), fetch)
            .await
            .with_context(|| format!("Subscribe to {} timed out", endpoint))?
    }
}

#[async_trait]
impl NoteTransport for HttpRelayClient {
    /// Fire the note at every configured relay concurrently and return the
    /// local note id without waiting for acknowledgements; reach is counted
    /// in the background for logging only.
    #[instrument(skip(self, note), fields(note_id = %note.id))]
    async fn publish(&self, note: &SurveyNote) -> Result<String> {
        let note_id = note.id.clone();
        let note = note.clone();
        let http_client = self.http_client.clone();
        let endpoints = self.relay_endpoints.clone();

        tokio::spawn(async move {
            let attempts = endpoints.iter().map(|endpoint| {
                let http_client = &http_client;
                let note = &note;
                async move {
                    match Self::publish_to_relay(http_client, endpoint, note).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("Relay publish dropped: {:#}", e);
                            false
                        }
                    }
                }
            });
            let reached = join_all(attempts).await.into_iter().filter(|ok| *ok).count();
            debug!(
                "Note {} reached {}/{} relays",
                note.id,
                reached,
                endpoints.len()
            );
        });

        Ok(note_id)
    }

    /// Query every relay with an individual timeout, keep whatever arrived in
    /// time, drop envelopes that fail signature verification, and merge by
    /// note id.
    #[instrument(skip(self, filter))]
    async fn subscribe(
        &self,
        filter: &NoteFilter,
        limit: usize,
        timeout_ms: u64,
    ) -> Vec<RemoteSurveyNote> {
        let fetches = self
            .relay_endpoints
            .iter()
            .map(|endpoint| self.fetch_from_relay(endpoint, filter, limit, timeout_ms));

        let mut seen = HashSet::new();
        let mut notes: Vec<SurveyNote> = Vec::new();

        for outcome in join_all(fetches).await {
            match outcome {
                Ok(batch) => {
                    for note in batch {
                        if !note.verify() {
                            warn!("Discarding note {} with bad signature", note.id);
                            continue;
                        }
                        if seen.insert(note.id.clone()) {
                            notes.push(note);
                        }
                    }
                }
                // partial results are fine, a slow or dead relay only
                // shrinks the batch
                Err(e) => warn!("Relay subscribe degraded: {:#}", e),
            }
        }

        notes.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        notes.truncate(limit);

        debug!("Collected {} remote survey notes", notes.len());
        notes.into_iter().map(SurveyNote::into_remote).collect()
    }
}
