//! Core types and data structures for the poolscout survey system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A surveyor public key, lowercase hex encoded.
pub type SurveyorKey = String;

/// A block found by the pool, as reported by the upstream statistics API.
///
/// Immutable once fetched; identified by the block hash / height pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Upstream solver id
    pub solver_id: u64,
    /// Payout address of the solver that found the block
    pub solver_address: String,
    /// When the block was found
    pub time: DateTime<Utc>,
    /// Block height
    pub height: u64,
    /// Shares accepted in the round that produced this block
    pub accepted_shares: u64,
    /// Hash of the found block
    pub block_hash: String,
    /// Display name of the solver
    pub solver_name: String,
}

/// Pool-wide share window state at fetch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareWindow {
    /// When the window was observed
    pub as_of: DateTime<Utc>,
    /// Number of shares in the window
    pub size: u64,
}

impl ShareWindow {
    /// The degraded value substituted when the upstream call fails.
    pub fn empty() -> Self {
        Self {
            as_of: Utc::now(),
            size: 0,
        }
    }
}

/// One hashrate observation for a monitored address.
///
/// Values are TH/s after adapter normalization. Zero-valued upstream rows are
/// dropped before construction, so every retained sample has `value > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashRateSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// One complete snapshot of upstream pool data plus its derived discovery
/// score, tagged with the computing identity and time.
///
/// Created once per survey cycle; immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySurvey {
    /// The address being monitored
    pub address: String,
    /// Instant the score was computed
    pub timestamp: DateTime<Utc>,
    /// Recent blocks found by the pool
    pub blocks: Vec<BlockRecord>,
    /// Pool share window at fetch time
    pub share_window: ShareWindow,
    /// Normalized hashrate series for the address
    pub hash_rate_samples: Vec<HashRateSample>,
    /// Derived heuristic score, always >= 0
    pub discovery_score: f64,
    /// Public key of the surveyor that computed this survey
    pub surveyor_identity: SurveyorKey,
}

/// A survey as received from the network, before address/score recovery.
///
/// The address a remote note claims to describe is not guaranteed reliable;
/// the correlator recovers it from the structured tags when present, falling
/// back to scraping the free-text content. Discarded after one correlation
/// pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSurveyNote {
    /// Network-level note id
    pub note_id: String,
    /// Public key of the publishing surveyor
    pub surveyor_identity: SurveyorKey,
    /// Publish instant, taken from the note envelope
    pub published_at: DateTime<Utc>,
    /// Raw key/value tags carried by the note
    pub raw_tags: Vec<(String, String)>,
    /// Free-text note body
    pub content: String,
}

impl RemoteSurveyNote {
    /// First tag value for `key`, if any.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.raw_tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Kind of correlation a match result represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    /// Another survey claiming the identical monitored address
    SameAddress,
    /// A survey for a different address, compared for activity-level similarity
    CrossAddress,
    /// Synthetic aggregate across all cross-address matches
    NetworkTrend,
}

/// One ranked correlation outcome, produced fresh per correlation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// The remote note this result describes; `None` only for the synthetic
    /// NetworkTrend entry, which aggregates peers instead of quoting one.
    pub note: Option<RemoteSurveyNote>,
    /// Normalized correlation strength in [0, 1]
    pub match_score: f64,
    /// Whether the remote report is recent relative to the local survey
    pub is_recent: bool,
    pub match_type: MatchType,
    /// Human-readable delta description with numeric elapsed time and scores
    pub analysis: String,
}
