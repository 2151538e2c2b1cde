//! poolscout - mining-pool survey correlation system
//!
//! Polls a mining-pool statistics API, derives a heuristic discovery score
//! for a monitored address, publishes the summary as a signed network note,
//! and correlates other participants' published summaries against the local
//! one.

pub mod relay;
pub mod survey;
pub mod types;

// Re-export main types for convenience
pub use types::{DiscoverySurvey, MatchResult, MatchType, RemoteSurveyNote};
