//! Survey correlator.
//!
//! Matches a batch of independently published remote surveys against the
//! local one: recovers the address each note claims to describe, groups by
//! address, scores same-address and cross-address agreement, and synthesizes
//! a network-trend summary when enough peers are present. Pure data in,
//! ranked data out; no transport handle ever reaches this module.

use crate::types::{DiscoverySurvey, MatchResult, MatchType, RemoteSurveyNote};
use chrono::Duration;
use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Tag key carrying the monitored address verbatim.
pub const TAG_ADDRESS: &str = "address";
/// Tag key carrying the published discovery score.
pub const TAG_SCORE: &str = "score";

/// Same-address reports older than this are no longer "recent".
const SAME_ADDRESS_RECENT_MINUTES: i64 = 30;
/// Cross-address groups older than this are skipped entirely.
const CROSS_ADDRESS_RECENT_MINUTES: i64 = 60;

/// Co-temporal base credit, always awarded to a recent cross-address peer.
const CROSS_COTEMPORAL_POINTS: f64 = 30.0;
/// Maximum credit from score similarity.
const CROSS_SIMILARITY_POINTS: f64 = 40.0;
/// Flat pool-state consistency credit. No actual pool-state comparison is
/// performed; the weight is kept as-is for compatibility with historically
/// published match scores.
const CROSS_POOL_STATE_POINTS: f64 = 20.0;
/// Maximum attainable cross-address total, used for normalization.
const CROSS_MAX_POINTS: f64 = 90.0;
/// Normalized cross-address score cutoff.
const CROSS_MIN_NORMALIZED: f64 = 0.3;

lazy_static! {
    /// Labeled address in free text, e.g. "address: bc1qfoo...".
    static ref ADDRESS_LABEL_RE: Regex =
        Regex::new(r"(?i)address[:=\s]+([0-9a-zA-Z]{10,90})").expect("address pattern compiles");
    /// Trailing hashtag fragment, the truncated best-effort grouping key.
    static ref ADDRESS_FRAGMENT_RE: Regex =
        Regex::new(r"#([0-9a-zA-Z]{6,90})\s*$").expect("fragment pattern compiles");
    /// Labeled score in free text, e.g. "score: 42.5".
    static ref SCORE_LABEL_RE: Regex =
        Regex::new(r"(?i)score[:=\s]+([0-9]+(?:\.[0-9]+)?)").expect("score pattern compiles");
}

/// Correlate the local survey against a batch of remote notes.
///
/// Total: malformed or unattributable notes are dropped and their siblings
/// still processed. Result ordering is a contract surface: the synthetic
/// NetworkTrend entry (if any) first, then all SameAddress entries, then
/// CrossAddress entries by descending match score.
pub fn correlate(my_survey: &DiscoverySurvey, remote_notes: &[RemoteSurveyNote]) -> Vec<MatchResult> {
    let mut same_address: Vec<(&RemoteSurveyNote, f64)> = Vec::new();
    let mut cross_groups: HashMap<String, Vec<(&RemoteSurveyNote, f64)>> = HashMap::new();

    for note in remote_notes {
        let Some(address) = recover_address(note) else {
            debug!("Dropping note {}: no recoverable address", note.note_id);
            continue;
        };
        let Some(score) = recover_score(note) else {
            debug!("Dropping note {}: no recoverable score", note.note_id);
            continue;
        };

        if address == my_survey.address {
            same_address.push((note, score));
        } else {
            cross_groups.entry(address).or_default().push((note, score));
        }
    }

    let same_results: Vec<MatchResult> = same_address
        .iter()
        .map(|(note, score)| analyze_same_address(my_survey, note, *score))
        .collect();

    let mut cross_scored: Vec<(f64, MatchResult)> = Vec::new();
    for (_, group) in cross_groups {
        // Only the most recently published note per foreign address counts.
        let Some((note, score)) = group
            .into_iter()
            .max_by_key(|(note, _)| note.published_at)
        else {
            continue;
        };
        if let Some(result) = analyze_cross_address(my_survey, note, score) {
            cross_scored.push((score, result));
        }
    }
    cross_scored.sort_by(|(_, a), (_, b)| {
        b.match_score
            .partial_cmp(&a.match_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| cross_published_at(b).cmp(&cross_published_at(a)))
    });

    let mut results = Vec::with_capacity(1 + same_results.len() + cross_scored.len());
    if cross_scored.len() >= 2 {
        results.push(network_trend(my_survey, &cross_scored));
    }
    results.extend(same_results);
    results.extend(cross_scored.into_iter().map(|(_, result)| result));
    results
}

/// Recover the address a note claims to monitor.
///
/// Structured tag first; then a labeled address in the body; then a trailing
/// hashtag fragment as best-effort grouping key. This stays a loose heuristic
/// on purpose: the wire format is loosely structured and a stricter parser
/// would drop notes the network actually carries.
fn recover_address(note: &RemoteSurveyNote) -> Option<String> {
    if let Some(tag) = note.tag(TAG_ADDRESS) {
        if !tag.is_empty() {
            return Some(tag.to_string());
        }
    }

    if let Some(caps) = ADDRESS_LABEL_RE.captures(&note.content) {
        return Some(caps[1].to_string());
    }

    ADDRESS_FRAGMENT_RE
        .captures(&note.content)
        .map(|caps| caps[1].to_string())
}

/// Recover the discovery score a note published.
///
/// Structured tag first, then a labeled number in the body. Unrecoverable or
/// non-finite scores exclude the note.
fn recover_score(note: &RemoteSurveyNote) -> Option<f64> {
    note.tag(TAG_SCORE)
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|score| valid_score(*score))
        .or_else(|| {
            SCORE_LABEL_RE
                .captures(&note.content)
                .and_then(|caps| caps[1].parse::<f64>().ok())
                .filter(|score| valid_score(*score))
        })
}

fn valid_score(score: f64) -> bool {
    score.is_finite() && score >= 0.0
}

/// Tiered delta description for a report about the identical address.
///
/// Identical address is by definition a perfect correlation target, so the
/// match score is fixed at 1.0 and the tiers only shape the analysis text.
fn analyze_same_address(
    my_survey: &DiscoverySurvey,
    note: &RemoteSurveyNote,
    other_score: f64,
) -> MatchResult {
    let time_diff = (my_survey.timestamp - note.published_at).abs();
    let minutes = time_diff.num_seconds() as f64 / 60.0;
    let my_score = my_survey.discovery_score;
    let score_diff = my_score - other_score;

    let analysis = if time_diff < Duration::minutes(5) {
        let deviation = score_diff.abs() / my_score.max(other_score).max(1.0);
        if deviation < 0.1 {
            format!(
                "Real-time corroboration {:.1} minutes apart: score holding steady, {:.2} here vs {:.2} reported",
                minutes, my_score, other_score
            )
        } else {
            format!(
                "Real-time divergence {:.1} minutes apart: {:.2} here vs {:.2} reported ({:.0}% deviation)",
                minutes,
                my_score,
                other_score,
                deviation * 100.0
            )
        }
    } else if time_diff < Duration::minutes(30) {
        let trend = if score_diff > 5.0 {
            "ramping up"
        } else if score_diff < -5.0 {
            "slowing down"
        } else {
            "steady"
        };
        format!(
            "Short-term delta over {:.1} minutes: {} ({:.2} then, {:.2} now)",
            minutes, trend, other_score, my_score
        )
    } else if time_diff < Duration::hours(2) {
        let direction = if score_diff >= 0.0 { "up" } else { "down" };
        format!(
            "Hour-scale delta over {:.1} minutes: score moved {} by {:.2} ({:.2} then, {:.2} now)",
            minutes,
            direction,
            score_diff.abs(),
            other_score,
            my_score
        )
    } else {
        format!(
            "Historical report from {:.1} hours ago: scored {:.2} then, {:.2} now",
            minutes / 60.0,
            other_score,
            my_score
        )
    };

    MatchResult {
        note: Some(note.clone()),
        match_score: 1.0,
        is_recent: time_diff < Duration::minutes(SAME_ADDRESS_RECENT_MINUTES),
        match_type: MatchType::SameAddress,
        analysis,
    }
}

/// Weighted similarity for the freshest report about a different address.
///
/// Returns `None` when the report is too old or the normalized score does not
/// clear the inclusion cutoff.
fn analyze_cross_address(
    my_survey: &DiscoverySurvey,
    note: &RemoteSurveyNote,
    other_score: f64,
) -> Option<MatchResult> {
    let time_diff = (my_survey.timestamp - note.published_at).abs();
    if time_diff >= Duration::minutes(CROSS_ADDRESS_RECENT_MINUTES) {
        return None;
    }

    let minutes = time_diff.num_seconds() as f64 / 60.0;
    let my_score = my_survey.discovery_score;

    let mut total = CROSS_COTEMPORAL_POINTS;
    if my_score > 0.0 && other_score > 0.0 {
        let similarity = 1.0 - (my_score - other_score).abs() / my_score.max(other_score);
        total += CROSS_SIMILARITY_POINTS * similarity;
    }
    total += CROSS_POOL_STATE_POINTS;

    let normalized = total / CROSS_MAX_POINTS;
    if normalized <= CROSS_MIN_NORMALIZED {
        return None;
    }

    let standing = if other_score > my_score * 1.5 {
        "outperforming my address"
    } else if other_score < my_score * 0.7 {
        "underperforming my address"
    } else {
        "comparable to my address"
    };
    let analysis = format!(
        "Cross-address peer published {:.1} minutes apart: {} ({:.2} vs my {:.2})",
        minutes, standing, other_score, my_score
    );

    Some(MatchResult {
        note: Some(note.clone()),
        match_score: normalized,
        is_recent: true,
        match_type: MatchType::CrossAddress,
        analysis,
    })
}

/// Aggregate summary across all cross-address matches.
fn network_trend(my_survey: &DiscoverySurvey, cross_scored: &[(f64, MatchResult)]) -> MatchResult {
    let n = cross_scored.len();
    let my_score = my_survey.discovery_score;
    let peer_mean = cross_scored.iter().map(|(score, _)| score).sum::<f64>() / n as f64;

    let below = cross_scored
        .iter()
        .filter(|(score, _)| *score < my_score)
        .count();
    let above = cross_scored
        .iter()
        .filter(|(score, _)| *score > my_score)
        .count();
    let rank = above + 1;
    let percentile = below as f64 / n as f64 * 100.0;

    let standing = if my_score > peer_mean * 1.2 {
        "above the network average"
    } else if my_score < peer_mean * 0.8 {
        "below the network average"
    } else {
        "in line with the network average"
    };

    let match_score =
        cross_scored.iter().map(|(_, r)| r.match_score).sum::<f64>() / n as f64;

    MatchResult {
        note: None,
        match_score,
        is_recent: true,
        match_type: MatchType::NetworkTrend,
        analysis: format!(
            "Network trend across {} peers: rank #{} at the {:.0}th percentile, my score {:.2} vs peer mean {:.2}, {}",
            n, rank, percentile, my_score, peer_mean, standing
        ),
    }
}

fn cross_published_at(result: &MatchResult) -> chrono::DateTime<chrono::Utc> {
    result
        .note
        .as_ref()
        .map(|note| note.published_at)
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ShareWindow;
    use chrono::{DateTime, TimeZone, Utc};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn survey(address: &str, score: f64) -> DiscoverySurvey {
        DiscoverySurvey {
            address: address.to_string(),
            timestamp: fixed_now(),
            blocks: vec![],
            share_window: ShareWindow {
                as_of: fixed_now(),
                size: 0,
            },
            hash_rate_samples: vec![],
            discovery_score: score,
            surveyor_identity: "me".to_string(),
        }
    }

    fn tagged_note(id: &str, address: &str, score: f64, minutes_ago: i64) -> RemoteSurveyNote {
        RemoteSurveyNote {
            note_id: id.to_string(),
            surveyor_identity: format!("peer-{}", id),
            published_at: fixed_now() - Duration::minutes(minutes_ago),
            raw_tags: vec![
                (TAG_ADDRESS.to_string(), address.to_string()),
                (TAG_SCORE.to_string(), format!("{}", score)),
            ],
            content: String::new(),
        }
    }

    #[test]
    fn test_empty_batch_yields_empty_output() {
        let results = correlate(&survey("A", 40.0), &[]);
        assert!(results.is_empty());
    }

    #[test]
    fn test_all_same_address_batch() {
        let my = survey("A", 40.0);
        let notes = vec![
            tagged_note("n1", "A", 38.0, 2),
            tagged_note("n2", "A", 55.0, 20),
            tagged_note("n3", "A", 10.0, 200),
        ];

        let results = correlate(&my, &notes);

        assert_eq!(results.len(), 3);
        for result in &results {
            assert_eq!(result.match_type, MatchType::SameAddress);
            assert_eq!(result.match_score, 1.0);
        }
        // Recency flag follows the 30-minute bound
        assert!(results[0].is_recent);
        assert!(results[1].is_recent);
        assert!(!results[2].is_recent);
    }

    #[test]
    fn test_same_address_tier_messages() {
        let my = survey("A", 40.0);

        let realtime = correlate(&my, &[tagged_note("n1", "A", 39.0, 2)]);
        assert!(realtime[0].analysis.contains("Real-time"));
        assert!(realtime[0].analysis.contains("40.00"));
        assert!(realtime[0].analysis.contains("39.00"));

        let ramping = correlate(&my, &[tagged_note("n2", "A", 30.0, 15)]);
        assert!(ramping[0].analysis.contains("ramping up"));

        let slowing = correlate(&my, &[tagged_note("n3", "A", 50.0, 15)]);
        assert!(slowing[0].analysis.contains("slowing down"));

        let hourly = correlate(&my, &[tagged_note("n4", "A", 30.0, 90)]);
        assert!(hourly[0].analysis.contains("Hour-scale"));
        assert!(hourly[0].analysis.contains("up"));

        let historical = correlate(&my, &[tagged_note("n5", "A", 30.0, 300)]);
        assert!(historical[0].analysis.contains("Historical"));
        assert!(historical[0].analysis.contains("5.0 hours"));
    }

    #[test]
    fn test_real_time_divergence_threshold() {
        let my = survey("A", 100.0);
        // deviation 0.5 against the 0.1 threshold
        let results = correlate(&my, &[tagged_note("n1", "A", 50.0, 1)]);
        assert!(results[0].analysis.contains("divergence"));
    }

    #[test]
    fn test_cross_address_equal_nonzero_scores_match_fully() {
        let my = survey("A", 42.5);
        let results = correlate(&my, &[tagged_note("n1", "B", 42.5, 10)]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::CrossAddress);
        // (30 + 40 + 20) / 90
        assert_eq!(results[0].match_score, 1.0);
        assert!(results[0].is_recent);
    }

    #[test]
    fn test_cross_address_zero_score_skips_similarity_term() {
        let my = survey("A", 0.0);
        let results = correlate(&my, &[tagged_note("n1", "B", 42.5, 10)]);

        assert_eq!(results.len(), 1);
        let expected = (30.0 + 20.0) / 90.0;
        assert!((results[0].match_score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_cross_address_stale_group_skipped() {
        let my = survey("A", 40.0);
        let results = correlate(&my, &[tagged_note("n1", "B", 40.0, 90)]);
        assert!(results.is_empty());
    }

    #[test]
    fn test_cross_address_uses_freshest_note_per_group() {
        let my = survey("A", 40.0);
        let notes = vec![
            tagged_note("old", "B", 5.0, 50),
            tagged_note("fresh", "B", 40.0, 5),
        ];

        let results = correlate(&my, &notes);

        assert_eq!(results.len(), 1);
        let note = results[0].note.as_ref().unwrap();
        assert_eq!(note.note_id, "fresh");
        assert_eq!(results[0].match_score, 1.0);
    }

    #[test]
    fn test_ordering_contract() {
        let my = survey("A", 40.0);
        let notes = vec![
            // two cross-address groups with different similarity
            tagged_note("c-weak", "C", 400.0, 10),
            tagged_note("c-strong", "B", 40.0, 10),
            // two same-address reports
            tagged_note("s1", "A", 39.0, 2),
            tagged_note("s2", "A", 20.0, 20),
        ];

        let results = correlate(&my, &notes);

        assert_eq!(results.len(), 5);
        assert_eq!(results[0].match_type, MatchType::NetworkTrend);
        assert_eq!(results[1].match_type, MatchType::SameAddress);
        assert_eq!(results[2].match_type, MatchType::SameAddress);
        assert_eq!(results[3].match_type, MatchType::CrossAddress);
        assert_eq!(results[4].match_type, MatchType::CrossAddress);
        // cross entries in descending match score
        assert!(results[3].match_score >= results[4].match_score);
        assert_eq!(results[3].note.as_ref().unwrap().note_id, "c-strong");
    }

    #[test]
    fn test_network_trend_synthesis() {
        let my = survey("A", 40.0);
        let notes = vec![
            tagged_note("b", "B", 30.0, 10),
            tagged_note("c", "C", 50.0, 10),
        ];

        let results = correlate(&my, &notes);

        assert_eq!(results.len(), 3);
        let trend = &results[0];
        assert_eq!(trend.match_type, MatchType::NetworkTrend);
        assert!(trend.note.is_none());
        // peer mean 40.0, one peer below, rank #2
        assert!(trend.analysis.contains("2 peers"));
        assert!(trend.analysis.contains("rank #2"));
        assert!(trend.analysis.contains("50th percentile"));
        assert!(trend.analysis.contains("in line with the network average"));
    }

    #[test]
    fn test_no_trend_for_single_cross_match() {
        let my = survey("A", 40.0);
        let results = correlate(&my, &[tagged_note("b", "B", 30.0, 10)]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::CrossAddress);
    }

    #[test]
    fn test_address_recovered_from_labeled_body() {
        let my = survey("bc1qexampleaddr", 40.0);
        let mut note = tagged_note("n1", "", 38.0, 2);
        note.raw_tags.retain(|(k, _)| k != TAG_ADDRESS);
        note.content = "Discovery survey for address: bc1qexampleaddr score: 38".to_string();

        let results = correlate(&my, &[note]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::SameAddress);
    }

    #[test]
    fn test_address_recovered_from_trailing_hashtag_fragment() {
        let my = survey("fragmentkey", 40.0);
        let mut note = tagged_note("n1", "", 38.0, 2);
        note.raw_tags.clear();
        note.content = "activity report, score: 38 #fragmentkey".to_string();

        let results = correlate(&my, &[note]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::SameAddress);
    }

    #[test]
    fn test_unattributable_note_dropped_siblings_kept() {
        let my = survey("A", 40.0);
        let mut garbled = tagged_note("bad", "", 0.0, 2);
        garbled.raw_tags.clear();
        garbled.content = "{{{ not parseable at all".to_string();

        let notes = vec![garbled, tagged_note("good", "A", 41.0, 2)];
        let results = correlate(&my, &notes);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].note.as_ref().unwrap().note_id, "good");
    }

    #[test]
    fn test_note_without_recoverable_score_dropped() {
        let my = survey("A", 40.0);
        let mut note = tagged_note("n1", "A", 0.0, 2);
        note.raw_tags.retain(|(k, _)| k != TAG_SCORE);
        note.content = "a report with no figures".to_string();

        let results = correlate(&my, &[note]);
        assert!(results.is_empty());
    }

    #[test]
    fn test_negative_score_tag_falls_back_to_body() {
        let my = survey("A", 40.0);
        let mut note = tagged_note("n1", "A", 0.0, 2);
        for tag in note.raw_tags.iter_mut() {
            if tag.0 == TAG_SCORE {
                tag.1 = "-12.5".to_string();
            }
        }
        note.content = "score: 41.5".to_string();

        let results = correlate(&my, &[note]);

        assert_eq!(results.len(), 1);
        assert!(results[0].analysis.contains("41.50"));
    }

    #[test]
    fn test_negative_score_tag_without_body_score_drops_note() {
        let my = survey("A", 40.0);
        let mut note = tagged_note("n1", "A", 0.0, 2);
        for tag in note.raw_tags.iter_mut() {
            if tag.0 == TAG_SCORE {
                tag.1 = "-12.5".to_string();
            }
        }
        note.content = "no figures in this body".to_string();

        let results = correlate(&my, &[note]);
        assert!(results.is_empty());
    }

    #[test]
    fn test_malformed_score_tag_falls_back_to_body() {
        let my = survey("A", 40.0);
        let mut note = tagged_note("n1", "A", 0.0, 2);
        for tag in note.raw_tags.iter_mut() {
            if tag.0 == TAG_SCORE {
                tag.1 = "not-a-number".to_string();
            }
        }
        note.content = "score: 41.5".to_string();

        let results = correlate(&my, &[note]);

        assert_eq!(results.len(), 1);
        assert!(results[0].analysis.contains("41.50"));
    }
}
