//! Discovery score calculator.
//!
//! Turns one fetch of normalized pool data into a single non-negative score.
//! The point system is a transparent, auditable heuristic, not a calibrated
//! statistic: every term is computed independently and summed, and the exact
//! weights and thresholds are load-bearing for compatibility with scores
//! already published to the network. Missing or empty inputs lose their term
//! and nothing else; the function is total.

use crate::types::{BlockRecord, HashRateSample, ShareWindow};
use chrono::{DateTime, Duration, Utc};

/// Presence credit for a non-empty blocks list.
pub const BLOCKS_PRESENT_POINTS: f64 = 10.0;
/// Presence credit for a non-empty hashrate series.
pub const HASHRATE_PRESENT_POINTS: f64 = 10.0;
/// Presence credit for a non-zero share window.
pub const SHARE_WINDOW_PRESENT_POINTS: f64 = 5.0;
/// Credit per block solved by the monitored address itself.
pub const OWNED_BLOCK_POINTS: f64 = 15.0;
/// Credit per block, any solver, found within the trailing recency window.
pub const RECENT_BLOCK_POINTS: f64 = 2.0;
/// Cap of the hashrate consistency term.
pub const CONSISTENCY_MAX_POINTS: f64 = 10.0;
/// Credit when the share window exceeds the large-pool threshold.
pub const LARGE_POOL_POINTS: f64 = 5.0;
/// Share count above which the pool counts as large.
pub const LARGE_POOL_SHARE_THRESHOLD: u64 = 1_000_000_000_000;
/// Trailing window for the per-block recency credit.
pub const RECENCY_WINDOW_DAYS: i64 = 7;

/// Compute the discovery score against the current wall clock.
pub fn discovery_score(
    blocks: &[BlockRecord],
    share_window: &ShareWindow,
    samples: &[HashRateSample],
    address: &str,
) -> f64 {
    discovery_score_at(blocks, share_window, samples, address, Utc::now())
}

/// Compute the discovery score with an explicit "now" for the recency window.
///
/// Deterministic for fixed inputs; the only time-dependent term is the
/// trailing 7-day block recency credit.
pub fn discovery_score_at(
    blocks: &[BlockRecord],
    share_window: &ShareWindow,
    samples: &[HashRateSample],
    address: &str,
    now: DateTime<Utc>,
) -> f64 {
    let mut score = 0.0;

    if !blocks.is_empty() {
        score += BLOCKS_PRESENT_POINTS;
    }
    if !samples.is_empty() {
        score += HASHRATE_PRESENT_POINTS;
    }
    if share_window.size > 0 {
        score += SHARE_WINDOW_PRESENT_POINTS;
    }

    let owned = blocks
        .iter()
        .filter(|b| b.solver_address == address)
        .count();
    score += OWNED_BLOCK_POINTS * owned as f64;

    let window_start = now - Duration::days(RECENCY_WINDOW_DAYS);
    let recent = blocks.iter().filter(|b| b.time > window_start).count();
    score += RECENT_BLOCK_POINTS * recent as f64;

    score += consistency_bonus(samples);

    if share_window.size > LARGE_POOL_SHARE_THRESHOLD {
        score += LARGE_POOL_POINTS;
    }

    round2(score)
}

/// Hashrate stability credit: `max(0, 10 - cv * 10)` where cv is the
/// population coefficient of variation of the sample values.
///
/// Needs at least two samples. A zero mean would divide by zero, so that
/// degenerate series contributes 0 instead.
fn consistency_bonus(samples: &[HashRateSample]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }

    let n = samples.len() as f64;
    let mean = samples.iter().map(|s| s.value).sum::<f64>() / n;
    if mean == 0.0 {
        return 0.0;
    }

    let variance = samples
        .iter()
        .map(|s| (s.value - mean).powi(2))
        .sum::<f64>()
        / n;
    let coefficient = variance.sqrt() / mean;

    (CONSISTENCY_MAX_POINTS - coefficient * 10.0).max(0.0)
}

/// Drop samples that do not satisfy the `value > 0` invariant.
///
/// Idempotent: running it over an already-filtered series is a no-op, so the
/// adapter filtering upstream rows and the scorer receiving the result agree.
pub fn retain_positive(mut samples: Vec<HashRateSample>) -> Vec<HashRateSample> {
    samples.retain(|s| s.value.is_finite() && s.value > 0.0);
    samples
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn block(solver_address: &str, height: u64, time: DateTime<Utc>) -> BlockRecord {
        BlockRecord {
            solver_id: height,
            solver_address: solver_address.to_string(),
            time,
            height,
            accepted_shares: 1_000,
            block_hash: format!("hash{}", height),
            solver_name: format!("solver-{}", solver_address),
        }
    }

    fn sample(value: f64, now: DateTime<Utc>, minutes_ago: i64) -> HashRateSample {
        HashRateSample {
            timestamp: now - Duration::minutes(minutes_ago),
            value,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_inputs_score_zero() {
        let window = ShareWindow {
            as_of: fixed_now(),
            size: 0,
        };
        let score = discovery_score_at(&[], &window, &[], "addr", fixed_now());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_worked_example() {
        let now = fixed_now();
        let blocks = vec![
            block("A", 100, now - Duration::hours(1)),
            block("B", 101, now - Duration::hours(2)),
        ];
        let window = ShareWindow {
            as_of: now,
            size: 2_000_000_000_000,
        };
        let samples = vec![
            sample(50.0, now, 30),
            sample(50.0, now, 20),
            sample(50.0, now, 10),
        ];

        let score = discovery_score_at(&blocks, &window, &samples, "A", now);

        // 10 blocks present + 10 hashrate present + 5 window non-zero
        // + 15 one block solved by A + 2*2 both blocks within 7 days
        // + 10 zero-variance consistency + 5 large pool
        assert_eq!(score, 59.0);
    }

    #[test]
    fn test_deterministic() {
        let now = fixed_now();
        let blocks = vec![block("A", 100, now - Duration::days(1))];
        let window = ShareWindow { as_of: now, size: 5 };
        let samples = vec![sample(40.0, now, 10), sample(60.0, now, 5)];

        let a = discovery_score_at(&blocks, &window, &samples, "A", now);
        let b = discovery_score_at(&blocks, &window, &samples, "A", now);
        assert_eq!(a, b);
    }

    #[test]
    fn test_monotonic_under_information_loss() {
        let now = fixed_now();
        let blocks = vec![block("A", 100, now - Duration::hours(1))];
        let window = ShareWindow {
            as_of: now,
            size: 2_000_000_000_000,
        };
        let samples = vec![sample(50.0, now, 10), sample(50.0, now, 5)];

        let full = discovery_score_at(&blocks, &window, &samples, "A", now);
        let no_blocks = discovery_score_at(&[], &window, &samples, "A", now);
        let no_samples = discovery_score_at(&blocks, &window, &[], "A", now);
        let no_window =
            discovery_score_at(&blocks, &ShareWindow { as_of: now, size: 0 }, &samples, "A", now);

        assert!(no_blocks <= full);
        assert!(no_samples <= full);
        assert!(no_window <= full);
    }

    #[test]
    fn test_old_blocks_get_no_recency_credit() {
        let now = fixed_now();
        let recent = vec![block("B", 100, now - Duration::days(1))];
        let stale = vec![block("B", 100, now - Duration::days(30))];
        let window = ShareWindow { as_of: now, size: 0 };

        let with_recent = discovery_score_at(&recent, &window, &[], "A", now);
        let with_stale = discovery_score_at(&stale, &window, &[], "A", now);

        assert_eq!(with_recent, 12.0); // presence 10 + recency 2
        assert_eq!(with_stale, 10.0); // presence only
    }

    #[test]
    fn test_consistency_erratic_series_floors_at_zero() {
        let now = fixed_now();
        // cv well above 1.0, so the term floors at 0 instead of going negative
        let samples = vec![
            sample(1.0, now, 30),
            sample(200.0, now, 20),
            sample(1.0, now, 10),
        ];
        let window = ShareWindow { as_of: now, size: 0 };

        let score = discovery_score_at(&[], &window, &samples, "A", now);
        assert_eq!(score, 10.0); // hashrate presence only
    }

    #[test]
    fn test_consistency_needs_two_samples() {
        let now = fixed_now();
        let samples = vec![sample(50.0, now, 10)];
        let window = ShareWindow { as_of: now, size: 0 };

        let score = discovery_score_at(&[], &window, &samples, "A", now);
        assert_eq!(score, 10.0);
    }

    #[test]
    fn test_retain_positive_is_idempotent() {
        let now = fixed_now();
        let raw = vec![
            sample(50.0, now, 30),
            sample(0.0, now, 20),
            sample(-1.0, now, 15),
            sample(f64::NAN, now, 12),
            sample(60.0, now, 10),
        ];

        let filtered = retain_positive(raw);
        assert_eq!(filtered.len(), 2);

        let window = ShareWindow { as_of: now, size: 0 };
        let once = discovery_score_at(&[], &window, &filtered, "A", now);
        let twice = discovery_score_at(
            &[],
            &window,
            &retain_positive(filtered.clone()),
            "A",
            now,
        );
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rounded_to_two_decimals() {
        let now = fixed_now();
        let samples = vec![
            sample(48.0, now, 30),
            sample(50.0, now, 20),
            sample(52.0, now, 10),
        ];
        let window = ShareWindow { as_of: now, size: 0 };

        let score = discovery_score_at(&[], &window, &samples, "A", now);
        assert_eq!(score, (score * 100.0).round() / 100.0);
        assert!(score >= 0.0);
    }
}
