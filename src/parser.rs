//! Rating extraction from free-text model output.
//!
//! Models wrap the requested comma-separated ratings in prose often enough
//! that this is a boundary-adapter concern: keep the strategy isolated here so
//! it can be swapped (e.g. for structured output) without touching the tier
//! controller.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// A bounded decimal that is meant to be in [0, 1]. The optional sign and the
/// bare `1.5`-style overshoots are accepted on purpose: models occasionally
/// emit out-of-range values and we clamp instead of failing the whole batch.
static RATING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\b[01](?:\.\d+)?\b").expect("rating pattern is valid"));

/// Marks a line that looks like the canonical ratings line.
static RATINGS_LINE_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[01]\.\d+").expect("hint pattern is valid"));

/// Extract exactly `expected` ratings from raw model output, in order.
///
/// Scans line by line for a line containing a comma and at least one float
/// literal and prefers that as the canonical ratings line, falling back to
/// the whole text. Fewer matches than expected is an outright failure (the
/// caller must retry or degrade). Surplus matches are truncated to the first
/// `expected`, since models commonly append commentary after the ratings, but
/// flagged with a warning because surplus can also mask a miscount (e.g.
/// decimals inside the rubric echoed back). Every value is clamped to
/// [0.0, 1.0].
pub fn extract_ratings(raw: &str, expected: usize) -> Option<Vec<f64>> {
    if expected == 0 {
        return Some(Vec::new());
    }

    let haystack = ratings_line(raw).unwrap_or(raw);
    let values: Vec<f64> = RATING_RE
        .find_iter(haystack)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();

    if values.len() < expected {
        warn!(
            found = values.len(),
            expected, "too few ratings in model output"
        );
        return None;
    }
    if values.len() > expected {
        warn!(
            found = values.len(),
            expected, "surplus ratings in model output; truncating to the first expected matches"
        );
    }

    Some(
        values
            .into_iter()
            .take(expected)
            .map(|v| v.clamp(0.0, 1.0))
            .collect(),
    )
}

/// Extract a single rating (per-item tier). First match wins, clamped.
pub fn extract_single(raw: &str) -> Option<f64> {
    RATING_RE
        .find(raw)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}

fn ratings_line(raw: &str) -> Option<&str> {
    raw.lines()
        .find(|line| line.contains(',') && RATINGS_LINE_HINT.is_match(line))
}
