//! Core types for ranking jobs.

use std::time::Duration;

use crate::credentials::CredentialSnapshot;

/// One granularity strategy for obtaining scores.
///
/// Strict total order, descending risk/efficiency: a mega request scores the
/// whole job in one call but fails as a unit; the heuristic never fails but
/// never sees the model. A job only ever moves down this ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// One request carrying the entire item list.
    Mega,
    /// Fixed-size chunks, rotating credentials between chunks.
    Batch,
    /// One request per item.
    Single,
    /// Deterministic lexical scoring, network-free.
    Heuristic,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Mega => "mega",
            Tier::Batch => "batch",
            Tier::Single => "single",
            Tier::Heuristic => "heuristic",
        }
    }
}

/// Final score for one item, tagged with the tier that produced it.
///
/// The provenance tag is for observability; correctness only requires the
/// score to be in [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemScore {
    pub score: f64,
    pub tier: Tier,
}

/// Statistics for one completed ranking job.
#[derive(Debug, Clone, Default)]
pub struct RankStats {
    pub items_total: usize,
    pub mega_items: usize,
    pub batch_items: usize,
    pub single_items: usize,
    pub heuristic_items: usize,
    /// Provider calls dispatched (successful or not).
    pub llm_requests: u32,
    /// Time spent sleeping on quota windows and pool rotation.
    pub quota_wait: Duration,
    /// Wall time for the whole job.
    pub elapsed: Duration,
    /// Per-credential usage at job completion.
    pub credentials: Vec<CredentialSnapshot>,
}

impl RankStats {
    pub(crate) fn count(&mut self, tier: Tier) {
        match tier {
            Tier::Mega => self.mega_items += 1,
            Tier::Batch => self.batch_items += 1,
            Tier::Single => self.single_items += 1,
            Tier::Heuristic => self.heuristic_items += 1,
        }
    }
}

/// Result of a ranking job: one score per input item, in input order.
#[derive(Debug, Clone)]
pub struct RankOutcome {
    pub scores: Vec<ItemScore>,
    pub stats: RankStats,
}

impl RankOutcome {
    /// Bare score vector, same length and order as the input items.
    pub fn values(&self) -> Vec<f64> {
        self.scores.iter().map(|s| s.score).collect()
    }
}

/// Errors surfaced to the ranking caller.
///
/// Everything recoverable is handled inside the tier controller; the only
/// mid-job failure a caller ever sees is an incomplete job with heuristic
/// fallback disabled, and that carries exactly which items remain unscored.
#[derive(Debug, thiserror::Error)]
pub enum RankError {
    #[error(
        "ranking incomplete: {} of {} items unscored and heuristic fallback is disabled",
        missing_indices.len(),
        partial.len()
    )]
    Incomplete {
        /// Scores for items a tier did reach, in input order; `None` marks
        /// unscored items (missing, not defaulted).
        partial: Vec<Option<ItemScore>>,
        /// Indices of the unscored items.
        missing_indices: Vec<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_order_is_strictly_descending() {
        assert!(Tier::Mega < Tier::Batch);
        assert!(Tier::Batch < Tier::Single);
        assert!(Tier::Single < Tier::Heuristic);
    }

    #[test]
    fn incomplete_error_reports_counts() {
        let err = RankError::Incomplete {
            partial: vec![
                Some(ItemScore {
                    score: 0.5,
                    tier: Tier::Batch,
                }),
                None,
                None,
            ],
            missing_indices: vec![1, 2],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 of 3"));
    }
}
