//! Relevance ranking over a credential pool.
//!
//! [`RankingScheduler`] is the public entry point: given a context string and
//! a list of items, it returns one score in [0.0, 1.0] per item, in input
//! order. Internally it drives a degradation ladder of request granularities
//! (see [`Tier`]) and rotates credentials between calls, so a job survives
//! quota exhaustion and malformed model output without surfacing mid-job
//! errors to the caller.

mod tiers;
mod types;

pub use types::{ItemScore, RankError, RankOutcome, RankStats, Tier};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};
use uuid::Uuid;

use crate::backoff::{BackoffPolicy, CancelToken};
use crate::credentials::{CredentialPool, CredentialSnapshot};
use crate::gateway::{CompletionGateway, NoopUsageSink, UsageSink};
use crate::heuristic::{HeuristicConfig, HeuristicScorer};
use crate::prompts;

use tiers::TierController;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Tuning knobs for the scheduler. Defaults match free-tier Gemini pacing.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Model identifier, recorded with usage records.
    pub model: String,
    /// Largest job the mega tier will attempt in a single request.
    pub mega_max_items: usize,
    /// Items per chunk in the batch tier.
    pub batch_size: usize,
    /// Attempts before the mega tier is abandoned.
    pub mega_retry_budget: u32,
    /// Attempts per chunk before its items are left for a lower tier.
    pub batch_retry_budget: u32,
    /// Attempts per item in the single tier.
    pub single_retry_budget: u32,
    /// Fraction of batch chunks that must fail on malformed output before
    /// the single tier runs. Below it, unscored items go straight to the
    /// heuristic: per-item requests are only worth their cost when the model
    /// keeps breaking the list format.
    pub single_trigger_ratio: f64,
    /// When false, unscored items surface as [`RankError::Incomplete`]
    /// instead of being filled by the heuristic.
    pub allow_heuristic: bool,
    /// Longest the scheduler will block waiting for any credential to admit
    /// a request before the current tier gives up.
    pub pool_wait_max: Duration,
    /// Pause between batch chunks.
    pub inter_batch_delay: Duration,
    /// Sampling temperature for all rating requests.
    pub temperature: f32,
    /// Retry pacing.
    pub backoff: BackoffPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".into(),
            mega_max_items: 100,
            batch_size: 10,
            mega_retry_budget: 3,
            batch_retry_budget: 3,
            single_retry_budget: 3,
            single_trigger_ratio: 0.5,
            allow_heuristic: true,
            pool_wait_max: Duration::from_secs(30),
            inter_batch_delay: Duration::from_secs(1),
            temperature: prompts::RATING_TEMPERATURE,
            backoff: BackoffPolicy::default(),
        }
    }
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Quota-aware ranking scheduler.
///
/// Holds the gateway, the credential pool, a usage sink, and the heuristic
/// fallback. Cheap to share behind an `Arc`; each [`RankingScheduler::rank`]
/// call is an independent job with its own id.
pub struct RankingScheduler<G: CompletionGateway> {
    gateway: Arc<G>,
    pool: Arc<CredentialPool>,
    usage: Arc<dyn UsageSink>,
    heuristic: HeuristicScorer,
    config: SchedulerConfig,
}

impl<G: CompletionGateway> RankingScheduler<G> {
    pub fn new(gateway: Arc<G>, pool: Arc<CredentialPool>, config: SchedulerConfig) -> Self {
        Self {
            gateway,
            pool,
            usage: Arc::new(NoopUsageSink),
            heuristic: HeuristicScorer::new(HeuristicConfig::default()),
            config,
        }
    }

    /// Route usage records somewhere other than the void.
    pub fn with_usage_sink(mut self, usage: Arc<dyn UsageSink>) -> Self {
        self.usage = usage;
        self
    }

    /// Replace the fallback scorer (seeded for reproducible tests, or tuned
    /// keywords for a different corpus).
    pub fn with_heuristic(mut self, heuristic: HeuristicScorer) -> Self {
        self.heuristic = heuristic;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Per-credential usage view, for dashboards and tests.
    pub fn pool_snapshots(&self) -> Vec<CredentialSnapshot> {
        self.pool.snapshots()
    }

    /// Rank `items` for relevance to `context`.
    ///
    /// Always returns one score per item, in input order, unless heuristic
    /// fallback is disabled and the LLM tiers left items unscored.
    pub async fn rank(&self, context: &str, items: &[String]) -> Result<RankOutcome, RankError> {
        self.rank_with_cancel(context, items, &CancelToken::new())
            .await
    }

    /// Like [`RankingScheduler::rank`], but stops cleanly when `cancel`
    /// trips: already-scored items keep their LLM scores and the rest fall
    /// through to the heuristic.
    pub async fn rank_with_cancel(
        &self,
        context: &str,
        items: &[String],
        cancel: &CancelToken,
    ) -> Result<RankOutcome, RankError> {
        let started = Instant::now();
        let mut stats = RankStats {
            items_total: items.len(),
            ..Default::default()
        };

        if items.is_empty() {
            stats.credentials = self.pool.snapshots();
            return Ok(RankOutcome {
                scores: Vec::new(),
                stats,
            });
        }

        let job_id = Uuid::new_v4();
        debug!(%job_id, items = items.len(), "starting ranking job");

        let mut controller = TierController::new(
            &*self.gateway,
            &self.pool,
            &*self.usage,
            &self.config,
            cancel,
            job_id,
        );
        let mut slots = controller.run(context, items).await;
        stats.llm_requests = controller.llm_requests;
        stats.quota_wait = controller.quota_wait;

        let missing: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| index)
            .collect();

        if !missing.is_empty() {
            if !self.config.allow_heuristic {
                return Err(RankError::Incomplete {
                    partial: slots,
                    missing_indices: missing,
                });
            }
            debug!(%job_id, unscored = missing.len(), "filling unscored items heuristically");
            for &index in &missing {
                slots[index] = Some(ItemScore {
                    score: self.heuristic.score(&items[index], context),
                    tier: Tier::Heuristic,
                });
            }
        }

        let scores: Vec<ItemScore> = slots.into_iter().flatten().collect();
        debug_assert_eq!(scores.len(), items.len());
        for item in &scores {
            stats.count(item.tier);
        }
        stats.elapsed = started.elapsed();
        stats.credentials = self.pool.snapshots();

        info!(
            %job_id,
            items = stats.items_total,
            mega = stats.mega_items,
            batch = stats.batch_items,
            single = stats.single_items,
            heuristic = stats.heuristic_items,
            llm_requests = stats.llm_requests,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "ranking job complete"
        );

        Ok(RankOutcome { scores, stats })
    }
}
