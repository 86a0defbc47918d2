//! The degradation ladder: mega request, then batched chunks, then per-item
//! requests.
//!
//! Strictly descending within one job; a tier abandoned once (retry budget
//! spent, or no admissible credential within the wait bound) is abandoned for
//! the rest of the job. Items scored by a higher tier are never rescored.
//! Heuristic fill happens in the scheduler: this controller drives only the
//! LLM tiers and leaves holes where they fail.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backoff::CancelToken;
use crate::credentials::{Credential, CredentialPool};
use crate::gateway::{
    Attribution, CompletionGateway, GenerateRequest, ProviderCallRecord, ProviderError, UsageSink,
};
use crate::parser;
use crate::prompts;

use super::types::{ItemScore, Tier};
use super::SchedulerConfig;

/// Synthetic token charge used to demote a credential after a provider-side
/// quota error: the local window believed the credential was available, so
/// something external is consuming its quota.
const QUOTA_PENALTY_TOKENS: u64 = 10_000;

/// Floor on rotation sleeps so a zero-length wait hint cannot spin.
const MIN_ROTATION_WAIT: Duration = Duration::from_millis(10);

/// Why a tier had to stop for the remainder of the job.
enum TierFailure {
    PoolExhausted,
    Cancelled,
}

enum CallError {
    Tier(TierFailure),
    Provider(ProviderError),
}

enum ChunkOutcome {
    Scored(Vec<f64>),
    Failed { malformed: bool },
    Abandon,
}

pub(super) struct TierController<'a> {
    gateway: &'a dyn CompletionGateway,
    pool: &'a CredentialPool,
    usage: &'a dyn UsageSink,
    config: &'a SchedulerConfig,
    cancel: &'a CancelToken,
    job_id: Uuid,
    pub(super) llm_requests: u32,
    pub(super) quota_wait: Duration,
}

impl<'a> TierController<'a> {
    pub(super) fn new(
        gateway: &'a dyn CompletionGateway,
        pool: &'a CredentialPool,
        usage: &'a dyn UsageSink,
        config: &'a SchedulerConfig,
        cancel: &'a CancelToken,
        job_id: Uuid,
    ) -> Self {
        Self {
            gateway,
            pool,
            usage,
            config,
            cancel,
            job_id,
            llm_requests: 0,
            quota_wait: Duration::ZERO,
        }
    }

    /// Drive the LLM tiers over the job. Returns one slot per item, in input
    /// order; `None` marks items no LLM tier reached.
    pub(super) async fn run(
        &mut self,
        context: &str,
        items: &[String],
    ) -> Vec<Option<ItemScore>> {
        let mut scores: Vec<Option<ItemScore>> = vec![None; items.len()];

        if self.try_mega(context, items, &mut scores).await {
            return scores;
        }

        let bulk_distrust = self.run_batches(context, items, &mut scores).await;

        let unscored = scores.iter().any(Option::is_none);
        if unscored && bulk_distrust >= self.config.single_trigger_ratio {
            debug!(
                bulk_distrust,
                "bulk parsing trust is low; descending to per-item requests"
            );
            self.run_singles(context, items, &mut scores).await;
        }

        scores
    }

    /// One request carrying the entire item list. All-or-nothing: success
    /// requires exactly N parsed ratings.
    async fn try_mega(
        &mut self,
        context: &str,
        items: &[String],
        scores: &mut [Option<ItemScore>],
    ) -> bool {
        if items.len() > self.config.mega_max_items {
            debug!(
                items = items.len(),
                cap = self.config.mega_max_items,
                "job too large for mega tier"
            );
            return false;
        }

        let prompt = prompts::mega_prompt(context, items);
        let estimated = prompts::estimate_tokens(&prompt, items.len());

        for attempt in 0..self.config.mega_retry_budget {
            if self.cancel.is_cancelled() {
                return false;
            }
            match self
                .call_model(
                    &prompt,
                    prompts::MEGA_MAX_OUTPUT_TOKENS,
                    estimated,
                    "rank::mega",
                )
                .await
            {
                Ok(text) => match parser::extract_ratings(&text, items.len()) {
                    Some(values) => {
                        for (slot, value) in scores.iter_mut().zip(values) {
                            *slot = Some(ItemScore {
                                score: value,
                                tier: Tier::Mega,
                            });
                        }
                        return true;
                    }
                    None => warn!(attempt, "malformed mega response"),
                },
                Err(CallError::Tier(_)) => return false,
                Err(CallError::Provider(err)) => {
                    warn!(attempt, error = %err, "mega request failed");
                    if !err.is_retryable() {
                        return false;
                    }
                    if err.is_quota() {
                        // The quota backoff already paced this attempt.
                        continue;
                    }
                }
            }
            if attempt + 1 < self.config.mega_retry_budget {
                sleep(self.config.backoff.jittered_delay_for(attempt)).await;
            }
        }
        false
    }

    /// Fixed-size chunks, each retried with a freshly selected credential.
    /// A chunk that still fails leaves its items unscored; partial success is
    /// preserved. Returns the fraction of attempted chunks that failed on
    /// malformed output, which gauges how much bulk parsing can be trusted.
    async fn run_batches(
        &mut self,
        context: &str,
        items: &[String],
        scores: &mut [Option<ItemScore>],
    ) -> f64 {
        let chunk_size = self.config.batch_size.max(1);
        let mut chunks_total = 0usize;
        let mut chunks_malformed = 0usize;

        for (chunk_index, chunk) in items.chunks(chunk_size).enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            let start = chunk_index * chunk_size;
            if scores[start..start + chunk.len()].iter().all(Option::is_some) {
                continue;
            }

            chunks_total += 1;
            match self.try_chunk(context, chunk).await {
                ChunkOutcome::Scored(values) => {
                    for (offset, value) in values.into_iter().enumerate() {
                        scores[start + offset] = Some(ItemScore {
                            score: value,
                            tier: Tier::Batch,
                        });
                    }
                }
                ChunkOutcome::Failed { malformed } => {
                    if malformed {
                        chunks_malformed += 1;
                    }
                }
                ChunkOutcome::Abandon => break,
            }

            if self.config.inter_batch_delay > Duration::ZERO && !self.cancel.is_cancelled() {
                sleep(self.config.inter_batch_delay).await;
            }
        }

        if chunks_total == 0 {
            0.0
        } else {
            chunks_malformed as f64 / chunks_total as f64
        }
    }

    async fn try_chunk(&mut self, context: &str, chunk: &[String]) -> ChunkOutcome {
        let prompt = prompts::batch_prompt(context, chunk);
        let estimated = prompts::estimate_tokens(&prompt, chunk.len());
        let mut malformed = false;

        for attempt in 0..self.config.batch_retry_budget {
            if self.cancel.is_cancelled() {
                return ChunkOutcome::Abandon;
            }
            match self
                .call_model(
                    &prompt,
                    prompts::BATCH_MAX_OUTPUT_TOKENS,
                    estimated,
                    "rank::batch",
                )
                .await
            {
                Ok(text) => match parser::extract_ratings(&text, chunk.len()) {
                    Some(values) => return ChunkOutcome::Scored(values),
                    None => {
                        malformed = true;
                        warn!(attempt, "malformed batch response");
                    }
                },
                Err(CallError::Tier(_)) => return ChunkOutcome::Abandon,
                Err(CallError::Provider(err)) => {
                    warn!(attempt, error = %err, "batch request failed");
                    if !err.is_retryable() {
                        break;
                    }
                    if err.is_quota() {
                        continue;
                    }
                }
            }
            if attempt + 1 < self.config.batch_retry_budget {
                sleep(self.config.backoff.jittered_delay_for(attempt)).await;
            }
        }
        ChunkOutcome::Failed { malformed }
    }

    /// One request per still-unscored item. Most expensive, most robust to
    /// formatting drift.
    async fn run_singles(
        &mut self,
        context: &str,
        items: &[String],
        scores: &mut [Option<ItemScore>],
    ) {
        for (index, item) in items.iter().enumerate() {
            if scores[index].is_some() {
                continue;
            }
            if self.cancel.is_cancelled() {
                return;
            }

            let prompt = prompts::single_prompt(context, item);
            let estimated = prompts::estimate_tokens(&prompt, 1);

            for attempt in 0..self.config.single_retry_budget {
                if self.cancel.is_cancelled() {
                    return;
                }
                match self
                    .call_model(
                        &prompt,
                        prompts::SINGLE_MAX_OUTPUT_TOKENS,
                        estimated,
                        "rank::single",
                    )
                    .await
                {
                    Ok(text) => match parser::extract_single(&text) {
                        Some(value) => {
                            scores[index] = Some(ItemScore {
                                score: value,
                                tier: Tier::Single,
                            });
                            break;
                        }
                        None => warn!(index, attempt, "malformed single response"),
                    },
                    Err(CallError::Tier(_)) => return,
                    Err(CallError::Provider(err)) => {
                        warn!(index, attempt, error = %err, "single request failed");
                        if !err.is_retryable() {
                            break;
                        }
                        if err.is_quota() {
                            continue;
                        }
                    }
                }
                if attempt + 1 < self.config.single_retry_budget {
                    sleep(self.config.backoff.jittered_delay_for(attempt)).await;
                }
            }
        }
    }

    /// Select a credential, dispatch one model call, and account for it.
    ///
    /// Usage is recorded against the credential after dispatch whether or not
    /// the call succeeded: the provider saw the request either way. A quota
    /// error additionally demotes the credential and applies the long quota
    /// backoff before the caller decides what to do next.
    async fn call_model(
        &mut self,
        prompt: &str,
        max_output_tokens: u32,
        estimated_tokens: u64,
        caller: &'static str,
    ) -> Result<String, CallError> {
        let credential = self
            .acquire(estimated_tokens)
            .await
            .map_err(CallError::Tier)?;

        let request = GenerateRequest::new(prompt, Attribution::new(caller).with_job(self.job_id))
            .temperature(self.config.temperature)
            .max_output_tokens(max_output_tokens);

        debug!(
            credential = %credential.id(),
            caller,
            estimated_tokens,
            "dispatching model call"
        );
        let started = Instant::now();
        let result = self.gateway.generate(credential.key(), &request).await;
        self.pool.record_usage(&credential, estimated_tokens);
        self.llm_requests += 1;

        let record = ProviderCallRecord::new(
            "gemini",
            self.config.model.clone(),
            credential.id(),
            caller,
        )
        .estimated(estimated_tokens)
        .latency(started.elapsed().as_millis() as i32)
        .job(Some(self.job_id));

        match result {
            Ok(response) => {
                self.usage
                    .record(record.tokens(response.input_tokens, response.output_tokens))
                    .await;
                Ok(response.text)
            }
            Err(err) => {
                self.usage.record(record.error(err.code())).await;
                if err.is_quota() {
                    self.pool.penalize(&credential, QUOTA_PENALTY_TOKENS);
                    if !self.cancel.is_cancelled() {
                        let delay = self.config.backoff.quota_delay;
                        warn!(
                            credential = %credential.id(),
                            delay_ms = delay.as_millis() as u64,
                            "provider quota hit; backing off"
                        );
                        sleep(delay).await;
                        self.quota_wait += delay;
                    }
                }
                Err(CallError::Provider(err))
            }
        }
    }

    /// Least-loaded admissible credential, blocking-and-retrying within the
    /// pool wait bound when nothing currently admits.
    async fn acquire(&mut self, estimated_tokens: u64) -> Result<Arc<Credential>, TierFailure> {
        let start = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                return Err(TierFailure::Cancelled);
            }
            if let Some(credential) = self.pool.best_available(estimated_tokens) {
                return Ok(credential);
            }
            let hint = match self.pool.shortest_wait(estimated_tokens) {
                Some(hint) => hint.max(MIN_ROTATION_WAIT),
                None => return Err(TierFailure::PoolExhausted),
            };
            let remaining = self.config.pool_wait_max.saturating_sub(start.elapsed());
            if hint > remaining {
                debug!(
                    hint_ms = hint.as_millis() as u64,
                    "no admissible credential within the wait bound"
                );
                return Err(TierFailure::PoolExhausted);
            }
            sleep(hint).await;
            self.quota_wait += hint;
        }
    }
}
