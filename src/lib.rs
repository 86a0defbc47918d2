#![forbid(unsafe_code)]

//! # rankgate
//!
//! Quota-aware relevance ranking over a pool of LLM API credentials.
//!
//! Free-tier API keys come with tight per-key ceilings (requests per minute,
//! tokens per minute, requests per day). rankgate spreads a ranking job across
//! every key you have: each credential tracks its own sliding quota windows,
//! the pool always dispatches through the least-loaded admissible key, and the
//! scheduler degrades request granularity (whole job, then chunks, then single
//! items, then a network-free heuristic) rather than failing the job when
//! quota or model formatting gives out.
//!
//! The entry point is [`rank::RankingScheduler`].

pub mod backoff;
pub mod credentials;
pub mod gateway;
pub mod heuristic;
pub mod parser;
pub mod prompts;
pub mod quota;
pub mod rank;

pub use backoff::{BackoffPolicy, CancelToken};
pub use credentials::{ApiKey, Credential, CredentialPool, CredentialSnapshot, NoCredentials};
pub use gateway::{
    Attribution, CompletionGateway, GeminiAdapter, GenerateRequest, GenerateResponse,
    ProviderError, UsageSink,
};
pub use heuristic::{HeuristicConfig, HeuristicScorer};
pub use quota::{QuotaLimits, RateWindow, WindowSnapshot};
pub use rank::{
    ItemScore, RankError, RankOutcome, RankStats, RankingScheduler, SchedulerConfig, Tier,
};
