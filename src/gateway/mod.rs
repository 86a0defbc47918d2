//! Provider gateway for Gemini text completions.
//!
//! The gateway is a thin adapter: retry pacing, credential rotation, and
//! quota accounting all live in the ranking scheduler, which is the only
//! component with enough context to decide between retrying, rotating, and
//! degrading tier.

pub mod error;
pub mod gemini;
pub mod types;
pub mod usage;

use async_trait::async_trait;

use crate::credentials::ApiKey;

pub use error::{ErrorContext, ProviderError, QuotaSource};
pub use gemini::GeminiAdapter;
pub use types::{Attribution, GenerateRequest, GenerateResponse};
pub use usage::{CallStatus, NoopUsageSink, ProviderCallRecord, StderrUsageSink, UsageSink};

/// Contract the scheduler requires from the completion provider.
///
/// The key is passed per call because the scheduler rotates credentials
/// between requests of the same job.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn generate(
        &self,
        key: &ApiKey,
        req: &GenerateRequest,
    ) -> Result<GenerateResponse, ProviderError>;
}
