//! Core types for the provider gateway.

use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Attribution for usage tracking and debugging.
///
/// Every request through the gateway carries attribution so we know which
/// ranking job it belongs to and which code path triggered it.
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    /// Ranking job this request is part of.
    pub job_id: Option<Uuid>,
    /// Which code path made this call, for debugging.
    /// Use a static string like "rank::mega" or "rank::single".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            ..Default::default()
        }
    }

    pub fn with_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }
}

// =============================================================================
// GENERATION TYPES
// =============================================================================

/// Request for a text completion.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// The full prompt text.
    pub prompt: String,
    /// Sampling temperature. Low by default: ratings should be stable.
    pub temperature: f32,
    /// Hard cap on generated tokens.
    pub max_output_tokens: u32,
    /// Attribution for usage tracking.
    pub attribution: Attribution,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, attribution: Attribution) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.1,
            max_output_tokens: 500,
            attribution,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = max;
        self
    }
}

/// Response from a completion request.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// Raw completion text; rating extraction happens downstream.
    pub text: String,
    /// Prompt tokens, as reported by the provider (0 if unreported).
    pub input_tokens: u32,
    /// Generated tokens, as reported by the provider (0 if unreported).
    pub output_tokens: u32,
    /// Round-trip time for the request.
    pub latency: Duration,
}
