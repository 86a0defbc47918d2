//! Gemini adapter for text completions.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::credentials::ApiKey;

use super::error::{ErrorContext, ProviderError};
use super::types::{GenerateRequest, GenerateResponse};
use super::CompletionGateway;

// =============================================================================
// GEMINI ADAPTER
// =============================================================================

/// Maximum allowed response content length (1MB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Maximum allowed prompt characters (~125k tokens).
const MAX_PROMPT_CHARS: usize = 500_000;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Gemini API adapter for `generateContent` completions.
///
/// Holds no credential: the API key arrives per call, because the scheduler
/// rotates credentials between requests.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl GeminiAdapter {
    /// Create with the default endpoint, model, and timeout.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_config(DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT)
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self, ProviderError> {
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());

        let timeout = std::env::var("GEMINI_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        Self::with_config(base_url, model, timeout)
    }

    /// Create with custom configuration.
    pub fn with_config(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_url(&self, key: &ApiKey) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            key.expose()
        )
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct ApiRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    status: Option<String>,
}

// =============================================================================
// COMPLETION GATEWAY IMPL
// =============================================================================

#[async_trait]
impl CompletionGateway for GeminiAdapter {
    async fn generate(
        &self,
        key: &ApiKey,
        req: &GenerateRequest,
    ) -> Result<GenerateResponse, ProviderError> {
        if req.prompt.len() > MAX_PROMPT_CHARS {
            return Err(ProviderError::invalid_request(format!(
                "Prompt too large: {} chars (max {MAX_PROMPT_CHARS})",
                req.prompt.len()
            )));
        }

        let start = Instant::now();

        let api_req = ApiRequest {
            contents: vec![Content {
                parts: vec![Part { text: &req.prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: req.temperature,
                max_output_tokens: req.max_output_tokens,
                top_p: 0.8,
                top_k: 40,
            },
        };

        let mut response = self
            .client
            .post(self.generate_url(key))
            .json(&api_req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = response.status();

        // Stream response to enforce size limit
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(ProviderError::provider(
                    "gemini",
                    format!("Response too large: {new_len} bytes"),
                    false,
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&bytes).to_string();

        if !status.is_success() {
            let ctx = ErrorContext::new().with_status(status.as_u16());

            if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(&body) {
                if let Some(error) = parsed.error {
                    let message = error.message.unwrap_or_default();
                    let code = error.status.unwrap_or_default();
                    let ctx = ctx.with_code(&code);

                    if status.as_u16() == 429 || code == "RESOURCE_EXHAUSTED" {
                        return Err(ProviderError::quota_remote(Duration::from_secs(60), ctx));
                    }
                    return Err(ProviderError::provider_with_context(
                        "gemini",
                        message,
                        status.as_u16() >= 500,
                        ctx,
                    ));
                }
            }

            if status.as_u16() == 429 {
                return Err(ProviderError::quota_remote(Duration::from_secs(60), ctx));
            }
            return Err(ProviderError::provider_with_context(
                "gemini",
                format!("HTTP {}", status.as_u16()),
                status.as_u16() >= 500,
                ctx,
            ));
        }

        let parsed: ApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::provider("gemini", format!("Invalid JSON: {e}"), false))?;

        // Prompt-level safety block: no candidates will be present.
        if let Some(feedback) = parsed.prompt_feedback {
            if let Some(reason) = feedback.block_reason {
                return Err(ProviderError::refused(format!("prompt blocked: {reason}")));
            }
        }

        let candidate = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| {
                ProviderError::provider("gemini", "No candidates in response", false)
            })?;

        if candidate.content.is_none() {
            // Candidate-level safety stop surfaces as a finish reason.
            if let Some(reason) = candidate.finish_reason {
                if reason == "SAFETY" || reason == "PROHIBITED_CONTENT" {
                    return Err(ProviderError::refused(format!(
                        "completion blocked: {reason}"
                    )));
                }
            }
        }

        let mut text = candidate
            .content
            .and_then(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ProviderError::provider("gemini", "Empty completion", false));
        }

        // Normalize content for downstream parsers.
        if text.len() > MAX_RESPONSE_LEN {
            text.truncate(MAX_RESPONSE_LEN);
        }

        let usage = parsed.usage_metadata;
        let input_tokens = usage
            .as_ref()
            .and_then(|u| u.prompt_token_count)
            .unwrap_or(0);
        let output_tokens = usage
            .as_ref()
            .and_then(|u| u.candidates_token_count)
            .unwrap_or(0);

        Ok(GenerateResponse {
            text,
            input_tokens,
            output_tokens,
            latency: start.elapsed(),
        })
    }
}
