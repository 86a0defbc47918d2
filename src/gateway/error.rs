//! Error types for the provider gateway.

use std::time::Duration;
use thiserror::Error;

/// Source of a quota condition: local (our windows) or remote (provider 429).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaSource {
    /// Our own rate window blocked the request.
    Local,
    /// The provider reported quota exhaustion despite local tracking.
    Remote,
}

/// Additional context from provider errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the provider.
    pub http_status: Option<u16>,
    /// Provider-specific status string (e.g. "RESOURCE_EXHAUSTED").
    pub provider_code: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }
}

/// Errors that can occur when calling the completion provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Quota or rate limit hit - caller should back off long and rotate
    /// credentials. The origin field is named to stay clear of thiserror's
    /// implicit `source` handling; it is data, not an error cause.
    #[error("quota exceeded ({quota_source:?}), retry after {retry_after:?}")]
    QuotaExceeded {
        retry_after: Duration,
        quota_source: QuotaSource,
        context: Option<ErrorContext>,
    },

    /// Invalid request - permanent, don't retry.
    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Provider refused to complete (safety block, etc.) - permanent.
    #[error("refused: {message}")]
    Refused { message: String },

    /// Provider error - may be retryable.
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        retryable: bool,
        context: Option<ErrorContext>,
    },

    /// Request timed out - retryable.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (missing API key, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Quota condition detected by the local rate windows.
    pub fn quota_local(retry_after: Duration) -> Self {
        Self::QuotaExceeded {
            retry_after,
            quota_source: QuotaSource::Local,
            context: None,
        }
    }

    /// Quota condition reported by the provider (HTTP 429 equivalent).
    pub fn quota_remote(retry_after: Duration, context: ErrorContext) -> Self {
        Self::QuotaExceeded {
            retry_after,
            quota_source: QuotaSource::Remote,
            context: Some(context),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            context: None,
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self::Refused {
            message: message.into(),
        }
    }

    pub fn provider(provider: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
            context: None,
        }
    }

    pub fn provider_with_context(
        provider: &'static str,
        message: impl Into<String>,
        retryable: bool,
        context: ErrorContext,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
            context: Some(context),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the same request may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::QuotaExceeded { .. } => true,
            Self::Timeout(_) => true,
            Self::Provider { retryable, .. } => *retryable,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::InvalidRequest { .. } => false,
            Self::Refused { .. } => false,
            Self::Config(_) => false,
        }
    }

    /// Whether this is a quota/rate-limit condition. The tier controller
    /// reacts to these with a long fixed backoff and credential demotion
    /// instead of the ordinary retry schedule.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Short error code for logging and usage records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::QuotaExceeded {
                quota_source: QuotaSource::Local,
                ..
            } => "quota_local",
            Self::QuotaExceeded {
                quota_source: QuotaSource::Remote,
                ..
            } => "quota_remote",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Refused { .. } => "refused",
            Self::Provider { .. } => "provider_error",
            Self::Timeout(_) => "timeout",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::QuotaExceeded { context, .. } => context.as_ref(),
            Self::InvalidRequest { context, .. } => context.as_ref(),
            Self::Provider { context, .. } => context.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_errors_are_retryable_and_detectable() {
        let err = ProviderError::quota_remote(
            Duration::from_secs(60),
            ErrorContext::new().with_status(429),
        );
        assert!(err.is_retryable());
        assert!(err.is_quota());
        assert_eq!(err.code(), "quota_remote");
        assert_eq!(err.context().unwrap().http_status, Some(429));
    }

    #[test]
    fn quota_origin_does_not_become_the_error_source() {
        use std::error::Error as _;

        // The origin of a quota condition is payload, not a cause chain; the
        // derived source() must exist and be empty for both variants.
        let local = ProviderError::quota_local(Duration::from_secs(1));
        assert!(local.source().is_none());
        assert_eq!(local.code(), "quota_local");

        let remote = ProviderError::quota_remote(Duration::from_secs(1), ErrorContext::new());
        assert!(remote.source().is_none());
        assert!(remote.to_string().contains("Remote"));
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!ProviderError::invalid_request("bad").is_retryable());
        assert!(!ProviderError::refused("blocked").is_retryable());
        assert!(!ProviderError::config("no key").is_retryable());
        assert!(!ProviderError::provider("gemini", "boom", false).is_retryable());
    }

    #[test]
    fn transient_provider_errors_are_retryable() {
        assert!(ProviderError::provider("gemini", "503", true).is_retryable());
        assert!(ProviderError::Timeout(Duration::from_secs(120)).is_retryable());
    }
}
