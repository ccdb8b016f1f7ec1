//! Typed errors for the analysis pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Every error that can end up
//! attached to a single source exposes a short `reason()` code that the
//! presentation layer can show as-is.

use std::time::Duration;

use thiserror::Error;

/// Errors that abort a whole pipeline call or a store operation.
///
/// Per-source failures never surface as `PipelineError`; they are captured
/// in that source's [`AnalysisResult`](crate::types::analysis::AnalysisResult).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing credentials or malformed settings
    #[error("config error: {0}")]
    Config(String),

    /// Cache backend failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// JSON (de)serialization of a cache record failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while retrieving the raw bytes of a source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the configured timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Body exceeded the byte ceiling
    #[error("source exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    /// File or upload could not be read
    #[error("unreadable source: {0}")]
    Unreadable(String),

    /// Locator is not something this fetcher can retrieve
    #[error("invalid locator: {0}")]
    InvalidLocator(String),
}

impl FetchError {
    /// Short display code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::HttpStatus { .. } => "http_error",
            Self::Network(_) => "network_error",
            Self::Timeout { .. } => "timeout",
            Self::TooLarge { .. } => "too large",
            Self::Unreadable(_) => "unreadable",
            Self::InvalidLocator(_) => "invalid_locator",
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::Network(_) | Self::Timeout { .. } => true,
            Self::TooLarge { .. } | Self::Unreadable(_) | Self::InvalidLocator(_) => false,
        }
    }
}

/// Errors raised while turning raw bytes into text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// The byte stream cannot be parsed at all
    #[error("corrupt content: {0}")]
    Corrupt(String),
}

impl ExtractError {
    /// Short display code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Corrupt(_) => "corrupt",
        }
    }
}

/// Raw failure reported by a reasoning service, before retry policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Provider quota hit
    #[error("rate limited by reasoning service")]
    RateLimited { retry_after: Option<Duration> },

    /// Call did not complete in time
    #[error("reasoning service timed out")]
    Timeout,

    /// Network hiccup or 5xx
    #[error("transient reasoning service error: {0}")]
    Transient(String),

    /// Request rejected; retrying will not help
    #[error("reasoning service error: {0}")]
    Fatal(String),
}

impl ServiceError {
    /// Rate limits, timeouts and transient errors are retried.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }
}

/// Errors raised by the analysis orchestrator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// Breaker open or retries exhausted
    #[error("reasoning service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Structured output still invalid after the corrective re-prompt
    #[error("response failed schema validation: {0}")]
    SchemaValidation(String),

    /// Response was not the JSON shape the step expects
    #[error("unparseable response: {0}")]
    Parse(String),

    /// Service rejected the request outright
    #[error("reasoning service rejected request: {0}")]
    Api(String),
}

impl AnalysisError {
    /// Short display code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::SchemaValidation(_) => "schema_validation",
            Self::Parse(_) => "parse_error",
            Self::Api(_) => "api_error",
        }
    }
}

/// Result type alias for pipeline-level operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for extraction operations.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// Result type alias for orchestrator operations.
pub type AnalyzeResult<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_reasons() {
        let http = FetchError::HttpStatus {
            status: 500,
            url: "https://example.com".into(),
        };
        assert_eq!(http.reason(), "http_error");
        assert_eq!(FetchError::TooLarge { limit: 10 }.reason(), "too large");
        assert_eq!(FetchError::Unreadable("gone".into()).reason(), "unreadable");
    }

    #[test]
    fn test_retryable_statuses() {
        let server = FetchError::HttpStatus {
            status: 503,
            url: "u".into(),
        };
        let throttled = FetchError::HttpStatus {
            status: 429,
            url: "u".into(),
        };
        let missing = FetchError::HttpStatus {
            status: 404,
            url: "u".into(),
        };

        assert!(server.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!missing.is_retryable());
        assert!(!FetchError::TooLarge { limit: 1 }.is_retryable());
    }

    #[test]
    fn test_service_error_transience() {
        assert!(ServiceError::Timeout.is_transient());
        assert!(ServiceError::RateLimited { retry_after: None }.is_transient());
        assert!(!ServiceError::Fatal("bad request".into()).is_transient());
    }
}
